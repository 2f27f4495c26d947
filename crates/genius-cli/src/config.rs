use genius_supervisor::SupervisorConfig;
use serde::Deserialize;
use std::path::Path;

/// Contents of `genius.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct GeniusConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl GeniusConfig {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: GeniusConfig = toml::from_str(raw)?;
        config.supervisor.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the built-in defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw).map_err(|e| {
                anyhow::anyhow!("Invalid config file '{}': {e}", path.display())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use genius_supervisor::AgentType;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GeniusConfig::parse("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.supervisor.workflow.max_concurrent_workflows, 10);
        assert_eq!(config.supervisor.retry.base_delay_ms, 5000);
        assert_eq!(
            config.supervisor.agents.get(AgentType::CodeAnalyzer).endpoint,
            "http://localhost:8082"
        );
    }

    #[test]
    fn test_partial_tables_merge_with_defaults() {
        let raw = r#"
[server]
port = 9000

[supervisor.workflow]
max_concurrent_workflows = 2

[supervisor.workflow.aging]
boost_per_minute = 0.5

[supervisor.retry]
max_attempts = 5
max_delay_ms = 60000

[supervisor.agents.docgenie]
endpoint = "http://docs.internal:9083"
max_attempts = 1

[supervisor.validation]
allowed_hosts = []
"#;
        let config = GeniusConfig::parse(raw).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        let sup = &config.supervisor;
        assert_eq!(sup.workflow.max_concurrent_workflows, 2);
        assert_eq!(sup.workflow.default_priority, 5);
        assert_eq!(sup.workflow.aging.as_ref().unwrap().boost_per_minute, 0.5);
        assert_eq!(sup.retry.max_attempts, 5);
        assert_eq!(sup.retry.max_delay_ms, Some(60_000));
        let docs = sup.agents.get(AgentType::DocGenie);
        assert_eq!(docs.endpoint, "http://docs.internal:9083");
        assert_eq!(docs.max_attempts, Some(1));
        assert_eq!(docs.timeout_secs, 300);
        assert!(sup.validation.allowed_hosts.is_empty());
    }

    #[test]
    fn test_example_config_parses() {
        let config = GeniusConfig::parse(include_str!("../../../genius.example.toml")).unwrap();
        assert_eq!(config.supervisor.agents.get(AgentType::DocGenie).timeout_secs, 400);
        assert!(config.supervisor.workflow.aging.is_none());
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(GeniusConfig::parse("[supervisor.workflow]\nmax_concurrent_workflows = 0\n").is_err());
        assert!(GeniusConfig::parse("[supervisor.retry]\nmax_attempts = 11\n").is_err());
        assert!(GeniusConfig::parse("[server]\nport = \"eighty\"\n").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeniusConfig::load(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[tokio::test]
    async fn test_invalid_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genius.toml");
        std::fs::write(&path, "[supervisor.health]\ninterval_secs = 0\n").unwrap();
        let err = GeniusConfig::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("genius.toml"));
    }
}
