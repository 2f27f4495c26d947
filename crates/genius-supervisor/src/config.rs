use crate::types::AgentType;
use genius_core::{GeniusError, GeniusResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level supervisor configuration (the `[supervisor]` table of `genius.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub quality: QualityWeights,
    /// Root under which documentation artifacts may be removed on delete.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_workflows: usize,
    #[serde(default = "default_priority")]
    pub default_priority: u8,
    /// Hint returned to submitters.
    #[serde(default = "default_estimated_completion")]
    pub estimated_completion_secs: u64,
    /// Priority aging. Absent means off.
    #[serde(default)]
    pub aging: Option<AgingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingConfig {
    /// Priority points gained per minute spent in the queue.
    pub boost_per_minute: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay. Absent means uncapped.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_health_path")]
    pub path: String,
}

/// Endpoint and limits for one remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
    /// In-flight calls treated as full load.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Overrides `retry.max_attempts` for the phase this agent serves.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_repository_mapper")]
    pub repository_mapper: AgentConfig,
    #[serde(default = "default_code_analyzer")]
    pub code_analyzer: AgentConfig,
    #[serde(default = "default_docgenie")]
    pub docgenie: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,
    /// Exact or parent-domain matches. Empty accepts any host.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

/// Weights of the three quality components in the overall score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityWeights {
    #[serde(default = "default_weight")]
    pub repository: f64,
    #[serde(default = "default_weight")]
    pub analysis: f64,
    #[serde(default = "default_weight")]
    pub documentation: f64,
}

fn default_max_concurrent() -> usize {
    10
}
fn default_priority() -> u8 {
    5
}
fn default_estimated_completion() -> u64 {
    300
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    5_000
}
fn default_health_interval() -> u64 {
    30
}
fn default_probe_timeout() -> u64 {
    2_000
}
fn default_health_path() -> String {
    "/api/health".into()
}
fn default_agent_timeout() -> u64 {
    300
}
fn default_capacity() -> u32 {
    4
}
fn default_weight() -> f64 {
    1.0
}
fn default_allowed_schemes() -> Vec<String> {
    vec!["https".into(), "http".into()]
}
fn default_allowed_hosts() -> Vec<String> {
    vec![
        "github.com".into(),
        "gitlab.com".into(),
        "bitbucket.org".into(),
    ]
}

fn agent(endpoint: &str, capabilities: &[&str], timeout_secs: u64) -> AgentConfig {
    AgentConfig {
        endpoint: endpoint.into(),
        capabilities: capabilities.iter().map(|c| (*c).to_string()).collect(),
        timeout_secs,
        capacity: default_capacity(),
        max_attempts: None,
    }
}

fn default_repository_mapper() -> AgentConfig {
    agent(
        "http://localhost:8081",
        &["clone_repository", "generate_file_tree", "summarize_readme"],
        300,
    )
}
fn default_code_analyzer() -> AgentConfig {
    agent(
        "http://localhost:8082",
        &["parse_code", "build_ccg", "extract_relationships"],
        600,
    )
}
fn default_docgenie() -> AgentConfig {
    agent(
        "http://localhost:8083",
        &["generate_documentation", "create_diagrams", "assess_quality"],
        400,
    )
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: default_max_concurrent(),
            default_priority: default_priority(),
            estimated_completion_secs: default_estimated_completion(),
            aging: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: None,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            probe_timeout_ms: default_probe_timeout(),
            path: default_health_path(),
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            repository_mapper: default_repository_mapper(),
            code_analyzer: default_code_analyzer(),
            docgenie: default_docgenie(),
        }
    }
}

impl AgentsConfig {
    pub fn get(&self, agent_type: AgentType) -> &AgentConfig {
        match agent_type {
            AgentType::RepositoryMapper => &self.repository_mapper,
            AgentType::CodeAnalyzer => &self.code_analyzer,
            AgentType::DocGenie => &self.docgenie,
        }
    }

    pub fn get_mut(&mut self, agent_type: AgentType) -> &mut AgentConfig {
        match agent_type {
            AgentType::RepositoryMapper => &mut self.repository_mapper,
            AgentType::CodeAnalyzer => &mut self.code_analyzer,
            AgentType::DocGenie => &mut self.docgenie,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            repository: default_weight(),
            analysis: default_weight(),
            documentation: default_weight(),
        }
    }
}

impl SupervisorConfig {
    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> GeniusResult<()> {
        let wf = &self.workflow;
        if !(1..=100).contains(&wf.max_concurrent_workflows) {
            return Err(GeniusError::Config(format!(
                "workflow.max_concurrent_workflows must be 1-100, got {}",
                wf.max_concurrent_workflows
            )));
        }
        if !(1..=10).contains(&wf.default_priority) {
            return Err(GeniusError::Config(format!(
                "workflow.default_priority must be 1-10, got {}",
                wf.default_priority
            )));
        }
        if let Some(aging) = &wf.aging {
            if !aging.boost_per_minute.is_finite() || aging.boost_per_minute < 0.0 {
                return Err(GeniusError::Config(
                    "workflow.aging.boost_per_minute must be a non-negative number".into(),
                ));
            }
        }

        check_attempts("retry.max_attempts", self.retry.max_attempts)?;
        if let Some(max) = self.retry.max_delay_ms {
            if max < self.retry.base_delay_ms {
                return Err(GeniusError::Config(
                    "retry.max_delay_ms must not be below retry.base_delay_ms".into(),
                ));
            }
        }

        if self.health.interval_secs == 0 || self.health.probe_timeout_ms == 0 {
            return Err(GeniusError::Config(
                "health.interval_secs and health.probe_timeout_ms must be positive".into(),
            ));
        }
        if !self.health.path.starts_with('/') {
            return Err(GeniusError::Config(format!(
                "health.path must start with '/', got '{}'",
                self.health.path
            )));
        }

        for agent_type in AgentType::ALL {
            let agent = self.agents.get(agent_type);
            if agent.endpoint.trim().is_empty() {
                return Err(GeniusError::Config(format!(
                    "agents.{agent_type}.endpoint must not be empty"
                )));
            }
            if agent.capacity == 0 || agent.timeout_secs == 0 {
                return Err(GeniusError::Config(format!(
                    "agents.{agent_type}: capacity and timeout_secs must be positive"
                )));
            }
            if let Some(n) = agent.max_attempts {
                check_attempts(&format!("agents.{agent_type}.max_attempts"), n)?;
            }
        }

        if self.validation.allowed_schemes.is_empty() {
            return Err(GeniusError::Config(
                "validation.allowed_schemes must not be empty".into(),
            ));
        }

        let q = &self.quality;
        let weights = [q.repository, q.analysis, q.documentation];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(GeniusError::Config(
                "quality weights must be non-negative and not all zero".into(),
            ));
        }
        Ok(())
    }
}

fn check_attempts(field: &str, value: u32) -> GeniusResult<()> {
    if (1..=10).contains(&value) {
        Ok(())
    } else {
        Err(GeniusError::Config(format!(
            "{field} must be 1-10, got {value}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SupervisorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.workflow.max_concurrent_workflows, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.agents.code_analyzer.endpoint, "http://localhost:8082");
        assert_eq!(config.agents.code_analyzer.timeout_secs, 600);
        assert!(config.workflow.aging.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SupervisorConfig = serde_json::from_value(serde_json::json!({
            "retry": {"base_delay_ms": 100},
            "agents": {"docgenie": {"endpoint": "http://docs:9000"}}
        }))
        .unwrap();
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.agents.docgenie.endpoint, "http://docs:9000");
        assert_eq!(config.agents.docgenie.capacity, 4);
        assert_eq!(
            config.agents.repository_mapper.endpoint,
            "http://localhost:8081"
        );
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut config = SupervisorConfig::default();
        config.workflow.max_concurrent_workflows = 0;
        assert!(matches!(config.validate(), Err(GeniusError::Config(_))));

        let mut config = SupervisorConfig::default();
        config.retry.max_attempts = 11;
        assert!(config.validate().is_err());

        let mut config = SupervisorConfig::default();
        config.agents.get_mut(AgentType::CodeAnalyzer).endpoint = " ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("code_analyzer"));
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = SupervisorConfig::default();
        config.quality = QualityWeights {
            repository: 0.0,
            analysis: 0.0,
            documentation: 0.0,
        };
        assert!(config.validate().is_err());
    }
}
