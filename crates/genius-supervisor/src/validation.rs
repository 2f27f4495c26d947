//! Submission-time validation of repository URLs.

use crate::config::ValidationConfig;
use genius_core::{GeniusError, GeniusResult};
use regex::Regex;

const URL_PATTERN: &str =
    r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<host>[^/:?#\s]+)(?::(?P<port>\d{1,5}))?(?P<rest>[/?#]\S*)?$";
const DOMAIN_PATTERN: &str =
    r"^(?:[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$";
const IPV4_PATTERN: &str = r"^\d{1,3}(?:\.\d{1,3}){3}$";

/// Accepts well-formed URLs whose scheme and host are on the allow lists.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    url: Regex,
    domain: Regex,
    ipv4: Regex,
    allowed_schemes: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl UrlPolicy {
    pub fn new(config: &ValidationConfig) -> GeniusResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| GeniusError::Config(format!("invalid URL pattern: {e}")))
        };
        Ok(Self {
            url: compile(URL_PATTERN)?,
            domain: compile(DOMAIN_PATTERN)?,
            ipv4: compile(IPV4_PATTERN)?,
            allowed_schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }

    /// Validate `url`, returning its trimmed form.
    pub fn check(&self, url: &str) -> GeniusResult<String> {
        let url = url.trim();
        if url.is_empty() {
            return Err(GeniusError::Validation("repository_url is required".into()));
        }

        let caps = self
            .url
            .captures(url)
            .ok_or_else(|| GeniusError::Validation(format!("'{url}' is not a valid URL")))?;

        let scheme = caps
            .name("scheme")
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        if !self.allowed_schemes.contains(&scheme) {
            return Err(GeniusError::Validation(format!(
                "scheme '{scheme}' is not allowed"
            )));
        }

        let host = caps
            .name("host")
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        if !self.is_valid_host(&host) {
            return Err(GeniusError::Validation(format!(
                "'{host}' is not a valid host"
            )));
        }
        if !self.host_allowed(&host) {
            return Err(GeniusError::Validation(format!(
                "host '{host}' is not an allowed repository host"
            )));
        }

        if let Some(port) = caps.name("port") {
            if port.as_str().parse::<u16>().is_err() {
                return Err(GeniusError::Validation(format!(
                    "port '{}' is out of range",
                    port.as_str()
                )));
            }
        }
        Ok(url.to_string())
    }

    fn is_valid_host(&self, host: &str) -> bool {
        if host == "localhost" || self.domain.is_match(host) {
            return true;
        }
        self.ipv4.is_match(host) && host.split('.').all(|octet| octet.parse::<u8>().is_ok())
    }

    fn host_allowed(&self, host: &str) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        self.allowed_hosts.iter().any(|allowed| {
            host == allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
