//! Delegation transport: the [`AgentClient`] seam and its HTTP implementation.

use crate::types::{AgentConnection, AgentType};
use async_trait::async_trait;
use genius_core::{GeniusError, GeniusResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Body sent to an agent for one phase attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub action: String,
    /// The repository URL for `map`, otherwise the previous phase's output.
    pub input: Value,
    pub options: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    Completed,
    Failed,
}

/// What an agent answers to a [`DelegationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationResponse {
    pub status: DelegationStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Seconds, as reported by the agent.
    #[serde(default)]
    pub processing_time: Option<f64>,
}

impl DelegationResponse {
    pub fn completed(result: Value, processing_time: f64) -> Self {
        Self {
            status: DelegationStatus::Completed,
            result: Some(result),
            error: None,
            processing_time: Some(processing_time),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DelegationStatus::Failed,
            result: None,
            error: Some(error.into()),
            processing_time: None,
        }
    }

    /// Unwrap the payload of a completed response.
    ///
    /// An agent-reported failure is transient; a completion without a
    /// payload is malformed.
    pub fn into_payload(self, agent: AgentType) -> GeniusResult<Value> {
        match (self.status, self.result) {
            (DelegationStatus::Completed, Some(result)) if !result.is_null() => Ok(result),
            (DelegationStatus::Completed, _) => Err(GeniusError::Validation(format!(
                "agent {agent} reported completion without a result"
            ))),
            (DelegationStatus::Failed, _) => Err(GeniusError::transient(
                agent.to_string(),
                self.error.unwrap_or_else(|| "agent reported failure".into()),
            )),
        }
    }
}

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Healthy { latency: Duration },
    /// The agent answered, but with an error status.
    Unhealthy { reason: String },
    /// No answer within the probe timeout.
    Unreachable { reason: String },
}

/// Capability to run phase work on, and probe, a remote agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Run one attempt of `request` on `agent`.
    async fn delegate(
        &self,
        agent: &AgentConnection,
        request: &DelegationRequest,
    ) -> GeniusResult<DelegationResponse>;

    /// Check whether `agent` is reachable within `timeout`.
    async fn probe(&self, agent: &AgentConnection, timeout: Duration) -> ProbeOutcome;
}

/// [`AgentClient`] speaking JSON over HTTP.
///
/// Delegations go to `POST {endpoint}/api/{action}` (underscores in the
/// action become dashes); probes go to `GET {endpoint}{health_path}`.
pub struct HttpAgentClient {
    http: reqwest::Client,
    health_path: String,
}

impl HttpAgentClient {
    pub fn new(health_path: impl Into<String>) -> GeniusResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| GeniusError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            health_path: health_path.into(),
        })
    }

    fn delegation_url(agent: &AgentConnection, action: &str) -> String {
        format!(
            "{}/api/{}",
            agent.endpoint.trim_end_matches('/'),
            action.replace('_', "-")
        )
    }

    fn health_url(&self, agent: &AgentConnection) -> String {
        format!("{}{}", agent.endpoint.trim_end_matches('/'), self.health_path)
    }
}

fn classify_transport(agent: AgentType, err: &reqwest::Error) -> GeniusError {
    if err.is_decode() {
        GeniusError::Validation(format!("agent {agent} returned an undecodable body: {err}"))
    } else if err.is_timeout() {
        GeniusError::transient(agent.to_string(), format!("request timed out: {err}"))
    } else if err.is_connect() {
        GeniusError::transient(agent.to_string(), format!("connection failed: {err}"))
    } else {
        GeniusError::transient(agent.to_string(), err.to_string())
    }
}

fn classify_status(agent: AgentType, status: StatusCode, body: &str) -> GeniusError {
    let detail = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.chars().take(200).collect::<String>())
    };
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        GeniusError::transient(agent.to_string(), detail)
    } else {
        GeniusError::Validation(format!("agent {agent} rejected the request: {detail}"))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn delegate(
        &self,
        agent: &AgentConnection,
        request: &DelegationRequest,
    ) -> GeniusResult<DelegationResponse> {
        let url = Self::delegation_url(agent, &request.action);
        debug!(agent = %agent.agent_type, url = %url, "Delegating");

        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(agent.timeout_secs))
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport(agent.agent_type, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(agent.agent_type, status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport(agent.agent_type, &e))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            GeniusError::Validation(format!(
                "agent {} returned a malformed delegation response: {e}",
                agent.agent_type
            ))
        })
    }

    async fn probe(&self, agent: &AgentConnection, timeout: Duration) -> ProbeOutcome {
        let url = self.health_url(agent);
        let started = Instant::now();
        match self.http.get(&url).timeout(timeout).send().await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Healthy {
                latency: started.elapsed(),
            },
            Ok(resp) => ProbeOutcome::Unhealthy {
                reason: format!("HTTP {}", resp.status()),
            },
            Err(e) => ProbeOutcome::Unreachable {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_response_yields_payload() {
        let resp = DelegationResponse::completed(serde_json::json!({"ok": true}), 1.5);
        let payload = resp.into_payload(AgentType::RepositoryMapper).unwrap();
        assert_eq!(payload["ok"], true);
    }

    #[test]
    fn test_completed_without_result_is_validation() {
        let resp: DelegationResponse =
            serde_json::from_str(r#"{"status":"completed","result":null}"#).unwrap();
        let err = resp.into_payload(AgentType::CodeAnalyzer).unwrap_err();
        assert!(matches!(err, GeniusError::Validation(_)));
    }

    #[test]
    fn test_failed_response_is_transient() {
        let err = DelegationResponse::failed("parser crashed")
            .into_payload(AgentType::CodeAnalyzer)
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("parser crashed"));
    }

    #[test]
    fn test_urls() {
        let agent = AgentConnection::new(AgentType::DocGenie, "http://localhost:8083/");
        assert_eq!(
            HttpAgentClient::delegation_url(&agent, "generate_documentation"),
            "http://localhost:8083/api/generate-documentation"
        );
        let client = HttpAgentClient::new("/api/health").unwrap();
        assert_eq!(client.health_url(&agent), "http://localhost:8083/api/health");
    }

    #[test]
    fn test_status_classification() {
        let agent = AgentType::RepositoryMapper;
        assert!(classify_status(agent, StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status(agent, StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status(agent, StatusCode::REQUEST_TIMEOUT, "").is_retryable());
        let err = classify_status(agent, StatusCode::UNPROCESSABLE_ENTITY, "bad input");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("bad input"));
    }
}
