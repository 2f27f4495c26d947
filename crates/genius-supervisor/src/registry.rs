use crate::client::ProbeOutcome;
use crate::config::SupervisorConfig;
use crate::types::{AgentConnection, AgentType, HealthStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const EWMA_OLD: f64 = 0.8;
const EWMA_NEW: f64 = 0.2;

fn blend(avg_ms: f64, sample: Duration) -> f64 {
    let sample_ms = sample.as_secs_f64() * 1000.0;
    if avg_ms == 0.0 {
        sample_ms
    } else {
        avg_ms * EWMA_OLD + sample_ms * EWMA_NEW
    }
}

/// Live table of known agents, one connection per agent type.
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentType, AgentConnection>>,
}

impl AgentRegistry {
    pub fn new(connections: impl IntoIterator<Item = AgentConnection>) -> Self {
        let agents = connections
            .into_iter()
            .map(|c| (c.agent_type, c))
            .collect();
        Self {
            agents: RwLock::new(agents),
        }
    }

    /// Seed one disconnected connection per configured agent.
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(AgentType::ALL.iter().map(|t| {
            let agent = config.agents.get(*t);
            let mut conn = AgentConnection::new(*t, agent.endpoint.clone())
                .with_capabilities(agent.capabilities.clone());
            conn.timeout_secs = agent.timeout_secs;
            conn.capacity = agent.capacity;
            conn
        }))
    }

    pub async fn get(&self, agent_type: AgentType) -> Option<AgentConnection> {
        self.agents.read().await.get(&agent_type).cloned()
    }

    /// All connections, in phase order.
    pub async fn snapshot(&self) -> Vec<AgentConnection> {
        let agents = self.agents.read().await;
        let mut list: Vec<AgentConnection> = agents.values().cloned().collect();
        list.sort_by_key(|c| c.agent_type);
        list
    }

    pub async fn set_status(&self, agent_type: AgentType, status: HealthStatus) {
        if let Some(conn) = self.agents.write().await.get_mut(&agent_type) {
            conn.status = status;
        }
    }

    /// Apply a health probe result.
    pub async fn record_probe(&self, agent_type: AgentType, outcome: &ProbeOutcome) {
        let mut agents = self.agents.write().await;
        let Some(conn) = agents.get_mut(&agent_type) else {
            return;
        };
        let previous = conn.status;
        match outcome {
            ProbeOutcome::Healthy { latency } => {
                conn.status = HealthStatus::Connected;
                conn.last_heartbeat = Some(Utc::now());
                conn.avg_response_ms = blend(conn.avg_response_ms, *latency);
                conn.last_error = None;
                debug!(agent = %agent_type, latency_ms = latency.as_millis() as u64, "Probe ok");
            }
            ProbeOutcome::Unhealthy { reason } => {
                conn.status = HealthStatus::Error;
                conn.last_error = Some(reason.clone());
                warn!(agent = %agent_type, reason = %reason, "Agent unhealthy");
            }
            ProbeOutcome::Unreachable { reason } => {
                conn.status = HealthStatus::Disconnected;
                conn.last_error = Some(reason.clone());
                warn!(agent = %agent_type, reason = %reason, "Agent unreachable");
            }
        }
        if previous != conn.status {
            info!(agent = %agent_type, from = ?previous, to = ?conn.status, "Agent health changed");
        }
    }

    /// Count a delegation as in flight.
    pub async fn begin_call(&self, agent_type: AgentType) {
        if let Some(conn) = self.agents.write().await.get_mut(&agent_type) {
            conn.in_flight += 1;
            conn.load = load(conn);
        }
    }

    /// Record the outcome of a delegation started with [`begin_call`](Self::begin_call).
    ///
    /// Call outcomes feed load and latency figures only; health status is
    /// owned by the probes.
    pub async fn end_call(&self, agent_type: AgentType, latency: Duration, error: Option<&str>) {
        if let Some(conn) = self.agents.write().await.get_mut(&agent_type) {
            conn.in_flight = conn.in_flight.saturating_sub(1);
            conn.load = load(conn);
            conn.avg_response_ms = blend(conn.avg_response_ms, latency);
            match error {
                None => conn.success_count += 1,
                Some(err) => {
                    conn.failure_count += 1;
                    conn.last_error = Some(err.to_string());
                }
            }
        }
    }
}

fn load(conn: &AgentConnection) -> f64 {
    if conn.capacity == 0 {
        return 1.0;
    }
    (f64::from(conn.in_flight) / f64::from(conn.capacity)).min(1.0)
}
