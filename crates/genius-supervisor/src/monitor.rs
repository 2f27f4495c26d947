use crate::client::AgentClient;
use crate::config::HealthConfig;
use crate::registry::AgentRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Periodically probes every registered agent and updates the registry.
pub struct HealthMonitor {
    registry: Arc<AgentRegistry>,
    client: Arc<dyn AgentClient>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        client: Arc<dyn AgentClient>,
        config: &HealthConfig,
    ) -> Self {
        Self {
            registry,
            client,
            interval: Duration::from_secs(config.interval_secs),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }

    /// Probe all agents once, concurrently.
    pub async fn probe_all(&self) {
        let agents = self.registry.snapshot().await;
        let mut probes = tokio::task::JoinSet::new();
        for agent in agents {
            let client = self.client.clone();
            let timeout = self.probe_timeout;
            probes.spawn(async move {
                let outcome = client.probe(&agent, timeout).await;
                (agent.agent_type, outcome)
            });
        }
        while let Some(joined) = probes.join_next().await {
            if let Ok((agent_type, outcome)) = joined {
                self.registry.record_probe(agent_type, &outcome).await;
            }
        }
    }

    /// Run the probe loop until `shutdown` fires. The first sweep runs immediately.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Health monitor started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.probe_all().await,
                }
            }
            info!("Health monitor stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::client::{DelegationRequest, DelegationResponse, ProbeOutcome};
    use crate::config::SupervisorConfig;
    use crate::types::{AgentConnection, AgentType, HealthStatus};
    use async_trait::async_trait;
    use genius_core::GeniusResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Code analyzer is down, everything else answers.
    struct PartialOutage {
        probes: AtomicUsize,
    }

    #[async_trait]
    impl AgentClient for PartialOutage {
        async fn delegate(
            &self,
            _agent: &AgentConnection,
            _request: &DelegationRequest,
        ) -> GeniusResult<DelegationResponse> {
            Ok(DelegationResponse::failed("unused"))
        }

        async fn probe(&self, agent: &AgentConnection, _timeout: Duration) -> ProbeOutcome {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if agent.agent_type == AgentType::CodeAnalyzer {
                ProbeOutcome::Unreachable {
                    reason: "connection refused".into(),
                }
            } else {
                ProbeOutcome::Healthy {
                    latency: Duration::from_millis(5),
                }
            }
        }
    }

    fn monitor(client: Arc<PartialOutage>) -> (Arc<AgentRegistry>, Arc<HealthMonitor>) {
        let config = SupervisorConfig::default();
        let registry = Arc::new(AgentRegistry::from_config(&config));
        let health = HealthConfig {
            interval_secs: 3600,
            ..config.health
        };
        let monitor = Arc::new(HealthMonitor::new(registry.clone(), client, &health));
        (registry, monitor)
    }

    #[tokio::test]
    async fn test_probe_all_updates_every_agent() {
        let client = Arc::new(PartialOutage {
            probes: AtomicUsize::new(0),
        });
        let (registry, monitor) = monitor(client.clone());

        monitor.probe_all().await;
        assert_eq!(client.probes.load(Ordering::SeqCst), 3);
        let mapper = registry.get(AgentType::RepositoryMapper).await.unwrap();
        assert_eq!(mapper.status, HealthStatus::Connected);
        let analyzer = registry.get(AgentType::CodeAnalyzer).await.unwrap();
        assert_eq!(analyzer.status, HealthStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_spawned_loop_probes_immediately_and_stops() {
        let client = Arc::new(PartialOutage {
            probes: AtomicUsize::new(0),
        });
        let (registry, monitor) = monitor(client.clone());
        let shutdown = CancellationToken::new();
        let handle = monitor.spawn(shutdown.clone());

        for _ in 0..100 {
            if client.probes.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(client.probes.load(Ordering::SeqCst), 3);
        assert!(registry
            .get(AgentType::DocGenie)
            .await
            .unwrap()
            .is_connected());
    }
}
