//! Workflow lifecycle: submission, admission, phase execution, cancellation.
//!
//! Each admitted workflow is driven by its own tokio task, which owns the
//! workflow record and writes a snapshot to the store after every
//! transition. Callers only ever see those snapshots.

use crate::aggregator::{AggregatedResult, ResultAggregator};
use crate::client::{AgentClient, DelegationRequest, DelegationResponse};
use crate::config::SupervisorConfig;
use crate::payload::validate_phase_output;
use crate::registry::AgentRegistry;
use crate::retry::{RetryDecision, RetryManager};
use crate::scheduler::{AgingPolicy, PriorityScheduler, SchedulerSnapshot, MAX_PRIORITY};
use crate::store::WorkflowStore;
use crate::types::{AgentType, Phase, PhaseState, Workflow, WorkflowOptions, WorkflowStatus};
use crate::validation::UrlPolicy;
use genius_core::{GeniusError, GeniusResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const DELETE_CANCEL_WAIT: Duration = Duration::from_secs(5);

/// A request to process one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub repository_url: String,
    /// 1-10; the configured default when absent.
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub options: WorkflowOptions,
}

impl SubmitRequest {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub workflow_id: Uuid,
    pub status: String,
    /// Seconds.
    pub estimated_completion: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub progress_percent: f64,
    pub current_phase: Option<Phase>,
    pub error: Option<String>,
}

impl From<&Workflow> for StatusReport {
    fn from(wf: &Workflow) -> Self {
        Self {
            workflow_id: wf.id,
            status: wf.status,
            progress_percent: wf.progress_percent(),
            current_phase: wf.current_phase(),
            error: wf.error.clone(),
        }
    }
}

/// Answer to a cancel request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub workflow_id: Uuid,
    /// Status when the request was handled. A running workflow reaches
    /// `cancelled` at its next checkpoint.
    pub status: WorkflowStatus,
    /// False when the workflow had already finished.
    pub accepted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowList {
    pub active: Vec<Uuid>,
    pub terminal: Vec<Uuid>,
}

enum PhaseOutcome {
    Completed(Value),
    Cancelled,
    Failed(GeniusError),
}

struct Inner {
    config: SupervisorConfig,
    registry: Arc<AgentRegistry>,
    client: Arc<dyn AgentClient>,
    store: Arc<dyn WorkflowStore>,
    retry: RetryManager,
    aggregator: ResultAggregator,
    urls: UrlPolicy,
    scheduler: Mutex<PriorityScheduler>,
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
}

/// Drives workflows through map, analyze and document.
#[derive(Clone)]
pub struct WorkflowCoordinator {
    inner: Arc<Inner>,
}

impl WorkflowCoordinator {
    pub fn new(
        config: SupervisorConfig,
        registry: Arc<AgentRegistry>,
        client: Arc<dyn AgentClient>,
        store: Arc<dyn WorkflowStore>,
    ) -> GeniusResult<Self> {
        config.validate()?;
        let urls = UrlPolicy::new(&config.validation)?;
        let aging = config.workflow.aging.as_ref().map(|a| AgingPolicy {
            boost_per_minute: a.boost_per_minute,
        });
        let scheduler = PriorityScheduler::new(config.workflow.max_concurrent_workflows, aging);
        Ok(Self {
            inner: Arc::new(Inner {
                retry: RetryManager::from_config(&config),
                aggregator: ResultAggregator::new(config.quality.clone()),
                urls,
                scheduler: Mutex::new(scheduler),
                tokens: Mutex::new(HashMap::new()),
                registry,
                client,
                store,
                config,
            }),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.inner.registry
    }

    /// Validate and enqueue a workflow. Invalid input creates no record.
    pub async fn submit(&self, request: SubmitRequest) -> GeniusResult<SubmitReceipt> {
        let inner = &self.inner;
        let url = inner.urls.check(&request.repository_url)?;
        let priority = request
            .priority
            .unwrap_or(inner.config.workflow.default_priority);
        if !(1..=MAX_PRIORITY).contains(&priority) {
            return Err(GeniusError::Validation(format!(
                "priority must be between 1 and {MAX_PRIORITY}, got {priority}"
            )));
        }

        let workflow = Workflow::new(url, priority, request.options, |p| {
            inner.retry.max_attempts(p)
        });
        let id = workflow.id;
        inner.store.put(&workflow).await?;
        inner.tokens.lock().await.insert(id, CancellationToken::new());
        inner.scheduler.lock().await.enqueue(id, priority);
        info!(
            workflow_id = %id,
            repository_url = %workflow.repository_url,
            priority,
            "Workflow accepted"
        );

        self.dispatch().await;
        Ok(SubmitReceipt {
            workflow_id: id,
            status: "accepted".into(),
            estimated_completion: inner.config.workflow.estimated_completion_secs,
        })
    }

    pub async fn get(&self, id: Uuid) -> GeniusResult<Workflow> {
        self.inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| GeniusError::NotFound(id.to_string()))
    }

    pub async fn get_status(&self, id: Uuid) -> GeniusResult<StatusReport> {
        Ok(StatusReport::from(&self.get(id).await?))
    }

    /// The aggregated result, which exists only for completed workflows.
    pub async fn get_result(&self, id: Uuid) -> GeniusResult<AggregatedResult> {
        let wf = self.get(id).await?;
        match (wf.status, wf.result) {
            (WorkflowStatus::Completed, Some(result)) => Ok(result),
            (status, _) => Err(GeniusError::NotReady {
                id: id.to_string(),
                status: status.to_string(),
            }),
        }
    }

    pub async fn list(&self) -> GeniusResult<WorkflowList> {
        Ok(WorkflowList {
            active: self.inner.store.list_active().await?,
            terminal: self.inner.store.list_terminal().await?,
        })
    }

    pub async fn scheduler_snapshot(&self) -> SchedulerSnapshot {
        self.inner.scheduler.lock().await.snapshot(Instant::now())
    }

    /// Request cancellation.
    ///
    /// A queued workflow is cancelled at once. A running one is signalled and
    /// stops at its next checkpoint; an in-flight agent call is left to finish
    /// on the agent side and its result is discarded.
    pub async fn cancel(&self, id: Uuid) -> GeniusResult<CancelAck> {
        let inner = &self.inner;
        let wf = self.get(id).await?;
        if wf.status.is_terminal() {
            return Ok(CancelAck {
                workflow_id: id,
                status: wf.status,
                accepted: false,
            });
        }

        let mut scheduler = inner.scheduler.lock().await;
        if scheduler.remove(id) {
            // Still queued, so no task owns the record yet.
            let mut wf = self.get(id).await?;
            wf.finish(WorkflowStatus::Cancelled, Some("cancelled before start".into()));
            inner.store.put(&wf).await?;
            drop(scheduler);
            inner.tokens.lock().await.remove(&id);
            info!(workflow_id = %id, "Queued workflow cancelled");
            return Ok(CancelAck {
                workflow_id: id,
                status: WorkflowStatus::Cancelled,
                accepted: true,
            });
        }
        drop(scheduler);

        let token = inner.tokens.lock().await.get(&id).cloned();
        match token {
            Some(token) => {
                token.cancel();
                info!(workflow_id = %id, "Cancellation requested");
                Ok(CancelAck {
                    workflow_id: id,
                    status: WorkflowStatus::Running,
                    accepted: true,
                })
            }
            None => {
                let wf = self.get(id).await?;
                Ok(CancelAck {
                    workflow_id: id,
                    status: wf.status,
                    accepted: false,
                })
            }
        }
    }

    /// Remove a workflow record and its artifacts, cancelling it first if needed.
    ///
    /// Fails with `NotReady` if the workflow does not stop in time; the record
    /// is kept so that its task can still finish writing it.
    pub async fn delete(&self, id: Uuid) -> GeniusResult<()> {
        self.delete_within(id, DELETE_CANCEL_WAIT).await
    }

    async fn delete_within(&self, id: Uuid, wait: Duration) -> GeniusResult<()> {
        let mut wf = self.get(id).await?;
        if !wf.status.is_terminal() {
            self.cancel(id).await?;
            wf = self.await_terminal(id, wait).await?;
            if !wf.status.is_terminal() {
                warn!(workflow_id = %id, "Workflow has not stopped, keeping its record");
                return Err(GeniusError::NotReady {
                    id: id.to_string(),
                    status: wf.status.to_string(),
                });
            }
        }
        self.inner.store.delete(id).await?;
        if let Some(root) = &self.inner.config.artifacts_dir {
            remove_artifacts(root, &wf).await;
        }
        info!(workflow_id = %id, "Workflow deleted");
        Ok(())
    }

    /// Poll until the workflow is terminal or `timeout` elapses, returning the latest snapshot.
    pub async fn await_terminal(&self, id: Uuid, timeout: Duration) -> GeniusResult<Workflow> {
        let deadline = Instant::now() + timeout;
        loop {
            let wf = self.get(id).await?;
            if wf.status.is_terminal() || Instant::now() >= deadline {
                return Ok(wf);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Admit queued workflows while slots are free.
    async fn dispatch(&self) {
        let inner = &self.inner;
        let mut scheduler = inner.scheduler.lock().await;
        while let Some(id) = scheduler.admit_next(Instant::now()) {
            let mut wf = match inner.store.get(id).await {
                Ok(Some(wf)) => wf,
                Ok(None) => {
                    warn!(workflow_id = %id, "Admitted workflow has no record");
                    scheduler.release(id);
                    inner.tokens.lock().await.remove(&id);
                    continue;
                }
                Err(e) => {
                    error!(workflow_id = %id, error = %e, "Failed to load admitted workflow");
                    self.abort_admission(&mut scheduler, id, &e).await;
                    continue;
                }
            };
            wf.mark_running();
            if let Err(e) = inner.store.put(&wf).await {
                error!(workflow_id = %id, error = %e, "Failed to persist admitted workflow");
                self.abort_admission(&mut scheduler, id, &e).await;
                continue;
            }
            let token = inner
                .tokens
                .lock()
                .await
                .entry(id)
                .or_insert_with(CancellationToken::new)
                .clone();
            info!(
                workflow_id = %id,
                running = scheduler.running_len(),
                queued = scheduler.queued_len(),
                "Workflow admitted"
            );
            tokio::spawn(self.clone().drive(wf, token));
        }
    }

    /// Give up on an admitted workflow that could not be started.
    async fn abort_admission(
        &self,
        scheduler: &mut PriorityScheduler,
        id: Uuid,
        err: &GeniusError,
    ) {
        scheduler.release(id);
        self.inner.tokens.lock().await.remove(&id);
        self.mark_failed(id, err).await;
    }

    fn drive(self, workflow: Workflow, token: CancellationToken) -> TaskFuture {
        Box::pin(async move {
            let id = workflow.id;
            if let Err(e) = self.execute(workflow, &token).await {
                error!(workflow_id = %id, error = %e, "Workflow task aborted");
                self.mark_failed(id, &e).await;
            }
            self.inner.scheduler.lock().await.release(id);
            self.inner.tokens.lock().await.remove(&id);
            self.dispatch().await;
        })
    }

    async fn mark_failed(&self, id: Uuid, err: &GeniusError) {
        if let Ok(Some(mut wf)) = self.inner.store.get(id).await {
            if !wf.status.is_terminal() {
                wf.finish(WorkflowStatus::Failed, Some(err.to_string()));
                if let Err(e) = self.inner.store.put(&wf).await {
                    error!(workflow_id = %id, error = %e, "Failed to persist failure");
                }
            }
        }
    }

    async fn execute(&self, mut wf: Workflow, token: &CancellationToken) -> GeniusResult<()> {
        let id = wf.id;
        info!(workflow_id = %id, "Workflow started");
        let mut input = Value::String(wf.repository_url.clone());

        for phase in Phase::ALL {
            match self.run_phase(&mut wf, phase, input, token).await? {
                PhaseOutcome::Completed(output) => input = output,
                PhaseOutcome::Cancelled => {
                    wf.finish(
                        WorkflowStatus::Cancelled,
                        Some(format!("cancelled during {phase}")),
                    );
                    self.inner.store.put(&wf).await?;
                    info!(workflow_id = %id, phase = %phase, "Workflow cancelled");
                    return Ok(());
                }
                PhaseOutcome::Failed(err) => {
                    let failure = GeniusError::PermanentFailure {
                        phase: phase.to_string(),
                        message: err.to_string(),
                    };
                    error!(workflow_id = %id, phase = %phase, error = %err, "Workflow failed");
                    wf.finish(WorkflowStatus::Failed, Some(failure.to_string()));
                    self.inner.store.put(&wf).await?;
                    return Ok(());
                }
            }
        }

        match self.inner.aggregator.aggregate(&wf) {
            Ok(result) => {
                info!(
                    workflow_id = %id,
                    overall_score = result.quality.overall_score,
                    total_processing_secs = result.total_processing_secs,
                    "Workflow completed"
                );
                wf.result = Some(result);
                wf.finish(WorkflowStatus::Completed, None);
            }
            Err(e) => {
                error!(workflow_id = %id, error = %e, "Result aggregation failed");
                wf.finish(WorkflowStatus::Failed, Some(e.to_string()));
            }
        }
        self.inner.store.put(&wf).await
    }

    async fn run_phase(
        &self,
        wf: &mut Workflow,
        phase: Phase,
        input: Value,
        token: &CancellationToken,
    ) -> GeniusResult<PhaseOutcome> {
        let inner = &self.inner;
        let agent_type = phase.agent_type();
        let request = DelegationRequest {
            action: phase.action().to_string(),
            input,
            options: wf.options.for_phase(phase),
        };

        loop {
            if token.is_cancelled() {
                // A phase that never started stays pending.
                if wf.phase(phase).state == PhaseState::Retry {
                    wf.phase_mut(phase).mark_abandoned("workflow cancelled");
                }
                return Ok(PhaseOutcome::Cancelled);
            }
            wf.phase_mut(phase).mark_running();
            inner.store.put(wf).await?;
            info!(
                workflow_id = %wf.id,
                phase = %phase,
                agent = %agent_type,
                attempt = wf.phase(phase).attempts + 1,
                "Phase started"
            );

            let started = Instant::now();
            let call = tokio::spawn(delegate_once(
                inner.registry.clone(),
                inner.client.clone(),
                agent_type,
                request.clone(),
            ));
            let joined = tokio::select! {
                _ = token.cancelled() => None,
                joined = call => Some(joined),
            };
            let Some(joined) = joined else {
                wf.phase_mut(phase)
                    .mark_abandoned("workflow cancelled while the agent call was in flight");
                return Ok(PhaseOutcome::Cancelled);
            };
            let elapsed = started.elapsed();

            let outcome = joined
                .map_err(|e| {
                    GeniusError::transient(agent_type.to_string(), format!("delegation task failed: {e}"))
                })
                .and_then(|r| r)
                .and_then(|response| {
                    let agent_time = response.processing_time;
                    let payload = response.into_payload(agent_type)?;
                    validate_phase_output(phase, &payload)?;
                    Ok((payload, agent_time))
                });

            match outcome {
                Ok((payload, agent_time)) => {
                    wf.phase_mut(phase)
                        .mark_completed(payload.clone(), elapsed.as_secs_f64(), agent_time);
                    inner.store.put(wf).await?;
                    info!(
                        workflow_id = %wf.id,
                        phase = %phase,
                        duration_secs = elapsed.as_secs_f64(),
                        "Phase completed"
                    );
                    return Ok(PhaseOutcome::Completed(payload));
                }
                Err(err) => {
                    let decision = inner.retry.record_failure(wf.phase_mut(phase), &err);
                    inner.store.put(wf).await?;
                    match decision {
                        RetryDecision::Retry { delay, .. } => {
                            let cancelled = tokio::select! {
                                _ = token.cancelled() => true,
                                _ = tokio::time::sleep(delay) => false,
                            };
                            if cancelled {
                                wf.phase_mut(phase).mark_abandoned("workflow cancelled during backoff");
                                return Ok(PhaseOutcome::Cancelled);
                            }
                        }
                        RetryDecision::GiveUp => return Ok(PhaseOutcome::Failed(err)),
                    }
                }
            }
        }
    }
}

/// One delegation attempt, short-circuited when the agent is not connected.
///
/// Runs as its own task so that an abandoned call still completes its
/// registry bookkeeping.
async fn delegate_once(
    registry: Arc<AgentRegistry>,
    client: Arc<dyn AgentClient>,
    agent_type: AgentType,
    request: DelegationRequest,
) -> GeniusResult<DelegationResponse> {
    let agent = registry
        .get(agent_type)
        .await
        .ok_or_else(|| GeniusError::AgentUnavailable(format!("{agent_type} is not registered")))?;
    if !agent.is_connected() {
        return Err(GeniusError::AgentUnavailable(format!(
            "{agent_type} is {:?}",
            agent.status
        )));
    }

    registry.begin_call(agent_type).await;
    let started = Instant::now();
    let result = client.delegate(&agent, &request).await;
    let error = result.as_ref().err().map(ToString::to_string);
    registry
        .end_call(agent_type, started.elapsed(), error.as_deref())
        .await;
    result
}

/// Delete the workflow's artifact files and its per-workflow directory, but
/// only where they resolve inside `root`.
async fn remove_artifacts(root: &Path, wf: &Workflow) {
    let Ok(root) = tokio::fs::canonicalize(root).await else {
        return;
    };
    let mut targets: Vec<std::path::PathBuf> = wf
        .result
        .iter()
        .flat_map(|r| r.artifacts.iter())
        .map(|a| {
            let path = Path::new(a);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        })
        .collect();
    targets.push(root.join(wf.id.to_string()));

    for target in targets {
        let Ok(resolved) = tokio::fs::canonicalize(&target).await else {
            continue;
        };
        if !resolved.starts_with(&root) || resolved == root {
            warn!(workflow_id = %wf.id, path = %resolved.display(), "Skipping artifact outside artifacts_dir");
            continue;
        }
        let is_dir = tokio::fs::metadata(&resolved)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let removed = if is_dir {
            tokio::fs::remove_dir_all(&resolved).await
        } else {
            tokio::fs::remove_file(&resolved).await
        };
        if let Err(e) = removed {
            warn!(workflow_id = %wf.id, path = %resolved.display(), error = %e, "Failed to remove artifact");
        }
    }
}
