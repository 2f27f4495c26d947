use crate::aggregator::AggregatedResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One of the three sequential pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Clone the repository, build the file tree, summarize the README.
    Map,
    /// Parse sources and build the code consistency graph.
    Analyze,
    /// Render documentation from the graph.
    Document,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Map, Phase::Analyze, Phase::Document];

    /// Agent type responsible for this phase.
    pub fn agent_type(self) -> AgentType {
        match self {
            Phase::Map => AgentType::RepositoryMapper,
            Phase::Analyze => AgentType::CodeAnalyzer,
            Phase::Document => AgentType::DocGenie,
        }
    }

    /// Action name sent in the delegation request.
    pub fn action(self) -> &'static str {
        match self {
            Phase::Map => "map_repository",
            Phase::Analyze => "analyze_repository",
            Phase::Document => "generate_documentation",
        }
    }

    /// Position of this phase in [`Phase::ALL`].
    pub fn index(self) -> usize {
        match self {
            Phase::Map => 0,
            Phase::Analyze => 1,
            Phase::Document => 2,
        }
    }

    /// Options sent to the agent when the submission does not override them.
    pub fn default_options(self) -> Map<String, Value> {
        let value = match self {
            Phase::Map => serde_json::json!({
                "include_file_tree": true,
                "include_readme": true,
                "include_metadata": true,
            }),
            Phase::Analyze => serde_json::json!({
                "depth": "full",
                "include_relationships": true,
                "include_metrics": true,
            }),
            Phase::Document => serde_json::json!({
                "formats": ["markdown", "html"],
                "include_diagrams": true,
                "include_citations": true,
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Map => write!(f, "map"),
            Phase::Analyze => write!(f, "analyze"),
            Phase::Document => write!(f, "document"),
        }
    }
}

/// Kind of remote agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentType {
    /// Serves the map phase.
    #[serde(rename = "repository_mapper")]
    RepositoryMapper,
    /// Serves the analyze phase.
    #[serde(rename = "code_analyzer")]
    CodeAnalyzer,
    /// Serves the document phase.
    #[serde(rename = "docgenie")]
    DocGenie,
}

impl AgentType {
    /// All agent types, in phase order.
    pub const ALL: [AgentType; 3] = [
        AgentType::RepositoryMapper,
        AgentType::CodeAnalyzer,
        AgentType::DocGenie,
    ];
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::RepositoryMapper => write!(f, "repository_mapper"),
            AgentType::CodeAnalyzer => write!(f, "code_analyzer"),
            AgentType::DocGenie => write!(f, "docgenie"),
        }
    }
}

/// Overall status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Completed, failed and cancelled workflows never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// State of a single phase within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Pending,
    Running,
    Completed,
    /// The attempt in flight was abandoned because the workflow was cancelled.
    Failed,
    /// Waiting out a backoff delay before the next attempt.
    Retry,
    FailedPermanent,
}

/// Progress record for one phase of one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase: Phase,
    pub agent_type: AgentType,
    pub state: PhaseState,
    /// Failed attempts so far. Never exceeds `max_attempts`.
    pub attempts: u32,
    pub max_attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration of the successful delegation call.
    pub duration_secs: Option<f64>,
    /// Processing time reported by the agent itself.
    pub agent_processing_time: Option<f64>,
    /// Validated phase output.
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Error message of every failed attempt, oldest first.
    #[serde(default)]
    pub error_history: Vec<String>,
}

impl PhaseStatus {
    pub fn new(phase: Phase, max_attempts: u32) -> Self {
        Self {
            phase,
            agent_type: phase.agent_type(),
            state: PhaseState::Pending,
            attempts: 0,
            max_attempts,
            started_at: None,
            completed_at: None,
            duration_secs: None,
            agent_processing_time: None,
            result: None,
            error: None,
            error_history: Vec::new(),
        }
    }

    /// Enter `running` for a new attempt. The start timestamp is kept from the first attempt.
    pub fn mark_running(&mut self) {
        self.state = PhaseState::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self, result: Value, duration_secs: f64, agent_time: Option<f64>) {
        self.state = PhaseState::Completed;
        self.completed_at = Some(Utc::now());
        self.duration_secs = Some(duration_secs);
        self.agent_processing_time = agent_time;
        self.result = Some(result);
        self.error = None;
    }

    /// Abandon the attempt in flight (cancellation).
    pub fn mark_abandoned(&mut self, reason: impl Into<String>) {
        self.state = PhaseState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(reason.into());
    }
}

/// Per-phase option overrides supplied at submission.
///
/// Keys given here replace the phase defaults; other defaults are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOptions {
    #[serde(default)]
    pub map: Map<String, Value>,
    #[serde(default)]
    pub analyze: Map<String, Value>,
    #[serde(default)]
    pub document: Map<String, Value>,
}

impl WorkflowOptions {
    /// Effective options for `phase`: defaults overlaid with the overrides.
    pub fn for_phase(&self, phase: Phase) -> Value {
        let overrides = match phase {
            Phase::Map => &self.map,
            Phase::Analyze => &self.analyze,
            Phase::Document => &self.document,
        };
        let mut merged = phase.default_options();
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        Value::Object(merged)
    }
}

/// One end-to-end request to process a repository through all phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub repository_url: String,
    /// 1-10, higher is more urgent.
    pub priority: u8,
    #[serde(default)]
    pub options: WorkflowOptions,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// One record per phase, in [`Phase::ALL`] order.
    pub phases: Vec<PhaseStatus>,
    pub status: WorkflowStatus,
    pub result: Option<AggregatedResult>,
    pub error: Option<String>,
}

impl Workflow {
    /// Create a pending workflow. `max_attempts` yields the retry budget per phase.
    pub fn new(
        repository_url: impl Into<String>,
        priority: u8,
        options: WorkflowOptions,
        max_attempts: impl Fn(Phase) -> u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository_url: repository_url.into(),
            priority,
            options,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            phases: Phase::ALL
                .iter()
                .map(|p| PhaseStatus::new(*p, max_attempts(*p)))
                .collect(),
            status: WorkflowStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn phase(&self, phase: Phase) -> &PhaseStatus {
        &self.phases[phase.index()]
    }

    pub fn phase_mut(&mut self, phase: Phase) -> &mut PhaseStatus {
        &mut self.phases[phase.index()]
    }

    /// Share of phases completed, 0-100.
    pub fn progress_percent(&self) -> f64 {
        let done = self
            .phases
            .iter()
            .filter(|p| p.state == PhaseState::Completed)
            .count();
        done as f64 / self.phases.len() as f64 * 100.0
    }

    /// The phase currently being worked on, if the workflow is running.
    pub fn current_phase(&self) -> Option<Phase> {
        if self.status != WorkflowStatus::Running {
            return None;
        }
        self.phases
            .iter()
            .find(|p| p.state != PhaseState::Completed)
            .map(|p| p.phase)
    }

    pub fn mark_running(&mut self) {
        self.status = WorkflowStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move to a terminal status.
    pub fn finish(&mut self, status: WorkflowStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// Reachability of an agent as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Connected,
    /// No response to the last probe.
    Disconnected,
    /// The last probe got an error response.
    Error,
}

/// Live view of one remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConnection {
    pub agent_type: AgentType,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub status: HealthStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// In-flight calls relative to capacity, in [0, 1].
    pub load: f64,
    /// Exponentially weighted mean of observed response times.
    pub avg_response_ms: f64,
    pub in_flight: u32,
    pub capacity: u32,
    /// Timeout applied to delegation calls.
    pub timeout_secs: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_error: Option<String>,
}

impl AgentConnection {
    pub fn new(agent_type: AgentType, endpoint: impl Into<String>) -> Self {
        Self {
            agent_type,
            endpoint: endpoint.into(),
            capabilities: Vec::new(),
            status: HealthStatus::Disconnected,
            last_heartbeat: None,
            load: 0.0,
            avg_response_ms: 0.0,
            in_flight: 0,
            capacity: 4,
            timeout_secs: 300,
            success_count: 0,
            failure_count: 0,
            last_error: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.status == HealthStatus::Connected
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_routing() {
        assert_eq!(Phase::Map.agent_type(), AgentType::RepositoryMapper);
        assert_eq!(Phase::Analyze.agent_type(), AgentType::CodeAnalyzer);
        assert_eq!(Phase::Document.agent_type(), AgentType::DocGenie);
        assert_eq!(Phase::Document.action(), "generate_documentation");
        for (i, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
    }

    #[test]
    fn test_agent_type_serialization() {
        let json = serde_json::to_string(&AgentType::DocGenie).unwrap();
        assert_eq!(json, "\"docgenie\"");
        let parsed: AgentType = serde_json::from_str("\"code_analyzer\"").unwrap();
        assert_eq!(parsed, AgentType::CodeAnalyzer);
        assert_eq!(AgentType::RepositoryMapper.to_string(), "repository_mapper");
    }

    #[test]
    fn test_phase_state_serialization() {
        let json = serde_json::to_string(&PhaseState::FailedPermanent).unwrap();
        assert_eq!(json, "\"failed_permanent\"");
    }

    #[test]
    fn test_new_workflow_is_pending() {
        let wf = Workflow::new("https://github.com/a/b", 5, WorkflowOptions::default(), |_| 3);
        assert_eq!(wf.status, WorkflowStatus::Pending);
        assert_eq!(wf.phases.len(), 3);
        assert!(wf.phases.iter().all(|p| p.state == PhaseState::Pending));
        assert!(wf.phases.iter().all(|p| p.max_attempts == 3));
        assert_eq!(wf.progress_percent(), 0.0);
        assert!(wf.current_phase().is_none());
    }

    #[test]
    fn test_progress_and_current_phase() {
        let mut wf = Workflow::new("https://github.com/a/b", 5, WorkflowOptions::default(), |_| 3);
        wf.mark_running();
        assert_eq!(wf.current_phase(), Some(Phase::Map));

        wf.phase_mut(Phase::Map)
            .mark_completed(serde_json::json!({}), 1.0, None);
        assert_eq!(wf.current_phase(), Some(Phase::Analyze));
        assert!((wf.progress_percent() - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_started_at_kept_across_attempts() {
        let mut phase = PhaseStatus::new(Phase::Analyze, 3);
        phase.mark_running();
        let first = phase.started_at;
        phase.state = PhaseState::Retry;
        phase.mark_running();
        assert_eq!(phase.started_at, first);
    }

    #[test]
    fn test_options_overlay_defaults() {
        let mut options = WorkflowOptions::default();
        options
            .document
            .insert("formats".into(), serde_json::json!(["markdown"]));

        let doc = options.for_phase(Phase::Document);
        assert_eq!(doc["formats"], serde_json::json!(["markdown"]));
        assert_eq!(doc["include_diagrams"], true);

        let analyze = options.for_phase(Phase::Analyze);
        assert_eq!(analyze["depth"], "full");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(!WorkflowStatus::Pending.is_terminal());
    }
}
