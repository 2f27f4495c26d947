//! The Genius supervisor: drives repositories through the map, analyze and
//! document pipeline executed by remote agents.
//!
//! Submitted workflows wait in a priority queue until a concurrency slot
//! frees, then run their phases strictly in order. Failed attempts are
//! retried with exponential backoff, agent health is tracked by a periodic
//! monitor, and the outputs of a fully successful run are combined into one
//! quality-scored result.
//!
//! # Main types
//!
//! - [`WorkflowCoordinator`]: Lifecycle state machine and public API.
//! - [`PriorityScheduler`]: Admission queue with a concurrency cap.
//! - [`RetryManager`]: Per-phase retry and backoff policy.
//! - [`AgentRegistry`] / [`HealthMonitor`]: Live agent table and its probe loop.
//! - [`ResultAggregator`]: Builds the [`AggregatedResult`] and quality metrics.
//! - [`AgentClient`]: Transport seam, implemented over HTTP by [`HttpAgentClient`].
//! - [`WorkflowStore`]: Record storage, in memory or as JSON files.

/// Result aggregation and quality scoring.
pub mod aggregator;
/// Code Consistency Graph model and validation.
pub mod ccg;
/// Agent transport trait and HTTP client.
pub mod client;
/// Supervisor configuration.
pub mod config;
/// Workflow coordinator.
pub mod coordinator;
/// Periodic agent health probing.
pub mod monitor;
/// Typed phase payloads.
pub mod payload;
/// Agent registry.
pub mod registry;
/// Retry policy.
pub mod retry;
/// Priority admission queue.
pub mod scheduler;
/// Workflow record storage.
pub mod store;
/// Workflow, phase and agent types.
pub mod types;
/// Repository URL validation.
pub mod validation;

pub use aggregator::{AggregatedResult, QualityMetrics, ResultAggregator};
pub use ccg::Ccg;
pub use client::{
    AgentClient, DelegationRequest, DelegationResponse, DelegationStatus, HttpAgentClient,
    ProbeOutcome,
};
pub use config::SupervisorConfig;
pub use coordinator::{
    CancelAck, StatusReport, SubmitReceipt, SubmitRequest, WorkflowCoordinator, WorkflowList,
};
pub use monitor::HealthMonitor;
pub use registry::AgentRegistry;
pub use retry::{RetryDecision, RetryManager, RetryPolicy};
pub use scheduler::{PriorityScheduler, SchedulerSnapshot};
pub use store::{FileWorkflowStore, InMemoryWorkflowStore, WorkflowStore};
pub use types::{
    AgentConnection, AgentType, HealthStatus, Phase, PhaseState, PhaseStatus, Workflow,
    WorkflowOptions, WorkflowStatus,
};
pub use validation::UrlPolicy;
