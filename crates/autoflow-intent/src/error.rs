//! Intent engine error types.
//!
//! All workflow, execution and service failures surface through
//! [`IntentError`].  Condition evaluation errors never appear here: the
//! evaluator swallows them and fails closed.

use crate::workflow::StepType;

/// Unified error type for the intent engine.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Workflow errors ------------------------------------------------------
    /// The workflow definition violates a structural rule.
    #[error("invalid workflow: {reason}")]
    InvalidWorkflow { reason: String },

    /// A step's action payload does not match its type.
    #[error("invalid action for step `{step_id}`: {reason}")]
    InvalidStepAction { step_id: String, reason: String },

    /// The referenced workflow does not exist.
    #[error("workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: String },

    // -- Execution errors ----------------------------------------------------
    /// A step failed while running.
    #[error("step `{step_id}` failed: {reason}")]
    StepExecution { step_id: String, reason: String },

    /// A step exceeded its deadline.
    #[error("step `{step_id}` timed out after {after_ms}ms")]
    StepTimeout { step_id: String, after_ms: u64 },

    /// No runner is registered for a delegated step type.
    #[error("no step runner registered for `{step_type}` steps")]
    NoRunnerRegistered { step_type: StepType },

    /// A step in "fail" mode errored and stopped the execution.
    #[error("execution aborted at step `{step_id}`: {reason}")]
    ExecutionAborted { step_id: String, reason: String },

    /// The execution was cancelled.
    #[error("execution cancelled")]
    ExecutionCancelled,

    /// The referenced execution is not running.
    #[error("execution not found: {execution_id}")]
    ExecutionNotFound { execution_id: String },

    // -- Generation errors ---------------------------------------------------
    /// Generated text could not be turned into a workflow.
    #[error("generated content is not a usable workflow: {reason}")]
    GenerationUnusable { reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the agent crate.
    #[error("agent error: {0}")]
    Agent(#[from] autoflow_agent::AgentError),

    /// An error propagated from the storage collaborators.
    #[error("store error: {0}")]
    Store(#[from] autoflow_store::StoreError),

    /// An error propagated from the kernel crate.
    #[error("kernel error: {0}")]
    Kernel(#[from] autoflow_kernel::KernelError),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;

impl IntentError {
    /// Whether this error must stop the whole execution regardless of the
    /// failing step's error-handling mode.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExecutionAborted { .. } | Self::ExecutionCancelled)
    }

    pub(crate) fn step(step_id: &str, reason: impl Into<String>) -> Self {
        Self::StepExecution {
            step_id: step_id.to_owned(),
            reason: reason.into(),
        }
    }
}
