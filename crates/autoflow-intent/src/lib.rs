//! Workflow model, generation and execution for autoflow.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  GENERATE_WORKFLOW  ┌───────────────────┐   ┌──────────────┐
//! │ WorkflowService │────────────────────>│ WorkflowGenerator │──>│ Orchestrator │
//! │ (typed messages)│                     └───────────────────┘   └──────▲───────┘
//! │                 │  EXECUTE_WORKFLOW   ┌───────────────────┐          │ feedback
//! │                 │────────────────────>│ WorkflowExecutor  │──────────┘
//! └─────────────────┘                     └───┬───────┬───────┘
//!                                             │       │
//!                                   StepRunner│       │ApiClient / transforms /
//!                                   (page     │       │conditions / loops
//!                                    actions) ▼       ▼
//! ```
//!
//! ## Modules
//!
//! - [`workflow`] -- Workflow, steps, error policy, normalization, corrections.
//! - [`action`] -- Typed action payloads, one variant per step type.
//! - [`condition`] -- Fail-closed condition evaluation.
//! - [`scope`] / [`template`] -- Path lookup and `{{path}}` substitution.
//! - [`transform`] -- filter / map / aggregate / parse / stringify.
//! - [`api`] -- HTTP calls made by `api` steps.
//! - [`runner`] -- Step runner capability for delegated step types.
//! - [`context`] -- Per-execution state and step results.
//! - [`registry`] -- Live executions with cancellation.
//! - [`executor`] -- The step state machine.
//! - [`generator`] -- Natural language to workflow.
//! - [`service`] -- Request/response message API.
//! - [`error`] -- Intent error types.

pub mod action;
pub mod api;
pub mod condition;
pub mod context;
pub mod error;
pub mod executor;
pub mod generator;
pub mod registry;
pub mod runner;
pub mod scope;
pub mod service;
pub mod template;
pub mod transform;
pub mod workflow;

// Re-export the most commonly used types at the crate root.
pub use action::StepAction;
pub use api::{ApiClient, ApiRequest};
pub use condition::{Condition, Operator, evaluate, evaluate_all};
pub use context::{ExecutionContext, ExecutionError, ExecutionStatus, StepOutcome, StepResult};
pub use error::{IntentError, Result};
pub use executor::{ExecutionSummary, ExecutorConfig, WorkflowExecutor};
pub use generator::{GeneratedWorkflow, GenerationContext, WorkflowGenerator};
pub use registry::{ExecutionGuard, ExecutionInfo, ExecutionRegistry};
pub use runner::{DryRunStepRunner, StepRunner, StepRunnerRegistry};
pub use scope::Scope;
pub use service::{Request, Response, ServiceStats, WorkflowService};
pub use transform::{AggregateFn, TransformAction, TransformOp};
pub use workflow::{
    ErrorHandling, ErrorMode, Step, StepType, Trigger, VariableSpec, VariableType, Workflow,
    WorkflowCorrection, WorkflowMetadata, WorkflowSettings,
};
