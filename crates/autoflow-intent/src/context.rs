//! Per-execution state.
//!
//! An [`ExecutionContext`] is owned by exactly one running execution and is
//! never shared.  It is also the [`Scope`] that conditions, templates and
//! transforms read from:
//!
//! | path prefix                  | resolves against                      |
//! |------------------------------|---------------------------------------|
//! | `variables.` / `vars.`       | variable bag (defaults, params, outputs) |
//! | `params.` / `parameters.`    | input parameters as given             |
//! | `steps.<id>`                 | output of a finished step             |
//! | `last` / `previous`          | most recent step output               |
//! | anything else                | variables, then params, then step outputs |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::scope::{Scope, get_path, split_head};
use crate::workflow::{Step, StepType, Workflow};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Lifecycle of an execution.  `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    /// Conditions did not hold; the step never ran.
    Skipped,
    Error,
    /// Succeeded after at least one failed attempt.
    Retried,
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub step_type: StepType,
    pub outcome: StepOutcome,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    /// Results of nested loop/condition steps, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<StepResult>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn skipped(step: &Step) -> Self {
        Self {
            step_id: step.id.clone(),
            step_type: step.step_type(),
            outcome: StepOutcome::Skipped,
            payload: Value::Null,
            error: None,
            attempts: 0,
            sub_results: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome == StepOutcome::Error
    }
}

/// A step error recorded on the execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub step_id: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub workflow: Arc<Workflow>,
    pub params: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub results: Vec<StepResult>,
    pub errors: Vec<ExecutionError>,
    pub step_outputs: Map<String, Value>,
    pub last_output: Option<Value>,
    pub started_at: DateTime<Utc>,
    current_step: usize,
    status: ExecutionStatus,
}

impl ExecutionContext {
    /// Fresh context.  Variables start from the workflow's declared
    /// defaults, overridden by `params`.
    pub fn new(execution_id: Uuid, workflow: Arc<Workflow>, params: Map<String, Value>) -> Self {
        let mut variables = workflow.default_variables();
        variables.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            execution_id,
            workflow,
            params,
            variables,
            results: Vec::new(),
            errors: Vec::new(),
            step_outputs: Map::new(),
            last_output: None,
            started_at: Utc::now(),
            current_step: 0,
            status: ExecutionStatus::Pending,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Move to `status`.  Terminal states are never left.
    pub fn set_status(&mut self, status: ExecutionStatus) {
        if self.status.is_terminal() {
            debug!(execution_id = %self.execution_id, from = ?self.status, to = ?status, "ignoring status change after termination");
            return;
        }
        self.status = status;
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Advance the top-level step index; it never moves backwards.
    pub fn advance_to(&mut self, index: usize) {
        self.current_step = self.current_step.max(index);
    }

    pub fn set_variable(&mut self, name: &str, value: Value) -> Option<Value> {
        self.variables.insert(name.to_owned(), value)
    }

    /// Put back a variable saved by [`set_variable`](Self::set_variable).
    pub fn restore_variable(&mut self, name: &str, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.variables.insert(name.to_owned(), value);
            }
            None => {
                self.variables.remove(name);
            }
        }
    }

    /// Store a step's output under its id and its output variable.
    ///
    /// Condition steps do not replace `last`, so a transform after a branch
    /// reads the branch's output rather than the boolean.
    pub fn record_output(&mut self, step: &Step, payload: &Value) {
        self.step_outputs.insert(step.id.clone(), payload.clone());
        if let Some(variable) = &step.output {
            self.variables.insert(variable.clone(), payload.clone());
        }
        if step.step_type() != StepType::Condition {
            self.last_output = Some(payload.clone());
        }
    }

    pub fn record_error(&mut self, step_id: &str, message: impl Into<String>) {
        self.errors.push(ExecutionError {
            step_id: step_id.to_owned(),
            message: message.into(),
        });
    }
}

fn lookup_in(map: &Map<String, Value>, path: &str) -> Option<Value> {
    let (head, rest) = split_head(path);
    if head.is_empty() {
        return Some(Value::Object(map.clone()));
    }
    map.get(head).and_then(|v| get_path(v, rest)).cloned()
}

impl Scope for ExecutionContext {
    fn lookup(&self, path: &str) -> Option<Value> {
        match split_head(path) {
            ("variables" | "vars", rest) => lookup_in(&self.variables, rest),
            ("params" | "parameters", rest) => lookup_in(&self.params, rest),
            ("steps", rest) => lookup_in(&self.step_outputs, rest),
            ("last" | "previous", rest) => self
                .last_output
                .as_ref()
                .and_then(|v| get_path(v, rest))
                .cloned(),
            ("execution_id" | "executionId", "") => Some(Value::String(self.execution_id.to_string())),
            (head, rest) => self
                .variables
                .get(head)
                .or_else(|| self.params.get(head))
                .or_else(|| self.step_outputs.get(head))
                .and_then(|v| get_path(v, rest))
                .cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ClickAction, StepAction};
    use crate::workflow::VariableSpec;
    use serde_json::json;

    fn context() -> ExecutionContext {
        let mut workflow = Workflow::new(
            "w",
            vec![Step::new("s", StepAction::Click(ClickAction { selector: "a".into() }))],
        );
        workflow
            .variables
            .insert("limit".into(), VariableSpec::with_default(5));
        workflow
            .variables
            .insert("query".into(), VariableSpec::with_default("books"));
        let params = json!({"query": "films", "user": {"id": 7}});
        let Value::Object(params) = params else { unreachable!() };
        ExecutionContext::new(Uuid::now_v7(), Arc::new(workflow), params)
    }

    #[test]
    fn params_override_defaults() {
        let ctx = context();
        assert_eq!(ctx.lookup("limit"), Some(json!(5)));
        assert_eq!(ctx.lookup("query"), Some(json!("films")));
        assert_eq!(ctx.lookup("params.user.id"), Some(json!(7)));
        assert_eq!(ctx.lookup("variables.user.id"), Some(json!(7)));
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn outputs_are_addressable() {
        let mut ctx = context();
        let step = Step::new("fetch", StepAction::Click(ClickAction { selector: "a".into() }))
            .with_output("page");
        ctx.record_output(&step, &json!({"title": "Home"}));
        assert_eq!(ctx.lookup("steps.fetch.title"), Some(json!("Home")));
        assert_eq!(ctx.lookup("page.title"), Some(json!("Home")));
        assert_eq!(ctx.lookup("last.title"), Some(json!("Home")));
    }

    #[test]
    fn step_index_is_monotonic() {
        let mut ctx = context();
        ctx.advance_to(3);
        ctx.advance_to(1);
        assert_eq!(ctx.current_step(), 3);
    }

    #[test]
    fn terminal_status_is_sticky() {
        let mut ctx = context();
        ctx.set_status(ExecutionStatus::Running);
        ctx.set_status(ExecutionStatus::Failed);
        ctx.set_status(ExecutionStatus::Succeeded);
        assert_eq!(ctx.status(), ExecutionStatus::Failed);
    }

    #[test]
    fn variables_restore() {
        let mut ctx = context();
        let previous = ctx.set_variable("item", json!(1));
        assert_eq!(previous, None);
        ctx.restore_variable("item", previous);
        assert_eq!(ctx.lookup("item"), None);
    }
}
