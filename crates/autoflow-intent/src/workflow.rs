//! Workflow data model.
//!
//! A [`Workflow`] is an ordered list of [`Step`]s plus triggers, declared
//! variables, a default error-handling policy and execution settings.  It
//! is created when text is generated and afterwards only changes through
//! [`Workflow::apply_correction`].
//!
//! Generated JSON is accepted in a few shapes (camelCase keys, inline
//! action payloads, numeric ids); everything is parsed into typed values
//! up front, then [`Workflow::normalize`] fills in missing step ids and
//! [`Workflow::validate`] enforces the structural rules.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::action::{AlertAction, AlertLevel, StepAction};
use crate::condition::Condition;
use crate::error::{IntentError, Result};

/// Longest workflow name derived from a description.
const MAX_DERIVED_NAME_CHARS: usize = 60;

// ---------------------------------------------------------------------------
// StepType
// ---------------------------------------------------------------------------

/// The kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[serde(alias = "navigation", alias = "goto", alias = "open")]
    Navigate,
    Click,
    #[serde(alias = "fill", alias = "type_text")]
    Input,
    #[serde(alias = "scrape", alias = "extract_data")]
    Extract,
    #[serde(alias = "delay", alias = "sleep")]
    Wait,
    #[serde(alias = "http", alias = "fetch", alias = "request", alias = "api_call")]
    Api,
    Transform,
    #[serde(alias = "if", alias = "branch")]
    Condition,
    #[serde(alias = "foreach", alias = "for_each", alias = "repeat")]
    Loop,
    #[serde(alias = "notify", alias = "notification", alias = "message")]
    Alert,
}

impl StepType {
    pub const ALL: [StepType; 10] = [
        Self::Navigate,
        Self::Click,
        Self::Input,
        Self::Extract,
        Self::Wait,
        Self::Api,
        Self::Transform,
        Self::Condition,
        Self::Loop,
        Self::Alert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Input => "input",
            Self::Extract => "extract",
            Self::Wait => "wait",
            Self::Api => "api",
            Self::Transform => "transform",
            Self::Condition => "condition",
            Self::Loop => "loop",
            Self::Alert => "alert",
        }
    }

    /// Whether steps of this type are handed to an external step runner
    /// instead of being performed by the engine.
    pub fn is_delegated(self) -> bool {
        matches!(
            self,
            Self::Navigate | Self::Click | Self::Input | Self::Extract | Self::Wait | Self::Alert
        )
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// What happens when a step errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Abort the remaining steps; the execution fails.
    #[serde(alias = "stop", alias = "abort")]
    Fail,
    /// Re-run the step with a step-scoped retry budget.
    Retry,
    /// Record the error and continue with the next step.
    #[default]
    #[serde(alias = "continue", alias = "skip_and_continue", alias = "ignore")]
    Skip,
}

/// Error-handling policy of a workflow or a single step.
///
/// Accepts either a bare mode string (`"retry"`) or an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawErrorHandling")]
pub struct ErrorHandling {
    pub mode: ErrorMode,
    /// Attempt budget for `retry` mode; the executor default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Base backoff for `retry` mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl ErrorHandling {
    pub fn mode(mode: ErrorMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawErrorHandling {
    Mode(ErrorMode),
    Full {
        #[serde(default, alias = "strategy", alias = "on_error", alias = "onError")]
        mode: ErrorMode,
        #[serde(default, alias = "maxAttempts", alias = "retries")]
        max_attempts: Option<u32>,
        #[serde(default, alias = "retryDelayMs", alias = "retry_delay")]
        retry_delay_ms: Option<u64>,
    },
}

impl From<RawErrorHandling> for ErrorHandling {
    fn from(raw: RawErrorHandling) -> Self {
        match raw {
            RawErrorHandling::Mode(mode) => Self::mode(mode),
            RawErrorHandling::Full {
                mode,
                max_attempts,
                retry_delay_ms,
            } => Self {
                mode,
                max_attempts,
                retry_delay_ms,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Triggers, variables, settings, metadata
// ---------------------------------------------------------------------------

/// What starts a workflow.  Stored for callers; the engine itself only
/// runs workflows on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Schedule {
        #[serde(alias = "cron")]
        expression: String,
    },
    Event {
        #[serde(alias = "event", alias = "eventName")]
        event_name: String,
    },
    #[serde(alias = "pageLoad")]
    PageLoad {
        #[serde(alias = "urlPattern", alias = "url")]
        url_pattern: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[serde(alias = "text")]
    String,
    #[serde(alias = "integer", alias = "float", alias = "int")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "list")]
    Array,
    #[serde(alias = "map")]
    Object,
    #[default]
    Any,
}

impl VariableType {
    fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::Null => Self::Any,
        }
    }
}

/// A declared workflow variable.
///
/// Written either as `{"type": ..., "default": ...}` or as a bare default
/// value whose type is inferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct VariableSpec {
    #[serde(rename = "type")]
    pub kind: VariableType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VariableSpec {
    pub fn with_default(default: impl Into<Value>) -> Self {
        Self::from(default.into())
    }
}

impl From<Value> for VariableSpec {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.contains_key("type") || map.contains_key("default") => {
                let default = map.remove("default").filter(|v| !v.is_null());
                let kind = map
                    .remove("type")
                    .and_then(|t| serde_json::from_value(t).ok())
                    .unwrap_or_else(|| default.as_ref().map_or(VariableType::Any, VariableType::of));
                let description = map
                    .remove("description")
                    .and_then(|d| d.as_str().map(str::to_owned));
                Self {
                    kind,
                    default,
                    description,
                }
            }
            literal => Self {
                kind: VariableType::of(&literal),
                default: (!literal.is_null()).then_some(literal),
                description: None,
            },
        }
    }
}

/// Execution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Fixed pause after every top-level step.
    #[serde(alias = "stepDelayMs", alias = "step_delay", alias = "delay_ms")]
    pub step_delay_ms: u64,
    /// Overrides the executor's loop iteration cap.
    #[serde(alias = "maxLoopIterations", skip_serializing_if = "Option::is_none")]
    pub max_loop_iterations: Option<usize>,
}

/// Where a workflow came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub cached: bool,
    /// Set on the stand-in workflow returned when generation failed.
    pub placeholder: bool,
    #[serde(alias = "sourceDescription", skip_serializing_if = "Option::is_none")]
    pub source_description: Option<String>,
}

impl Default for WorkflowMetadata {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            created_at: Utc::now(),
            cached: false,
            placeholder: false,
            source_description: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single unit of work.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct Step {
    /// Unique within the workflow, nested steps included.
    pub id: String,
    pub description: String,
    pub action: StepAction,
    /// All must hold for the step to run.
    pub conditions: Vec<Condition>,
    /// Overrides the workflow's policy.
    pub error_handling: Option<ErrorHandling>,
    /// Variable that receives the step's output.
    pub output: Option<String>,
    /// Deadline for delegated steps.
    pub timeout_ms: Option<u64>,
}

impl Step {
    pub fn new(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            action,
            conditions: Vec::new(),
            error_handling: None,
            output: None,
            timeout_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_error_handling(mut self, handling: ErrorHandling) -> Self {
        self.error_handling = Some(handling);
        self
    }

    pub fn with_output(mut self, variable: impl Into<String>) -> Self {
        self.output = Some(variable.into());
        self
    }

    pub fn step_type(&self) -> StepType {
        self.action.step_type()
    }
}

/// Generated step as written, before the action is typed.
#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "type", alias = "step_type", alias = "stepType")]
    step_type: StepType,
    #[serde(default, alias = "name")]
    description: String,
    #[serde(default, alias = "params", alias = "parameters", alias = "config")]
    action: Option<Value>,
    #[serde(default, alias = "condition")]
    conditions: Option<Value>,
    #[serde(default, alias = "errorHandling", alias = "on_error", alias = "onError")]
    error_handling: Option<ErrorHandling>,
    #[serde(
        default,
        alias = "outputVariable",
        alias = "output_variable",
        alias = "saveAs",
        alias = "save_as"
    )]
    output: Option<String>,
    #[serde(default, alias = "timeoutMs")]
    timeout_ms: Option<u64>,
    /// Inline action fields when there is no `action` object.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<RawStep> for Step {
    type Error = IntentError;

    fn try_from(raw: RawStep) -> Result<Self> {
        let id = match raw.id {
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let label = if id.is_empty() { "<unnamed>" } else { id.as_str() };

        let mut step_conditions = raw.conditions;
        let payload = match raw.action {
            Some(action) if !action.is_null() => action,
            _ => {
                let mut inline = raw.extra;
                // An inline condition step's `conditions` belong to its action.
                if raw.step_type == StepType::Condition {
                    if let Some(conditions) = step_conditions.take() {
                        inline.insert("conditions".into(), conditions);
                    }
                }
                Value::Object(inline)
            }
        };
        let action = StepAction::parse(raw.step_type, label, payload)?;

        let conditions = match step_conditions {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| invalid_action(label, e))?,
            Some(single) => vec![serde_json::from_value(single).map_err(|e| invalid_action(label, e))?],
        };

        Ok(Self {
            id,
            description: raw.description,
            action,
            conditions,
            error_handling: raw.error_handling,
            output: raw.output.filter(|o| !o.trim().is_empty()),
            timeout_ms: raw.timeout_ms,
        })
    }
}

fn invalid_action(step_id: &str, e: impl fmt::Display) -> IntentError {
    IntentError::InvalidStepAction {
        step_id: step_id.to_owned(),
        reason: format!("invalid conditions: {e}"),
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", &self.step_type())?;
        if !self.description.is_empty() {
            map.serialize_entry("description", &self.description)?;
        }
        map.serialize_entry("action", &self.action)?;
        if !self.conditions.is_empty() {
            map.serialize_entry("conditions", &self.conditions)?;
        }
        if let Some(handling) = &self.error_handling {
            map.serialize_entry("error_handling", handling)?;
        }
        if let Some(output) = &self.output {
            map.serialize_entry("output", output)?;
        }
        if let Some(timeout) = self.timeout_ms {
            map.serialize_entry("timeout_ms", &timeout)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    #[serde(default, alias = "errorHandling")]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub settings: WorkflowSettings,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: String::new(),
            steps,
            triggers: Vec::new(),
            variables: BTreeMap::new(),
            error_handling: ErrorHandling::default(),
            settings: WorkflowSettings::default(),
            metadata: WorkflowMetadata::default(),
        }
    }

    /// Build a workflow from generated JSON.
    ///
    /// Accepts a workflow object, an object wrapping one under `workflow`,
    /// or a bare array of steps.  The result always gets a fresh id and is
    /// normalized and validated.
    pub fn from_generated(value: Value, description: &str) -> Result<Self> {
        let value = match value {
            Value::Object(mut map) if map.get("workflow").is_some_and(Value::is_object) => {
                map.remove("workflow").unwrap_or_default()
            }
            Value::Array(steps) => json!({ "steps": steps }),
            other => other,
        };
        let Value::Object(mut map) = value else {
            return Err(unusable("expected a JSON object or an array of steps"));
        };

        map.remove("id");
        let has_name = map
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.trim().is_empty());
        if !has_name {
            map.insert("name".into(), Value::String(name_from(description)));
        }
        if !map.contains_key("description") {
            map.insert("description".into(), Value::String(description.to_owned()));
        }

        let mut workflow: Self =
            serde_json::from_value(Value::Object(map)).map_err(|e| unusable(e.to_string()))?;
        workflow.metadata.source_description = Some(description.to_owned());
        workflow.normalize();
        workflow.validate().map_err(|e| unusable(e.to_string()))?;
        Ok(workflow)
    }

    /// Workflow of alert steps, one per recovered step description.
    pub fn from_step_lines(lines: &[String], description: &str) -> Result<Self> {
        let steps = lines
            .iter()
            .map(|line| {
                Step::new(
                    "",
                    StepAction::Alert(AlertAction {
                        message: line.clone(),
                        level: AlertLevel::Info,
                    }),
                )
                .with_description(line.clone())
            })
            .collect();
        let mut workflow = Self::new(name_from(description), steps);
        workflow.description = description.to_owned();
        workflow.metadata.source_description = Some(description.to_owned());
        workflow.normalize();
        workflow.validate().map_err(|e| unusable(e.to_string()))?;
        Ok(workflow)
    }

    /// Minimal stand-in returned when no provider could generate a
    /// workflow: one alert step explaining the failure.
    pub fn placeholder(description: &str, reason: &str) -> Self {
        let alert = Step::new(
            "step_1",
            StepAction::Alert(AlertAction {
                message: format!("Could not generate a workflow for \"{description}\": {reason}"),
                level: AlertLevel::Error,
            }),
        )
        .with_description("Report generation failure");
        let mut workflow = Self::new(name_from(description), vec![alert]);
        workflow.description = description.to_owned();
        workflow.metadata.placeholder = true;
        workflow.metadata.source_description = Some(description.to_owned());
        workflow
    }

    /// Assign ids to steps without one and make every id unique.
    ///
    /// Top-level steps become `step_N`; nested steps become
    /// `<parent>.N`.  A repeated id gets a `_2`, `_3`, ... suffix.
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        normalize_steps(&mut self.steps, None, 0, &mut seen);
    }

    /// Check the structural rules: a name, at least one step, and unique
    /// non-empty step ids.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("workflow name is empty"));
        }
        if self.steps.is_empty() {
            return Err(invalid("workflow has no steps"));
        }
        let mut seen = HashSet::new();
        for step in self.all_steps() {
            if step.id.trim().is_empty() {
                return Err(invalid(format!("a `{}` step has no id", step.step_type())));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(invalid(format!("duplicate step id `{}`", step.id)));
            }
        }
        Ok(())
    }

    /// Every step, nested ones included, depth first.
    pub fn all_steps(&self) -> Vec<&Step> {
        fn walk<'a>(steps: &'a [Step], out: &mut Vec<&'a Step>) {
            for step in steps {
                out.push(step);
                for nested in step.action.nested_steps() {
                    walk(std::slice::from_ref(nested), out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.steps, &mut out);
        out
    }

    pub fn find_step(&self, id: &str) -> Option<&Step> {
        self.all_steps().into_iter().find(|s| s.id == id)
    }

    /// Declared variable defaults.
    pub fn default_variables(&self) -> Map<String, Value> {
        self.variables
            .iter()
            .filter_map(|(name, spec)| spec.default.clone().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Merge a correction into this workflow.
    ///
    /// Fields present in the correction replace the current ones; steps are
    /// patched by id (anywhere in the tree) or appended; `remove_steps`
    /// drops steps by id.  The merged workflow is normalized and validated
    /// and is only committed when valid.
    pub fn apply_correction(&mut self, correction: WorkflowCorrection) -> Result<()> {
        let mut next = self.clone();
        if let Some(name) = correction.name {
            next.name = name;
        }
        if let Some(description) = correction.description {
            next.description = description;
        }
        if let Some(settings) = correction.settings {
            next.settings = settings;
        }
        if let Some(variables) = correction.variables {
            next.variables = variables;
        }
        if let Some(handling) = correction.error_handling {
            next.error_handling = handling;
        }
        if let Some(triggers) = correction.triggers {
            next.triggers = triggers;
        }

        let removed: HashSet<&str> = correction.remove_steps.iter().map(String::as_str).collect();
        if !removed.is_empty() {
            remove_steps(&mut next.steps, &removed);
        }
        for step in correction.steps {
            match find_step_mut(&mut next.steps, &step.id) {
                Some(existing) if !step.id.is_empty() => *existing = step,
                _ => next.steps.push(step),
            }
        }

        next.normalize();
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Changes requested by a user for an existing workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowCorrection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<WorkflowSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, VariableSpec>>,
    #[serde(alias = "errorHandling", skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Trigger>>,
    /// Replacement steps (matched by id) or new steps.
    pub steps: Vec<Step>,
    #[serde(alias = "removeSteps")]
    pub remove_steps: Vec<String>,
}

fn normalize_steps(
    steps: &mut [Step],
    parent: Option<&str>,
    offset: usize,
    seen: &mut HashSet<String>,
) -> usize {
    for (i, step) in steps.iter_mut().enumerate() {
        let n = offset + i + 1;
        let mut id = step.id.trim().to_owned();
        if id.is_empty() {
            id = match parent {
                Some(parent) => format!("{parent}.{n}"),
                None => format!("step_{n}"),
            };
        }
        if seen.contains(&id) {
            let mut suffix = 2;
            while seen.contains(&format!("{id}_{suffix}")) {
                suffix += 1;
            }
            id = format!("{id}_{suffix}");
        }
        seen.insert(id.clone());
        step.id = id;

        let parent_id = step.id.clone();
        let mut nested_offset = 0;
        for list in step.action.nested_steps_mut() {
            nested_offset += normalize_steps(list, Some(&parent_id), nested_offset, seen);
        }
    }
    steps.len()
}

fn find_step_mut<'a>(steps: &'a mut [Step], id: &str) -> Option<&'a mut Step> {
    for step in steps.iter_mut() {
        if step.id == id {
            return Some(step);
        }
        for list in step.action.nested_steps_mut() {
            if let Some(found) = find_step_mut(list, id) {
                return Some(found);
            }
        }
    }
    None
}

fn remove_steps(steps: &mut Vec<Step>, ids: &HashSet<&str>) {
    steps.retain(|s| !ids.contains(s.id.as_str()));
    for step in steps.iter_mut() {
        for list in step.action.nested_steps_mut() {
            remove_steps(list, ids);
        }
    }
}

/// Short workflow name taken from the request text.
fn name_from(description: &str) -> String {
    let collapsed = description.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "Untitled workflow".into();
    }
    if collapsed.chars().count() <= MAX_DERIVED_NAME_CHARS {
        return collapsed;
    }
    let mut name: String = collapsed.chars().take(MAX_DERIVED_NAME_CHARS).collect();
    name.push_str("...");
    name
}

fn invalid(reason: impl Into<String>) -> IntentError {
    IntentError::InvalidWorkflow {
        reason: reason.into(),
    }
}

fn unusable(reason: impl Into<String>) -> IntentError {
    IntentError::GenerationUnusable {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
