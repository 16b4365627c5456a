//! Typed action payloads, one variant per [`StepType`].
//!
//! Generated workflows carry loosely shaped JSON.  [`StepAction::parse`]
//! turns a payload into the variant matching its declared step type, so a
//! type/payload mismatch is caught when the workflow is loaded rather than
//! half way through an execution.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiRequest;
use crate::condition::Condition;
use crate::error::{IntentError, Result};
use crate::scope::Scope;
use crate::template::resolve_value;
use crate::transform::TransformAction;
use crate::workflow::{Step, StepType};

// ---------------------------------------------------------------------------
// Page actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateAction {
    pub url: String,
    #[serde(default, alias = "newTab")]
    pub new_tab: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickAction {
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAction {
    pub selector: String,
    #[serde(alias = "text")]
    pub value: Value,
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractAction {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default)]
    pub multiple: bool,
}

/// Wait for a fixed duration, for a selector to appear, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitAction {
    #[serde(
        default,
        alias = "duration",
        alias = "durationMs",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    Info,
    Success,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAction {
    #[serde(alias = "text")]
    pub message: String,
    #[serde(default)]
    pub level: AlertLevel,
}

// ---------------------------------------------------------------------------
// Control-flow actions
// ---------------------------------------------------------------------------

/// Evaluates its conditions; runs `then` when they all hold, `else`
/// otherwise.  The step's payload is the boolean result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionAction {
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub then: Vec<Step>,
    #[serde(rename = "else", skip_serializing_if = "Vec::is_empty")]
    pub otherwise: Vec<Step>,
}

#[derive(Deserialize)]
struct RawConditionAction {
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default)]
    condition: Option<Condition>,
    #[serde(default, alias = "then_steps", alias = "thenSteps")]
    then: Vec<Step>,
    #[serde(default, rename = "else", alias = "else_steps", alias = "elseSteps")]
    otherwise: Vec<Step>,
}

impl<'de> Deserialize<'de> for ConditionAction {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = RawConditionAction::deserialize(d)?;
        let mut conditions = raw.conditions;
        conditions.extend(raw.condition);
        if conditions.is_empty() {
            return Err(serde::de::Error::custom("a condition step needs at least one condition"));
        }
        Ok(Self {
            conditions,
            then: raw.then,
            otherwise: raw.otherwise,
        })
    }
}

fn default_item_variable() -> String {
    "item".into()
}

fn default_index_variable() -> String {
    "index".into()
}

/// Runs `steps` once per element of `items`.
///
/// `items` is a literal array, a `$path`, or a `{{path}}` template that
/// resolves to an array at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopAction {
    #[serde(alias = "collection", alias = "over")]
    pub items: Value,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default = "default_item_variable", alias = "itemVariable")]
    pub item_variable: String,
    #[serde(default = "default_index_variable", alias = "indexVariable")]
    pub index_variable: String,
    #[serde(
        default,
        alias = "maxIterations",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_iterations: Option<usize>,
}

// ---------------------------------------------------------------------------
// StepAction
// ---------------------------------------------------------------------------

/// Closed set of step actions.
///
/// Serialized without a tag; the step's `type` field carries the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepAction {
    Navigate(NavigateAction),
    Click(ClickAction),
    Input(InputAction),
    Extract(ExtractAction),
    Wait(WaitAction),
    Api(ApiRequest),
    Transform(TransformAction),
    Condition(ConditionAction),
    Loop(LoopAction),
    Alert(AlertAction),
}

impl StepAction {
    /// Parse `payload` as the action for `step_type`.
    pub fn parse(step_type: StepType, step_id: &str, payload: Value) -> Result<Self> {
        let action = match step_type {
            StepType::Navigate => Self::Navigate(parse_as(step_id, payload)?),
            StepType::Click => Self::Click(parse_as(step_id, payload)?),
            StepType::Input => Self::Input(parse_as(step_id, payload)?),
            StepType::Extract => Self::Extract(parse_as(step_id, payload)?),
            StepType::Wait => Self::Wait(parse_as(step_id, payload)?),
            StepType::Api => Self::Api(parse_as(step_id, payload)?),
            StepType::Transform => Self::Transform(parse_as(step_id, payload)?),
            StepType::Condition => Self::Condition(parse_as(step_id, payload)?),
            StepType::Loop => Self::Loop(parse_as(step_id, payload)?),
            StepType::Alert => Self::Alert(parse_as(step_id, payload)?),
        };
        Ok(action)
    }

    pub fn step_type(&self) -> StepType {
        match self {
            Self::Navigate(_) => StepType::Navigate,
            Self::Click(_) => StepType::Click,
            Self::Input(_) => StepType::Input,
            Self::Extract(_) => StepType::Extract,
            Self::Wait(_) => StepType::Wait,
            Self::Api(_) => StepType::Api,
            Self::Transform(_) => StepType::Transform,
            Self::Condition(_) => StepType::Condition,
            Self::Loop(_) => StepType::Loop,
            Self::Alert(_) => StepType::Alert,
        }
    }

    /// Steps nested inside this action, in execution order.
    pub fn nested_steps(&self) -> Vec<&Step> {
        match self {
            Self::Loop(l) => l.steps.iter().collect(),
            Self::Condition(c) => c.then.iter().chain(&c.otherwise).collect(),
            _ => Vec::new(),
        }
    }

    /// Mutable access to every nested step list.
    pub fn nested_steps_mut(&mut self) -> Vec<&mut Vec<Step>> {
        match self {
            Self::Loop(l) => vec![&mut l.steps],
            Self::Condition(c) => vec![&mut c.then, &mut c.otherwise],
            _ => Vec::new(),
        }
    }

    /// A copy with `{{path}}` placeholders resolved against `scope`.
    ///
    /// Nested steps are left alone; they are resolved when they run.
    /// Transforms are resolved per item by the transform itself.
    pub fn resolved(&self, step_id: &str, scope: &dyn Scope) -> Result<Self> {
        match self {
            Self::Transform(_) => Ok(self.clone()),
            Self::Loop(l) => Ok(Self::Loop(LoopAction {
                items: resolve_value(&l.items, scope),
                ..l.clone()
            })),
            Self::Condition(c) => Ok(Self::Condition(ConditionAction {
                conditions: c
                    .conditions
                    .iter()
                    .map(|cond| Condition {
                        left: resolve_value(&cond.left, scope),
                        operator: cond.operator,
                        right: resolve_value(&cond.right, scope),
                    })
                    .collect(),
                ..c.clone()
            })),
            leaf => {
                let payload = resolve_value(&serde_json::to_value(leaf)?, scope);
                Self::parse(leaf.step_type(), step_id, payload)
            }
        }
    }
}

fn parse_as<T: DeserializeOwned>(step_id: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| IntentError::InvalidStepAction {
        step_id: step_id.to_owned(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_by_declared_type() {
        let action = StepAction::parse(
            StepType::Navigate,
            "s1",
            json!({"url": "https://example.com", "newTab": true}),
        )
        .unwrap();
        assert_eq!(
            action,
            StepAction::Navigate(NavigateAction {
                url: "https://example.com".into(),
                new_tab: true,
            })
        );
        assert_eq!(action.step_type(), StepType::Navigate);
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let err = StepAction::parse(StepType::Click, "s2", json!({"url": "x"})).unwrap_err();
        assert!(matches!(err, IntentError::InvalidStepAction { ref step_id, .. } if step_id == "s2"));
    }

    #[test]
    fn condition_accepts_single_condition() {
        let action = StepAction::parse(
            StepType::Condition,
            "c",
            json!({"condition": {"left": "$x", "operator": "==", "right": 1}}),
        )
        .unwrap();
        let StepAction::Condition(c) = action else {
            panic!("expected condition");
        };
        assert_eq!(c.conditions.len(), 1);
    }

    #[test]
    fn condition_without_conditions_is_rejected() {
        assert!(StepAction::parse(StepType::Condition, "c", json!({"then": []})).is_err());
    }

    #[test]
    fn loop_defaults() {
        let action = StepAction::parse(StepType::Loop, "l", json!({"items": [1, 2]})).unwrap();
        let StepAction::Loop(l) = action else {
            panic!("expected loop");
        };
        assert_eq!(l.item_variable, "item");
        assert_eq!(l.index_variable, "index");
        assert!(l.steps.is_empty());
    }

    #[test]
    fn wait_accepts_duration_alias() {
        let action = StepAction::parse(StepType::Wait, "w", json!({"duration": 250})).unwrap();
        assert_eq!(
            action,
            StepAction::Wait(WaitAction {
                duration_ms: Some(250),
                selector: None
            })
        );
    }

    #[test]
    fn resolves_leaf_templates() {
        let action = StepAction::parse(
            StepType::Navigate,
            "n",
            json!({"url": "https://shop.test/{{category}}"}),
        )
        .unwrap();
        let resolved = action.resolved("n", &json!({"category": "books"})).unwrap();
        assert_eq!(
            resolved,
            StepAction::Navigate(NavigateAction {
                url: "https://shop.test/books".into(),
                new_tab: false,
            })
        );
    }

    #[test]
    fn serializes_without_tag() {
        let action = StepAction::Alert(AlertAction {
            message: "done".into(),
            level: AlertLevel::Success,
        });
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"message": "done", "level": "success"})
        );
    }
}
