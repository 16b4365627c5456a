//! Step runners for delegated step types.
//!
//! Page actions (navigate, click, input, extract, wait) and alerts are not
//! performed by the engine.  A [`StepRunner`] registered per step type does
//! the work; the engine only hands it a step whose placeholders are already
//! resolved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::action::{AlertLevel, StepAction};
use crate::error::{IntentError, Result};
use crate::workflow::{Step, StepType};

/// Performs delegated steps.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `step` and return its output.
    async fn run(&self, step: &Step) -> Result<Value>;
}

/// Explicit step-type to runner mapping.  A delegated step type without a
/// registered runner is an error, never a silent no-op.
#[derive(Clone, Default)]
pub struct StepRunnerRegistry {
    runners: HashMap<StepType, Arc<dyn StepRunner>>,
}

impl StepRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `runner` handling every delegated step type.
    pub fn with_runner(runner: Arc<dyn StepRunner>) -> Self {
        let mut registry = Self::new();
        for step_type in StepType::ALL.into_iter().filter(|t| t.is_delegated()) {
            registry.runners.insert(step_type, Arc::clone(&runner));
        }
        registry
    }

    /// Register `runner` for `step_type`, replacing any previous one.
    ///
    /// Only delegated types can be registered; the engine performs the
    /// others itself.
    pub fn register(&mut self, step_type: StepType, runner: Arc<dyn StepRunner>) -> Result<()> {
        if !step_type.is_delegated() {
            return Err(IntentError::InvalidWorkflow {
                reason: format!("`{step_type}` steps are executed by the engine"),
            });
        }
        self.runners.insert(step_type, runner);
        Ok(())
    }

    pub fn get(&self, step_type: StepType) -> Result<&Arc<dyn StepRunner>> {
        self.runners
            .get(&step_type)
            .ok_or(IntentError::NoRunnerRegistered { step_type })
    }

    pub fn registered(&self) -> Vec<StepType> {
        let mut types: Vec<_> = self.runners.keys().copied().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for StepRunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunnerRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}

/// Runner that performs no page automation.
///
/// Logs each step, sleeps for fixed `wait` durations and reports what it
/// would have done.  Used by the CLI and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunStepRunner;

#[async_trait]
impl StepRunner for DryRunStepRunner {
    async fn run(&self, step: &Step) -> Result<Value> {
        let output = match &step.action {
            StepAction::Navigate(a) => {
                info!(step_id = %step.id, url = %a.url, "dry run: navigate");
                json!({"navigated": a.url, "new_tab": a.new_tab})
            }
            StepAction::Click(a) => {
                info!(step_id = %step.id, selector = %a.selector, "dry run: click");
                json!({"clicked": a.selector})
            }
            StepAction::Input(a) => {
                info!(step_id = %step.id, selector = %a.selector, "dry run: input");
                json!({"selector": a.selector, "value": a.value})
            }
            StepAction::Extract(a) => {
                info!(step_id = %step.id, selector = %a.selector, "dry run: extract");
                if a.multiple { json!([]) } else { Value::Null }
            }
            StepAction::Wait(a) => {
                if let Some(ms) = a.duration_ms {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                json!({"waited_ms": a.duration_ms.unwrap_or(0), "selector": a.selector})
            }
            StepAction::Alert(a) => {
                match a.level {
                    AlertLevel::Warning | AlertLevel::Error => {
                        warn!(step_id = %step.id, level = ?a.level, message = %a.message, "alert")
                    }
                    AlertLevel::Info | AlertLevel::Success => {
                        info!(step_id = %step.id, level = ?a.level, message = %a.message, "alert")
                    }
                }
                json!({"message": a.message, "level": a.level})
            }
            other => {
                return Err(IntentError::step(
                    &step.id,
                    format!("dry-run runner cannot perform `{}` steps", other.step_type()),
                ));
            }
        };
        Ok(output)
    }
}
