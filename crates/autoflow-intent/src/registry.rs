//! Registry of in-flight executions.
//!
//! Every running execution has an entry keyed by its id.  Entries are
//! inserted by [`ExecutionRegistry::begin`] and removed when the returned
//! [`ExecutionGuard`] drops, so an execution that ends by success, failure,
//! panic or cancellation never leaves a stale entry behind.

use std::sync::Arc;

use autoflow_kernel::CancellationToken;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug)]
struct LiveExecution {
    workflow_id: Uuid,
    workflow_name: String,
    started_at: DateTime<Utc>,
    current_step: Option<String>,
    cancel: CancellationToken,
}

/// Snapshot of one running execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub started_at: DateTime<Utc>,
    pub current_step: Option<String>,
}

/// Shared, cloneable handle to the live-execution map.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRegistry {
    live: Arc<DashMap<Uuid, LiveExecution>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution.  The returned guard carries a token that is
    /// cancelled by [`cancel`](Self::cancel) or when `parent` is cancelled.
    pub fn begin(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: &str,
        parent: &CancellationToken,
    ) -> ExecutionGuard {
        let cancel = parent.child_token();
        self.live.insert(
            execution_id,
            LiveExecution {
                workflow_id,
                workflow_name: workflow_name.to_owned(),
                started_at: Utc::now(),
                current_step: None,
                cancel: cancel.clone(),
            },
        );
        debug!(%execution_id, live = self.live.len(), "execution registered");
        ExecutionGuard {
            execution_id,
            cancel,
            live: Arc::clone(&self.live),
        }
    }

    /// Request cancellation.  Returns `false` if the execution is not live.
    pub fn cancel(&self, execution_id: &Uuid) -> bool {
        match self.live.get(execution_id) {
            Some(entry) => {
                info!(%execution_id, "cancelling execution");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<ExecutionInfo> {
        let mut infos: Vec<ExecutionInfo> = self
            .live
            .iter()
            .map(|entry| ExecutionInfo {
                execution_id: *entry.key(),
                workflow_id: entry.workflow_id,
                workflow_name: entry.workflow_name.clone(),
                started_at: entry.started_at,
                current_step: entry.current_step.clone(),
            })
            .collect();
        infos.sort_by_key(|info| info.started_at);
        infos
    }

    pub fn contains(&self, execution_id: &Uuid) -> bool {
        self.live.contains_key(execution_id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Removes its execution from the registry on drop.
#[derive(Debug)]
pub struct ExecutionGuard {
    execution_id: Uuid,
    cancel: CancellationToken,
    live: Arc<DashMap<Uuid, LiveExecution>>,
}

impl ExecutionGuard {
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn set_current_step(&self, step_id: &str) {
        if let Some(mut entry) = self.live.get_mut(&self.execution_id) {
            entry.current_step = Some(step_id.to_owned());
        }
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.live.remove(&self.execution_id);
        debug!(execution_id = %self.execution_id, "execution unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_removes_entry() {
        let registry = ExecutionRegistry::new();
        let id = Uuid::now_v7();
        {
            let guard = registry.begin(id, Uuid::now_v7(), "wf", &CancellationToken::new());
            guard.set_current_step("step_1");
            assert!(registry.contains(&id));
            assert_eq!(registry.list()[0].current_step.as_deref(), Some("step_1"));
        }
        assert!(registry.is_empty());
        assert!(!registry.cancel(&id));
    }

    #[test]
    fn cancel_fires_guard_token() {
        let registry = ExecutionRegistry::new();
        let id = Uuid::now_v7();
        let guard = registry.begin(id, Uuid::now_v7(), "wf", &CancellationToken::new());
        assert!(registry.cancel(&id));
        assert!(guard.token().is_cancelled());
    }

    #[test]
    fn parent_cancellation_propagates() {
        let registry = ExecutionRegistry::new();
        let parent = CancellationToken::new();
        let guard = registry.begin(Uuid::now_v7(), Uuid::now_v7(), "wf", &parent);
        parent.cancel();
        assert!(guard.token().is_cancelled());
    }
}
