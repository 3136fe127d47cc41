//! Execution Registry
//!
//! Process-scoped map from execution id to the cancellation token of the
//! task running it. Empty at startup, an entry is added on dispatch and
//! removed when the task finishes or the execution is cancelled. Nothing here
//! is persisted: after a restart in-flight executions can only be inspected,
//! not cancelled.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    handles: DashMap<Uuid, CancellationToken>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh token for `id` and returns a handle to it
    pub fn register(&self, id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.handles.insert(id, token.clone());
        token
    }

    /// Signals cancellation to the task running `id`
    ///
    /// Returns `false` when no task is registered for it.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.handles.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: Uuid) {
        self.handles.remove(&id);
    }

    #[cfg(test)]
    pub fn contains(&self, id: Uuid) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
