//! Extension point for the background auto-sync export feature.
//!
//! Auto-sync (journaling task/learning/attempt mutations to a line-delimited
//! export) is an explicit non-goal of this engine — the file watcher and
//! journal format live outside this crate. This trait documents the seam a
//! real exporter would attach to, with the contract the design notes
//! require: the mutation path never awaits a hook, failures are the hook's
//! own problem to log, and disabling a hook does not cancel in-flight work.
//! [`NoopSyncHook`] is the only implementation shipped here.

use async_trait::async_trait;

/// A mutation a repository just committed, handed to hooks fire-and-forget.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    TaskMutated { task_id: String },
    LearningMutated { learning_id: i64 },
    AttemptMutated { attempt_id: i64 },
}

#[async_trait]
pub trait SyncHook: Send + Sync {
    /// Called after a mutation commits. Implementations must not block the
    /// caller on slow I/O — spawn onto a runtime task if real work is needed.
    async fn on_mutation(&self, event: SyncEvent);
}

/// Default hook: does nothing. Used whenever no exporter is configured.
pub struct NoopSyncHook;

#[async_trait]
impl SyncHook for NoopSyncHook {
    async fn on_mutation(&self, _event: SyncEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_hook_accepts_every_event_variant() {
        let hook = NoopSyncHook;
        hook.on_mutation(SyncEvent::TaskMutated { task_id: "tx-1".into() }).await;
        hook.on_mutation(SyncEvent::LearningMutated { learning_id: 1 }).await;
        hook.on_mutation(SyncEvent::AttemptMutated { attempt_id: 1 }).await;
    }
}
