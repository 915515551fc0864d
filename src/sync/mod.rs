//! Lifecycle-triggered synchronization of records into their indexes.

pub mod hooks;
pub mod orchestrator;
pub mod queue;

pub use hooks::{HookOutcome, HookRegistry, PreOperation, SyncSubscriber};
pub use orchestrator::{
    DispatchOutcome, IndexOutcome, LifecycleTrigger, SyncOrchestrator, SyncPause,
};
pub use queue::{
    create_dispatch_queue, spawn_dispatch_worker, DispatchQueue, DispatchStats, QueueSubscriber,
    SyncTask,
};
