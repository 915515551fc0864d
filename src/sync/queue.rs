//! Asynchronous dispatch seam.
//!
//! A [`QueueSubscriber`] intercepts pre-operation notifications and pushes
//! them onto a bounded channel; a worker spawned with
//! [`spawn_dispatch_worker`] drains it and performs each task through the
//! orchestrator. When the channel is full the subscriber declines and the
//! orchestrator falls back to the synchronous call.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::hooks::{HookOutcome, PreOperation, SyncSubscriber};
use super::orchestrator::{DispatchOutcome, SyncOrchestrator};
use crate::types::{DocumentBody, SyncEvent};

/// An intercepted operation waiting to be performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub event: SyncEvent,
    /// `None` for deletes.
    pub body: Option<DocumentBody>,
}

impl SyncTask {
    pub fn from_operation(op: &PreOperation<'_>) -> Self {
        SyncTask {
            event: op.event().clone(),
            body: op.body().cloned(),
        }
    }
}

pub type DispatchQueue = mpsc::Sender<SyncTask>;

pub struct QueueSubscriber {
    tx: Mutex<Option<DispatchQueue>>,
}

impl QueueSubscriber {
    pub fn new(tx: DispatchQueue) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Drop the sender so the worker drains what is queued and exits.
    /// Later operations are dispatched inline.
    pub fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().map(|tx| tx.is_none()).unwrap_or(true)
    }
}

impl SyncSubscriber for QueueSubscriber {
    fn on_pre_operation(&self, op: &PreOperation<'_>) -> HookOutcome {
        let Some(tx) = self.tx.lock().ok().and_then(|tx| tx.clone()) else {
            return HookOutcome::Continue;
        };
        match tx.try_send(SyncTask::from_operation(op)) {
            Ok(()) => HookOutcome::Handled,
            Err(e) => {
                let event = op.event();
                tracing::warn!(
                    "[QUEUE {}] could not enqueue {} of {} ({}), dispatching inline",
                    event.index,
                    event.kind,
                    event.record_id,
                    e
                );
                HookOutcome::Continue
            }
        }
    }
}

pub fn create_dispatch_queue(capacity: usize) -> (QueueSubscriber, mpsc::Receiver<SyncTask>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueSubscriber::new(tx), rx)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub performed: usize,
    pub failed: usize,
}

/// Drain `rx` until every sender is dropped (see [`QueueSubscriber::close`]).
/// The worker keeps its own handle on the orchestrator, so the channel
/// does not close just because other handles go away. Failures are logged and counted,
/// never retried.
pub fn spawn_dispatch_worker(
    orchestrator: Arc<SyncOrchestrator>,
    mut rx: mpsc::Receiver<SyncTask>,
) -> tokio::task::JoinHandle<DispatchStats> {
    tokio::spawn(async move {
        tracing::info!("[QUEUE] dispatch worker started");
        let mut stats = DispatchStats::default();
        while let Some(task) = rx.recv().await {
            match orchestrator.perform(&task).await {
                Ok(outcome) => {
                    debug_assert!(outcome != DispatchOutcome::Intercepted);
                    stats.performed += 1;
                }
                Err(e) => {
                    tracing::error!("[QUEUE {}] {}", task.event.index, e);
                    stats.failed += 1;
                }
            }
        }
        tracing::info!(
            "[QUEUE] channel closed, performed={} failed={}",
            stats.performed,
            stats.failed
        );
        stats
    })
}
