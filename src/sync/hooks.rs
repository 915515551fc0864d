use std::sync::Arc;

use crate::types::{DocumentBody, OperationKind, SyncEvent};

/// Notification published just before the orchestrator touches the engine.
#[derive(Debug, Clone, Copy)]
pub enum PreOperation<'a> {
    Index {
        event: &'a SyncEvent,
        body: &'a DocumentBody,
    },
    Update {
        event: &'a SyncEvent,
        body: &'a DocumentBody,
    },
    Delete {
        event: &'a SyncEvent,
    },
}

impl<'a> PreOperation<'a> {
    pub fn event(&self) -> &'a SyncEvent {
        match self {
            PreOperation::Index { event, .. }
            | PreOperation::Update { event, .. }
            | PreOperation::Delete { event } => event,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.event().kind
    }

    pub fn body(&self) -> Option<&'a DocumentBody> {
        match self {
            PreOperation::Index { body, .. } | PreOperation::Update { body, .. } => Some(body),
            PreOperation::Delete { .. } => None,
        }
    }
}

/// What a subscriber did with a [`PreOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Let the orchestrator perform the operation itself.
    Continue,
    /// The subscriber took over (e.g. queued it); skip the synchronous call.
    Handled,
}

pub trait SyncSubscriber: Send + Sync {
    fn on_pre_operation(&self, op: &PreOperation<'_>) -> HookOutcome;
}

impl<F> SyncSubscriber for F
where
    F: Fn(&PreOperation<'_>) -> HookOutcome + Send + Sync,
{
    fn on_pre_operation(&self, op: &PreOperation<'_>) -> HookOutcome {
        self(op)
    }
}

/// Subscribers registered at startup. Every subscriber sees every
/// notification; the operation counts as handled if any of them handled it.
#[derive(Default, Clone)]
pub struct HookRegistry {
    subscribers: Vec<Arc<dyn SyncSubscriber>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn SyncSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn publish(&self, op: &PreOperation<'_>) -> HookOutcome {
        let mut outcome = HookOutcome::Continue;
        for subscriber in &self.subscribers {
            if subscriber.on_pre_operation(op) == HookOutcome::Handled {
                outcome = HookOutcome::Handled;
            }
        }
        outcome
    }
}
