use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::hooks::{HookOutcome, HookRegistry, PreOperation, SyncSubscriber};
use super::queue::SyncTask;
use crate::coalescer::UpdateCoalescer;
use crate::config::{ConfigRegistry, IndexConfig};
use crate::document::{Documentable, ModelCatalog, UpdateContext};
use crate::error::{Result, SyncError, TransportError};
use crate::transport::{Connections, SearchTransport};
use crate::types::{OperationKind, RecordId, SyncEvent};

/// A record lifecycle change reported by the host framework.
#[derive(Clone, Copy)]
pub enum LifecycleTrigger<'a> {
    Created(&'a dyn Documentable),
    /// `None` means the changed fields are unknown and a full index is sent.
    Updated(&'a dyn Documentable, Option<&'a [String]>),
    Deleted(&'a dyn Documentable),
}

/// What happened for one (record, index) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Indexed,
    Updated,
    Deleted,
    /// Identical body already sent within the coalescing window.
    Suppressed,
    /// The mapper produced an empty partial body.
    EmptyUpdate,
    /// A subscriber took over the operation.
    Intercepted,
    /// The record is outside the manager's search queryset for this index.
    NotInQueryset,
    /// The index has `auto_sync` turned off.
    IndexSyncDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    pub index: String,
    pub outcome: DispatchOutcome,
}

/// Reacts to record lifecycle triggers and keeps every index a record is
/// bound to in step with it.
///
/// Transport failures surface as [`SyncError::IndexOperation`]; nothing is
/// retried here, and the coalescer only learns about an update once the
/// engine accepted it.
pub struct SyncOrchestrator {
    registry: Arc<ConfigRegistry>,
    catalog: ModelCatalog,
    connections: Connections,
    coalescer: UpdateCoalescer,
    hooks: HookRegistry,
    pause_depth: AtomicUsize,
}

/// Sync is paused for as long as this guard lives.
#[must_use = "sync resumes as soon as the guard is dropped"]
pub struct SyncPause<'a> {
    depth: &'a AtomicUsize,
}

impl Drop for SyncPause<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        catalog: ModelCatalog,
        connections: Connections,
    ) -> Self {
        Self {
            registry,
            catalog,
            connections,
            coalescer: UpdateCoalescer::new(),
            hooks: HookRegistry::new(),
            pause_depth: AtomicUsize::new(0),
        }
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn SyncSubscriber>) -> Self {
        self.hooks.subscribe(subscriber);
        self
    }

    pub fn with_coalescer(mut self, coalescer: UpdateCoalescer) -> Self {
        self.coalescer = coalescer;
        self
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub fn coalescer(&self) -> &UpdateCoalescer {
        &self.coalescer
    }

    /// Temporarily stop lifecycle-triggered sync, e.g. around bulk imports.
    /// Guards nest; sync resumes when the last one is dropped.
    pub fn pause(&self) -> SyncPause<'_> {
        self.pause_depth.fetch_add(1, Ordering::SeqCst);
        SyncPause {
            depth: &self.pause_depth,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_depth.load(Ordering::SeqCst) > 0
    }

    /// Global switch, runtime pause and the never-sync list combined.
    pub fn sync_enabled_for(&self, model_id: &str) -> bool {
        !self.is_paused() && self.registry.auto_sync_enabled(model_id)
    }

    pub async fn on_create(&self, record: &dyn Documentable) -> Result<Vec<IndexOutcome>> {
        self.handle(LifecycleTrigger::Created(record)).await
    }

    pub async fn on_update(
        &self,
        record: &dyn Documentable,
        changed_fields: Option<&[String]>,
    ) -> Result<Vec<IndexOutcome>> {
        self.handle(LifecycleTrigger::Updated(record, changed_fields))
            .await
    }

    pub async fn on_delete(&self, record: &dyn Documentable) -> Result<Vec<IndexOutcome>> {
        self.handle(LifecycleTrigger::Deleted(record)).await
    }

    /// Process one trigger against every index the record's model is bound to.
    ///
    /// Stops at the first failing index and returns its error.
    pub async fn handle(&self, trigger: LifecycleTrigger<'_>) -> Result<Vec<IndexOutcome>> {
        let (record, kind, changed_fields) = match trigger {
            LifecycleTrigger::Created(r) => (r, OperationKind::Index, None),
            LifecycleTrigger::Updated(r, None) => (r, OperationKind::Index, None),
            LifecycleTrigger::Updated(r, Some(fields)) => (r, OperationKind::Update, Some(fields)),
            LifecycleTrigger::Deleted(r) => (r, OperationKind::Delete, None),
        };

        let model_id = record.model_id();
        if !self.sync_enabled_for(model_id) {
            tracing::debug!(
                "[SYNC] auto sync disabled for {}, ignoring {} of {}",
                model_id,
                kind,
                record.record_id()
            );
            return Ok(Vec::new());
        }

        let targets = self.registry.indexes_for(model_id);
        let mut outcomes = Vec::with_capacity(targets.len());
        for index in targets {
            let outcome = self
                .sync_index(record, index, kind, changed_fields)
                .await
                .inspect_err(|e| {
                    tracing::warn!("[SYNC {}] {} failed: {}", index.name, kind, e);
                })?;
            outcomes.push(IndexOutcome {
                index: index.name.clone(),
                outcome,
            });
        }
        Ok(outcomes)
    }

    async fn sync_index(
        &self,
        record: &dyn Documentable,
        index: &IndexConfig,
        kind: OperationKind,
        changed_fields: Option<&[String]>,
    ) -> Result<DispatchOutcome> {
        if !index.settings.auto_sync {
            return Ok(DispatchOutcome::IndexSyncDisabled);
        }

        let record_id = record.record_id();
        let event = SyncEvent::new(
            record_id.clone(),
            record.model_id(),
            &index.name,
            kind,
            changed_fields.map(|f| f.to_vec()),
        );

        if kind == OperationKind::Delete {
            if self.hooks.publish(&PreOperation::Delete { event: &event }) == HookOutcome::Handled {
                return Ok(DispatchOutcome::Intercepted);
            }
            let transport = self.transport(index, &event)?;
            delete_tolerating_absent(transport.as_ref(), &index.name, &record_id)
                .await
                .map_err(|e| SyncError::index_operation(kind, &record_id, &index.name, e))?;
            self.coalescer.forget(&record_id, &index.name);
            tracing::debug!("[SYNC {}] deleted {}", index.name, record_id);
            return Ok(DispatchOutcome::Deleted);
        }

        if let Some(manager) = self.catalog.get(record.model_id()) {
            if !manager.in_search_queryset(&record_id, &index.name).await? {
                tracing::debug!(
                    "[SYNC {}] {} is not in the search queryset, skipping",
                    index.name,
                    record_id
                );
                return Ok(DispatchOutcome::NotInQueryset);
            }
        }

        let Some(changed_fields) = changed_fields else {
            let body = record.as_document(&index.name)?;
            let op = PreOperation::Index {
                event: &event,
                body: &body,
            };
            if self.hooks.publish(&op) == HookOutcome::Handled {
                return Ok(DispatchOutcome::Intercepted);
            }
            self.transport(index, &event)?
                .index_document(&index.name, &record_id, &body)
                .await
                .map_err(|e| SyncError::index_operation(kind, &record_id, &index.name, e))?;
            tracing::debug!("[SYNC {}] indexed {}", index.name, record_id);
            return Ok(DispatchOutcome::Indexed);
        };

        let ctx = UpdateContext {
            index: &index.name,
            strategy: index.settings.update_strategy,
            mapping: index.mapping.as_ref(),
        };
        let body = record.as_document_update(&ctx, changed_fields)?;
        if body.is_empty() {
            tracing::debug!(
                "[SYNC {}] empty update body for {}, nothing to send",
                index.name,
                record_id
            );
            return Ok(DispatchOutcome::EmptyUpdate);
        }

        let fingerprint = body.fingerprint();
        if self
            .coalescer
            .is_redundant(&record_id, &index.name, &fingerprint)
        {
            tracing::debug!(
                "[SYNC {}] update for {} unchanged, suppressed",
                index.name,
                record_id
            );
            return Ok(DispatchOutcome::Suppressed);
        }

        let op = PreOperation::Update {
            event: &event,
            body: &body,
        };
        if self.hooks.publish(&op) == HookOutcome::Handled {
            return Ok(DispatchOutcome::Intercepted);
        }
        self.transport(index, &event)?
            .update_document(&index.name, &record_id, &body)
            .await
            .map_err(|e| SyncError::index_operation(kind, &record_id, &index.name, e))?;
        self.coalescer.commit(&record_id, &index.name, &fingerprint);
        tracing::debug!(
            "[SYNC {}] updated {} ({} field(s))",
            index.name,
            record_id,
            body.len()
        );
        Ok(DispatchOutcome::Updated)
    }

    /// Perform a task that a subscriber previously intercepted.
    ///
    /// Bypasses hooks, the auto-sync switches and the coalescer check; the
    /// coalescer is still committed after a successful update.
    pub async fn perform(&self, task: &SyncTask) -> Result<DispatchOutcome> {
        let event = &task.event;
        let index = self.registry.require_index(&event.index)?;
        let transport = self.transport(index, event)?;
        let fail = |e: TransportError| {
            SyncError::index_operation(event.kind, &event.record_id, &index.name, e)
        };

        match (event.kind, &task.body) {
            (OperationKind::Delete, _) => {
                delete_tolerating_absent(transport.as_ref(), &index.name, &event.record_id)
                    .await
                    .map_err(fail)?;
                self.coalescer.forget(&event.record_id, &index.name);
                Ok(DispatchOutcome::Deleted)
            }
            (OperationKind::Index, Some(body)) => {
                transport
                    .index_document(&index.name, &event.record_id, body)
                    .await
                    .map_err(fail)?;
                Ok(DispatchOutcome::Indexed)
            }
            (OperationKind::Update, Some(body)) => {
                transport
                    .update_document(&index.name, &event.record_id, body)
                    .await
                    .map_err(fail)?;
                self.coalescer
                    .commit(&event.record_id, &index.name, &body.fingerprint());
                Ok(DispatchOutcome::Updated)
            }
            (kind, None) => Err(SyncError::index_operation(
                kind,
                &event.record_id,
                &index.name,
                "task has no document body",
            )),
        }
    }

    fn transport(
        &self,
        index: &IndexConfig,
        event: &SyncEvent,
    ) -> Result<&Arc<dyn SearchTransport>> {
        self.connections
            .get(&index.connection)
            .map_err(|e| SyncError::index_operation(event.kind, &event.record_id, &index.name, e))
    }
}

/// Delete a document, treating "not found" as done: the record may never
/// have reached this index (e.g. it was outside the index's queryset).
async fn delete_tolerating_absent(
    transport: &dyn SearchTransport,
    index: &str,
    id: &RecordId,
) -> std::result::Result<(), TransportError> {
    match transport.delete_document(index, id).await {
        Err(e) if e.is_not_found() => {
            tracing::debug!("[SYNC {}] {} was not in the index", index, id);
            Ok(())
        }
        other => other,
    }
}
