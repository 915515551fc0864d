//! Capability traits a model must satisfy to take part in search sync.
//!
//! A record type implements [`Documentable`] to produce its full and partial
//! search documents; the model's manager implements [`Indexable`] to enumerate
//! the records that belong in an index. Managers are registered by model id in
//! a [`ModelCatalog`], which the config registry checks at load time.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

use crate::config::{MappingSchema, UpdateStrategy};
use crate::error::{Result, SyncError};
use crate::transport::BulkAction;
use crate::types::{DocumentBody, FieldValue, ModelId, OperationKind, RecordId};

/// Reserved engine name meaning "every index"; never a valid sync target.
pub const ALL_INDEXES: &str = "_all";

/// What a record reports about one of its fields for partial updates.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldState {
    /// A plain value that can be sent as-is.
    Value(FieldValue),
    /// A relation or composite value that needs a hand-written mapping.
    Composite,
}

/// Per-index inputs to [`Documentable::as_document_update`].
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub index: &'a str,
    pub strategy: UpdateStrategy,
    /// `None` when the index has no mapping file (degraded).
    pub mapping: Option<&'a MappingSchema>,
}

/// A record that can be represented as a search document.
pub trait Documentable: Send + Sync {
    fn record_id(&self) -> RecordId;

    fn model_id(&self) -> &str;

    /// Full representation of the record in `index`.
    fn as_document(&self, index: &str) -> Result<DocumentBody>;

    /// Current state of a single field, used by the partial strategy.
    fn field_state(&self, _field: &str) -> Option<FieldState> {
        None
    }

    /// Partial representation after `changed_fields` were modified.
    ///
    /// Override to customise; returning an empty body tells the orchestrator
    /// to skip the update.
    fn as_document_update(
        &self,
        ctx: &UpdateContext<'_>,
        changed_fields: &[String],
    ) -> Result<DocumentBody> {
        match ctx.strategy {
            UpdateStrategy::Full => self.as_document(ctx.index),
            UpdateStrategy::Partial => partial_document(self, ctx, changed_fields),
        }
    }
}

/// Build `{field: value}` for every changed field the index mapping knows.
///
/// Unmapped fields are dropped. Composite fields fail the whole call with
/// [`SyncError::InvalidUpdateFields`]. Without a mapping the full document is
/// used instead.
pub fn partial_document<D: Documentable + ?Sized>(
    record: &D,
    ctx: &UpdateContext<'_>,
    changed_fields: &[String],
) -> Result<DocumentBody> {
    let Some(mapping) = ctx.mapping else {
        tracing::debug!(
            "[MAPPER] no mapping for '{}', sending full document for {}",
            ctx.index,
            record.record_id()
        );
        return record.as_document(ctx.index);
    };

    let mut body = DocumentBody::new();
    let mut invalid = Vec::new();
    for field in changed_fields {
        if !mapping.has_field(field) {
            continue;
        }
        match record.field_state(field) {
            Some(FieldState::Value(v)) => body.insert(field.clone(), v),
            Some(FieldState::Composite) => invalid.push(field.clone()),
            None => {
                tracing::debug!(
                    "[MAPPER] {} does not expose mapped field '{}', skipping",
                    record.model_id(),
                    field
                );
            }
        }
    }

    if !invalid.is_empty() {
        return Err(SyncError::InvalidUpdateFields {
            model: record.model_id().to_string(),
            fields: invalid,
        });
    }
    Ok(body)
}

/// Format a record as a bulk API action.
pub fn bulk_action<D: Documentable + ?Sized>(
    record: &D,
    index: &str,
    kind: OperationKind,
) -> Result<BulkAction> {
    if index == ALL_INDEXES {
        return Err(SyncError::Config(format!(
            "'{}' is reserved and cannot be a bulk target",
            ALL_INDEXES
        )));
    }
    let body = match kind {
        OperationKind::Index | OperationKind::Update => Some(record.as_document(index)?),
        OperationKind::Delete => None,
    };
    Ok(BulkAction {
        kind,
        index: index.to_string(),
        id: record.record_id(),
        body,
    })
}

/// The manager side of a model: enumerates records that belong in an index.
#[async_trait]
pub trait Indexable: Send + Sync {
    fn model_id(&self) -> &str;

    /// One page of the records to index, in a stable order.
    async fn search_queryset(
        &self,
        index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Box<dyn Documentable>>>;

    /// Whether the record with `id` belongs in `index`.
    async fn in_search_queryset(&self, id: &RecordId, index: &str) -> Result<bool>;
}

/// Explicit registration of model managers, keyed by model id.
#[derive(Default, Clone)]
pub struct ModelCatalog {
    managers: IndexMap<ModelId, Arc<dyn Indexable>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, manager: Arc<dyn Indexable>) -> &mut Self {
        let model_id = manager.model_id().to_string();
        if self.managers.insert(model_id.clone(), manager).is_some() {
            tracing::warn!("[CATALOG] replacing manager for {}", model_id);
        }
        self
    }

    pub fn get(&self, model_id: &str) -> Option<&Arc<dyn Indexable>> {
        self.managers.get(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.managers.contains_key(model_id)
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &ModelId> {
        self.managers.keys()
    }
}

impl std::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("models", &self.managers.keys().collect::<Vec<_>>())
            .finish()
    }
}
