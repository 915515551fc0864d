use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ConfigRegistry, IndexConfig};
use crate::document::{bulk_action, Indexable, ModelCatalog};
use crate::error::{Result, SyncError};
use crate::transport::{BulkAction, Connections, SearchTransport};
use crate::types::{OperationKind, RecordId};

/// A record that could not be written during a batch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: RecordId,
    pub reason: String,
}

/// Summary of a batched operation over one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub index: String,
    /// Records considered (queryset records for updates, engine ids for prune).
    pub processed: usize,
    pub succeeded: usize,
    pub batches: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    fn new(index: &str) -> Self {
        BatchReport {
            index: index.to_string(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail_all(&mut self, actions: &[BulkAction], reason: &str) {
        self.failures
            .extend(actions.iter().map(|a| BatchFailure {
                id: a.id.clone(),
                reason: reason.to_string(),
            }));
    }
}

/// Index lifecycle commands: create, bulk update, delete, prune, rebuild.
pub struct IndexAdmin {
    registry: Arc<ConfigRegistry>,
    catalog: ModelCatalog,
    connections: Connections,
}

impl IndexAdmin {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        catalog: ModelCatalog,
        connections: Connections,
    ) -> Self {
        Self {
            registry,
            catalog,
            connections,
        }
    }

    /// Create the index in the engine from its mapping file. A degraded index
    /// is created with empty mappings and left to the engine's defaults.
    pub async fn create_index(&self, name: &str) -> Result<()> {
        let index = self.registry.require_index(name)?;
        let transport = self.transport(index)?;
        let (mappings, settings) = match &index.mapping {
            Some(m) => (m.mappings(), m.index_settings()),
            None => {
                tracing::warn!(
                    "[ADMIN {}] creating without a mapping file, engine defaults apply",
                    name
                );
                (serde_json::json!({}), None)
            }
        };
        transport.create_index(name, &mappings, settings).await?;
        tracing::info!("[ADMIN {}] created", name);
        Ok(())
    }

    pub async fn delete_index(&self, name: &str) -> Result<()> {
        let index = self.registry.require_index(name)?;
        self.transport(index)?.delete_index(name).await?;
        tracing::info!("[ADMIN {}] deleted", name);
        Ok(())
    }

    /// Bulk-index every model's search queryset in `chunk_size` batches.
    ///
    /// Records that fail to map or that the engine rejects are collected in
    /// the report; the remaining batches still run.
    pub async fn update_index(&self, name: &str) -> Result<BatchReport> {
        let index = self.registry.require_index(name)?;
        let transport = self.transport(index)?;
        let chunk_size = index.settings.chunk_size;
        let mut report = BatchReport::new(name);

        for model_id in &index.models {
            let manager = self.manager(model_id)?;
            let mut offset = 0;
            loop {
                let page = manager.search_queryset(name, offset, chunk_size).await?;
                if page.is_empty() {
                    break;
                }
                report.processed += page.len();
                report.batches += 1;

                let mut actions = Vec::with_capacity(page.len());
                for record in &page {
                    match bulk_action(record.as_ref(), name, OperationKind::Index) {
                        Ok(action) => actions.push(action),
                        Err(e) => report.failures.push(BatchFailure {
                            id: record.record_id(),
                            reason: e.to_string(),
                        }),
                    }
                }
                self.send_batch(transport.as_ref(), &actions, &mut report)
                    .await;

                tracing::debug!(
                    "[ADMIN {}] {} batch {} ({} records)",
                    name,
                    model_id,
                    report.batches,
                    page.len()
                );
                if page.len() < chunk_size {
                    break;
                }
                offset += page.len();
            }
        }

        tracing::info!(
            "[ADMIN {}] update finished: {} indexed, {} failed",
            name,
            report.succeeded,
            report.failures.len()
        );
        Ok(report)
    }

    /// Delete engine documents whose records are no longer in any bound
    /// model's search queryset.
    pub async fn prune_index(&self, name: &str) -> Result<BatchReport> {
        let index = self.registry.require_index(name)?;
        let transport = self.transport(index)?;
        let managers = index
            .models
            .iter()
            .map(|m| self.manager(m))
            .collect::<Result<Vec<_>>>()?;

        let ids = transport
            .scan_ids(name, index.settings.chunk_size)
            .await?;
        let mut report = BatchReport::new(name);
        report.processed = ids.len();

        let mut orphans = Vec::new();
        'ids: for id in ids {
            for manager in &managers {
                match manager.in_search_queryset(&id, name).await {
                    Ok(true) => continue 'ids,
                    Ok(false) => {}
                    // Unknown membership: leave the document in place.
                    Err(e) => {
                        tracing::warn!(
                            "[ADMIN {}] queryset lookup for {} failed: {}",
                            name,
                            id,
                            e
                        );
                        report.failures.push(BatchFailure {
                            id,
                            reason: e.to_string(),
                        });
                        continue 'ids;
                    }
                }
            }
            orphans.push(BulkAction {
                kind: OperationKind::Delete,
                index: name.to_string(),
                id,
                body: None,
            });
        }

        for chunk in orphans.chunks(index.settings.chunk_size) {
            report.batches += 1;
            self.send_batch(transport.as_ref(), chunk, &mut report)
                .await;
        }
        tracing::info!(
            "[ADMIN {}] pruned {} of {} document(s)",
            name,
            report.succeeded,
            report.processed
        );
        Ok(report)
    }

    /// Delete, recreate and repopulate the index.
    pub async fn rebuild_index(&self, name: &str) -> Result<BatchReport> {
        self.delete_index(name).await?;
        self.create_index(name).await?;
        self.update_index(name).await
    }

    async fn send_batch(
        &self,
        transport: &dyn SearchTransport,
        actions: &[BulkAction],
        report: &mut BatchReport,
    ) {
        if actions.is_empty() {
            return;
        }
        match transport.bulk(actions).await {
            Ok(response) => {
                report.succeeded += response.succeeded;
                report
                    .failures
                    .extend(response.failures.into_iter().map(|f| BatchFailure {
                        id: f.id,
                        reason: f.reason,
                    }));
            }
            Err(e) => {
                tracing::warn!("[ADMIN {}] bulk request failed: {}", report.index, e);
                report.fail_all(actions, &e.to_string());
            }
        }
    }

    fn manager(&self, model_id: &str) -> Result<&Arc<dyn Indexable>> {
        self.catalog.get(model_id).ok_or_else(|| {
            SyncError::Config(format!("model '{}' is not registered", model_id))
        })
    }

    fn transport(&self, index: &IndexConfig) -> Result<&Arc<dyn SearchTransport>> {
        Ok(self.connections.get(&index.connection)?)
    }
}
