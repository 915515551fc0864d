//! # searchsync
//!
//! Keeps relational records in step with a search engine's document indexes
//! and turns search results back into ordered record sets.
//!
//! The pieces, in the order data flows through them:
//!
//! - [`config`]: boot-time validated registry of indexes, models, mappings
//!   and connections.
//! - [`document`]: the [`Documentable`] / [`Indexable`] capabilities a model
//!   implements, with full and partial update strategies.
//! - [`coalescer`]: drops identical updates sent within a short window.
//! - [`sync`]: turns create/update/delete triggers into engine calls, with
//!   pre-operation hooks and an optional dispatch queue.
//! - [`index`]: create, bulk update, prune and rebuild whole indexes.
//! - [`query`]: executes searches and records them in a query log.
//! - [`hydrate`]: loads the records behind a logged hit list, in rank order.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use searchsync::{
//!     ConfigRegistry, Connections, ExecuteOptions, ModelCatalog, QueryExecutor,
//!     MemoryQueryLogStore, SearchConfig, SearchRequest, SyncOrchestrator,
//! };
//! use std::sync::Arc;
//!
//! # async fn run(catalog: ModelCatalog) -> searchsync::Result<()> {
//! let config = SearchConfig::from_file("search.json".as_ref())?.with_env_overrides();
//! let registry = Arc::new(ConfigRegistry::load(config, &catalog)?);
//! let connections = Connections::from_registry(&registry)?;
//!
//! let sync = SyncOrchestrator::new(registry.clone(), catalog, connections.clone());
//! let search = QueryExecutor::new(registry, connections, Arc::new(MemoryQueryLogStore::new()));
//!
//! let request = SearchRequest::search(["blog"], serde_json::json!({"query": {"match_all": {}}}));
//! let entry = search.execute(&request, &ExecuteOptions::default()).await?;
//! println!("{} hits", entry.total_hits);
//! # let _ = sync;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Dependencies | Use case |
//! |---------|-------------|----------|
//! | `sqlite` (default) | rusqlite | [`hydrate::SqliteRecordStore`] with in-query rank ordering |

pub mod coalescer;
pub mod config;
pub mod document;
pub mod error;
pub mod hydrate;
pub mod index;
pub mod query;
pub mod sync;
pub mod transport;
pub mod types;

pub use coalescer::UpdateCoalescer;
pub use config::{
    ConfigRegistry, IndexConfig, MappingSchema, SearchConfig, Settings, UpdateStrategy,
};
pub use document::{Documentable, FieldState, Indexable, ModelCatalog, UpdateContext};
pub use error::{Result, SyncError, TransportError};
pub use hydrate::{hydrate, MemoryRecordStore, Ranked, RecordStore};
pub use index::{BatchReport, IndexAdmin};
pub use query::{
    ExecuteOptions, JsonlQueryLogStore, MemoryQueryLogStore, QueryExecutor, QueryLogEntry,
    QueryLogStore, SearchRequest,
};
pub use sync::{DispatchOutcome, HookOutcome, PreOperation, SyncOrchestrator, SyncSubscriber};
pub use transport::{Connections, HttpTransport, SearchTransport};
pub use types::*;

#[cfg(feature = "sqlite")]
pub use hydrate::SqliteRecordStore;

/// Install a `tracing` subscriber filtered by `SEARCHSYNC_LOG` (default
/// `info`). Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    static INIT: once_cell::sync::OnceCell<()> = once_cell::sync::OnceCell::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("SEARCHSYNC_LOG").unwrap_or_else(|_| "info".into()),
            ))
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
