//! Thin execute/response contract with the search engine.
//!
//! Everything above this module talks to the engine through
//! [`SearchTransport`]; [`http::HttpTransport`] is the REST implementation.

pub mod http;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ConfigRegistry, DEFAULT_CONNECTION};
use crate::error::TransportError;
use crate::types::{DocumentBody, OperationKind, RecordId};

pub use self::http::HttpTransport;

/// One line of a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAction {
    pub kind: OperationKind,
    pub index: String,
    pub id: RecordId,
    /// Present for index and update actions.
    pub body: Option<DocumentBody>,
}

/// A bulk item the engine rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemFailure {
    pub id: RecordId,
    pub kind: OperationKind,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub succeeded: usize,
    pub failures: Vec<BulkItemFailure>,
}

#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn index_document(
        &self,
        index: &str,
        id: &RecordId,
        body: &DocumentBody,
    ) -> Result<(), TransportError>;

    async fn update_document(
        &self,
        index: &str,
        id: &RecordId,
        body: &DocumentBody,
    ) -> Result<(), TransportError>;

    async fn delete_document(&self, index: &str, id: &RecordId) -> Result<(), TransportError>;

    async fn bulk(&self, actions: &[BulkAction]) -> Result<BulkResponse, TransportError>;

    /// Create `index` with the given `mappings` and optional index `settings`.
    async fn create_index(
        &self,
        index: &str,
        mappings: &serde_json::Value,
        settings: Option<&serde_json::Value>,
    ) -> Result<(), TransportError>;

    /// Delete `index`. A missing index is not an error.
    async fn delete_index(&self, index: &str) -> Result<(), TransportError>;

    async fn search(
        &self,
        indexes: &[String],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;

    async fn count(
        &self,
        indexes: &[String],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;

    /// Every document id currently in `index`, fetched `batch_size` at a time.
    async fn scan_ids(&self, index: &str, batch_size: usize)
        -> Result<Vec<RecordId>, TransportError>;
}

/// Transports keyed by connection name.
#[derive(Clone, Default)]
pub struct Connections {
    transports: IndexMap<String, Arc<dyn SearchTransport>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single transport registered as the default connection.
    pub fn single(transport: Arc<dyn SearchTransport>) -> Self {
        let mut c = Self::new();
        c.insert(DEFAULT_CONNECTION, transport);
        c
    }

    /// One [`HttpTransport`] per configured connection.
    pub fn from_registry(registry: &ConfigRegistry) -> Result<Self, TransportError> {
        let mut c = Self::new();
        for (name, url) in registry.connections() {
            c.insert(name, Arc::new(HttpTransport::new(url)?));
        }
        Ok(c)
    }

    pub fn insert(&mut self, name: &str, transport: Arc<dyn SearchTransport>) {
        self.transports.insert(name.to_string(), transport);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn SearchTransport>, TransportError> {
        self.transports
            .get(name)
            .ok_or_else(|| TransportError::UnknownConnection(name.to_string()))
    }

    /// The connection named `default`, or the first registered one.
    pub fn default_transport(&self) -> Result<&Arc<dyn SearchTransport>, TransportError> {
        self.transports
            .get(DEFAULT_CONNECTION)
            .or_else(|| self.transports.values().next())
            .ok_or_else(|| TransportError::UnknownConnection(DEFAULT_CONNECTION.to_string()))
    }
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connections")
            .field("names", &self.transports.keys().collect::<Vec<_>>())
            .finish()
    }
}
