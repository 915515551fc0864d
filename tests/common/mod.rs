#![allow(dead_code)]

use async_trait::async_trait;
use searchsync::document::FieldState;
use searchsync::error::TransportError;
use searchsync::transport::{BulkAction, BulkItemFailure, BulkResponse, SearchTransport};
use searchsync::{
    ConfigRegistry, Documentable, DocumentBody, Indexable, ModelCatalog, OperationKind,
    RecordId, SearchConfig,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const ARTICLE: &str = "blog.Article";

/// One call that reached the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Index {
        index: String,
        id: RecordId,
        body: DocumentBody,
    },
    Update {
        index: String,
        id: RecordId,
        body: DocumentBody,
    },
    Delete {
        index: String,
        id: RecordId,
    },
    Bulk(Vec<BulkAction>),
    CreateIndex {
        index: String,
        mappings: Value,
    },
    DeleteIndex(String),
    Search {
        indexes: Vec<String>,
        body: Value,
    },
    Count {
        indexes: Vec<String>,
        body: Value,
    },
}

/// In-process engine double that records every call.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    failing: AtomicBool,
    rejected: Mutex<HashSet<RecordId>>,
    absent: Mutex<HashSet<(String, RecordId)>>,
    engine_ids: Mutex<Vec<RecordId>>,
    response: Mutex<Value>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every subsequent call fail with a 503.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Bulk items for `id` come back as rejected.
    pub fn reject(&self, id: impl Into<RecordId>) {
        self.rejected.lock().unwrap().insert(id.into());
    }

    /// Deleting `id` from `index` comes back as a 404, as for a document the
    /// index never held.
    pub fn mark_absent(&self, index: &str, id: impl Into<RecordId>) {
        self.absent
            .lock()
            .unwrap()
            .insert((index.to_string(), id.into()));
    }

    /// Ids returned by `scan_ids`.
    pub fn set_engine_ids<I: Into<RecordId>>(&self, ids: impl IntoIterator<Item = I>) {
        *self.engine_ids.lock().unwrap() = ids.into_iter().map(Into::into).collect();
    }

    /// Response returned by `search` and `count`.
    pub fn set_response(&self, response: Value) {
        *self.response.lock().unwrap() = response;
    }

    fn record(&self, call: Call) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: http::StatusCode::SERVICE_UNAVAILABLE,
                body: "engine unavailable".to_string(),
            });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl SearchTransport for RecordingTransport {
    async fn index_document(
        &self,
        index: &str,
        id: &RecordId,
        body: &DocumentBody,
    ) -> Result<(), TransportError> {
        self.record(Call::Index {
            index: index.to_string(),
            id: id.clone(),
            body: body.clone(),
        })
    }

    async fn update_document(
        &self,
        index: &str,
        id: &RecordId,
        body: &DocumentBody,
    ) -> Result<(), TransportError> {
        self.record(Call::Update {
            index: index.to_string(),
            id: id.clone(),
            body: body.clone(),
        })
    }

    async fn delete_document(&self, index: &str, id: &RecordId) -> Result<(), TransportError> {
        self.record(Call::Delete {
            index: index.to_string(),
            id: id.clone(),
        })?;
        if self
            .absent
            .lock()
            .unwrap()
            .contains(&(index.to_string(), id.clone()))
        {
            return Err(TransportError::Status {
                status: http::StatusCode::NOT_FOUND,
                body: r#"{"result":"not_found"}"#.to_string(),
            });
        }
        Ok(())
    }

    async fn bulk(&self, actions: &[BulkAction]) -> Result<BulkResponse, TransportError> {
        self.record(Call::Bulk(actions.to_vec()))?;
        let rejected = self.rejected.lock().unwrap();
        let mut response = BulkResponse::default();
        for action in actions {
            if rejected.contains(&action.id) {
                response.failures.push(BulkItemFailure {
                    id: action.id.clone(),
                    kind: action.kind,
                    status: 400,
                    reason: "mapper_parsing_exception".to_string(),
                });
            } else {
                response.succeeded += 1;
            }
        }
        Ok(response)
    }

    async fn create_index(
        &self,
        index: &str,
        mappings: &Value,
        _settings: Option<&Value>,
    ) -> Result<(), TransportError> {
        self.record(Call::CreateIndex {
            index: index.to_string(),
            mappings: mappings.clone(),
        })
    }

    async fn delete_index(&self, index: &str) -> Result<(), TransportError> {
        self.record(Call::DeleteIndex(index.to_string()))
    }

    async fn search(&self, indexes: &[String], body: &Value) -> Result<Value, TransportError> {
        self.record(Call::Search {
            indexes: indexes.to_vec(),
            body: body.clone(),
        })?;
        Ok(self.response.lock().unwrap().clone())
    }

    async fn count(&self, indexes: &[String], body: &Value) -> Result<Value, TransportError> {
        self.record(Call::Count {
            indexes: indexes.to_vec(),
            body: body.clone(),
        })?;
        Ok(self.response.lock().unwrap().clone())
    }

    async fn scan_ids(
        &self,
        _index: &str,
        _batch_size: usize,
    ) -> Result<Vec<RecordId>, TransportError> {
        Ok(self.engine_ids.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub views: i64,
    pub published: bool,
}

impl Article {
    pub fn new(id: i64, title: &str) -> Self {
        Article {
            id,
            title: title.to_string(),
            views: 0,
            published: true,
        }
    }
}

impl Documentable for Article {
    fn record_id(&self) -> RecordId {
        RecordId::from(self.id)
    }

    fn model_id(&self) -> &str {
        ARTICLE
    }

    fn as_document(&self, _index: &str) -> searchsync::Result<DocumentBody> {
        Ok(DocumentBody::new()
            .with("title", self.title.clone())
            .with("views", self.views)
            .with("published", self.published))
    }

    fn field_state(&self, field: &str) -> Option<FieldState> {
        match field {
            "title" => Some(FieldState::Value(self.title.clone().into())),
            "views" => Some(FieldState::Value(self.views.into())),
            "published" => Some(FieldState::Value(self.published.into())),
            "author" => Some(FieldState::Composite),
            _ => None,
        }
    }
}

/// Manager over a shared article table; only published articles are
/// searchable.
#[derive(Default)]
pub struct ArticleManager {
    pub rows: Mutex<Vec<Article>>,
}

impl ArticleManager {
    pub fn with(articles: Vec<Article>) -> Arc<Self> {
        Arc::new(ArticleManager {
            rows: Mutex::new(articles),
        })
    }
}

#[async_trait]
impl Indexable for ArticleManager {
    fn model_id(&self) -> &str {
        ARTICLE
    }

    async fn search_queryset(
        &self,
        _index: &str,
        offset: usize,
        limit: usize,
    ) -> searchsync::Result<Vec<Box<dyn Documentable>>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|a| a.published)
            .skip(offset)
            .take(limit)
            .map(|a| Box::new(a.clone()) as Box<dyn Documentable>)
            .collect())
    }

    async fn in_search_queryset(&self, id: &RecordId, _index: &str) -> searchsync::Result<bool> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .any(|a| a.published && RecordId::from(a.id) == *id))
    }
}

pub fn catalog(manager: Arc<ArticleManager>) -> ModelCatalog {
    let mut catalog = ModelCatalog::new();
    catalog.register(manager);
    catalog
}

/// Write `{dir}/{index}.json` declaring `fields` as keyword properties.
pub fn write_mapping(dir: &Path, index: &str, fields: &[&str]) {
    let props: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| (f.to_string(), json!({"type": "keyword"})))
        .collect();
    let mapping = json!({
        "settings": {"number_of_shards": 1},
        "mappings": {"properties": props}
    });
    std::fs::write(
        dir.join(format!("{}.json", index)),
        serde_json::to_string_pretty(&mapping).unwrap(),
    )
    .unwrap();
}

/// Config with a single `blog` index bound to articles, mappings in `dir`.
pub fn blog_config(dir: &Path, extra_settings: Value) -> SearchConfig {
    let mut settings = json!({"mappings_dir": dir});
    if let (Some(base), Some(extra)) = (settings.as_object_mut(), extra_settings.as_object()) {
        base.extend(extra.clone());
    }
    let raw = json!({
        "connections": {"default": "http://localhost:9200"},
        "indexes": {"blog": {"models": [ARTICLE]}},
        "settings": settings,
    });
    SearchConfig::from_json_str(&raw.to_string()).unwrap()
}

/// Temp mappings dir holding a `blog` mapping for the article fields, plus
/// the registry loaded from [`blog_config`].
pub fn blog_registry(
    manager: Arc<ArticleManager>,
    extra_settings: Value,
) -> (TempDir, Arc<ConfigRegistry>, ModelCatalog) {
    let dir = TempDir::new().unwrap();
    write_mapping(dir.path(), "blog", &["title", "views", "published", "author"]);
    let catalog = catalog(manager);
    let registry =
        ConfigRegistry::load(blog_config(dir.path(), extra_settings), &catalog).unwrap();
    (dir, Arc::new(registry), catalog)
}

/// Registry with articles bound to every index in `indexes`, in that order,
/// each with a mapping for the article fields.
pub fn multi_index_registry(
    manager: Arc<ArticleManager>,
    indexes: &[&str],
    extra_settings: Value,
) -> (TempDir, Arc<ConfigRegistry>, ModelCatalog) {
    let dir = TempDir::new().unwrap();
    let mut declared = serde_json::Map::new();
    for index in indexes {
        write_mapping(dir.path(), index, &["title", "views", "published", "author"]);
        declared.insert(index.to_string(), json!({"models": [ARTICLE]}));
    }
    let mut settings = json!({"mappings_dir": dir.path()});
    if let (Some(base), Some(extra)) = (settings.as_object_mut(), extra_settings.as_object()) {
        base.extend(extra.clone());
    }
    let raw = json!({
        "connections": {"default": "http://localhost:9200"},
        "indexes": declared,
        "settings": settings,
    });
    let config = SearchConfig::from_json_str(&raw.to_string()).unwrap();
    let catalog = catalog(manager);
    let registry = ConfigRegistry::load(config, &catalog).unwrap();
    (dir, Arc::new(registry), catalog)
}

/// `(index, kind)` of every single-document call, in order.
pub fn dispatched(calls: &[Call]) -> Vec<(String, OperationKind)> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Index { index, .. } => Some((index.clone(), OperationKind::Index)),
            Call::Update { index, .. } => Some((index.clone(), OperationKind::Update)),
            Call::Delete { index, .. } => Some((index.clone(), OperationKind::Delete)),
            _ => None,
        })
        .collect()
}

pub fn op_kinds(calls: &[Call]) -> Vec<OperationKind> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Index { .. } => Some(OperationKind::Index),
            Call::Update { .. } => Some(OperationKind::Update),
            Call::Delete { .. } => Some(OperationKind::Delete),
            _ => None,
        })
        .collect()
}
