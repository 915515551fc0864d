use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use super::log::{QueryLogEntry, QueryType, SearchHit};
use super::store::QueryLogStore;
use crate::config::ConfigRegistry;
use crate::error::{Result, SyncError};
use crate::transport::{Connections, SearchTransport};
use crate::types::RecordId;

// Body keys the count endpoint rejects.
const NON_COUNT_KEYS: &[&str] = &[
    "from",
    "size",
    "sort",
    "aggs",
    "aggregations",
    "_source",
    "highlight",
    "track_total_hits",
];

/// A search or count request against one or more indexes.
///
/// The body is passed through to the engine untouched apart from the page
/// defaults filled in at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub indexes: Vec<String>,
    pub body: Value,
    pub query_type: QueryType,
}

impl SearchRequest {
    pub fn search<I, S>(indexes: I, body: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SearchRequest {
            indexes: indexes.into_iter().map(Into::into).collect(),
            body,
            query_type: QueryType::Search,
        }
    }

    pub fn count<I, S>(indexes: I, body: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SearchRequest {
            query_type: QueryType::Count,
            ..Self::search(indexes, body)
        }
    }

    pub fn from(self, from: u64) -> Self {
        self.with_key("from", json!(from))
    }

    pub fn size(self, size: u64) -> Self {
        self.with_key("size", json!(size))
    }

    pub fn aggregations(self, aggs: Value) -> Self {
        self.with_key("aggs", aggs)
    }

    fn with_key(mut self, key: &str, value: Value) -> Self {
        if self.body.is_null() {
            self.body = json!({});
        }
        if let Some(obj) = self.body.as_object_mut() {
            obj.insert(key.to_string(), value);
        }
        self
    }
}

/// Caller-supplied context for [`QueryExecutor::execute`]. None of it is
/// sent to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOptions {
    pub user: Option<String>,
    /// Free text the user typed, for analysis of the log.
    pub search_terms: Option<String>,
    /// Grouping key, e.g. the page the search came from.
    pub reference: Option<String>,
    /// Persist the entry to the query log store.
    pub save: bool,
    /// Log engine failures and return an empty, unsaved entry instead.
    pub empty_on_error: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            user: None,
            search_terms: None,
            reference: None,
            save: true,
            empty_on_error: false,
        }
    }
}

impl ExecuteOptions {
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn search_terms(mut self, terms: impl Into<String>) -> Self {
        self.search_terms = Some(terms.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    pub fn empty_on_error(mut self) -> Self {
        self.empty_on_error = true;
        self
    }
}

/// Executes requests and records each one as a [`QueryLogEntry`].
pub struct QueryExecutor {
    registry: Arc<ConfigRegistry>,
    connections: Connections,
    store: Arc<dyn QueryLogStore>,
}

impl QueryExecutor {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        connections: Connections,
        store: Arc<dyn QueryLogStore>,
    ) -> Self {
        Self {
            registry,
            connections,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueryLogStore> {
        &self.store
    }

    /// Send `request` to the engine and build its log entry.
    ///
    /// The returned entry always carries the raw response in memory; it is
    /// written to the store only when `options.save` is set. On an engine
    /// failure nothing is stored and [`SyncError::SearchExecution`] is
    /// returned, unless the caller opted into `empty_on_error`.
    pub async fn execute(
        &self,
        request: &SearchRequest,
        options: &ExecuteOptions,
    ) -> Result<QueryLogEntry> {
        let body = self.prepare_body(request)?;
        let transport = self.transport_for(&request.indexes)?;

        let started = Instant::now();
        let result = match request.query_type {
            QueryType::Search => transport.search(&request.indexes, &body).await,
            QueryType::Count => transport.count(&request.indexes, &body).await,
        };

        let mut entry = QueryLogEntry::new(request.indexes.clone(), request.query_type, body);
        entry.user = options.user.clone();
        entry.search_terms = options.search_terms.clone();
        entry.reference = options.reference.clone();
        entry.duration_ms = started.elapsed().as_millis() as u64;

        let response = match result {
            Ok(response) => response,
            Err(e) if options.empty_on_error => {
                tracing::warn!(
                    "[QUERY {}] {} failed, returning empty result: {}",
                    request.indexes.join(","),
                    query_kind(request.query_type),
                    e
                );
                return Ok(entry);
            }
            Err(e) => {
                tracing::warn!(
                    "[QUERY {}] {} failed: {}",
                    request.indexes.join(","),
                    query_kind(request.query_type),
                    e
                );
                return Err(SyncError::SearchExecution(e.to_string()));
            }
        };

        match request.query_type {
            QueryType::Search => read_search_response(&mut entry, &response),
            QueryType::Count => read_count_response(&mut entry, &response),
        }

        let settings = self.registry.settings();
        if settings.include_source {
            let size = serde_json::to_vec(&response)
                .map(|b| b.len())
                .unwrap_or(usize::MAX);
            if size <= settings.response_snapshot_limit {
                entry.response_snapshot = Some(response.clone());
            } else {
                tracing::debug!(
                    "[QUERY] response snapshot of {} bytes exceeds limit {}, not stored",
                    size,
                    settings.response_snapshot_limit
                );
            }
        }
        entry.raw_response = Some(response);

        if options.save {
            self.store.save(&entry)?;
        }
        tracing::debug!(
            "[QUERY {}] {} total={} hits={} in {}ms saved={}",
            entry.indexes.join(","),
            query_kind(entry.query_type),
            entry.total_hits,
            entry.hits.len(),
            entry.duration_ms,
            options.save
        );
        Ok(entry)
    }

    /// Copy of the request body with page defaults applied (search) or
    /// paging keys removed (count).
    fn prepare_body(&self, request: &SearchRequest) -> Result<Value> {
        if request.indexes.is_empty() {
            return Err(SyncError::SearchExecution(
                "request names no index".to_string(),
            ));
        }
        let mut body = match &request.body {
            Value::Null => serde_json::Map::new(),
            Value::Object(obj) => obj.clone(),
            other => {
                return Err(SyncError::SearchExecution(format!(
                    "request body must be a JSON object, got {}",
                    other
                )))
            }
        };

        match request.query_type {
            QueryType::Search => {
                let page_size = request
                    .indexes
                    .iter()
                    .find_map(|i| self.registry.settings_for(i))
                    .map(|s| s.page_size)
                    .unwrap_or(self.registry.settings().page_size);
                body.entry("from").or_insert_with(|| json!(0));
                body.entry("size").or_insert_with(|| json!(page_size));
            }
            QueryType::Count => {
                for key in NON_COUNT_KEYS {
                    body.remove(*key);
                }
            }
        }
        Ok(Value::Object(body))
    }

    /// The connection of the first configured index, or the default one.
    fn transport_for(&self, indexes: &[String]) -> Result<&Arc<dyn SearchTransport>> {
        let configured = indexes.iter().find_map(|i| self.registry.index(i));
        let transport = match configured {
            Some(index) => self.connections.get(&index.connection),
            None => self.connections.default_transport(),
        };
        transport.map_err(|e| SyncError::SearchExecution(e.to_string()))
    }
}

fn query_kind(query_type: QueryType) -> &'static str {
    match query_type {
        QueryType::Search => "search",
        QueryType::Count => "count",
    }
}

fn read_search_response(entry: &mut QueryLogEntry, response: &Value) {
    match response.pointer("/hits/total") {
        Some(Value::Object(total)) => {
            entry.total_hits = total.get("value").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(rel) = total.get("relation").and_then(|r| r.as_str()) {
                entry.total_hits_relation = rel.to_string();
            }
        }
        Some(total) => entry.total_hits = total.as_u64().unwrap_or(0),
        None => {}
    }

    let default_index = entry.indexes.first().cloned().unwrap_or_default();
    let hits = response
        .pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .map(|h| h.as_slice())
        .unwrap_or_default();
    entry.hits = hits
        .iter()
        .filter_map(|hit| {
            let id = match hit.get("_id")? {
                Value::String(s) => RecordId::new(s.as_str()),
                other => RecordId::new(other.to_string()),
            };
            let index = hit
                .get("_index")
                .and_then(|i| i.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| default_index.clone());
            Some((index, id, hit.get("_score").and_then(|s| s.as_f64())))
        })
        .enumerate()
        .map(|(pos, (index, id, score))| SearchHit {
            index,
            id,
            score,
            rank: pos + 1,
        })
        .collect();

    entry.aggregations = response.get("aggregations").cloned();
}

fn read_count_response(entry: &mut QueryLogEntry, response: &Value) {
    entry.total_hits = response.get("count").and_then(|c| c.as_u64()).unwrap_or(0);
}
