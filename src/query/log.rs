use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::RecordId;

/// Engine page size assumed when a logged query does not carry `size`.
const ENGINE_DEFAULT_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Search,
    Count,
}

/// Meta info for one hit, in engine order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub index: String,
    pub id: RecordId,
    /// `None` when the engine did not score the hit (e.g. sorted queries).
    pub score: Option<f64>,
    /// 1-based position in the returned page.
    pub rank: usize,
}

/// Record of one executed search or count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub id: Uuid,
    pub indexes: Vec<String>,
    pub query_type: QueryType,
    /// Request body as sent to the engine.
    pub query: serde_json::Value,
    pub user: Option<String>,
    pub search_terms: Option<String>,
    pub reference: Option<String>,
    pub total_hits: u64,
    /// `eq` or `gte`, as reported by the engine.
    pub total_hits_relation: String,
    pub hits: Vec<SearchHit>,
    pub aggregations: Option<serde_json::Value>,
    /// Raw response, kept only when `include_source` is on and it fits the
    /// configured size limit.
    pub response_snapshot: Option<serde_json::Value>,
    pub duration_ms: u64,
    pub executed_at: DateTime<Utc>,
    #[serde(skip)]
    pub raw_response: Option<serde_json::Value>,
}

impl QueryLogEntry {
    pub fn new(
        indexes: Vec<String>,
        query_type: QueryType,
        query: serde_json::Value,
    ) -> Self {
        QueryLogEntry {
            id: Uuid::new_v4(),
            indexes,
            query_type,
            query,
            user: None,
            search_terms: None,
            reference: None,
            total_hits: 0,
            total_hits_relation: "eq".to_string(),
            hits: Vec::new(),
            aggregations: None,
            response_snapshot: None,
            duration_ms: 0,
            executed_at: Utc::now(),
            raw_response: None,
        }
    }

    /// Distinct hit ids, in rank order.
    pub fn object_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = Vec::with_capacity(self.hits.len());
        for hit in &self.hits {
            if !ids.contains(&hit.id) {
                ids.push(hit.id.clone());
            }
        }
        ids
    }

    /// Highest score in the returned page, 0 if nothing was scored.
    pub fn max_score(&self) -> f64 {
        self.scores().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn min_score(&self) -> f64 {
        self.scores().reduce(f64::min).unwrap_or(0.0)
    }

    fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.hits.iter().filter_map(|h| h.score)
    }

    /// The query's `(from, size)`, 0-based.
    pub fn page_slice(&self) -> (u64, u64) {
        let get = |key: &str, default: u64| {
            self.query
                .get(key)
                .and_then(|v| v.as_u64())
                .unwrap_or(default)
        };
        (get("from", 0), get("size", ENGINE_DEFAULT_SIZE))
    }

    /// Number of hits returned in this page.
    pub fn page_size(&self) -> usize {
        self.hits.len()
    }

    /// 1-based position of the first hit in the page, 0 when empty.
    pub fn page_from(&self) -> u64 {
        if self.hits.is_empty() {
            return 0;
        }
        self.page_slice().0 + 1
    }

    /// 1-based position of the last hit in the page, 0 when empty.
    pub fn page_to(&self) -> u64 {
        if self.hits.is_empty() {
            return 0;
        }
        self.page_from() + self.hits.len() as u64 - 1
    }
}
