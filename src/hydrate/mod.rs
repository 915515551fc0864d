//! Turning a logged hit list back into ordered records.
//!
//! [`hydrate`] returns records in exactly the rank order of a
//! [`QueryLogEntry`], each annotated with its score and rank. Ids the backing
//! store no longer holds are dropped silently: a record deleted since it was
//! indexed is an expected transient state.
//!
//! Stores that can order by an injected value list (see
//! [`SqliteRecordStore`]) do the ordering in a single query. Others only
//! implement [`RecordStore::fetch_by_ids`] and are reordered in memory, which
//! is fine for a page of results.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::query::QueryLogEntry;
use crate::types::RecordId;

pub use memory::MemoryRecordStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{RowRecord, SqliteRecordStore};

/// Identifier, score and rank of one hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub id: RecordId,
    pub score: Option<f64>,
    pub rank: usize,
}

/// A record with the score and rank of the hit it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<R> {
    pub record: R,
    pub score: Option<f64>,
    pub rank: usize,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    type Record: Send;

    /// True when [`RecordStore::fetch_ranked`] orders inside the store.
    fn supports_ordering_injection(&self) -> bool {
        false
    }

    /// Records present for `ids`, in any order.
    async fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<(RecordId, Self::Record)>>;

    /// Records for `hits` ordered by rank, missing ids omitted.
    ///
    /// The default fetches by id and reorders in memory.
    async fn fetch_ranked(&self, hits: &[RankedHit]) -> Result<Vec<Ranked<Self::Record>>> {
        let ids: Vec<RecordId> = hits.iter().map(|h| h.id.clone()).collect();
        let fetched = self.fetch_by_ids(&ids).await?;
        Ok(reorder(hits, fetched))
    }
}

/// Records for every hit of `entry`, in rank order.
pub async fn hydrate<S>(entry: &QueryLogEntry, store: &S) -> Result<Vec<Ranked<S::Record>>>
where
    S: RecordStore + ?Sized,
{
    hydrate_hits(&ranked_hits(entry, None), store).await
}

/// Like [`hydrate`] but only for hits that came from `index`, for entries
/// that searched several indexes backed by different stores.
pub async fn hydrate_index<S>(
    entry: &QueryLogEntry,
    index: &str,
    store: &S,
) -> Result<Vec<Ranked<S::Record>>>
where
    S: RecordStore + ?Sized,
{
    hydrate_hits(&ranked_hits(entry, Some(index)), store).await
}

async fn hydrate_hits<S>(hits: &[RankedHit], store: &S) -> Result<Vec<Ranked<S::Record>>>
where
    S: RecordStore + ?Sized,
{
    if hits.is_empty() {
        return Ok(Vec::new());
    }
    if !store.supports_ordering_injection() {
        tracing::debug!("[HYDRATE] reordering {} hit(s) in memory", hits.len());
    }
    let records = store.fetch_ranked(hits).await?;
    if records.len() < hits.len() {
        tracing::debug!(
            "[HYDRATE] {} of {} hit(s) no longer in the store",
            hits.len() - records.len(),
            hits.len()
        );
    }
    Ok(records)
}

/// Hits sorted by rank with duplicate ids removed (first rank wins).
fn ranked_hits(entry: &QueryLogEntry, index: Option<&str>) -> Vec<RankedHit> {
    let mut hits: Vec<RankedHit> = entry
        .hits
        .iter()
        .filter(|h| index.map_or(true, |i| h.index == i))
        .map(|h| RankedHit {
            id: h.id.clone(),
            score: h.score,
            rank: h.rank,
        })
        .collect();
    hits.sort_by_key(|h| h.rank);
    let mut seen = std::collections::HashSet::new();
    hits.retain(|h| seen.insert(h.id.clone()));
    hits
}

/// Put `fetched` into the order of `hits`, dropping ids that were not found.
pub fn reorder<R>(hits: &[RankedHit], fetched: Vec<(RecordId, R)>) -> Vec<Ranked<R>> {
    let mut by_id: HashMap<RecordId, R> = fetched.into_iter().collect();
    hits.iter()
        .filter_map(|hit| {
            by_id.remove(&hit.id).map(|record| Ranked {
                record,
                score: hit.score,
                rank: hit.rank,
            })
        })
        .collect()
}
