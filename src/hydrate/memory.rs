use async_trait::async_trait;
use indexmap::IndexMap;

use super::RecordStore;
use crate::error::Result;
use crate::types::RecordId;

/// In-memory record store without ordering injection.
///
/// Returns fetched records in insertion order, so callers always go through
/// the in-memory reorder.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore<R> {
    records: IndexMap<RecordId, R>,
}

impl<R> MemoryRecordStore<R> {
    pub fn new() -> Self {
        MemoryRecordStore {
            records: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, id: impl Into<RecordId>, record: R) {
        self.records.insert(id.into(), record);
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<R> {
        self.records.shift_remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R> FromIterator<(RecordId, R)> for MemoryRecordStore<R> {
    fn from_iter<I: IntoIterator<Item = (RecordId, R)>>(iter: I) -> Self {
        MemoryRecordStore {
            records: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl<R> RecordStore for MemoryRecordStore<R>
where
    R: Clone + Send + Sync,
{
    type Record = R;

    async fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<(RecordId, R)>> {
        Ok(self
            .records
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect())
    }
}
