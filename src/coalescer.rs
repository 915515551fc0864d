use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::types::RecordId;

/// Fixed suppression window for identical updates.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(60);

/// Suppresses redundant document updates within a short window.
///
/// Keyed by (record, index). An update is redundant when an unexpired entry
/// exists with the same document fingerprint. Losing the map (restart) only
/// costs extra updates, so there is no persistence and no background sweep;
/// expiry is checked lazily on lookup.
pub struct UpdateCoalescer {
    entries: DashMap<(RecordId, String), CoalescerEntry>,
    window: Duration,
}

#[derive(Debug, Clone)]
struct CoalescerEntry {
    fingerprint: String,
    expires_at: Instant,
}

impl Default for UpdateCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateCoalescer {
    pub fn new() -> Self {
        Self::with_window(SUPPRESSION_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    /// Returns true if this update should be suppressed. Otherwise records
    /// `fingerprint` with a fresh expiry and returns false.
    ///
    /// A suppressed update does not refresh the expiry.
    pub fn should_suppress(&self, record_id: &RecordId, index: &str, fingerprint: &str) -> bool {
        let key = (record_id.clone(), index.to_string());
        let now = Instant::now();

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get();
                if entry.expires_at > now && entry.fingerprint == fingerprint {
                    return true;
                }
                occupied.insert(self.fresh(fingerprint, now));
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.fresh(fingerprint, now));
                false
            }
        }
    }

    /// Read-only half of [`UpdateCoalescer::should_suppress`].
    pub fn is_redundant(&self, record_id: &RecordId, index: &str, fingerprint: &str) -> bool {
        let key = (record_id.clone(), index.to_string());
        self.entries
            .get(&key)
            .map(|e| e.expires_at > Instant::now() && e.fingerprint == fingerprint)
            .unwrap_or(false)
    }

    /// Record a successfully dispatched update.
    pub fn commit(&self, record_id: &RecordId, index: &str, fingerprint: &str) {
        let key = (record_id.clone(), index.to_string());
        self.entries.insert(key, self.fresh(fingerprint, Instant::now()));
    }

    /// Drop any entry for (record, index), e.g. after a delete.
    pub fn forget(&self, record_id: &RecordId, index: &str) {
        self.entries.remove(&(record_id.clone(), index.to_string()));
    }

    /// Remove expired entries to bound memory in long-running processes.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fresh(&self, fingerprint: &str, now: Instant) -> CoalescerEntry {
        CoalescerEntry {
            fingerprint: fingerprint.to_string(),
            expires_at: now + self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> RecordId {
        RecordId::from(n)
    }

    #[test]
    fn first_update_passes() {
        let c = UpdateCoalescer::new();
        assert!(!c.should_suppress(&id(1), "blog", "abc"));
    }

    #[test]
    fn identical_update_within_window_is_suppressed() {
        let c = UpdateCoalescer::new();
        assert!(!c.should_suppress(&id(1), "blog", "abc"));
        assert!(c.should_suppress(&id(1), "blog", "abc"));
        assert!(c.should_suppress(&id(1), "blog", "abc"));
    }

    #[test]
    fn changed_fingerprint_passes_and_replaces_entry() {
        let c = UpdateCoalescer::new();
        assert!(!c.should_suppress(&id(1), "blog", "abc"));
        assert!(!c.should_suppress(&id(1), "blog", "def"));
        assert!(c.should_suppress(&id(1), "blog", "def"));
        assert!(!c.should_suppress(&id(1), "blog", "abc"));
    }

    #[test]
    fn records_and_indexes_are_independent() {
        let c = UpdateCoalescer::new();
        assert!(!c.should_suppress(&id(1), "blog", "abc"));
        assert!(!c.should_suppress(&id(2), "blog", "abc"));
        assert!(!c.should_suppress(&id(1), "archive", "abc"));
    }

    #[test]
    fn expired_entry_no_longer_suppresses() {
        let c = UpdateCoalescer::with_window(Duration::from_millis(0));
        assert!(!c.should_suppress(&id(1), "blog", "abc"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!c.should_suppress(&id(1), "blog", "abc"));
    }

    #[test]
    fn is_redundant_does_not_record() {
        let c = UpdateCoalescer::new();
        assert!(!c.is_redundant(&id(1), "blog", "abc"));
        assert!(c.is_empty());
        c.commit(&id(1), "blog", "abc");
        assert!(c.is_redundant(&id(1), "blog", "abc"));
        c.forget(&id(1), "blog");
        assert!(!c.is_redundant(&id(1), "blog", "abc"));
    }

    #[test]
    fn evict_expired_removes_stale_entries() {
        let c = UpdateCoalescer::with_window(Duration::from_millis(0));
        c.commit(&id(1), "blog", "abc");
        std::thread::sleep(Duration::from_millis(5));
        c.evict_expired();
        assert_eq!(c.len(), 0);
    }
}
