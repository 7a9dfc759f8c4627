use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::snapshot::{read_snapshot, write_snapshot};

/// Serializable snapshot of the processed-key set, keyed by dedupe key with
/// insertion timestamp.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DedupeSnapshot {
    pub entries: HashMap<String, i64>,
    pub last_event_id: Option<String>,
    pub last_event_at: Option<i64>,
    pub events_processed: u64,
}

/// Bounded, age-evicted set of dedupe keys already seen. The in-memory map
/// and the on-disk snapshot are both protected by a single mutex.
pub struct DedupeMap {
    cap: usize,
    snapshot_path: PathBuf,
    inner: Mutex<DedupeSnapshot>,
}

impl DedupeMap {
    pub fn new(cap: usize, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            cap,
            snapshot_path: snapshot_path.into(),
            inner: Mutex::new(DedupeSnapshot::default()),
        }
    }

    /// Restores the processed-key set from `state.json` if present. A
    /// restart with no prior snapshot starts from an empty map: events
    /// unrecorded before a crash are simply unknown to the new process.
    pub async fn load(&self) -> Result<(), LedgerError> {
        if let Some(snapshot) = read_snapshot::<DedupeSnapshot>(&self.snapshot_path).await? {
            *self.inner.lock().expect("dedupe mutex poisoned") = snapshot;
        }
        Ok(())
    }

    pub async fn persist(&self) -> Result<(), LedgerError> {
        let snapshot = self.inner.lock().expect("dedupe mutex poisoned").clone();
        write_snapshot(&self.snapshot_path, &snapshot).await
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Checks membership and inserts atomically under the write lock,
    /// evicting the oldest entries in one pass if the cap is exceeded.
    /// Returns `true` if the key was already present (i.e. this is a
    /// duplicate).
    pub fn check_and_insert(&self, key: &str, received_at: i64, event_id: &str) -> bool {
        let mut snapshot = self.inner.lock().expect("dedupe mutex poisoned");
        let already_seen = snapshot.entries.contains_key(key);
        if !already_seen {
            snapshot.entries.insert(key.to_string(), received_at);
            if snapshot.entries.len() > self.cap {
                evict_oldest(&mut snapshot.entries, self.cap);
            }
        }
        snapshot.events_processed += 1;
        snapshot.last_event_id = Some(event_id.to_string());
        snapshot.last_event_at = Some(received_at);
        already_seen
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("dedupe mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events_processed(&self) -> u64 {
        self.inner.lock().expect("dedupe mutex poisoned").events_processed
    }

    pub fn last_event_id(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("dedupe mutex poisoned")
            .last_event_id
            .clone()
    }

    /// `received_at` of the most recently observed event, regardless of
    /// whether it turned out to be a duplicate.
    pub fn last_event_at(&self) -> Option<i64> {
        self.inner.lock().expect("dedupe mutex poisoned").last_event_at
    }
}

/// Evicts the oldest entries by `received_at` in one pass until the map is
/// back at `cap`. Never blocks on I/O.
fn evict_oldest(entries: &mut HashMap<String, i64>, cap: usize) {
    let overflow = entries.len() - cap;
    if overflow == 0 {
        return;
    }
    let mut by_age: Vec<(String, i64)> =
        entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
    by_age.sort_by_key(|(_, received_at)| *received_at);
    for (key, _) in by_age.into_iter().take(overflow) {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_observation_of_same_key_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let map = DedupeMap::new(10, dir.path().join("state.json"));
        assert!(!map.check_and_insert("k1", 1, "e1"));
        assert!(map.check_and_insert("k1", 2, "e2"));
    }

    #[test]
    fn tracks_received_at_of_the_most_recent_event() {
        let dir = tempfile::tempdir().unwrap();
        let map = DedupeMap::new(10, dir.path().join("state.json"));
        map.check_and_insert("k1", 100, "e1");
        map.check_and_insert("k2", 200, "e2");
        assert_eq!(map.last_event_at(), Some(200));
    }

    #[test]
    fn evicts_oldest_when_over_cap() {
        let dir = tempfile::tempdir().unwrap();
        let map = DedupeMap::new(2, dir.path().join("state.json"));
        map.check_and_insert("a", 1, "e1");
        map.check_and_insert("b", 2, "e2");
        map.check_and_insert("c", 3, "e3");
        assert_eq!(map.len(), 2);
        assert!(!map.check_and_insert("a", 10, "e4"));
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let map = DedupeMap::new(10, &path);
        map.check_and_insert("k1", 1, "e1");
        map.persist().await.unwrap();

        let map2 = DedupeMap::new(10, &path);
        map2.load().await.unwrap();
        assert!(map2.check_and_insert("k1", 2, "e2"));
        assert_eq!(map2.events_processed(), 2);
    }
}
