//! In-memory record store and expiry index.
//!
//! These keep everything in process memory without persistence. Useful for
//! tests and for running the service without a database.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result, check_reward};
use crate::index::{DEFAULT_NAMESPACE, ExpiryIndex, cutoff_millis};
use crate::store::{RecordStore, SelectionStream};
use crate::types::{Origin, Selection, SelectionId, SelectionStatus};

/// In-memory implementation of RecordStore
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<SelectionId, Selection>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Stamp `updated_at` from a custom clock
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            clock,
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, selection: &Selection) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&selection.id) {
            return Err(Error::Conflict(selection.id));
        }
        let mut stored = selection.clone();
        stored.status = SelectionStatus::Pending;
        records.insert(stored.id, stored);
        Ok(())
    }

    async fn get(&self, id: SelectionId) -> Result<Selection> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn compare_and_resolve(
        &self,
        id: SelectionId,
        expected_arm: usize,
        reward: f64,
        origin: Origin,
    ) -> Result<Selection> {
        check_reward(reward)?;

        // Held across check and write; this is the atomic step.
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(Error::NotFound(id))?;
        if !record.is_pending() {
            return Err(Error::AlreadyResolved(id));
        }
        if record.arm != expected_arm {
            return Err(Error::Mismatch {
                id,
                expected: record.arm,
                actual: expected_arm,
            });
        }

        let prior = record.clone();
        *record = prior.resolved(reward, origin, self.clock.now());
        Ok(prior)
    }

    async fn scan_all(&self) -> Result<SelectionStream> {
        let snapshot: Vec<Selection> = self.records.read().await.values().cloned().collect();
        Ok(futures::stream::iter(snapshot.into_iter().map(Ok)).boxed())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    by_score: BTreeSet<(i64, SelectionId)>,
    scores: HashMap<SelectionId, i64>,
}

/// In-memory implementation of ExpiryIndex
pub struct MemoryExpiryIndex {
    namespace: String,
    set: RwLock<SortedSet>,
}

impl MemoryExpiryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            set: RwLock::new(SortedSet::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Score of an entry, if present
    pub async fn score(&self, id: SelectionId) -> Option<i64> {
        self.set.read().await.scores.get(&id).copied()
    }
}

impl Default for MemoryExpiryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpiryIndex for MemoryExpiryIndex {
    async fn insert(&self, id: SelectionId, created_at: DateTime<Utc>) -> Result<()> {
        let score = created_at.timestamp_millis();
        let mut set = self.set.write().await;
        if let Some(old) = set.scores.insert(id, score) {
            set.by_score.remove(&(old, id));
        }
        set.by_score.insert((score, id));
        Ok(())
    }

    async fn remove(&self, id: SelectionId) -> Result<bool> {
        let mut set = self.set.write().await;
        match set.scores.remove(&id) {
            Some(score) => {
                set.by_score.remove(&(score, id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn range_older_than(
        &self,
        age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<SelectionId>> {
        let cutoff = cutoff_millis(age, now);
        Ok(self
            .set
            .read()
            .await
            .by_score
            .iter()
            .take_while(|(score, _)| *score <= cutoff)
            .map(|(_, id)| *id)
            .collect())
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.set.read().await.scores.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[tokio::test]
    async fn store_rejects_duplicate_create() {
        let store = MemoryRecordStore::new();
        let selection = Selection::new(1, "green", Utc::now());

        store.create(&selection).await.unwrap();
        let err = store.create(&selection).await.unwrap_err();

        assert!(matches!(err, Error::Conflict(id) if id == selection.id));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_get_unknown_is_not_found() {
        let store = MemoryRecordStore::new();
        let id = SelectionId::new();
        assert!(matches!(store.get(id).await, Err(Error::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn compare_and_resolve_returns_prior_record() {
        let store = MemoryRecordStore::new();
        let selection = Selection::new(2, "blue", Utc::now());
        store.create(&selection).await.unwrap();

        let prior = store
            .compare_and_resolve(selection.id, 2, 0.5, Origin::Update)
            .await
            .unwrap();
        assert!(prior.is_pending());

        let stored = store.get(selection.id).await.unwrap();
        assert_eq!(stored.status, SelectionStatus::Resolved);
        assert_eq!(stored.reward, 0.5);
        assert_eq!(stored.origin, Origin::Update);
    }

    #[tokio::test]
    async fn compare_and_resolve_gates() {
        let store = MemoryRecordStore::new();
        let selection = Selection::new(0, "red", Utc::now());
        store.create(&selection).await.unwrap();

        let err = store
            .compare_and_resolve(selection.id, 1, 0.5, Origin::Update)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Mismatch {
                expected: 0,
                actual: 1,
                ..
            }
        ));

        let err = store
            .compare_and_resolve(selection.id, 0, 2.0, Origin::Update)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Range(_)));
        assert!(store.get(selection.id).await.unwrap().is_pending());

        store
            .compare_and_resolve(selection.id, 0, 1.0, Origin::Update)
            .await
            .unwrap();
        let err = store
            .compare_and_resolve(selection.id, 0, 1.0, Origin::Sweep)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyResolved(_)));
        assert_eq!(store.get(selection.id).await.unwrap().origin, Origin::Update);

        let err = store
            .compare_and_resolve(SelectionId::new(), 0, 1.0, Origin::Update)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn scan_all_yields_in_id_order() {
        let store = MemoryRecordStore::new();
        let first = Selection::new(0, "red", Utc::now());
        let second = Selection::new(1, "green", Utc::now());
        store.create(&second).await.unwrap();
        store.create(&first).await.unwrap();

        let all: Vec<Selection> = store.scan_all().await.unwrap().try_collect().await.unwrap();
        let ids: Vec<SelectionId> = all.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn index_ranges_oldest_first_inclusive() {
        let index = MemoryExpiryIndex::new();
        let (a, b, c) = (SelectionId::new(), SelectionId::new(), SelectionId::new());
        index.insert(c, at(3_000)).await.unwrap();
        index.insert(a, at(1_000)).await.unwrap();
        index.insert(b, at(2_000)).await.unwrap();

        let expired = index
            .range_older_than(Duration::seconds(1), at(3_000))
            .await
            .unwrap();
        assert_eq!(expired, vec![a, b]);
        assert_eq!(index.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn index_remove_is_best_effort() {
        let index = MemoryExpiryIndex::new();
        let id = SelectionId::new();
        assert!(!index.remove(id).await.unwrap());

        index.insert(id, at(0)).await.unwrap();
        assert!(index.remove(id).await.unwrap());
        assert!(!index.remove(id).await.unwrap());
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn index_reinsert_rescores() {
        let index = MemoryExpiryIndex::new();
        let id = SelectionId::new();
        index.insert(id, at(1_000)).await.unwrap();
        index.insert(id, at(9_000)).await.unwrap();

        assert_eq!(index.score(id).await, Some(9_000));
        assert_eq!(index.len().await.unwrap(), 1);
        let expired = index
            .range_older_than(Duration::zero(), at(5_000))
            .await
            .unwrap();
        assert!(expired.is_empty());
    }
}
