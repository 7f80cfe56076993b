//! Turso/libSQL implementation of the expiry index.
//!
//! A sorted set as a table keyed by `(namespace, member)` with an index on
//! `(namespace, score)` for the oldest-first range scan.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lever_core::index::cutoff_millis;
use lever_core::{DEFAULT_NAMESPACE, ExpiryIndex, SelectionId};
use tracing::instrument;

use crate::database::TursoDatabase;
use crate::error::{Result, StoreError};

/// libSQL-backed expiry index
#[derive(Clone)]
pub struct TursoExpiryIndex {
    db: TursoDatabase,
    namespace: String,
}

impl TursoExpiryIndex {
    pub fn new(db: TursoDatabase) -> Self {
        Self::with_namespace(db, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(db: TursoDatabase, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn upsert(&self, id: SelectionId, score: i64) -> Result<()> {
        self.db
            .conn()
            .execute(
                "INSERT INTO expiry_index (namespace, member, score) VALUES (?, ?, ?) ON CONFLICT(namespace, member) DO UPDATE SET score = excluded.score",
                libsql::params![self.namespace.clone(), id.to_string(), score],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: SelectionId) -> Result<bool> {
        let deleted = self
            .db
            .conn()
            .execute(
                "DELETE FROM expiry_index WHERE namespace = ? AND member = ?",
                libsql::params![self.namespace.clone(), id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn members_up_to(&self, cutoff: i64) -> Result<Vec<SelectionId>> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT member FROM expiry_index WHERE namespace = ? AND score <= ? ORDER BY score ASC, member ASC",
                libsql::params![self.namespace.clone(), cutoff],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let member: String = row.get(0)?;
            let id = member
                .parse::<SelectionId>()
                .map_err(|_| StoreError::InvalidData(format!("invalid index member: {member}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn count_members(&self) -> Result<u64> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT COUNT(*) FROM expiry_index WHERE namespace = ?",
                [self.namespace.clone()],
            )
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count as u64)
    }
}

#[async_trait]
impl ExpiryIndex for TursoExpiryIndex {
    #[instrument(skip(self), fields(namespace = %self.namespace), level = "debug")]
    async fn insert(&self, id: SelectionId, created_at: DateTime<Utc>) -> lever_core::Result<()> {
        self.upsert(id, created_at.timestamp_millis())
            .await
            .map_err(StoreError::into_index)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), level = "debug")]
    async fn remove(&self, id: SelectionId) -> lever_core::Result<bool> {
        self.delete(id).await.map_err(StoreError::into_index)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), level = "debug")]
    async fn range_older_than(
        &self,
        age: Duration,
        now: DateTime<Utc>,
    ) -> lever_core::Result<Vec<SelectionId>> {
        self.members_up_to(cutoff_millis(age, now))
            .await
            .map_err(StoreError::into_index)
    }

    async fn len(&self) -> lever_core::Result<u64> {
        self.count_members().await.map_err(StoreError::into_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    async fn create_test_index() -> TursoExpiryIndex {
        TursoExpiryIndex::new(TursoDatabase::new_memory().await.unwrap())
    }

    #[tokio::test]
    async fn range_is_oldest_first_and_inclusive() {
        let index = create_test_index().await;
        let (a, b, c) = (SelectionId::new(), SelectionId::new(), SelectionId::new());
        index.insert(b, at(2_000)).await.unwrap();
        index.insert(c, at(3_000)).await.unwrap();
        index.insert(a, at(1_000)).await.unwrap();

        let expired = index
            .range_older_than(Duration::seconds(1), at(3_000))
            .await
            .unwrap();

        assert_eq!(expired, vec![a, b]);
        assert_eq!(index.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn insert_rescores_existing_member() {
        let index = create_test_index().await;
        let id = SelectionId::new();
        index.insert(id, at(1_000)).await.unwrap();
        index.insert(id, at(9_000)).await.unwrap();

        assert_eq!(index.len().await.unwrap(), 1);
        assert!(
            index
                .range_older_than(Duration::zero(), at(5_000))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let index = create_test_index().await;
        let id = SelectionId::new();

        assert!(!index.remove(id).await.unwrap());
        index.insert(id, at(0)).await.unwrap();
        assert!(index.remove(id).await.unwrap());
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let db = TursoDatabase::new_memory().await.unwrap();
        let arms = TursoExpiryIndex::new(db.clone());
        let other = TursoExpiryIndex::with_namespace(db, "experiment-b");
        let id = SelectionId::new();

        arms.insert(id, at(0)).await.unwrap();

        assert_eq!(arms.namespace(), "arm");
        assert_eq!(other.len().await.unwrap(), 0);
        assert!(!other.remove(id).await.unwrap());
        assert_eq!(arms.len().await.unwrap(), 1);
    }
}
