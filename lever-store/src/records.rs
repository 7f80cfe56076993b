//! Turso/libSQL implementation of the record store.
//!
//! Compare-and-resolve reads the row to classify the request, then commits
//! with a conditional `UPDATE ... WHERE status = 'pending'`. That single
//! statement is the gate: when two resolvers race past the read, only one
//! update touches a row.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use lever_core::error::check_reward;
use lever_core::{
    Clock, Error, Origin, RecordStore, Selection, SelectionId, SelectionStatus, SelectionStream,
    SystemClock,
};
use tracing::{debug, instrument};

use crate::database::{TursoDatabase, format_datetime, parse_datetime};
use crate::error::{Result, StoreError};

const SELECT_COLUMNS: &str =
    "SELECT id, arm, feature, status, reward, origin, created_at, updated_at FROM selections";

/// libSQL-backed record store
#[derive(Clone)]
pub struct TursoRecordStore {
    db: TursoDatabase,
    clock: Arc<dyn Clock>,
}

impl TursoRecordStore {
    pub fn new(db: TursoDatabase) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    /// Stamp `updated_at` from a custom clock
    pub fn with_clock(db: TursoDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Parse a selection from a database row.
    fn parse_selection(row: &libsql::Row) -> Result<Selection> {
        let id_str: String = row.get(0)?;
        let arm: i64 = row.get(1)?;
        let feature: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let reward: f64 = row.get(4)?;
        let origin_str: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;

        let id = id_str
            .parse::<SelectionId>()
            .map_err(|_| StoreError::InvalidData(format!("invalid selection id: {id_str}")))?;
        let arm = usize::try_from(arm)
            .map_err(|_| StoreError::InvalidData(format!("invalid arm: {arm}")))?;
        let status = SelectionStatus::parse(&status_str)
            .ok_or_else(|| StoreError::InvalidData(format!("invalid status: {status_str}")))?;
        let origin = Origin::parse(&origin_str)
            .ok_or_else(|| StoreError::InvalidData(format!("invalid origin: {origin_str}")))?;

        Ok(Selection {
            arm,
            id,
            created_at: parse_datetime(&created_at_str)?,
            updated_at: parse_datetime(&updated_at_str)?,
            status,
            reward,
            feature,
            origin,
        })
    }

    async fn insert(&self, selection: &Selection) -> Result<bool> {
        let inserted = self
            .db
            .conn()
            .execute(
                "INSERT INTO selections (id, arm, feature, status, reward, origin, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
                libsql::params![
                    selection.id.to_string(),
                    selection.arm as i64,
                    selection.feature.clone(),
                    SelectionStatus::Pending.as_str(),
                    selection.reward,
                    selection.origin.as_str(),
                    format_datetime(selection.created_at),
                    format_datetime(selection.updated_at),
                ],
            )
            .await?;
        Ok(inserted == 1)
    }

    async fn find(&self, id: SelectionId) -> Result<Option<Selection>> {
        let mut rows = self
            .db
            .conn()
            .query(&format!("{SELECT_COLUMNS} WHERE id = ?"), [id.to_string()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_selection(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_resolved(
        &self,
        id: SelectionId,
        arm: usize,
        reward: f64,
        origin: Origin,
    ) -> Result<bool> {
        let updated = self
            .db
            .conn()
            .execute(
                "UPDATE selections SET status = ?, reward = ?, origin = ?, updated_at = ? WHERE id = ? AND arm = ? AND status = ?",
                libsql::params![
                    SelectionStatus::Resolved.as_str(),
                    reward,
                    origin.as_str(),
                    format_datetime(self.clock.now()),
                    id.to_string(),
                    arm as i64,
                    SelectionStatus::Pending.as_str(),
                ],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn rows_by_id(&self) -> Result<libsql::Rows> {
        Ok(self
            .db
            .conn()
            .query(&format!("{SELECT_COLUMNS} ORDER BY id ASC"), ())
            .await?)
    }

    /// Decode one row per poll, handing the cursor back for the next.
    async fn next_selection(mut rows: libsql::Rows) -> Result<Option<(Selection, libsql::Rows)>> {
        match rows.next().await? {
            Some(row) => Ok(Some((Self::parse_selection(&row)?, rows))),
            None => Ok(None),
        }
    }

    async fn count_rows(&self) -> Result<u64> {
        let mut rows = self
            .db
            .conn()
            .query("SELECT COUNT(*) FROM selections", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count as u64)
    }
}

#[async_trait]
impl RecordStore for TursoRecordStore {
    #[instrument(skip(self, selection), fields(arm_id = %selection.id), level = "debug")]
    async fn create(&self, selection: &Selection) -> lever_core::Result<()> {
        if self.insert(selection).await.map_err(StoreError::into_store)? {
            Ok(())
        } else {
            Err(Error::Conflict(selection.id))
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, id: SelectionId) -> lever_core::Result<Selection> {
        self.find(id)
            .await
            .map_err(StoreError::into_store)?
            .ok_or(Error::NotFound(id))
    }

    #[instrument(skip(self), level = "debug")]
    async fn compare_and_resolve(
        &self,
        id: SelectionId,
        expected_arm: usize,
        reward: f64,
        origin: Origin,
    ) -> lever_core::Result<Selection> {
        check_reward(reward)?;

        let prior = self.get(id).await?;
        if !prior.is_pending() {
            return Err(Error::AlreadyResolved(id));
        }
        if prior.arm != expected_arm {
            return Err(Error::Mismatch {
                id,
                expected: prior.arm,
                actual: expected_arm,
            });
        }

        let won = self
            .mark_resolved(id, expected_arm, reward, origin)
            .await
            .map_err(StoreError::into_store)?;
        if !won {
            // Arm never changes, so a lost update means another resolver got there first.
            debug!(arm_id = %id, "Lost resolve race");
            return Err(Error::AlreadyResolved(id));
        }
        Ok(prior)
    }

    #[instrument(skip(self), level = "debug")]
    async fn scan_all(&self) -> lever_core::Result<SelectionStream> {
        let rows = self.rows_by_id().await.map_err(StoreError::into_store)?;
        Ok(futures::stream::try_unfold(rows, Self::next_selection)
            .map_err(StoreError::into_store)
            .boxed())
    }

    async fn count(&self) -> lever_core::Result<u64> {
        self.count_rows().await.map_err(StoreError::into_store)
    }
}
