//! Record store contract
//!
//! The record store is the durable audit log of every selection. Its
//! compare-and-resolve is the only atomicity boundary in the system: the
//! PENDING → RESOLVED transition happens there exactly once per id.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{Origin, Selection, SelectionId};

/// Lazy, single-pass sequence of stored selections
pub type SelectionStream = BoxStream<'static, Result<Selection>>;

/// Durable keyed storage for selections
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new pending selection. Fails with `Conflict` if the id exists.
    async fn create(&self, selection: &Selection) -> Result<()>;

    /// Fetch a selection. Fails with `NotFound` if absent.
    async fn get(&self, id: SelectionId) -> Result<Selection>;

    /// Atomically resolve a pending selection, returning the prior record.
    ///
    /// Fails with `Range` if the reward is outside `[0, 1]`, `NotFound` if the
    /// id is unknown, `AlreadyResolved` if the record is terminal, and
    /// `Mismatch` if the stored arm differs from `expected_arm`. On failure
    /// nothing is written.
    async fn compare_and_resolve(
        &self,
        id: SelectionId,
        expected_arm: usize,
        reward: f64,
        origin: Origin,
    ) -> Result<Selection>;

    /// Every stored selection in id order. Diagnostics only.
    async fn scan_all(&self) -> Result<SelectionStream>;

    /// Number of stored selections
    async fn count(&self) -> Result<u64>;
}
