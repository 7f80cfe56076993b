//! Expiry index contract
//!
//! A sorted set of pending selection ids under one namespace key, scored by
//! creation time in epoch millis. The sweep reads it oldest-first to find
//! selections whose outcome was never reported.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::types::SelectionId;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "arm";

/// Time-ordered index of pending selection ids
#[async_trait]
pub trait ExpiryIndex: Send + Sync {
    /// Add an entry, or re-score it if present
    async fn insert(&self, id: SelectionId, created_at: DateTime<Utc>) -> Result<()>;

    /// Drop an entry. Returns whether one existed; absence is not an error.
    async fn remove(&self, id: SelectionId) -> Result<bool>;

    /// Ids scored at or before `now - age`, oldest first. Removes nothing.
    async fn range_older_than(&self, age: Duration, now: DateTime<Utc>)
    -> Result<Vec<SelectionId>>;

    /// Number of entries
    async fn len(&self) -> Result<u64>;
}

/// Highest score that counts as expired for `age` at `now`.
///
/// An age reaching past the representable range expires nothing.
pub fn cutoff_millis(age: Duration, now: DateTime<Utc>) -> i64 {
    now.checked_sub_signed(age)
        .map_or(i64::MIN, |cutoff| cutoff.timestamp_millis())
}
