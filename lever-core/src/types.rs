//! Core type definitions for arm selections

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Unique identifier for a selection.
///
/// UUIDv7 ids sort by creation time, so the record store's natural key order
/// is also issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionId(pub Uuid);

impl SelectionId {
    /// Create a new selection ID with a UUIDv7 (time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SelectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SelectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::Validation(format!("invalid arm_id: {s}")))
    }
}

/// Lifecycle status of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionStatus {
    /// Served, no reward recorded yet
    #[serde(rename = "SELECT")]
    Pending,
    /// Reward recorded; terminal
    #[serde(rename = "UPDATE")]
    Resolved,
}

impl SelectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Where the latest state of a selection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Created by select, not yet resolved
    Select,
    /// Resolved by a client report
    Update,
    /// Force-resolved by the sweep
    Sweep,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Update => "update",
            Self::Sweep => "sweep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "select" => Some(Self::Select),
            "update" => Some(Self::Update),
            "sweep" => Some(Self::Sweep),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One served arm choice and its outcome.
///
/// Serializes to the persisted record encoding:
/// `{arm, arm_id, created_at, updated_at, type, reward, feature, origin}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub arm: usize,
    #[serde(rename = "arm_id")]
    pub id: SelectionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub status: SelectionStatus,
    /// Meaningful only once resolved
    #[serde(default)]
    pub reward: f64,
    pub feature: String,
    pub origin: Origin,
}

impl Selection {
    /// Create a pending selection for `arm`
    pub fn new(arm: usize, feature: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            arm,
            id: SelectionId::new(),
            created_at: now,
            updated_at: now,
            status: SelectionStatus::Pending,
            reward: 0.0,
            feature: feature.into(),
            origin: Origin::Select,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SelectionStatus::Pending
    }

    /// Reward, if one has been recorded
    pub fn outcome(&self) -> Option<f64> {
        match self.status {
            SelectionStatus::Resolved => Some(self.reward),
            SelectionStatus::Pending => None,
        }
    }

    /// Copy of this selection in its resolved form
    pub fn resolved(&self, reward: f64, origin: Origin, now: DateTime<Utc>) -> Self {
        Self {
            status: SelectionStatus::Resolved,
            reward,
            origin,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Creation time as epoch millis, the expiry index score
    pub fn score(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}
