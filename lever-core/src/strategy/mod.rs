//! Arm selection strategies
//!
//! A strategy owns the per-arm statistics (resolved count and running mean
//! reward) and decides which arm to serve next. Variants are picked once at
//! startup from [`StrategyKind`] and shared behind `Arc<dyn Strategy>`.

mod epsilon;
mod thompson;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, check_reward};

pub use epsilon::EpsilonGreedy;
pub use thompson::ThompsonSampling;

/// Default exploration rate
pub const DEFAULT_EPSILON: f64 = 0.1;

/// Stateful arm selection algorithm
pub trait Strategy: Send + Sync {
    /// Pick an arm in `[0, arm_count)`. `draw` is uniform in `[0, 1)`.
    fn select_arm(&self, draw: f64) -> usize;

    /// Fold one resolved reward into `arm`'s statistics
    fn update(&self, arm: usize, reward: f64) -> Result<()>;

    /// Copy of the current per-arm statistics
    fn snapshot(&self) -> StrategySnapshot;

    fn arm_count(&self) -> usize;

    /// Name for logs and health output
    fn name(&self) -> &'static str;
}

/// Immutable copy of per-arm statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub counts: Vec<u64>,
    pub rewards: Vec<f64>,
}

impl StrategySnapshot {
    /// Total resolved selections across all arms
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Which strategy to build, as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
    EpsilonGreedy { epsilon: f64 },
    Thompson,
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::EpsilonGreedy {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EpsilonGreedy { .. } => "epsilon_greedy",
            Self::Thompson => "thompson",
        }
    }

    /// Build the configured strategy for `arm_count` arms
    pub fn build(&self, arm_count: usize) -> Result<Arc<dyn Strategy>> {
        Ok(match *self {
            Self::EpsilonGreedy { epsilon } => Arc::new(EpsilonGreedy::new(arm_count, epsilon)?),
            Self::Thompson => Arc::new(ThompsonSampling::new(arm_count)?),
        })
    }
}

/// Per-arm counts and running means shared by every strategy
#[derive(Debug, Clone)]
pub(crate) struct ArmTable {
    counts: Vec<u64>,
    means: Vec<f64>,
}

impl ArmTable {
    pub(crate) fn new(arm_count: usize) -> Result<Self> {
        if arm_count == 0 {
            return Err(Error::Validation("at least one arm is required".into()));
        }
        Ok(Self {
            counts: vec![0; arm_count],
            means: vec![0.0; arm_count],
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.counts.len()
    }

    pub(crate) fn count(&self, arm: usize) -> u64 {
        self.counts[arm]
    }

    pub(crate) fn mean(&self, arm: usize) -> f64 {
        self.means[arm]
    }

    /// newMean = oldMean + (reward - oldMean) / newCount
    pub(crate) fn record(&mut self, arm: usize, reward: f64) -> Result<()> {
        if arm >= self.len() {
            return Err(Error::Range(format!(
                "arm {arm} is outside [0, {})",
                self.len()
            )));
        }
        check_reward(reward)?;

        self.counts[arm] += 1;
        let n = self.counts[arm] as f64;
        self.means[arm] += (reward - self.means[arm]) / n;
        Ok(())
    }

    /// Highest mean, lowest index on ties
    pub(crate) fn best_arm(&self) -> usize {
        let mut best = 0;
        for arm in 1..self.len() {
            if self.means[arm] > self.means[best] {
                best = arm;
            }
        }
        best
    }

    pub(crate) fn snapshot(&self) -> StrategySnapshot {
        StrategySnapshot {
            counts: self.counts.clone(),
            rewards: self.means.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_table_incremental_mean() {
        let mut table = ArmTable::new(2).unwrap();
        table.record(1, 1.0).unwrap();
        table.record(1, 0.0).unwrap();
        table.record(1, 0.5).unwrap();

        assert_eq!(table.count(1), 3);
        assert!((table.mean(1) - 0.5).abs() < 1e-12);
        assert_eq!(table.count(0), 0);
    }

    #[test]
    fn test_arm_table_rejects_out_of_range() {
        let mut table = ArmTable::new(3).unwrap();
        assert!(matches!(table.record(3, 0.5), Err(Error::Range(_))));
        assert!(matches!(table.record(0, 1.5), Err(Error::Range(_))));
        assert_eq!(table.snapshot().total(), 0);
    }

    #[test]
    fn test_best_arm_breaks_ties_low() {
        let mut table = ArmTable::new(3).unwrap();
        assert_eq!(table.best_arm(), 0);

        table.record(2, 0.4).unwrap();
        table.record(1, 0.4).unwrap();
        assert_eq!(table.best_arm(), 1);
    }

    #[test]
    fn test_zero_arms_rejected() {
        assert!(matches!(ArmTable::new(0), Err(Error::Validation(_))));
    }

    #[test]
    fn test_kind_toml_shape() {
        let kind: StrategyKind = toml::from_str("kind = \"epsilon_greedy\"\nepsilon = 0.2").unwrap();
        assert_eq!(kind, StrategyKind::EpsilonGreedy { epsilon: 0.2 });

        let kind: StrategyKind = toml::from_str("kind = \"thompson\"").unwrap();
        assert_eq!(kind, StrategyKind::Thompson);
    }

    #[test]
    fn test_build_selects_variant() {
        let strategy = StrategyKind::default().build(3).unwrap();
        assert_eq!(strategy.name(), "epsilon_greedy");
        assert_eq!(strategy.arm_count(), 3);

        let strategy = StrategyKind::Thompson.build(2).unwrap();
        assert_eq!(strategy.name(), "thompson");
    }
}
