//! Thompson sampling over Beta posteriors
//!
//! Each arm's posterior is Beta(1 + Σreward, 1 + count - Σreward), recovered
//! from the running mean. Every selection samples all posteriors and serves
//! the highest draw.

use std::sync::{Mutex, RwLock};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Beta, Distribution};

use crate::error::Result;

use super::{ArmTable, Strategy, StrategySnapshot};

/// Thompson sampling strategy
#[derive(Debug)]
pub struct ThompsonSampling {
    arms: RwLock<ArmTable>,
    rng: Mutex<StdRng>,
}

impl ThompsonSampling {
    pub fn new(arm_count: usize) -> Result<Self> {
        Ok(Self {
            arms: RwLock::new(ArmTable::new(arm_count)?),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Deterministic sampling for tests
    pub fn with_seed(arm_count: usize, seed: u64) -> Result<Self> {
        Ok(Self {
            arms: RwLock::new(ArmTable::new(arm_count)?),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    fn posterior(arms: &ArmTable, arm: usize) -> (f64, f64) {
        let n = arms.count(arm) as f64;
        let successes = arms.mean(arm) * n;
        (1.0 + successes, 1.0 + (n - successes).max(0.0))
    }
}

impl Strategy for ThompsonSampling {
    fn select_arm(&self, _draw: f64) -> usize {
        let arms = self.arms.read().unwrap_or_else(|e| e.into_inner());
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let mut best = (0, f64::NEG_INFINITY);
        for arm in 0..arms.len() {
            let (alpha, beta) = Self::posterior(&arms, arm);
            let sample = Beta::new(alpha, beta)
                .map(|dist| dist.sample(&mut *rng))
                .unwrap_or(alpha / (alpha + beta));
            if sample > best.1 {
                best = (arm, sample);
            }
        }
        best.0
    }

    fn update(&self, arm: usize, reward: f64) -> Result<()> {
        self.arms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .record(arm, reward)
    }

    fn snapshot(&self) -> StrategySnapshot {
        self.arms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    fn arm_count(&self) -> usize {
        self.arms.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn name(&self) -> &'static str {
        "thompson"
    }
}
