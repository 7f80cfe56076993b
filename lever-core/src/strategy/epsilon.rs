//! Epsilon-greedy arm selection
//!
//! Explores a uniformly random arm with probability epsilon, otherwise
//! exploits the arm with the best running mean reward.

use std::sync::RwLock;

use crate::error::{Error, Result};

use super::{ArmTable, Strategy, StrategySnapshot};

/// Epsilon-greedy strategy
#[derive(Debug)]
pub struct EpsilonGreedy {
    epsilon: f64,
    arms: RwLock<ArmTable>,
}

impl EpsilonGreedy {
    /// Create a strategy over `arm_count` arms with exploration rate `epsilon`
    pub fn new(arm_count: usize, epsilon: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(Error::Validation(format!(
                "epsilon {epsilon} is outside [0, 1]"
            )));
        }
        Ok(Self {
            epsilon,
            arms: RwLock::new(ArmTable::new(arm_count)?),
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Strategy for EpsilonGreedy {
    fn select_arm(&self, draw: f64) -> usize {
        let arms = self.arms.read().unwrap_or_else(|e| e.into_inner());

        if draw < self.epsilon {
            // draw / epsilon is uniform in [0, 1) on the exploration branch
            let scaled = (draw / self.epsilon) * arms.len() as f64;
            return (scaled as usize).min(arms.len() - 1);
        }

        arms.best_arm()
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
        "epsilon_greedy"
    }
}
