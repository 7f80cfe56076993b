//! Arm lifecycle coordinator
//!
//! Turns one select into a unit of work spanning the strategy, the record
//! store and the expiry index, and reconciles abandoned selections.
//!
//! ## Ordering
//!
//! ```text
//! select:  strategy.select_arm → store.create (commit point) → index.insert (best effort)
//! resolve: store.compare_and_resolve (gate) → strategy.update → index.remove (best effort)
//! sweep:   index.range_older_than → per id: store.get → resolve(reward = 0, sweep)
//! ```
//!
//! The store's compare-and-resolve is the only point where concurrent
//! resolutions of one id are serialized. The coordinator holds no lock across
//! the strategy and the store.

use std::sync::{Arc, Mutex};

use chrono::Duration;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::index::ExpiryIndex;
use crate::store::{RecordStore, SelectionStream};
use crate::strategy::{Strategy, StrategySnapshot};
use crate::types::{Origin, Selection, SelectionId, SelectionStatus};

/// Reward recorded for selections the sweep force-resolves
pub const SWEEP_REWARD: f64 = 0.0;

/// Per-arm statistics paired with feature labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub counts: Vec<u64>,
    pub rewards: Vec<f64>,
    pub features: Vec<String>,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Expired ids read from the index
    pub candidates: usize,
    /// Newly resolved by this pass
    pub resolved: usize,
    /// Already resolved elsewhere; index entry cleared
    pub already_resolved: usize,
    /// Logged and left for the next pass
    pub failed: usize,
    /// Another sweep was running, nothing was done
    pub skipped: bool,
}

/// Outcome of startup recovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Resolved rewards folded back into the strategy
    pub replayed: usize,
    /// Pending selections written back into the index
    pub reindexed: usize,
    /// Records that could not be applied
    pub skipped: usize,
}

/// Orchestrates select, resolve, sweep and stats
pub struct Coordinator {
    strategy: Arc<dyn Strategy>,
    records: Arc<dyn RecordStore>,
    index: Arc<dyn ExpiryIndex>,
    features: Vec<String>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    sweep_guard: tokio::sync::Mutex<()>,
}

impl Coordinator {
    /// Create a coordinator. `features` labels each arm and must have one
    /// entry per strategy arm.
    pub fn new(
        strategy: Arc<dyn Strategy>,
        records: Arc<dyn RecordStore>,
        index: Arc<dyn ExpiryIndex>,
        features: Vec<String>,
    ) -> Result<Self> {
        if features.len() != strategy.arm_count() {
            return Err(Error::Validation(format!(
                "{} feature labels for {} arms",
                features.len(),
                strategy.arm_count()
            )));
        }
        Ok(Self {
            strategy,
            records,
            index,
            features,
            clock: Arc::new(SystemClock),
            rng: Mutex::new(StdRng::from_entropy()),
            sweep_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// Use a custom clock for timestamps and sweep cutoffs
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the selection draw
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    pub fn record_store(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn index(&self) -> &Arc<dyn ExpiryIndex> {
        &self.index
    }

    /// Serve an arm using a fresh uniform draw
    pub async fn select(&self) -> Result<Selection> {
        let draw = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen_range(0.0..1.0)
        };
        self.select_with_draw(draw).await
    }

    /// Serve an arm for a given draw in `[0, 1)`.
    ///
    /// The record store write is the commit point. An index failure after it
    /// is logged and swallowed; recovery re-indexes the selection later.
    #[instrument(skip(self), level = "debug")]
    pub async fn select_with_draw(&self, draw: f64) -> Result<Selection> {
        let arm = self.strategy.select_arm(draw);
        let feature = self
            .features
            .get(arm)
            .cloned()
            .ok_or_else(|| Error::Range(format!("strategy returned arm {arm}")))?;

        let selection = Selection::new(arm, feature, self.clock.now());
        self.records.create(&selection).await?;

        if let Err(e) = self.index.insert(selection.id, selection.created_at).await {
            warn!(
                arm_id = %selection.id,
                arm,
                error = %e,
                "Failed to index selection; it stays pending until recovered"
            );
        }

        debug!(arm_id = %selection.id, arm, feature = %selection.feature, "Selected arm");
        Ok(selection)
    }

    /// Record a reward against a pending selection, exactly once.
    ///
    /// Strategy state changes only when the store's compare-and-resolve
    /// succeeds. An arm the strategy cannot count is rejected before the
    /// store is touched. `AlreadyResolved` still clears any stale index entry.
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(
        &self,
        id: SelectionId,
        arm: usize,
        reward: f64,
        origin: Origin,
    ) -> Result<Selection> {
        let arm_count = self.strategy.arm_count();
        if arm >= arm_count {
            return Err(Error::Range(format!("arm {arm} is outside [0, {arm_count})")));
        }

        let prior = match self
            .records
            .compare_and_resolve(id, arm, reward, origin)
            .await
        {
            Ok(prior) => prior,
            Err(Error::AlreadyResolved(id)) => {
                self.forget(id).await;
                return Err(Error::AlreadyResolved(id));
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.strategy.update(prior.arm, reward) {
            error!(
                arm_id = %id,
                arm = prior.arm,
                error = %e,
                "Selection resolved but strategy rejected the reward"
            );
            self.forget(id).await;
            return Err(e);
        }

        self.forget(id).await;
        info!(arm_id = %id, arm = prior.arm, reward, %origin, "Resolved selection");

        Ok(prior.resolved(reward, origin, self.clock.now()))
    }

    /// Best-effort index removal
    async fn forget(&self, id: SelectionId) {
        match self.index.remove(id).await {
            Ok(true) => {}
            Ok(false) => debug!(arm_id = %id, "Index entry already gone"),
            Err(e) => warn!(arm_id = %id, error = %e, "Failed to remove index entry"),
        }
    }

    /// Force-resolve every pending selection older than `max_age` with a zero
    /// reward.
    ///
    /// Single-flight: a call made while another sweep runs returns a report
    /// with `skipped` set. Per-id failures are logged and counted; the
    /// entry stays indexed for the next pass.
    pub async fn sweep(&self, max_age: Duration) -> Result<SweepReport> {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            debug!("Sweep already running, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        };

        let expired = self
            .index
            .range_older_than(max_age, self.clock.now())
            .await?;
        let mut report = SweepReport {
            candidates: expired.len(),
            ..SweepReport::default()
        };

        for id in expired {
            match self.sweep_one(id).await {
                Ok(()) => report.resolved += 1,
                Err(Error::AlreadyResolved(_)) => report.already_resolved += 1,
                Err(e) => {
                    warn!(arm_id = %id, error = %e, "Sweep failed for selection, will retry");
                    report.failed += 1;
                }
            }
        }

        if report.candidates > 0 {
            info!(
                candidates = report.candidates,
                resolved = report.resolved,
                already_resolved = report.already_resolved,
                failed = report.failed,
                "Sweep finished"
            );
        }
        Ok(report)
    }

    async fn sweep_one(&self, id: SelectionId) -> Result<()> {
        let record = self.records.get(id).await?;
        self.resolve(id, record.arm, SWEEP_REWARD, Origin::Sweep)
            .await
            .map(|_| ())
    }

    /// Strategy snapshot with feature labels. Pure read.
    pub fn stats(&self) -> Stats {
        let StrategySnapshot { counts, rewards } = self.strategy.snapshot();
        Stats {
            counts,
            rewards,
            features: self.features.clone(),
        }
    }

    /// Every stored selection, for diagnostics
    pub async fn records(&self) -> Result<SelectionStream> {
        self.records.scan_all().await
    }

    /// Rebuild volatile state from the record store.
    ///
    /// Replays resolved rewards into the strategy and re-indexes pending
    /// selections. Records whose arm no longer fits the strategy are skipped
    /// and dropped from the index. Run once at startup, before serving.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let mut records = self.records.scan_all().await?;

        while let Some(record) = records.next().await {
            let record = record?;
            match record.status {
                SelectionStatus::Resolved => {
                    match self.strategy.update(record.arm, record.reward) {
                        Ok(()) => report.replayed += 1,
                        Err(e) => {
                            warn!(arm_id = %record.id, error = %e, "Skipping unreplayable record");
                            report.skipped += 1;
                            self.forget(record.id).await;
                        }
                    }
                }
                SelectionStatus::Pending => {
                    if record.arm >= self.strategy.arm_count() {
                        warn!(arm_id = %record.id, arm = record.arm, "Pending record has unknown arm");
                        report.skipped += 1;
                        // Left indexed, the sweep would retry it forever.
                        self.forget(record.id).await;
                        continue;
                    }
                    self.index.insert(record.id, record.created_at).await?;
                    report.reindexed += 1;
                }
            }
        }

        info!(
            replayed = report.replayed,
            reindexed = report.reindexed,
            skipped = report.skipped,
            "Recovered state from record store"
        );
        Ok(report)
    }
}
