//! Load generator against a running lever server
//!
//! Each round selects an arm, draws a Bernoulli reward with that arm's
//! configured probability, and reports it back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use lever_core::Stats;
use lever_server::http::{SelectArmResponse, UpdateArmRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Arguments for the simulate command
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Base URL of the lever server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub url: String,

    /// Total select/update rounds
    #[arg(long, default_value_t = 500)]
    pub rounds: usize,

    /// Rounds in flight at once
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Reward probability per arm, comma separated
    #[arg(long, value_delimiter = ',', default_value = "0.1,0.1,0.9")]
    pub probs: Vec<f64>,

    /// Seed for reward draws
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Per-arm tallies from one simulation
#[derive(Debug, Default, Clone)]
struct Tally {
    served: Vec<u64>,
    rewarded: Vec<u64>,
    failures: u64,
}

impl Tally {
    fn new(arms: usize) -> Self {
        Self {
            served: vec![0; arms],
            rewarded: vec![0; arms],
            failures: 0,
        }
    }

    fn merge(&mut self, other: Tally) {
        for (total, n) in self.served.iter_mut().zip(other.served) {
            *total += n;
        }
        for (total, n) in self.rewarded.iter_mut().zip(other.rewarded) {
            *total += n;
        }
        self.failures += other.failures;
    }
}

/// Run the simulate command
pub async fn run(args: SimulateArgs) -> Result<()> {
    if args.probs.iter().any(|p| !(0.0..=1.0).contains(p)) {
        bail!("every probability must be within [0, 1]");
    }
    if args.concurrency == 0 {
        bail!("concurrency must be at least 1");
    }

    let base = args.url.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();
    let probs = Arc::new(args.probs.clone());
    let remaining = Arc::new(AtomicUsize::new(args.rounds));

    let mut workers = JoinSet::new();
    for worker in 0..args.concurrency {
        let client = client.clone();
        let base = base.clone();
        let probs = probs.clone();
        let remaining = remaining.clone();
        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
            None => StdRng::from_entropy(),
        };

        workers.spawn(async move {
            let mut tally = Tally::new(probs.len());
            while take_round(&remaining) {
                match play_round(&client, &base, &probs, &mut rng).await {
                    Ok((arm, rewarded)) => {
                        if let Some(served) = tally.served.get_mut(arm) {
                            *served += 1;
                            tally.rewarded[arm] += u64::from(rewarded);
                        }
                    }
                    Err(e) => {
                        warn!(worker, error = %e, "Round failed");
                        tally.failures += 1;
                    }
                }
            }
            tally
        });
    }

    let mut tally = Tally::new(probs.len());
    while let Some(result) = workers.join_next().await {
        tally.merge(result.context("simulation worker panicked")?);
    }

    let stats: Stats = client
        .get(format!("{base}/stats"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    println!("{}", summary_table(&tally, &probs, &stats));
    println!(
        "rounds: {}  failures: {}",
        args.rounds, tally.failures
    );
    Ok(())
}

fn take_round(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

async fn play_round(
    client: &reqwest::Client,
    base: &str,
    probs: &[f64],
    rng: &mut StdRng,
) -> Result<(usize, bool)> {
    let selected: SelectArmResponse = client
        .get(format!("{base}/select-arm"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let p = probs.get(selected.arm).copied().unwrap_or(0.0);
    let rewarded = rng.gen_bool(p);
    let request = UpdateArmRequest {
        arm_id: selected.arm_id.to_string(),
        arm: selected.arm as i64,
        reward: if rewarded { 1.0 } else { 0.0 },
    };

    client
        .post(format!("{base}/update-arm"))
        .json(&request)
        .send()
        .await?
        .error_for_status()?;
    debug!(arm = selected.arm, rewarded, "Round complete");

    Ok((selected.arm, rewarded))
}

fn summary_table(tally: &Tally, probs: &[f64], stats: &Stats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Arm").fg(Color::Cyan),
        Cell::new("Feature").fg(Color::Cyan),
        Cell::new("P(reward)").fg(Color::Cyan),
        Cell::new("Served").fg(Color::Cyan),
        Cell::new("Rewarded").fg(Color::Cyan),
        Cell::new("Count").fg(Color::Cyan),
        Cell::new("Mean").fg(Color::Cyan),
    ]);

    for (arm, feature) in stats.features.iter().enumerate() {
        let cell = |v: Option<String>| Cell::new(v.unwrap_or_else(|| "-".into()));
        table.add_row(vec![
            Cell::new(arm),
            Cell::new(feature),
            cell(probs.get(arm).map(|p| format!("{p:.2}"))),
            cell(tally.served.get(arm).map(u64::to_string)),
            cell(tally.rewarded.get(arm).map(u64::to_string)),
            cell(stats.counts.get(arm).map(u64::to_string)),
            cell(stats.rewards.get(arm).map(|m| format!("{m:.3}"))),
        ]);
    }
    table
}
