//! One poll cycle: agent → membership diff → upsert.

use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::membership::{MembershipDiff, MembershipTracker};
use crate::agent::Agent;
use crate::storage::CoinStore;
use crate::types::error_category;

/// Summary of a completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub fetched: usize,
    pub upserted: usize,
    pub diff: MembershipDiff,
    pub agent_steps: u32,
    pub timestamp: chrono::DateTime<Utc>,
}

pub struct Poller {
    agent: Agent,
    store: Arc<dyn CoinStore>,
    tracker: MembershipTracker,
    prompt: String,
    cycle_count: u64,
}

impl Poller {
    pub fn new(agent: Agent, store: Arc<dyn CoinStore>, prompt: impl Into<String>) -> Self {
        Self {
            agent,
            store,
            tracker: MembershipTracker::new(),
            prompt: prompt.into(),
            cycle_count: 0,
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn tracker(&self) -> &MembershipTracker {
        &self.tracker
    }

    /// Run one cycle. Errors are returned for the caller to log; the
    /// cycle counter advances either way.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle_count += 1;
        let timestamp = Utc::now();
        info!(
            cycle = self.cycle_count,
            at = %timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            "Starting new data cycle"
        );

        let run = self.agent.run(&self.prompt).await?;
        let requested = self.agent.requested_count() as usize;

        let diff = self
            .tracker
            .observe(run.records.iter().map(|r| r.id.clone()), requested);
        log_diff(&diff, requested, run.records.len());

        let upserted = if run.records.is_empty() {
            info!("No data to upload");
            0
        } else {
            info!(count = run.records.len(), backend = self.store.backend(), "Uploading records");
            self.store
                .upsert_many(&run.records)
                .await
                .context("Failed to upsert market data")?
        };

        Ok(CycleReport {
            cycle_number: self.cycle_count,
            fetched: run.records.len(),
            upserted,
            diff,
            agent_steps: run.steps,
            timestamp,
        })
    }

    /// Run cycles until `shutdown` resolves, sleeping `wait` after every
    /// cycle whatever its outcome. A slow cycle never shortens the wait.
    pub async fn run_until<F: Future>(&mut self, wait: Duration, shutdown: F) {
        tokio::pin!(shutdown);

        loop {
            let outcome = tokio::select! {
                result = self.run_cycle() => Some(result),
                _ = &mut shutdown => None,
            };
            match outcome {
                Some(Ok(report)) => log_cycle_report(&report),
                Some(Err(e)) => error!(
                    cycle = self.cycle_count,
                    category = error_category(&e),
                    error = %format!("{e:#}"),
                    "Cycle failed, continuing to next"
                ),
                None => break,
            }

            info!("Cycle finished. Waiting for {} seconds", wait.as_secs_f64());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => break,
            }
        }

        info!(cycles = self.cycle_count, "Shutdown signal received.");
    }
}

/// Log a one-line cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        fetched = report.fetched,
        upserted = report.upserted,
        entrants = report.diff.entrants.len(),
        exits = report.diff.exits.len(),
        agent_steps = report.agent_steps,
        "Cycle complete"
    );
}

fn join(ids: &std::collections::BTreeSet<String>) -> String {
    ids.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn log_diff(diff: &MembershipDiff, requested: usize, fetched: usize) {
    if !diff.entrants.is_empty() {
        info!(
            entrants = %join(&diff.entrants),
            "Market shift detected: new coins in top {requested}"
        );
    }
    if !diff.exits.is_empty() {
        info!(
            exits = %join(&diff.exits),
            "Market shift detected: coins dropped out of top {requested}"
        );
    }
    if diff.exits_suppressed {
        warn!(requested, fetched, "Short poll, exit reporting suppressed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
