//! Stage gateway and pipeline orchestrator.
//!
//! The five stages run in fixed order: ingest → load → clean → aggregate →
//! analyze. Each stage reports a processed-row count or a stage-level error;
//! the first error halts the remaining stages for this run (already-committed
//! writes are retained, and the idempotent stage design makes the next run
//! the recovery mechanism). Per-item failures never reach this module — the
//! stages swallow and log those themselves.

use std::future::Future;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::config::Config;

pub mod aggregate;
pub mod analyze;
pub mod clean;
pub mod ingest;
pub mod load;

// ---

/// Outcome of one stage within a run.
#[derive(Debug)]
pub struct StageOutcome {
    // ---
    pub stage: &'static str,
    /// Rows processed (stage-specific meaning: staged cities, inserted rows,
    /// cleaned rows, aggregated pairs, analyzed cities).
    pub rows: u64,
    pub duration: Duration,
    /// Stage-level failure, if any. Always `None` for completed stages.
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// True when every executed stage completed.
pub fn succeeded(outcomes: &[StageOutcome]) -> bool {
    outcomes.iter().all(StageOutcome::succeeded)
}

/// Run the full pipeline, halting after the first failed stage.
///
/// Returns one outcome per executed stage; stages after a failure do not
/// appear at all (they never started).
pub async fn run_pipeline(config: &Config, pool: &PgPool) -> Vec<StageOutcome> {
    // ---
    info!("Starting air-quality pipeline run (5 stages)");
    let mut outcomes: Vec<StageOutcome> = Vec::with_capacity(5);

    macro_rules! stage {
        ($name:expr, $fut:expr) => {
            let outcome = run_stage($name, $fut).await;
            let failed = !outcome.succeeded();
            outcomes.push(outcome);
            if failed {
                warn!("Halting pipeline: stage '{}' failed", $name);
                summarize(&outcomes);
                return outcomes;
            }
        };
    }

    stage!("ingest", ingest::run(config));
    stage!("load", load::run(config, pool));
    stage!("clean", clean::run(pool));
    stage!("aggregate", aggregate::run(pool));
    stage!("analyze", analyze::run(config, pool));

    summarize(&outcomes);
    outcomes
}

/// Execute one stage, timing it and converting its error into an outcome.
async fn run_stage<F>(name: &'static str, fut: F) -> StageOutcome
where
    F: Future<Output = anyhow::Result<u64>>,
{
    // ---
    info!("[STAGE: {}] starting", name);
    let start = Instant::now();

    match fut.await {
        Ok(rows) => {
            let duration = start.elapsed();
            info!(
                "[STAGE: {}] completed: {} rows in {:.2?}",
                name, rows, duration
            );
            StageOutcome {
                stage: name,
                rows,
                duration,
                error: None,
            }
        }
        Err(e) => {
            let duration = start.elapsed();
            error!("[STAGE: {}] failed after {:.2?}: {:#}", name, duration, e);
            StageOutcome {
                stage: name,
                rows: 0,
                duration,
                error: Some(format!("{e:#}")),
            }
        }
    }
}

/// Structured per-run summary.
fn summarize(outcomes: &[StageOutcome]) {
    // ---
    info!("Pipeline run summary:");
    for outcome in outcomes {
        match &outcome.error {
            None => info!(
                "  {:<10} ok     {:>6} rows  {:.2?}",
                outcome.stage, outcome.rows, outcome.duration
            ),
            Some(e) => error!(
                "  {:<10} FAILED after {:.2?}: {}",
                outcome.stage, outcome.duration, e
            ),
        }
    }

    let completed = outcomes.iter().filter(|o| o.succeeded()).count();
    if succeeded(outcomes) && outcomes.len() == 5 {
        info!("All {} stages completed successfully", outcomes.len());
    } else {
        warn!("{} of 5 stages completed before halt", completed);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn run_stage_records_success() {
        // ---
        let outcome = run_stage("demo", async { Ok(7) }).await;
        assert!(outcome.succeeded());
        assert_eq!(outcome.rows, 7);
        assert_eq!(outcome.stage, "demo");
    }

    #[tokio::test]
    async fn run_stage_captures_error_chain() {
        // ---
        let outcome = run_stage("demo", async {
            Err(anyhow::anyhow!("db down").context("clean stage"))
        })
        .await;
        assert!(!outcome.succeeded());
        let message = outcome.error.unwrap();
        assert!(message.contains("clean stage"));
        assert!(message.contains("db down"));
    }

    #[test]
    fn overall_success_requires_every_stage() {
        // ---
        let ok = StageOutcome {
            stage: "a",
            rows: 1,
            duration: Duration::from_millis(1),
            error: None,
        };
        let bad = StageOutcome {
            stage: "b",
            rows: 0,
            duration: Duration::from_millis(1),
            error: Some("boom".into()),
        };
        assert!(succeeded(&[ok]));
        assert!(!succeeded(&[
            StageOutcome {
                stage: "a",
                rows: 1,
                duration: Duration::from_millis(1),
                error: None
            },
            bad
        ]));
    }
}
