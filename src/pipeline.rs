//! Execution Pipeline - One Maintenance Cycle
//!
//! Runs a single cycle end to end: select pools with outstanding trades,
//! submit one maintenance transaction per pool, and drive every submission
//! to a terminal outcome. The contract that matters: one pool's failure
//! never aborts the batch, and the cycle never blocks past the per-pool
//! confirmation bound.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::chain::{ChainClient, ConfirmationStatus, SubmissionHandle};
use crate::pool::{Pool, PoolStore, SelectionError};

// ============================================
// OUTCOMES
// ============================================

/// Terminal state of one pool's maintenance attempt. Once recorded it does
/// not change within the cycle; re-attempts happen only through re-selection
/// at the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    Failed(String),
    TimedOut,
}

/// Outcome of one pool within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOutcome {
    pub pair_id: String,
    pub outcome: Outcome,
}

/// Result of one full cycle, one entry per selected pool in selection order.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcomes: Vec<PoolOutcome>,
}

impl CycleResult {
    fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ended_at: Utc::now(),
            outcomes: Vec::new(),
        }
    }

    pub fn confirmed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Confirmed))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed(_)))
            .count()
    }

    pub fn timed_out(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::TimedOut))
            .count()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

// ============================================
// MAINTENANCE JOB
// ============================================

/// Per-pool, per-cycle bookkeeping. Lives only for the duration of one
/// attempt and is consumed into the cycle result.
#[derive(Debug)]
struct MaintenanceJob {
    pair_id: String,
    submitted_at: Option<DateTime<Utc>>,
    state: JobState,
}

#[derive(Debug)]
enum JobState {
    Pending,
    Submitted(SubmissionHandle),
    Done(Outcome),
}

impl MaintenanceJob {
    fn new(pair_id: String) -> Self {
        Self {
            pair_id,
            submitted_at: None,
            state: JobState::Pending,
        }
    }

    fn mark_submitted(&mut self, handle: SubmissionHandle) {
        self.submitted_at = Some(Utc::now());
        self.state = JobState::Submitted(handle);
    }

    fn finish(&mut self, outcome: Outcome) {
        self.state = JobState::Done(outcome);
    }

    fn into_outcome(self) -> Outcome {
        match self.state {
            JobState::Done(outcome) => outcome,
            // A job that never reached a terminal state is a bug in the
            // driver; surface it as a failure rather than dropping the pool.
            JobState::Pending => {
                Outcome::Failed("maintenance job dropped before submission".to_string())
            }
            JobState::Submitted(handle) => Outcome::Failed(format!(
                "maintenance job for tx {} dropped before a terminal state",
                handle.tx_hash
            )),
        }
    }
}

// ============================================
// PIPELINE
// ============================================

pub struct ExecutionPipeline {
    store: Arc<dyn PoolStore>,
    chain: Arc<dyn ChainClient>,
    confirmation_timeout: Duration,
}

impl ExecutionPipeline {
    pub fn new(
        store: Arc<dyn PoolStore>,
        chain: Arc<dyn ChainClient>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            chain,
            confirmation_timeout,
        }
    }

    /// Execute one maintenance cycle to completion.
    ///
    /// Only a failed pool selection aborts the cycle; everything after that
    /// is per-pool data. Pools are processed concurrently but outcomes are
    /// assembled in selection order, one per selected pool.
    pub async fn run_cycle(&self) -> Result<CycleResult, SelectionError> {
        let started_at = Utc::now();

        let pools = self.store.find_eligible_pools().await?;
        if pools.is_empty() {
            info!("no pools with outstanding trades, nothing to maintain");
            return Ok(CycleResult::empty(started_at));
        }

        info!("processing {} pools with outstanding trades", pools.len());

        let mut tasks = Vec::with_capacity(pools.len());
        for pool in pools {
            let chain = Arc::clone(&self.chain);
            let bound = self.confirmation_timeout;
            let pair_id = pool.pair_id.clone();
            tasks.push((pair_id, tokio::spawn(process_pool(chain, pool, bound))));
        }

        // Join in selection order so the result ordering is stable and the
        // outcome list is assembled on a single task.
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (pair_id, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                // A panicked pool task is that pool's failure, nobody else's.
                Err(e) => {
                    error!("maintenance task for pool {pair_id} aborted: {e}");
                    Outcome::Failed(format!("maintenance task aborted: {e}"))
                }
            };
            outcomes.push(PoolOutcome { pair_id, outcome });
        }

        Ok(CycleResult {
            started_at,
            ended_at: Utc::now(),
            outcomes,
        })
    }
}

/// Drive one pool's maintenance attempt to a terminal state.
async fn process_pool(chain: Arc<dyn ChainClient>, pool: Pool, bound: Duration) -> Outcome {
    info!(
        "processing pool {} with outstanding trades = {}",
        pool.pair_id, pool.outstanding_trades
    );

    let mut job = MaintenanceJob::new(pool.pair_id.clone());

    let handle = match chain.submit(&job.pair_id).await {
        Ok(handle) => handle,
        Err(e) => {
            // No in-cycle retry: the pool stays eligible and the next tick
            // re-selects it.
            warn!("maintenance submission failed for pool {}: {e}", job.pair_id);
            job.finish(Outcome::Failed(e.to_string()));
            return job.into_outcome();
        }
    };
    job.mark_submitted(handle.clone());

    match timeout(bound, chain.await_confirmation(&handle)).await {
        Ok(ConfirmationStatus::Confirmed) => {
            let wait = job
                .submitted_at
                .map(|t| Utc::now() - t)
                .unwrap_or_else(chrono::Duration::zero);
            info!(
                "maintenance confirmed for pool {} after {}ms",
                job.pair_id,
                wait.num_milliseconds()
            );
            job.finish(Outcome::Confirmed);
        }
        Ok(ConfirmationStatus::Failed(reason)) => {
            warn!(
                "maintenance failed on-chain for pool {}: {reason}",
                job.pair_id
            );
            job.finish(Outcome::Failed(reason));
        }
        Err(_) => {
            // The transaction may still land later. Whether the pool needs
            // another attempt is decided by outstandingTrades at the next
            // selection, not by transaction status.
            warn!(
                "confirmation for pool {} not seen within {:?}",
                job.pair_id, bound
            );
            job.finish(Outcome::TimedOut);
        }
    }

    job.into_outcome()
}

// ============================================
// TESTS
// ============================================
