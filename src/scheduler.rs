//! Maintenance Scheduler - Single-Flight Cycles
//!
//! Fires the execution pipeline on a fixed interval and guarantees that at
//! most one cycle is in flight at any instant. Ticks that arrive while a
//! cycle is running are dropped, never queued: buffering them would change
//! the failure behavior under sustained slow cycles.
//!
//! The guard is a `tokio::sync::Mutex<()>` acquired with `try_lock`, not a
//! boolean flag. Release happens when the guard drops, so every exit path
//! from a cycle releases it, a panicking pipeline included.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::pipeline::ExecutionPipeline;

#[derive(Clone)]
pub struct MaintenanceScheduler {
    pipeline: Arc<ExecutionPipeline>,
    interval: Duration,
    guard: Arc<Mutex<()>>,
}

impl MaintenanceScheduler {
    pub fn new(pipeline: Arc<ExecutionPipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Run the tick loop forever.
    ///
    /// Each interval elapse spawns `tick` as its own task so a tick landing
    /// during a slow cycle still runs, observes the held guard, and logs the
    /// skip instead of silently piling up behind the cycle.
    pub async fn run(&self) {
        info!(
            "maintenance scheduler started, tick every {:?}",
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.tick().await;
            });
        }
    }

    /// One scheduler tick: try-acquire the guard, run a cycle, report it.
    pub async fn tick(&self) {
        let _cycle_guard = match self.guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("maintenance tick skipped: previous cycle still in progress");
                return;
            }
        };

        info!("maintenance cycle started");
        let started = Instant::now();

        // The pipeline runs as its own task so even a panic inside it is
        // contained here; the guard still drops at the end of this scope.
        let pipeline = Arc::clone(&self.pipeline);
        let cycle = tokio::spawn(async move { pipeline.run_cycle().await });

        match cycle.await {
            Ok(Ok(result)) => {
                info!(
                    "maintenance cycle completed in {:?}: {} confirmed, {} failed, {} timed out ({} pools)",
                    started.elapsed(),
                    result.confirmed(),
                    result.failed(),
                    result.timed_out(),
                    result.outcomes.len()
                );
            }
            Ok(Err(e)) => {
                error!("maintenance cycle aborted: {e}");
            }
            Err(e) => {
                error!("maintenance cycle did not complete: {e}");
            }
        }
    }

    /// Run exactly one cycle, for the `--once` flag.
    pub async fn run_once(&self) {
        self.tick().await;
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainClient, ConfirmationStatus, SubmissionError, SubmissionHandle};
    use crate::pool::{Pool, PoolStore, SelectionError};
    use alloy_primitives::TxHash;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct StubStore {
        fail: bool,
        panic: bool,
        queries: AtomicUsize,
        /// When set, the first query blocks until notified (slow cycle).
        hold: Option<Arc<Notify>>,
        held: AtomicBool,
    }

    impl StubStore {
        fn ready() -> Self {
            Self {
                fail: false,
                panic: false,
                queries: AtomicUsize::new(0),
                hold: None,
                held: AtomicBool::new(false),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ready()
            }
        }

        fn panicking() -> Self {
            Self {
                panic: true,
                ..Self::ready()
            }
        }

        fn holding(gate: Arc<Notify>) -> Self {
            Self {
                hold: Some(gate),
                ..Self::ready()
            }
        }
    }

    #[async_trait]
    impl PoolStore for StubStore {
        async fn find_eligible_pools(&self) -> Result<Vec<Pool>, SelectionError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("stub store panic");
            }
            if self.fail {
                return Err(SelectionError::Unreachable("store down".into()));
            }
            if let Some(gate) = &self.hold {
                if !self.held.swap(true, Ordering::SeqCst) {
                    gate.notified().await;
                }
            }
            Ok(vec![Pool {
                pair_id: "A".to_string(),
                user: "0x1111111111111111111111111111111111111111".to_string(),
                token_amount: "1".to_string(),
                d_token_amount: "1".to_string(),
                outstanding_trades: 1,
            }])
        }
    }

    struct OkChain;

    #[async_trait]
    impl ChainClient for OkChain {
        async fn submit(&self, pair_id: &str) -> Result<SubmissionHandle, SubmissionError> {
            Ok(SubmissionHandle {
                pair_id: pair_id.to_string(),
                tx_hash: TxHash::ZERO,
            })
        }

        async fn await_confirmation(&self, _handle: &SubmissionHandle) -> ConfirmationStatus {
            ConfirmationStatus::Confirmed
        }
    }

    fn scheduler_with(store: Arc<StubStore>) -> MaintenanceScheduler {
        let pipeline = Arc::new(ExecutionPipeline::new(
            store,
            Arc::new(OkChain),
            Duration::from_secs(5),
        ));
        MaintenanceScheduler::new(pipeline, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped_not_queued() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(StubStore::holding(gate.clone()));
        let scheduler = scheduler_with(store.clone());

        // First tick blocks inside the cycle on the store gate.
        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        };
        tokio::task::yield_now().await;
        while store.queries.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // Second tick must bounce off the held guard without queuing work.
        scheduler.tick().await;
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);

        gate.notify_one();
        first.await.unwrap();

        // Guard is free again; a later tick runs a fresh cycle.
        scheduler.tick().await;
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guard_released_after_cycle_fault() {
        let store = Arc::new(StubStore::failing());
        let scheduler = scheduler_with(store.clone());

        scheduler.tick().await;

        // The failed cycle must not leave the guard held.
        assert!(scheduler.guard.try_lock().is_ok());
        scheduler.tick().await;
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guard_released_after_pipeline_panic() {
        let store = Arc::new(StubStore::panicking());
        let scheduler = scheduler_with(store.clone());

        scheduler.tick().await;

        assert!(scheduler.guard.try_lock().is_ok());
        // And the scheduler itself survived to run the next tick.
        scheduler.tick().await;
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_once_runs_a_single_cycle() {
        let store = Arc::new(StubStore::ready());
        let scheduler = scheduler_with(store.clone());

        scheduler.run_once().await;

        assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    }
}
