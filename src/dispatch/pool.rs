//! Bounded worker pool over matrix cells
//!
//! Runs one job per cell with at most `limit` in flight. Results come
//! back in input order regardless of completion order. Under fail-fast,
//! the first failing job stops new cells from starting; jobs already in
//! flight run to completion.

use crate::dispatch::report::{DispatchResult, RunReport};
use crate::matrix::MatrixCell;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What to do after a cell fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Start no new cells after the first failure
    #[default]
    FailFast,
    /// Run every cell and report all failures
    ContinueOnError,
}

/// Bounded pool of cell jobs
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: usize,
    policy: FailurePolicy,
}

impl WorkerPool {
    pub fn new(limit: usize, policy: FailurePolicy) -> Self {
        Self {
            limit: limit.max(1),
            policy,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `job` for each cell and aggregate the results
    ///
    /// Cancellation stops new cells from starting; in-flight jobs are
    /// expected to observe `cancel` themselves.
    pub async fn run<F, Fut>(
        &self,
        cells: Vec<MatrixCell>,
        cancel: &CancellationToken,
        job: F,
    ) -> RunReport
    where
        F: Fn(MatrixCell) -> Fut,
        Fut: Future<Output = DispatchResult> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let halted = Arc::new(AtomicBool::new(false));
        let first_failure: Arc<Mutex<Option<MatrixCell>>> = Arc::new(Mutex::new(None));
        let fail_fast = self.policy == FailurePolicy::FailFast;

        let mut slots: Vec<Option<DispatchResult>> = cells.iter().map(|_| None).collect();
        let mut tasks = JoinSet::new();

        for (index, cell) in cells.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let permit = match permit {
                Some(permit) if !halted.load(Ordering::SeqCst) && !cancel.is_cancelled() => permit,
                _ => break,
            };

            debug!("[{}] starting ({} in flight)", cell, tasks.len() + 1);

            let work = job(cell.clone());
            let halted = halted.clone();
            let first_failure = first_failure.clone();
            tasks.spawn(async move {
                let result = work.await;
                if result.status.is_failure() {
                    let mut first = first_failure.lock().unwrap_or_else(|e| e.into_inner());
                    if first.is_none() {
                        *first = Some(result.cell.clone());
                    }
                    if fail_fast {
                        halted.store(true, Ordering::SeqCst);
                    }
                }
                drop(permit);
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!("Worker task failed: {}", e),
            }
        }

        let why = if cancel.is_cancelled() {
            "not started: run cancelled"
        } else {
            "not started: an earlier cell failed"
        };

        let results: Vec<DispatchResult> = slots
            .into_iter()
            .zip(cells)
            .map(|(slot, cell)| slot.unwrap_or_else(|| DispatchResult::skipped(cell, why)))
            .collect();

        let first_failure = first_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        RunReport::new(results, first_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::report::CellStatus;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn cells(n: usize) -> Vec<MatrixCell> {
        (1..=n)
            .map(|i| MatrixCell::new([("n", i.to_string())]))
            .collect()
    }

    fn statuses(report: &RunReport) -> Vec<CellStatus> {
        report.results.iter().map(|r| r.status).collect()
    }

    #[tokio::test]
    async fn results_follow_input_order() {
        let pool = WorkerPool::new(3, FailurePolicy::FailFast);
        let report = pool
            .run(cells(3), &CancellationToken::new(), |cell| async move {
                // later cells finish first
                let n: u64 = cell.get("n").unwrap().parse().unwrap();
                tokio::time::sleep(Duration::from_millis(40 - n * 10)).await;
                DispatchResult::exited(cell, 0)
            })
            .await;

        assert!(report.success);
        let keys: Vec<String> = report.results.iter().map(|r| r.cell.key()).collect();
        assert_eq!(keys, vec!["n=1", "n=2", "n=3"]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(2, FailurePolicy::ContinueOnError);

        let report = pool
            .run(cells(6), &CancellationToken::new(), |cell| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    DispatchResult::exited(cell, 0)
                }
            })
            .await;

        assert!(report.success);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fail_fast_skips_remaining_cells() {
        let pool = WorkerPool::new(1, FailurePolicy::FailFast);
        let report = pool
            .run(cells(3), &CancellationToken::new(), |cell| async move {
                let code = if cell.get("n") == Some("2") { 1 } else { 0 };
                DispatchResult::exited(cell, code)
            })
            .await;

        assert!(!report.success);
        assert_eq!(
            statuses(&report),
            vec![CellStatus::Passed, CellStatus::Failed, CellStatus::Skipped]
        );
        assert_eq!(report.first_failure.unwrap().key(), "n=2");
    }

    #[tokio::test]
    async fn continue_on_error_runs_everything() {
        let pool = WorkerPool::new(1, FailurePolicy::ContinueOnError);
        let report = pool
            .run(cells(3), &CancellationToken::new(), |cell| async move {
                let code = if cell.get("n") == Some("3") { 0 } else { 4 };
                DispatchResult::exited(cell, code)
            })
            .await;

        assert_eq!(
            statuses(&report),
            vec![CellStatus::Failed, CellStatus::Failed, CellStatus::Passed]
        );
        assert_eq!(report.failures().count(), 2);
        assert_eq!(report.first_failure.unwrap().key(), "n=1");
    }

    #[tokio::test]
    async fn in_flight_cells_finish_under_fail_fast() {
        let pool = WorkerPool::new(2, FailurePolicy::FailFast);
        let report = pool
            .run(cells(3), &CancellationToken::new(), |cell| async move {
                match cell.get("n") {
                    Some("1") => {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        DispatchResult::exited(cell, 0)
                    }
                    _ => DispatchResult::exited(cell, 1),
                }
            })
            .await;

        assert_eq!(
            statuses(&report),
            vec![CellStatus::Passed, CellStatus::Failed, CellStatus::Skipped]
        );
    }

    #[tokio::test]
    async fn cancellation_stops_new_cells() {
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(1, FailurePolicy::ContinueOnError);
        let started = Arc::new(AtomicUsize::new(0));

        let report = pool
            .run(cells(3), &cancel, |cell| {
                let cancel = cancel.clone();
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel();
                    DispatchResult::exited(cell, 0)
                }
            })
            .await;

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(
            statuses(&report),
            vec![CellStatus::Passed, CellStatus::Skipped, CellStatus::Skipped]
        );
        assert!(!report.success);
        assert_eq!(
            report.results[1].reason.as_deref(),
            Some("not started: run cancelled")
        );
    }
}
