//! Per-cell results and the aggregated run report

use crate::build::planner::BuildAction;
use crate::error::{DrydockError, ErrorLayer};
use crate::matrix::MatrixCell;
use std::path::PathBuf;
use std::time::Duration;

/// Final state of one cell in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    /// Provisioned and (if a command was given) exited 0
    Passed,
    /// Command exited nonzero or could not be run
    Failed,
    /// The image could not be provisioned
    ProvisionFailed,
    /// Stopped by cancellation while in flight
    Cancelled,
    /// Never started (fail-fast halt or cancellation)
    Skipped,
}

impl CellStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::ProvisionFailed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::ProvisionFailed => "provision-failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

/// Outcome of one cell
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub cell: MatrixCell,
    pub status: CellStatus,
    /// Command exit code, when the command ran to completion
    pub exit_code: Option<i32>,
    /// Captured output of the cell
    pub log_path: Option<PathBuf>,
    pub duration: Duration,
    /// Provisioning action actually taken
    pub action: Option<BuildAction>,
    /// Which layer failed, for failures
    pub layer: Option<ErrorLayer>,
    /// Human-readable failure reason
    pub reason: Option<String>,
    /// Last lines of output, for the failure summary
    pub tail: Vec<String>,
}

impl DispatchResult {
    fn new(cell: MatrixCell, status: CellStatus) -> Self {
        Self {
            cell,
            status,
            exit_code: None,
            log_path: None,
            duration: Duration::ZERO,
            action: None,
            layer: None,
            reason: None,
            tail: Vec::new(),
        }
    }

    /// Result for a command that ran to completion
    pub fn exited(cell: MatrixCell, code: i32) -> Self {
        let mut result = Self::new(
            cell,
            if code == 0 {
                CellStatus::Passed
            } else {
                CellStatus::Failed
            },
        );
        result.exit_code = Some(code);
        if code != 0 {
            let err = DrydockError::DispatchFailure {
                cell: result.cell.key(),
                code,
            };
            result.layer = Some(err.layer());
            result.reason = Some(err.to_string());
        }
        result
    }

    /// Result for a cell whose environment is ready and nothing was run
    pub fn provisioned(cell: MatrixCell) -> Self {
        Self::new(cell, CellStatus::Passed)
    }

    /// Result for a cell that failed with `error` before or instead of exiting
    pub fn errored(cell: MatrixCell, error: &DrydockError) -> Self {
        let status = match error {
            DrydockError::Cancelled => CellStatus::Cancelled,
            DrydockError::ProvisionFailure { .. } => CellStatus::ProvisionFailed,
            e if e.layer() == ErrorLayer::Cache => CellStatus::ProvisionFailed,
            _ => CellStatus::Failed,
        };
        let mut result = Self::new(cell, status);
        result.layer = Some(error.layer());
        result.reason = Some(error.to_string());
        result
    }

    /// Result for a cell that was never started
    pub fn skipped(cell: MatrixCell, why: &str) -> Self {
        let mut result = Self::new(cell, CellStatus::Skipped);
        result.reason = Some(why.to_string());
        result
    }

    pub fn with_log(mut self, path: PathBuf, tail: Vec<String>) -> Self {
        self.log_path = Some(path);
        self.tail = tail;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_action(mut self, action: BuildAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Aggregated outcome of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// True only if every cell passed
    pub success: bool,
    /// One result per cell, in resolver order
    pub results: Vec<DispatchResult>,
    /// First cell to fail, in completion order
    pub first_failure: Option<MatrixCell>,
}

impl RunReport {
    pub fn new(results: Vec<DispatchResult>, first_failure: Option<MatrixCell>) -> Self {
        let success =
            !results.is_empty() && results.iter().all(|r| r.status == CellStatus::Passed);
        Self {
            success,
            results,
            first_failure,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &DispatchResult> {
        self.results.iter().filter(|r| r.status.is_failure())
    }

    pub fn count(&self, status: CellStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Whether any cell was stopped or skipped by cancellation
    pub fn was_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == CellStatus::Cancelled)
    }
}
