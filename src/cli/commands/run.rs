//! Run command - provision the matrix and run a command in every cell

use crate::cli::args::{RunArgs, SelectArgs};
use crate::cli::commands::Workspace;
use crate::dispatch::{new_run_id, CellStatus, DispatchOptions, FailurePolicy, RunReport};
use crate::error::{DrydockError, DrydockResult};
use crate::pipeline::RunRequest;
use crate::ui::{self, TaskSpinner, UiContext};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Lines of captured output shown under each failed cell
const FAILURE_TAIL_LINES: usize = 8;

/// Execute the run command
pub async fn execute(args: RunArgs, ws: &Workspace) -> DrydockResult<()> {
    let job = MatrixJob {
        select: args.select,
        force: args.force,
        jobs: args.jobs,
        continue_on_error: args.continue_on_error,
        env: args.env,
        volumes: args.volume,
        command: Some(args.command),
    };
    job.execute(ws).await
}

/// Shared body of `run` and `build`
pub(crate) struct MatrixJob {
    pub select: SelectArgs,
    pub force: bool,
    pub jobs: Option<usize>,
    pub continue_on_error: bool,
    pub env: Vec<(String, String)>,
    pub volumes: Vec<String>,
    pub command: Option<Vec<String>>,
}

impl MatrixJob {
    pub(crate) async fn execute(self, ws: &Workspace) -> DrydockResult<()> {
        let ctx = UiContext::detect();
        let pipeline = ws.pipeline().await?;
        let matrix = ws.matrix_request(&self.select)?;

        let mut options = DispatchOptions::from_config(&ws.config.dispatch, &ws.project_dir);
        if let Some(jobs) = self.jobs {
            options.concurrency = jobs.max(1);
        }
        options.policy = if self.continue_on_error {
            FailurePolicy::ContinueOnError
        } else {
            FailurePolicy::FailFast
        };
        options.env.extend(self.env);
        options.volumes.extend(self.volumes);

        let run_id = new_run_id();
        let title = match &self.command {
            Some(command) => format!("drydock run {} ({})", command.join(" "), run_id),
            None => format!("drydock build ({})", run_id),
        };
        ui::intro(&ctx, &title);

        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping in-flight cells");
                    cancel.cancel();
                }
            }
        });

        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start(&format!(
            "Working on {} with {} cell(s) at a time",
            matrix, options.concurrency
        ));

        let request = RunRequest {
            matrix,
            force: self.force,
            command: self.command,
            options,
        };
        let outcome = pipeline.run(request, run_id, &cancel).await;
        interrupt.abort();
        spinner.clear();

        let report = outcome?;
        print_report(&ctx, &report);
        verdict(&report)
    }
}

fn print_report(ctx: &UiContext, report: &RunReport) {
    ui::section(ctx, "Results");

    for result in &report.results {
        let key = result.cell.key();
        let action = result
            .action
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        let detail = format!("{}, {:.1}s", action, result.duration.as_secs_f64());

        match result.status {
            CellStatus::Passed => ui::step_ok_detail(ctx, &key, &detail),
            CellStatus::Failed | CellStatus::ProvisionFailed => {
                let layer = result
                    .layer
                    .map(|l| format!("{} error", l))
                    .unwrap_or_else(|| "error".to_string());
                let reason = result.reason.as_deref().unwrap_or("unknown failure");
                ui::step_error_detail(ctx, &key, &format!("{} ({})", reason, layer));
                let skip = result.tail.len().saturating_sub(FAILURE_TAIL_LINES);
                for line in &result.tail[skip..] {
                    ui::remark(ctx, line);
                }
                if let Some(ref path) = result.log_path {
                    ui::remark(ctx, &format!("log: {}", path.display()));
                }
            }
            CellStatus::Cancelled => ui::step_warn_hint(ctx, &key, "cancelled"),
            CellStatus::Skipped => {
                ui::step_skipped(ctx, &key, result.reason.as_deref().unwrap_or("skipped"))
            }
        }
    }

    let summary = format!(
        "{} passed, {} failed, {} skipped",
        report.count(CellStatus::Passed),
        report.failures().count(),
        report.count(CellStatus::Skipped)
    );
    ui::outro(ctx, &summary, report.success);
}

/// Map a report to the command's exit status
fn verdict(report: &RunReport) -> DrydockResult<()> {
    if report.success {
        return Ok(());
    }

    let failed = report.failures().count();
    if failed == 0 && report.was_cancelled() {
        return Err(DrydockError::Cancelled);
    }

    let first = report
        .first_failure
        .as_ref()
        .map(|cell| cell.key())
        .unwrap_or_else(|| "none".to_string());
    Err(DrydockError::RunFailed {
        failed,
        total: report.results.len(),
        first,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchResult;
    use crate::matrix::MatrixCell;

    fn cell(v: &str) -> MatrixCell {
        MatrixCell::new([("python", v)])
    }

    #[test]
    fn verdict_names_first_failure() {
        let report = RunReport::new(
            vec![
                DispatchResult::exited(cell("3.11"), 0),
                DispatchResult::exited(cell("3.12"), 2),
            ],
            Some(cell("3.12")),
        );
        match verdict(&report) {
            Err(DrydockError::RunFailed { failed, total, first }) => {
                assert_eq!((failed, total), (1, 2));
                assert_eq!(first, "python=3.12");
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[test]
    fn verdict_reports_cancellation() {
        let report = RunReport::new(
            vec![
                DispatchResult::errored(cell("3.11"), &DrydockError::Cancelled),
                DispatchResult::skipped(cell("3.12"), "not started: run cancelled"),
            ],
            None,
        );
        assert!(matches!(verdict(&report), Err(DrydockError::Cancelled)));
        assert!(verdict(&RunReport::new(vec![DispatchResult::provisioned(cell("3.11"))], None)).is_ok());
    }
}
