//! End-to-end run: resolve, plan, provision, dispatch
//!
//! Each cell's provision-then-dispatch sequence runs on one pool worker.
//! Planning and provisioning failures are cell results, not run errors;
//! only system-level problems (empty matrix, corrupt ledger, unusable
//! engine) abort the run before anything is dispatched.

use crate::build::planner::{BuildDecision, BuildPlanner};
use crate::build::provisioner::{Provisioner, RetryPolicy};
use crate::cache::inputs::InputCollector;
use crate::cache::ledger::Ledger;
use crate::config::Config;
use crate::dispatch::{
    CellStatus, DispatchOptions, DispatchResult, Dispatcher, RunReport, WorkerPool,
};
use crate::engine::ContainerEngine;
use crate::error::{DrydockError, DrydockResult};
use crate::journal::Journal;
use crate::matrix::{MatrixCell, MatrixRequest, MatrixResolver};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One invocation of `build` or `run`
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub matrix: MatrixRequest,
    /// Rebuild every cell regardless of the ledger
    pub force: bool,
    /// Command to dispatch; `None` only provisions
    pub command: Option<Vec<String>>,
    pub options: DispatchOptions,
}

/// Wires the components together for one project
pub struct Pipeline {
    config: Config,
    project_dir: PathBuf,
    ledger: Arc<Ledger>,
    engine: Arc<dyn ContainerEngine>,
    journal: Arc<Journal>,
    runs_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        config: Config,
        project_dir: PathBuf,
        ledger: Arc<Ledger>,
        engine: Arc<dyn ContainerEngine>,
        runs_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            project_dir,
            ledger,
            engine,
            journal: Arc::new(Journal::disabled()),
            runs_dir,
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Resolve `request` against the configured matrix
    pub fn resolve(&self, request: &MatrixRequest) -> DrydockResult<Vec<MatrixCell>> {
        MatrixResolver::new(&self.config).resolve(request)
    }

    fn planner(&self, force: bool) -> BuildPlanner {
        let collector = InputCollector::new(&self.project_dir, self.config.inputs.clone());
        BuildPlanner::new(self.ledger.clone(), collector, self.config.image.clone()).force(force)
    }

    /// Plan every cell without touching the engine or the ledger
    ///
    /// Per-cell planning errors are returned alongside the cell; system
    /// errors such as a corrupt ledger abort the whole plan.
    pub async fn plan(
        &self,
        cells: &[MatrixCell],
        force: bool,
    ) -> DrydockResult<Vec<(MatrixCell, DrydockResult<BuildDecision>)>> {
        let results = self.planner(force).plan_all(cells).await;

        let mut planned = Vec::with_capacity(cells.len());
        for (cell, result) in cells.iter().zip(results) {
            match result {
                Err(e) if e.is_fatal_for_run() => return Err(e),
                other => planned.push((cell.clone(), other)),
            }
        }
        Ok(planned)
    }

    /// Resolve, plan, provision and (optionally) dispatch
    pub async fn run(
        &self,
        request: RunRequest,
        run_id: String,
        cancel: &CancellationToken,
    ) -> DrydockResult<RunReport> {
        let started = Instant::now();
        let cells = self.resolve(&request.matrix)?;
        info!("Resolved {} cell(s) for {}", cells.len(), request.matrix);

        let planned = self.plan(&cells, request.force).await?;
        self.engine.ensure_ready().await?;

        let decisions: Arc<BTreeMap<MatrixCell, Result<BuildDecision, DispatchResult>>> =
            Arc::new(
                planned
                    .into_iter()
                    .map(|(cell, result)| {
                        let entry = result.map_err(|e| DispatchResult::errored(cell.clone(), &e));
                        (cell, entry)
                    })
                    .collect(),
            );

        let provisioner = Arc::new(
            Provisioner::new(
                self.engine.clone(),
                self.ledger.clone(),
                RetryPolicy::from_config(&self.config.provision),
            )
            .with_journal(self.journal.clone()),
        );
        let dispatcher = Dispatcher::new(
            self.engine.clone(),
            &self.runs_dir,
            run_id,
            request.options.clone(),
        )
        .with_journal(self.journal.clone());
        let command: Option<Arc<[String]>> = request.command.as_deref().map(Into::into);

        let pool = WorkerPool::new(request.options.concurrency, request.options.policy);
        let report = pool
            .run(cells, cancel, |cell| {
                let decisions = decisions.clone();
                let provisioner = provisioner.clone();
                let dispatcher = dispatcher.clone();
                let command = command.clone();
                let cancel = cancel.clone();
                async move {
                    let decision = match decisions.get(&cell) {
                        Some(Ok(decision)) => decision.clone(),
                        Some(Err(failed)) => return failed.clone(),
                        None => {
                            return DispatchResult::errored(
                                cell.clone(),
                                &DrydockError::Internal(format!("no plan for {}", cell)),
                            )
                        }
                    };
                    process_cell(
                        &dispatcher,
                        &provisioner,
                        decision,
                        command.as_deref(),
                        &cancel,
                    )
                    .await
                }
            })
            .await;

        self.journal
            .record(
                "run.finish",
                &serde_json::json!({
                    "run_id": dispatcher.run_id(),
                    "success": report.success,
                    "cells": report.results.len(),
                    "passed": report.count(CellStatus::Passed),
                    "failed": report.failures().count(),
                    "skipped": report.count(CellStatus::Skipped),
                    "first_failure": report.first_failure.as_ref().map(MatrixCell::key),
                    "duration_ms": started.elapsed().as_millis() as u64,
                }),
            )
            .await;

        Ok(report)
    }
}

/// Provision one cell, then run the command in it
async fn process_cell(
    dispatcher: &Dispatcher,
    provisioner: &Provisioner,
    decision: BuildDecision,
    command: Option<&[String]>,
    cancel: &CancellationToken,
) -> DispatchResult {
    let started = Instant::now();
    let cell = decision.cell.clone();

    let log = match dispatcher.open_log(&cell).await {
        Ok(log) => log,
        Err(e) => return DispatchResult::errored(cell, &e),
    };
    let sink = log.sink();

    let result = match provisioner.provision(&decision, &sink, cancel).await {
        Err(e) => DispatchResult::errored(cell.clone(), &e),
        Ok(outcome) => match outcome.error() {
            Some(e) => DispatchResult::errored(cell.clone(), &e).with_action(outcome.action),
            None => {
                debug!("[{}] environment ready: {}", cell, outcome.detail);
                let result = match command {
                    None => DispatchResult::provisioned(cell.clone()),
                    Some(command) => match dispatcher
                        .execute(&cell, &outcome.image, command, &sink, cancel)
                        .await
                    {
                        Ok(code) => DispatchResult::exited(cell.clone(), code),
                        Err(e) => DispatchResult::errored(cell.clone(), &e),
                    },
                };
                result.with_action(outcome.action)
            }
        },
    };

    drop(sink);
    dispatcher.finish_cell(log, result, started).await
}
