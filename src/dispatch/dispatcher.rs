//! Command dispatch
//!
//! Runs a command in each cell's image through the container engine.
//! Every cell's output goes to its own log file under the run directory,
//! drained by a separate task, so concurrent cells never interleave.

use crate::config::schema::DispatchConfig;
use crate::dispatch::pool::{FailurePolicy, WorkerPool};
use crate::dispatch::report::{DispatchResult, RunReport};
use crate::engine::{ContainerEngine, OutputSink, RunSpec};
use crate::error::{DrydockError, DrydockResult};
use crate::journal::Journal;
use crate::matrix::MatrixCell;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Output lines kept in memory per cell
const TAIL_LINES: usize = 20;

/// Identifier for one invocation, used for the log directory
pub fn new_run_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

/// How commands are run in each cell
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub concurrency: usize,
    pub policy: FailurePolicy,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// Host directory mounted at `workdir`
    pub project_mount: Option<PathBuf>,
    /// Extra mounts; values accept `{axis}`
    pub volumes: Vec<String>,
    /// Environment; values accept `{axis}`
    pub env: BTreeMap<String, String>,
}

impl DispatchOptions {
    pub fn from_config(config: &DispatchConfig, project_dir: &Path) -> Self {
        Self {
            concurrency: config.concurrency,
            policy: FailurePolicy::FailFast,
            workdir: Some(config.workdir.clone()),
            project_mount: config.mount_project.then(|| project_dir.to_path_buf()),
            volumes: config.volumes.clone(),
            env: config.env.clone(),
        }
    }
}

/// Captured output of one cell
///
/// Lines sent through [`CellLog::sink`] are appended to the log file by a
/// drain task; [`CellLog::finish`] waits for it and returns the tail.
pub struct CellLog {
    path: PathBuf,
    tx: mpsc::UnboundedSender<String>,
    drain: JoinHandle<VecDeque<String>>,
}

impl CellLog {
    pub async fn create(path: PathBuf, cell: &MatrixCell) -> DrydockResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DrydockError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| DrydockError::io(format!("creating log {}", path.display()), e))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let cell = cell.clone();
        let log_path = path.clone();
        let drain = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(TAIL_LINES);
            let mut write_ok = true;
            while let Some(line) = rx.recv().await {
                debug!(target: "drydock::output", "[{}] {}", cell, line);
                if write_ok {
                    let written = match file.write_all(line.as_bytes()).await {
                        Ok(()) => file.write_all(b"\n").await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        warn!("Failed to write {}: {}", log_path.display(), e);
                        write_ok = false;
                    }
                }
                if tail.len() == TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            if let Err(e) = file.flush().await {
                warn!("Failed to flush {}: {}", log_path.display(), e);
            }
            tail
        });

        Ok(Self { path, tx, drain })
    }

    /// A line sink feeding this log
    pub fn sink(&self) -> impl Fn(String) + Send + Sync {
        let tx = self.tx.clone();
        move |line| {
            let _ = tx.send(line);
        }
    }

    /// Close the log and return its last lines
    ///
    /// Every sink obtained from this log must be dropped first.
    pub async fn finish(self) -> (PathBuf, Vec<String>) {
        let Self { path, tx, drain } = self;
        drop(tx);
        let tail = match drain.await {
            Ok(tail) => tail.into_iter().collect(),
            Err(e) => {
                warn!("Log drain for {} failed: {}", path.display(), e);
                Vec::new()
            }
        };
        (path, tail)
    }
}

/// Runs commands in provisioned cells
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn ContainerEngine>,
    run_id: String,
    log_dir: PathBuf,
    options: Arc<DispatchOptions>,
    journal: Arc<Journal>,
}

impl Dispatcher {
    /// Create a dispatcher writing logs to `<runs_dir>/<run_id>/`
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        runs_dir: &Path,
        run_id: String,
        options: DispatchOptions,
    ) -> Self {
        Self {
            engine,
            log_dir: runs_dir.join(&run_id),
            run_id,
            options: Arc::new(options),
            journal: Arc::new(Journal::disabled()),
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Open the output log for `cell`
    pub async fn open_log(&self, cell: &MatrixCell) -> DrydockResult<CellLog> {
        CellLog::create(self.log_dir.join(format!("{}.log", cell.storage_id())), cell).await
    }

    /// Run `command` in every cell's image with bounded concurrency
    ///
    /// Dispatch only: `targets` pairs each cell with an image that is
    /// already provisioned, in resolver order. The pipeline provisions and
    /// dispatches in one log per cell through [`Dispatcher::open_log`],
    /// [`Dispatcher::execute`] and [`Dispatcher::finish_cell`].
    pub async fn dispatch(
        &self,
        targets: Vec<(MatrixCell, String)>,
        command: &[String],
        cancel: &CancellationToken,
    ) -> RunReport {
        let images: Arc<BTreeMap<MatrixCell, String>> = Arc::new(targets.iter().cloned().collect());
        let cells: Vec<MatrixCell> = targets.into_iter().map(|(cell, _)| cell).collect();
        let command: Arc<[String]> = command.into();
        let pool = WorkerPool::new(self.options.concurrency, self.options.policy);

        info!(
            "Dispatching to {} cell(s), {} at a time",
            cells.len(),
            pool.limit()
        );

        pool.run(cells, cancel, |cell| {
            let dispatcher = self.clone();
            let images = images.clone();
            let command = command.clone();
            let cancel = cancel.clone();
            async move {
                let image = images.get(&cell).cloned().unwrap_or_default();
                dispatcher.run_cell(&cell, &image, &command, &cancel).await
            }
        })
        .await
    }

    /// Run `command` in one cell with its own log
    pub async fn run_cell(
        &self,
        cell: &MatrixCell,
        image: &str,
        command: &[String],
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let started = Instant::now();
        let log = match self.open_log(cell).await {
            Ok(log) => log,
            Err(e) => return DispatchResult::errored(cell.clone(), &e),
        };

        let sink = log.sink();
        let outcome = self.execute(cell, image, command, &sink, cancel).await;
        drop(sink);

        let result = match outcome {
            Ok(code) => DispatchResult::exited(cell.clone(), code),
            Err(e) => DispatchResult::errored(cell.clone(), &e),
        };
        self.finish_cell(log, result, started).await
    }

    /// Close the cell's log, attach it to `result` and journal the outcome
    ///
    /// Every sink taken from `log` must be dropped first.
    pub async fn finish_cell(
        &self,
        log: CellLog,
        result: DispatchResult,
        started: Instant,
    ) -> DispatchResult {
        let (path, tail) = log.finish().await;
        let result = result
            .with_log(path, tail)
            .with_duration(started.elapsed());
        self.record(&result).await;
        result
    }

    /// Run `command` in `image`, streaming output to `on_output`
    pub async fn execute(
        &self,
        cell: &MatrixCell,
        image: &str,
        command: &[String],
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<i32> {
        let spec = self.run_spec(cell, image, command)?;
        info!("[{}] running: {}", cell, command.join(" "));
        let code = self.engine.run(&spec, on_output, cancel).await?;
        if code == 0 {
            info!("[{}] passed", cell);
        } else {
            warn!("[{}] exited with code {}", cell, code);
        }
        Ok(code)
    }

    async fn record(&self, result: &DispatchResult) {
        self.journal
            .record(
                "dispatch.finish",
                &serde_json::json!({
                    "run_id": self.run_id,
                    "cell": result.cell.key(),
                    "status": result.status.label(),
                    "exit_code": result.exit_code,
                    "duration_ms": result.duration.as_millis() as u64,
                    "log": result.log_path,
                }),
            )
            .await;
    }

    fn run_spec(&self, cell: &MatrixCell, image: &str, command: &[String]) -> DrydockResult<RunSpec> {
        let mut volumes = Vec::new();
        if let (Some(project), Some(workdir)) = (&self.options.project_mount, &self.options.workdir) {
            volumes.push(format!("{}:{}", project.display(), workdir));
        }
        for volume in &self.options.volumes {
            volumes.push(cell.render(volume)?);
        }

        let mut env = BTreeMap::new();
        env.insert("DRYDOCK_CELL".to_string(), cell.key());
        for binding in cell.bindings() {
            env.insert(
                format!("DRYDOCK_AXIS_{}", env_name(binding.axis())),
                binding.value().to_string(),
            );
        }
        for (key, value) in &self.options.env {
            env.insert(key.clone(), cell.render(value)?);
        }

        Ok(RunSpec {
            image: image.to_string(),
            name: format!("drydock-{}-{}", self.run_id, cell.storage_id()),
            command: command.to_vec(),
            workdir: self.options.workdir.clone(),
            volumes,
            env,
        })
    }
}

/// `backend-version` -> `BACKEND_VERSION`
fn env_name(axis: &str) -> String {
    axis.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
