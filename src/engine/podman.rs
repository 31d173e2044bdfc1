//! Podman (or Docker) CLI engine
//!
//! Implements the ContainerEngine trait by executing the engine CLI.
//! Docker accepts every subcommand used here, so pointing `binary` at
//! `docker` works unchanged.

use crate::config::schema::EngineConfig;
use crate::engine::runtime::{BuildRequest, ContainerEngine, OutputSink, RunSpec};
use crate::engine::{build_error_output, is_transient_output, supervise_child, ChildOutcome};
use crate::error::{DrydockError, DrydockResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Container engine driven through the podman/docker CLI
pub struct PodmanEngine {
    binary: String,
    global_args: Vec<String>,
    env: HashMap<String, String>,
    grace_period: Duration,
}

impl PodmanEngine {
    /// Create an engine for `binary` with the configured passthrough
    pub fn new(binary: impl Into<String>, config: &EngineConfig, grace_period: Duration) -> Self {
        Self {
            binary: binary.into(),
            global_args: config.global_args.clone(),
            env: config.env.clone(),
            grace_period,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.global_args).args(args).envs(&self.env);
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.first().copied().unwrap_or_default())
    }

    fn spawn_error(&self, args: &[&str], e: std::io::Error) -> DrydockError {
        if e.kind() == ErrorKind::NotFound {
            DrydockError::EngineNotFound {
                binary: self.binary.clone(),
            }
        } else {
            DrydockError::command_failed(self.describe(args), e)
        }
    }

    /// Execute an engine command and return the output
    async fn exec(&self, args: &[&str]) -> DrydockResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        self.command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(args, e))
    }

    /// Spawn an engine command with piped output
    fn spawn_piped(&self, args: &[&str]) -> DrydockResult<Child> {
        debug!("Spawning: {} {:?}", self.binary, args);

        self.command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(args, e))
    }

    /// Run a short-lived engine command, streaming its output
    ///
    /// A failed command yields `Ok(Err(output))` so the caller can
    /// classify the failure.
    async fn exec_streaming(
        &self,
        args: &[&str],
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<Result<(), Vec<String>>> {
        let mut child = self.spawn_piped(args)?;
        let command = self.describe(args);

        match supervise_child(&mut child, &command, on_output, cancel).await? {
            ChildOutcome::Exited { status, output } => {
                if status.success() {
                    Ok(Ok(()))
                } else {
                    Ok(Err(output))
                }
            }
            ChildOutcome::Cancelled => {
                debug!("{} cancelled, killing", command);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", command, e);
                }
                Err(DrydockError::Cancelled)
            }
        }
    }

    /// Stop a container, escalating to kill after the grace period
    async fn stop_container(&self, name: &str) {
        let grace = self.grace_period.as_secs().to_string();
        match self.exec(&["stop", "--time", &grace, name]).await {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!("{} stop {}: {}", self.binary, name, stderr.trim());
            }
            Err(e) => warn!("Failed to stop container {}: {}", name, e),
            Ok(_) => {}
        }
    }

    /// Remove a container, ignoring one that is already gone
    async fn remove_container(&self, name: &str) {
        match self.exec(&["rm", "-f", name]).await {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.to_ascii_lowercase().contains("no such container") {
                    warn!("Failed to remove container {}: {}", name, stderr.trim());
                }
            }
            Err(e) => warn!("Failed to remove container {}: {}", name, e),
            Ok(_) => {}
        }
    }
}

/// Arguments for `build`
fn build_args(request: &BuildRequest) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "-t".to_string(),
        request.tag.clone(),
        "-f".to_string(),
        request.dockerfile.display().to_string(),
    ];

    for (key, value) in &request.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }

    args.push(request.context.display().to_string());
    args
}

/// Arguments for `run`
fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];

    // Working directory
    if let Some(ref workdir) = spec.workdir {
        args.push("-w".to_string());
        args.push(workdir.clone());
    }

    // Volumes
    for v in &spec.volumes {
        args.push("-v".to_string());
        args.push(v.clone());
    }

    // Environment variables
    for (k, v) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", k, v));
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn ensure_ready(&self) -> DrydockResult<()> {
        let output = self.exec(&["info"]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DrydockError::EngineUnavailable(format!(
                "{} info: {}",
                self.binary,
                stderr.trim()
            )))
        }
    }

    async fn image_exists(&self, image: &str) -> DrydockResult<bool> {
        let output = self
            .exec(&["image", "inspect", "--format", "{{.Id}}", image])
            .await?;
        Ok(output.status.success())
    }

    async fn pull(
        &self,
        image: &str,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<()> {
        info!("Pulling image: {}", image);

        match self.exec_streaming(&["pull", image], on_output, cancel).await? {
            Ok(()) => Ok(()),
            Err(output) if is_transient_output(&output) => Err(DrydockError::EngineTransient {
                operation: format!("pull {}", image),
                reason: build_error_output(&output),
            }),
            Err(output) => Err(DrydockError::ImagePull {
                image: image.to_string(),
                reason: build_error_output(&output),
            }),
        }
    }

    async fn build(
        &self,
        request: &BuildRequest,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<()> {
        info!("Building image: {}", request.tag);

        let args = build_args(request);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match self.exec_streaming(&args, on_output, cancel).await? {
            Ok(()) => Ok(()),
            Err(output) if is_transient_output(&output) => Err(DrydockError::EngineTransient {
                operation: format!("build {}", request.tag),
                reason: build_error_output(&output),
            }),
            Err(output) => Err(DrydockError::ImageBuild {
                tag: request.tag.clone(),
                output: build_error_output(&output),
            }),
        }
    }

    async fn run(
        &self,
        spec: &RunSpec,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<i32> {
        let args = run_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!("Running container: {} {:?}", self.binary, args);

        let mut child = self.spawn_piped(&args)?;
        let command = self.describe(&args);

        match supervise_child(&mut child, &command, on_output, cancel).await? {
            ChildOutcome::Exited { status, .. } => Ok(status.code().unwrap_or(-1)),
            ChildOutcome::Cancelled => {
                info!(
                    "Stopping {} (grace {}s)",
                    spec.name,
                    self.grace_period.as_secs()
                );
                self.stop_container(&spec.name).await;
                if let Err(e) = child.kill().await {
                    debug!("{} already exited: {}", command, e);
                }
                self.remove_container(&spec.name).await;
                Err(DrydockError::Cancelled)
            }
        }
    }

    fn engine_name(&self) -> &str {
        &self.binary
    }
}
