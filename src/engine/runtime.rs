//! Container engine abstraction
//!
//! Provides a trait for the image and container operations drydock
//! needs, so provisioning and dispatch can run against any engine.

use crate::error::DrydockResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Receives engine output one line at a time
pub type OutputSink<'a> = &'a (dyn Fn(String) + Send + Sync);

/// Inputs for one image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Tag applied to the built image
    pub tag: String,
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile path
    pub dockerfile: PathBuf,
    /// `--build-arg` values
    pub build_args: BTreeMap<String, String>,
}

/// A command to run in a fresh container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Image to run
    pub image: String,
    /// Container name, used to stop it on cancellation
    pub name: String,
    /// Command and arguments
    pub command: Vec<String>,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// Volume mounts (host:container format)
    pub volumes: Vec<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
}

/// Abstract container engine interface
///
/// Long-running operations stream output through `on_output` and stop
/// early with `DrydockError::Cancelled` when `cancel` fires.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Fail early if the engine cannot be used
    async fn ensure_ready(&self) -> DrydockResult<()>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> DrydockResult<bool>;

    /// Pull an image
    ///
    /// Network and registry failures surface as `EngineTransient`.
    async fn pull(
        &self,
        image: &str,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<()>;

    /// Build an image
    ///
    /// Network and registry failures surface as `EngineTransient`;
    /// everything else as `ImageBuild`.
    async fn build(
        &self,
        request: &BuildRequest,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<()>;

    /// Run a command to completion and return its exit code
    ///
    /// A nonzero exit code is not an error.
    async fn run(
        &self,
        spec: &RunSpec,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<i32>;

    /// Get the human-readable engine name for display
    fn engine_name(&self) -> &str;
}
