//! Scriptable in-memory engine for tests

use crate::engine::runtime::{BuildRequest, ContainerEngine, OutputSink, RunSpec};
use crate::error::{DrydockError, DrydockResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted failure for the next build or pull of an image
#[derive(Debug, Clone, Copy)]
pub(crate) enum FakeFailure {
    Transient,
    Permanent,
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    images: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, VecDeque<FakeFailure>>>,
    exit_codes: Mutex<Vec<(String, i32)>>,
    build_delay: Mutex<Duration>,
    run_delay: Mutex<Duration>,
    ran: Mutex<Vec<String>>,
    builds: AtomicUsize,
    pulls: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pretend `image` is already present locally
    pub(crate) fn with_image(self, image: &str) -> Self {
        self.images.lock().unwrap().insert(image.to_string());
        self
    }

    /// Fail the next builds/pulls of `image` in order
    pub(crate) fn fail(self, image: &str, failures: &[FakeFailure]) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(image.to_string())
            .or_default()
            .extend(failures.iter().copied());
        self
    }

    /// Exit with `code` when running an image whose tag contains `pattern`
    pub(crate) fn exit_code(self, pattern: &str, code: i32) -> Self {
        self.exit_codes.lock().unwrap().push((pattern.to_string(), code));
        self
    }

    pub(crate) fn build_delay(self, delay: Duration) -> Self {
        *self.build_delay.lock().unwrap() = delay;
        self
    }

    pub(crate) fn run_delay(self, delay: Duration) -> Self {
        *self.run_delay.lock().unwrap() = delay;
        self
    }

    pub(crate) fn remove_image(&self, image: &str) {
        self.images.lock().unwrap().remove(image);
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub(crate) fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub(crate) fn runs(&self) -> usize {
        self.ran.lock().unwrap().len()
    }

    /// Images run, in start order
    pub(crate) fn ran(&self) -> Vec<String> {
        self.ran.lock().unwrap().clone()
    }

    /// Highest number of simultaneously running commands
    pub(crate) fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    fn next_failure(&self, image: &str, operation: &str) -> DrydockResult<()> {
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(image)
            .and_then(VecDeque::pop_front);

        match failure {
            Some(FakeFailure::Transient) => Err(DrydockError::EngineTransient {
                operation: format!("{} {}", operation, image),
                reason: "connection reset by peer".to_string(),
            }),
            Some(FakeFailure::Permanent) => Err(DrydockError::ImageBuild {
                tag: image.to_string(),
                output: "unknown instruction".to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn wait(delay: Duration, cancel: &CancellationToken) -> DrydockResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(DrydockError::Cancelled),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ensure_ready(&self) -> DrydockResult<()> {
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> DrydockResult<bool> {
        Ok(self.images.lock().unwrap().contains(image))
    }

    async fn pull(
        &self,
        image: &str,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<()> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        on_output(format!("pulling {}", image));
        Self::wait(Duration::ZERO, cancel).await?;
        self.next_failure(image, "pull")?;
        self.images.lock().unwrap().insert(image.to_string());
        Ok(())
    }

    async fn build(
        &self,
        request: &BuildRequest,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<()> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        on_output(format!("building {}", request.tag));
        let delay = *self.build_delay.lock().unwrap();
        Self::wait(delay, cancel).await?;
        self.next_failure(&request.tag, "build")?;
        self.images.lock().unwrap().insert(request.tag.clone());
        Ok(())
    }

    async fn run(
        &self,
        spec: &RunSpec,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<i32> {
        self.ran.lock().unwrap().push(spec.image.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);

        on_output(format!("$ {}", spec.command.join(" ")));
        let delay = *self.run_delay.lock().unwrap();
        let waited = Self::wait(delay, cancel).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        waited?;

        let code = self
            .exit_codes
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| spec.image.contains(pattern.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);
        on_output(format!("exit {}", code));
        Ok(code)
    }

    fn engine_name(&self) -> &str {
        "fake"
    }
}
