//! Environment provisioning
//!
//! Turns a build decision into a usable image: reuse verifies the image
//! is still present, rebuild builds or pulls it through the engine and
//! records the result in the ledger. Transient engine failures are
//! retried with exponential backoff.

use crate::build::planner::{BuildAction, BuildDecision, DecisionReason};
use crate::build::recipe::{BuildRecipe, RecipeSource};
use crate::cache::ledger::{BuildStatus, Ledger};
use crate::config::schema::ProvisionConfig;
use crate::engine::{BuildRequest, ContainerEngine, OutputSink};
use crate::error::{DrydockError, DrydockResult};
use crate::journal::Journal;
use crate::matrix::MatrixCell;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bounded retry with doubling backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProvisionConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStatus {
    Success,
    Failure,
}

/// Result of provisioning one cell
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub cell: MatrixCell,
    pub status: ProvisionStatus,
    /// Action actually taken (reuse may be downgraded to rebuild)
    pub action: BuildAction,
    pub reason: DecisionReason,
    /// Image the cell runs in
    pub image: String,
    /// Engine attempts made (0 for reuse)
    pub attempts: u32,
    /// Human-readable result, or the captured error on failure
    pub detail: String,
}

impl ProvisionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ProvisionStatus::Success
    }

    /// The failure as a cell-attributed error
    pub fn error(&self) -> Option<DrydockError> {
        match self.status {
            ProvisionStatus::Success => None,
            ProvisionStatus::Failure => Some(DrydockError::ProvisionFailure {
                cell: self.cell.key(),
                reason: self.detail.clone(),
            }),
        }
    }
}

/// Drives the container engine for build decisions
pub struct Provisioner {
    engine: Arc<dyn ContainerEngine>,
    ledger: Arc<Ledger>,
    journal: Arc<Journal>,
    retry: RetryPolicy,
}

impl Provisioner {
    pub fn new(engine: Arc<dyn ContainerEngine>, ledger: Arc<Ledger>, retry: RetryPolicy) -> Self {
        Self {
            engine,
            ledger,
            journal: Arc::new(Journal::disabled()),
            retry,
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = journal;
        self
    }

    /// Provision the image for `decision`
    ///
    /// Per-cell failures are returned as a `Failure` outcome. Only
    /// cancellation is returned as an error; the cell's in-progress
    /// marker is then left for the staleness rule.
    pub async fn provision(
        &self,
        decision: &BuildDecision,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<ProvisionOutcome> {
        let cell = &decision.cell;
        let mut outcome = ProvisionOutcome {
            cell: cell.clone(),
            status: ProvisionStatus::Success,
            action: decision.action,
            reason: decision.reason,
            image: decision.recipe.tag.clone(),
            attempts: 0,
            detail: String::new(),
        };

        if cancel.is_cancelled() {
            return Err(DrydockError::Cancelled);
        }

        if decision.action == BuildAction::Reuse {
            match self.engine.image_exists(&decision.recipe.tag).await {
                Ok(true) => {
                    info!("[{}] reusing {}", cell, decision.recipe.tag);
                    outcome.detail = format!("reused {}", decision.recipe.tag);
                    return Ok(outcome);
                }
                Ok(false) => {
                    warn!(
                        "[{}] image {} missing despite matching fingerprint, rebuilding",
                        cell, decision.recipe.tag
                    );
                    outcome.action = BuildAction::Rebuild;
                    outcome.reason = DecisionReason::ImageMissing;
                }
                Err(e) => return Ok(fail(outcome, &e)),
            }
        }

        let token = match self.ledger.begin_build(cell).await {
            Ok(token) => token,
            Err(e) => return Ok(fail(outcome, &e)),
        };

        self.journal
            .record(
                "build.start",
                &serde_json::json!({
                    "cell": cell.key(),
                    "image": decision.recipe.tag,
                    "action": outcome.action,
                    "reason": outcome.reason,
                    "fingerprint": decision.fingerprint.digest(),
                }),
            )
            .await;

        let started = Instant::now();
        let produced = self
            .produce_with_retry(cell, &decision.recipe, on_output, cancel)
            .await;

        let result = match produced {
            Ok(attempts) => {
                outcome.attempts = attempts;
                match self
                    .ledger
                    .commit(token, decision.fingerprint.clone(), BuildStatus::Success)
                    .await
                {
                    Ok(_) => {
                        info!(
                            "[{}] built {} in {:.1}s",
                            cell,
                            decision.recipe.tag,
                            started.elapsed().as_secs_f64()
                        );
                        outcome.detail = format!("built {}", decision.recipe.tag);
                        outcome
                    }
                    Err(e) => fail(outcome, &e),
                }
            }
            Err(DrydockError::Cancelled) => {
                warn!("[{}] build cancelled; ledger entry left in progress", cell);
                drop(token);
                return Err(DrydockError::Cancelled);
            }
            Err(e) => {
                if let Err(abort_err) = self.ledger.abort(token).await {
                    warn!("[{}] failed to release build: {}", cell, abort_err);
                }
                fail(outcome, &e)
            }
        };

        self.journal
            .record(
                "build.finish",
                &serde_json::json!({
                    "cell": cell.key(),
                    "image": result.image,
                    "success": result.is_success(),
                    "attempts": result.attempts,
                    "duration_ms": started.elapsed().as_millis() as u64,
                    "detail": result.detail,
                }),
            )
            .await;

        Ok(result)
    }

    /// Build or pull, retrying transient failures; returns attempts made
    async fn produce_with_retry(
        &self,
        cell: &MatrixCell,
        recipe: &BuildRecipe,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<u32> {
        let mut attempt = 1;
        loop {
            match self.produce(recipe, on_output, cancel).await {
                Ok(()) => return Ok(attempt),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "[{}] attempt {}/{} failed ({}), retrying in {}ms",
                        cell,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(DrydockError::Cancelled),
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn produce(
        &self,
        recipe: &BuildRecipe,
        on_output: OutputSink<'_>,
        cancel: &CancellationToken,
    ) -> DrydockResult<()> {
        match &recipe.source {
            RecipeSource::Pull { reference } => self.engine.pull(reference, on_output, cancel).await,
            RecipeSource::Build {
                context,
                dockerfile,
                build_args,
                base_image,
            } => {
                if let Some(base) = base_image {
                    if !self.engine.image_exists(base).await? {
                        self.engine.pull(base, on_output, cancel).await?;
                    }
                }
                let request = BuildRequest {
                    tag: recipe.tag.clone(),
                    context: context.clone(),
                    dockerfile: dockerfile.clone(),
                    build_args: build_args.clone(),
                };
                self.engine.build(&request, on_output, cancel).await
            }
        }
    }
}

fn fail(mut outcome: ProvisionOutcome, error: &DrydockError) -> ProvisionOutcome {
    warn!("[{}] provisioning failed: {}", outcome.cell, error);
    outcome.status = ProvisionStatus::Failure;
    outcome.detail = error.to_string();
    outcome
}
