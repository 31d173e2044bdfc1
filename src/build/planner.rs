//! Build planning
//!
//! Compares each cell's current fingerprint with its ledger entry and
//! decides whether the cached image can be reused. Planning only reads
//! the ledger.

use crate::build::recipe::BuildRecipe;
use crate::cache::fingerprint::{fingerprint, Fingerprint};
use crate::cache::inputs::InputCollector;
use crate::cache::ledger::{BuildStatus, Ledger, LedgerEntry};
use crate::config::schema::ImageConfig;
use crate::error::DrydockResult;
use crate::matrix::MatrixCell;
use futures_util::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What to do with a cell's image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildAction {
    Reuse,
    Rebuild,
    RebuildForced,
}

impl fmt::Display for BuildAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reuse => write!(f, "reuse"),
            Self::Rebuild => write!(f, "rebuild"),
            Self::RebuildForced => write!(f, "rebuild-forced"),
        }
    }
}

/// Why a decision was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    /// Ledger success entry with a matching fingerprint
    UpToDate,
    NoPriorBuild,
    /// Last build failed or was abandoned
    PriorFailure,
    /// Another build holds the cell
    BuildInProgress,
    /// Inputs changed since the last successful build
    StaleInput,
    /// Last build used an older fingerprint scheme
    SchemaChanged,
    UserForced,
    /// Ledger said reuse but the engine no longer has the image
    ImageMissing,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UpToDate => "up-to-date",
            Self::NoPriorBuild => "no-prior-build",
            Self::PriorFailure => "prior-failure",
            Self::BuildInProgress => "build-in-progress",
            Self::StaleInput => "stale-input",
            Self::SchemaChanged => "schema-changed",
            Self::UserForced => "user-forced",
            Self::ImageMissing => "image-missing",
        };
        write!(f, "{}", s)
    }
}

/// Planned action for one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDecision {
    pub cell: MatrixCell,
    pub action: BuildAction,
    pub reason: DecisionReason,
    /// Fingerprint of the current inputs
    pub fingerprint: Fingerprint,
    pub recipe: BuildRecipe,
}

/// Decide from a ledger snapshot
///
/// Only a success entry whose fingerprint matches `current` is reused;
/// `force` always rebuilds.
pub fn decide(
    entry: Option<&LedgerEntry>,
    current: &Fingerprint,
    force: bool,
) -> (BuildAction, DecisionReason) {
    if force {
        return (BuildAction::RebuildForced, DecisionReason::UserForced);
    }

    let entry = match entry {
        Some(entry) => entry,
        None => return (BuildAction::Rebuild, DecisionReason::NoPriorBuild),
    };

    match entry.status {
        BuildStatus::InProgress => (BuildAction::Rebuild, DecisionReason::BuildInProgress),
        BuildStatus::Failed => (BuildAction::Rebuild, DecisionReason::PriorFailure),
        BuildStatus::Success => match entry.fingerprint {
            Some(ref previous) if previous.matches(current) => {
                (BuildAction::Reuse, DecisionReason::UpToDate)
            }
            Some(ref previous) if !previous.is_current_schema() => {
                (BuildAction::Rebuild, DecisionReason::SchemaChanged)
            }
            _ => (BuildAction::Rebuild, DecisionReason::StaleInput),
        },
    }
}

/// Plans builds for resolved cells
pub struct BuildPlanner {
    ledger: Arc<Ledger>,
    collector: InputCollector,
    image: ImageConfig,
    force: bool,
}

impl BuildPlanner {
    pub fn new(ledger: Arc<Ledger>, collector: InputCollector, image: ImageConfig) -> Self {
        Self {
            ledger,
            collector,
            image,
            force: false,
        }
    }

    /// Rebuild every cell regardless of the ledger
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Plan one cell
    ///
    /// Fails with `InputUnavailable` when a declared input cannot be read.
    pub async fn plan(&self, cell: &MatrixCell) -> DrydockResult<BuildDecision> {
        let recipe = BuildRecipe::for_cell(&self.image, self.collector.project_dir(), cell)?;
        let inputs = self.collector.collect(cell, &recipe).await?;
        let current = fingerprint(cell, &inputs);
        let entry = self.ledger.get(cell).await?;

        let (action, reason) = decide(entry.as_ref(), &current, self.force);
        debug!("[{}] plan: {} ({}, {})", cell, action, reason, current);

        Ok(BuildDecision {
            cell: cell.clone(),
            action,
            reason,
            fingerprint: current,
            recipe,
        })
    }

    /// Plan every cell concurrently; results follow the order of `cells`
    pub async fn plan_all(&self, cells: &[MatrixCell]) -> Vec<DrydockResult<BuildDecision>> {
        join_all(cells.iter().map(|cell| self.plan(cell))).await
    }
}
