//! CLI command implementations

pub mod build;
pub mod config;
pub mod ledger;
pub mod matrix;
pub mod plan;
pub mod run;

pub use build::execute as build;
pub use config::execute as config;
pub use ledger::execute as ledger;
pub use matrix::execute as matrix;
pub use plan::execute as plan;
pub use run::execute as run;

use crate::cache::Ledger;
use crate::cli::args::SelectArgs;
use crate::config::{Config, ConfigManager};
use crate::engine::create_engine;
use crate::error::DrydockResult;
use crate::journal::Journal;
use crate::matrix::MatrixRequest;
use crate::pipeline::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Loaded configuration plus the paths every command needs
pub struct Workspace {
    pub manager: ConfigManager,
    pub config: Config,
    pub project_dir: PathBuf,
}

impl Workspace {
    pub fn new(manager: ConfigManager, config: Config, project_dir: PathBuf) -> Self {
        Self {
            manager,
            config,
            project_dir,
        }
    }

    /// Translate `--all` and `--axis` flags into a matrix request
    pub fn matrix_request(&self, select: &SelectArgs) -> DrydockResult<MatrixRequest> {
        let mut request = if select.all {
            MatrixRequest::everything(&self.config)
        } else {
            MatrixRequest::new()
        };
        for spec in &select.axes {
            request.parse_selector(spec)?;
        }
        Ok(request)
    }

    pub async fn open_ledger(&self) -> DrydockResult<Arc<Ledger>> {
        let ledger = Ledger::open(
            self.manager.ledger_dir(&self.config),
            Duration::from_secs(self.config.ledger.stale_after_secs),
        )
        .await?;
        Ok(Arc::new(ledger))
    }

    pub fn journal(&self) -> Arc<Journal> {
        Arc::new(Journal::new(
            self.manager.journal_path(),
            self.config.general.journal,
        ))
    }

    /// Wire up the engine, ledger and journal for this project
    pub async fn pipeline(&self) -> DrydockResult<Pipeline> {
        let engine = create_engine(&self.config)?;
        let ledger = self.open_ledger().await?;
        Ok(Pipeline::new(
            self.config.clone(),
            self.project_dir.clone(),
            ledger,
            engine,
            self.manager.runs_dir(),
        )
        .with_journal(self.journal()))
    }
}
