//! Build command - provision images without running anything

use crate::cli::args::BuildArgs;
use crate::cli::commands::run::MatrixJob;
use crate::cli::commands::Workspace;
use crate::error::DrydockResult;

/// Execute the build command
pub async fn execute(args: BuildArgs, ws: &Workspace) -> DrydockResult<()> {
    MatrixJob {
        select: args.select,
        force: args.force,
        jobs: args.jobs,
        continue_on_error: args.continue_on_error,
        env: Vec::new(),
        volumes: Vec::new(),
        command: None,
    }
    .execute(ws)
    .await
}
