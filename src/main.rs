//! Drydock - environment-matrix build cache and dispatcher
//!
//! CLI entry point that dispatches to subcommands.

use clap::{CommandFactory, Parser};
use console::style;
use drydock::cli::commands::{self, Workspace};
use drydock::cli::{Cli, Commands};
use drydock::config::ConfigManager;
use drydock::error::{DrydockError, DrydockResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DrydockResult<()> {
    let cli = Cli::parse();

    // Completions don't need config loading
    if let Commands::Completions(args) = cli.command {
        clap_complete::generate(
            args.shell,
            &mut Cli::command(),
            "drydock",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let mut manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    if let Some(ref dir) = cli.state_dir {
        manager = manager.with_state_dir(dir.clone());
    }

    let project_dir = match cli.project {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| DrydockError::io("getting current directory", e))?,
    };

    let local_config_path = if cli.no_local {
        None
    } else {
        ConfigManager::find_local_config(&project_dir)
    };

    let config = manager.load_merged(local_config_path.as_deref()).await?;
    init_logging(cli.verbose, &config.general.log_format);
    match local_config_path {
        Some(ref path) => debug!("Using local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => debug!("No {} found above {}", drydock::config::LOCAL_CONFIG_NAME, project_dir.display()),
    }

    manager.ensure_state_dirs(&config).await?;
    let ws = Workspace::new(manager, config, project_dir);

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Run(args) => commands::run(args, &ws).await,
        Commands::Build(args) => commands::build(args, &ws).await,
        Commands::Plan(args) => commands::plan(args, &ws).await,
        Commands::Matrix(args) => commands::matrix(args, &ws).await,
        Commands::Ledger(args) => commands::ledger(args, &ws).await,
        Commands::Config(args) => commands::config(args, &ws).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, format: &str) {
    let default = match verbose {
        0 => "drydock=warn",
        1 => "drydock=info",
        _ => "drydock=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
