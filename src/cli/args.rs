//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Drydock - environment-matrix build cache and dispatcher
///
/// Builds one container image per matrix cell, reuses images whose
/// inputs have not changed, and runs commands across the matrix.
#[derive(Parser, Debug)]
#[command(name = "drydock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DRYDOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for the ledger, run logs and journal
    #[arg(long, global = true, env = "DRYDOCK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Skip project-local drydock.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,

    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision every selected cell and run a command in each
    Run(RunArgs),

    /// Provision every selected cell without running anything
    Build(BuildArgs),

    /// Show whether each cell would be rebuilt or reused
    Plan(PlanArgs),

    /// List the cells a selection resolves to
    Matrix(MatrixArgs),

    /// Inspect or reset the build ledger
    Ledger(LedgerArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Axis selection shared by every matrix-aware command
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Axis selector AXIS=VALUE[,VALUE...], AXIS=all or AXIS=default
    #[arg(short, long = "axis", value_name = "AXIS=SELECTOR")]
    pub axes: Vec<String>,

    /// Select every value on every axis (explicit --axis still wins)
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Rebuild images even when the ledger says they are current
    #[arg(short, long)]
    pub force: bool,

    /// Maximum number of cells in flight
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Run every cell even after a failure
    #[arg(long)]
    pub continue_on_error: bool,

    /// Additional environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Additional volume mounts (host:container)
    #[arg(long)]
    pub volume: Vec<String>,

    /// Command and arguments to run in each cell
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Rebuild images even when the ledger says they are current
    #[arg(short, long)]
    pub force: bool,

    /// Maximum number of cells provisioned at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Keep provisioning after a failure
    #[arg(long)]
    pub continue_on_error: bool,
}

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Plan as if --force were given
    #[arg(short, long)]
    pub force: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the matrix command
#[derive(Parser, Debug)]
pub struct MatrixArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the ledger command
#[derive(Parser, Debug)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub action: LedgerAction,
}

/// Ledger subcommands
#[derive(Subcommand, Debug)]
pub enum LedgerAction {
    /// List recorded builds and in-progress markers
    List {
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Drop the record for one cell so it rebuilds next time
    Forget {
        /// Cell key, e.g. python=3.11,backend=sqlite,executor=local
        cell: String,
    },

    /// Drop every record
    Clear,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective (merged) configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration to the global config path
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
