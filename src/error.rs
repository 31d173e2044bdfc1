//! Error types for Drydock
//!
//! All modules use `DrydockResult<T>` as their return type. Per-cell
//! errors carry the offending cell identity so the run report can
//! attribute them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Drydock operations
pub type DrydockResult<T> = Result<T, DrydockError>;

/// All errors that can occur in Drydock
#[derive(Error, Debug)]
pub enum DrydockError {
    // Container engine errors
    #[error("Container engine not found: {binary}. Install podman or set [engine] binary in drydock.toml")]
    EngineNotFound { binary: String },

    #[error("Container engine is not usable: {0}")]
    EngineUnavailable(String),

    #[error("Transient container engine failure during {operation}: {reason}")]
    EngineTransient { operation: String, reason: String },

    #[error("Image build failed: {tag}\n{output}")]
    ImageBuild { tag: String, output: String },

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Container run failed: {image}: {reason}")]
    ContainerRun { image: String, reason: String },

    // Matrix errors
    #[error("Matrix is empty: {reason}")]
    EmptyMatrix { reason: String },

    #[error("Unknown matrix axis: {0}")]
    UnknownAxis(String),

    #[error("Unknown value '{value}' for axis '{axis}' (known: {known})")]
    UnknownAxisValue {
        axis: String,
        value: String,
        known: String,
    },

    // Cache errors
    #[error("[{cell}] build input '{input}' unavailable at {path}: {source}")]
    InputUnavailable {
        cell: String,
        input: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{cell}] another build is in progress (started {started_at})")]
    ConcurrentBuildConflict { cell: String, started_at: String },

    #[error("Ledger record corrupt at {path}: {reason}")]
    LedgerCorrupt { path: PathBuf, reason: String },

    #[error("[{cell}] build token no longer owns the in-progress marker")]
    BuildTokenLost { cell: String },

    // Per-cell outcomes
    #[error("[{cell}] provisioning failed: {reason}")]
    ProvisionFailure { cell: String, reason: String },

    #[error("[{cell}] command exited with code {code}")]
    DispatchFailure { cell: String, code: i32 },

    #[error("{failed} of {total} cell(s) failed; first failure: {first}")]
    RunFailed {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid matrix configuration: {0}")]
    MatrixConfig(String),

    #[error("Template '{template}' references unknown axis '{axis}'")]
    TemplateAxis { template: String, axis: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

/// Which layer an error originates from, for user-facing reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLayer {
    /// Fingerprinting, ledger, image provisioning
    Cache,
    /// The dispatched test/lint command itself
    Command,
    /// Matrix or config file problems
    Config,
    /// Everything else (IO, engine availability, internal)
    System,
}

impl fmt::Display for ErrorLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Command => write!(f, "command"),
            Self::Config => write!(f, "config"),
            Self::System => write!(f, "system"),
        }
    }
}

impl DrydockError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineTransient { .. })
    }

    /// Whether this error must abort the whole run before dispatch
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Self::EmptyMatrix { .. }
                | Self::LedgerCorrupt { .. }
                | Self::MatrixConfig(_)
                | Self::ConfigInvalid { .. }
                | Self::UnknownAxis(_)
                | Self::UnknownAxisValue { .. }
        )
    }

    /// Classify the error for user-facing output
    pub fn layer(&self) -> ErrorLayer {
        match self {
            Self::DispatchFailure { .. } => ErrorLayer::Command,
            Self::InputUnavailable { .. }
            | Self::ConcurrentBuildConflict { .. }
            | Self::LedgerCorrupt { .. }
            | Self::BuildTokenLost { .. }
            | Self::ProvisionFailure { .. }
            | Self::ImageBuild { .. }
            | Self::ImagePull { .. }
            | Self::EngineTransient { .. } => ErrorLayer::Cache,
            Self::EmptyMatrix { .. }
            | Self::UnknownAxis(_)
            | Self::UnknownAxisValue { .. }
            | Self::ConfigInvalid { .. }
            | Self::MatrixConfig(_)
            | Self::TemplateAxis { .. } => ErrorLayer::Config,
            _ => ErrorLayer::System,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EngineNotFound { .. } => Some("Install podman, or point [engine] binary at docker"),
            Self::EmptyMatrix { .. } => Some("Run: drydock matrix --all to see which cells exist"),
            Self::ConcurrentBuildConflict { .. } => {
                Some("Wait for the other build, or run: drydock ledger forget <cell>")
            }
            Self::LedgerCorrupt { .. } => Some("Run: drydock ledger clear"),
            Self::RunFailed { .. } => Some("Per-cell output is in the log files listed above"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_cell() {
        let err = DrydockError::ProvisionFailure {
            cell: "runtime=3.11,backend=postgres".to_string(),
            reason: "boom".to_string(),
        };
        assert!(err.to_string().contains("runtime=3.11,backend=postgres"));
    }

    #[test]
    fn error_hint() {
        let err = DrydockError::LedgerCorrupt {
            path: PathBuf::from("/tmp/x.json"),
            reason: "eof".to_string(),
        };
        assert_eq!(err.hint(), Some("Run: drydock ledger clear"));
    }

    #[test]
    fn error_retryable() {
        let transient = DrydockError::EngineTransient {
            operation: "pull".to_string(),
            reason: "i/o timeout".to_string(),
        };
        let permanent = DrydockError::ImageBuild {
            tag: "x".to_string(),
            output: "unknown instruction".to_string(),
        };
        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn error_layers_separate_cache_from_command() {
        let cmd = DrydockError::DispatchFailure {
            cell: "a".to_string(),
            code: 1,
        };
        let cache = DrydockError::ConcurrentBuildConflict {
            cell: "a".to_string(),
            started_at: "now".to_string(),
        };
        assert_eq!(cmd.layer(), ErrorLayer::Command);
        assert_eq!(cache.layer(), ErrorLayer::Cache);
        assert!(DrydockError::EmptyMatrix {
            reason: "x".to_string()
        }
        .is_fatal_for_run());
    }
}
