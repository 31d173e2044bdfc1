//! Configuration schema for Drydock
//!
//! Global configuration lives at `~/.config/drydock/config.toml`; a
//! project-local `drydock.toml` is merged over it.

use crate::error::{DrydockError, DrydockResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container engine settings
    pub engine: EngineConfig,

    /// Matrix axes, in identity order
    pub axes: Vec<AxisConfig>,

    /// Known-invalid combinations (partial axis assignments)
    pub exclude: Vec<BTreeMap<String, String>>,

    /// How each cell's image is produced
    pub image: ImageConfig,

    /// Declared build-relevant inputs
    pub inputs: Vec<InputConfig>,

    /// Cache ledger settings
    pub ledger: LedgerConfig,

    /// Provisioning retry policy
    pub provision: ProvisionConfig,

    /// Command dispatch defaults
    pub dispatch: DispatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            engine: EngineConfig::default(),
            axes: vec![
                AxisConfig::new("python", &["3.9", "3.10", "3.11", "3.12"], Some("3.10")),
                AxisConfig::new(
                    "backend",
                    &["sqlite", "postgres-13", "postgres-16", "mysql-8.0"],
                    Some("sqlite"),
                ),
                AxisConfig::new("executor", &["local", "celery"], Some("local")),
            ],
            exclude: vec![],
            image: ImageConfig::default(),
            inputs: vec![InputConfig {
                name: "pyproject".to_string(),
                path: "pyproject.toml".to_string(),
            }],
            ledger: LedgerConfig::default(),
            provision: ProvisionConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Config {
    /// Look up an axis by name
    pub fn axis(&self, name: &str) -> Option<&AxisConfig> {
        self.axes.iter().find(|a| a.name == name)
    }

    /// Axis names in identity order
    pub fn axis_names(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name.as_str()).collect()
    }

    /// Check the matrix declaration for internal consistency
    pub fn validate(&self) -> DrydockResult<()> {
        if self.axes.is_empty() {
            return Err(DrydockError::MatrixConfig(
                "at least one [[axes]] entry is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for axis in &self.axes {
            if axis.name.is_empty() || axis.name.contains(&['=', ',', '{', '}'][..]) {
                return Err(DrydockError::MatrixConfig(format!(
                    "invalid axis name '{}'",
                    axis.name
                )));
            }
            if !names.insert(axis.name.as_str()) {
                return Err(DrydockError::MatrixConfig(format!(
                    "axis '{}' declared twice",
                    axis.name
                )));
            }
            if axis.values.is_empty() {
                return Err(DrydockError::MatrixConfig(format!(
                    "axis '{}' has no values",
                    axis.name
                )));
            }
            if let Some(value) = axis.values.iter().find(|v| v.is_empty() || v.contains(',')) {
                return Err(DrydockError::MatrixConfig(format!(
                    "axis '{}' has invalid value '{}'",
                    axis.name, value
                )));
            }
            if let Some(ref default) = axis.default {
                if !axis.values.contains(default) {
                    return Err(DrydockError::MatrixConfig(format!(
                        "default '{}' of axis '{}' is not one of its values",
                        default, axis.name
                    )));
                }
            }
        }

        for rule in &self.exclude {
            if rule.is_empty() {
                return Err(DrydockError::MatrixConfig(
                    "empty [[exclude]] entry would exclude every cell".to_string(),
                ));
            }
            for key in rule.keys() {
                if !names.contains(key.as_str()) {
                    return Err(DrydockError::UnknownAxis(key.clone()));
                }
            }
        }

        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append build and run events to the journal
    pub journal: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            journal: true,
        }
    }
}

/// Container engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine CLI binary (podman or docker)
    pub binary: String,

    /// Arguments inserted before every engine subcommand (e.g. `--remote`)
    pub global_args: Vec<String>,

    /// Environment passed through to the engine process untouched
    pub env: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "podman".to_string(),
            global_args: vec![],
            env: HashMap::new(),
        }
    }
}

/// One matrix axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Axis name, used in cell identities and `{name}` templates
    pub name: String,

    /// All known values
    pub values: Vec<String>,

    /// Value used when the axis is selected as "default"
    #[serde(default)]
    pub default: Option<String>,
}

impl AxisConfig {
    /// Convenience constructor
    pub fn new(name: &str, values: &[&str], default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            default: default.map(str::to_string),
        }
    }

    /// The default value, falling back to the first declared value
    pub fn default_value(&self) -> Option<&str> {
        self.default
            .as_deref()
            .or_else(|| self.values.first().map(String::as_str))
    }
}

/// Image recipe configuration
///
/// String fields accept `{axis}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Local image repository; the tag is derived from the cell
    pub repository: String,

    /// Dockerfile path relative to the project root
    pub dockerfile: String,

    /// Build context relative to the project root
    pub context: String,

    /// Base image, passed as the `BASE_IMAGE` build arg and pulled first
    pub base_image: Option<String>,

    /// Additional build args
    pub build_args: BTreeMap<String, String>,

    /// Pull this reference instead of building
    pub pull: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        let mut build_args = BTreeMap::new();
        build_args.insert("PYTHON_VERSION".to_string(), "{python}".to_string());
        build_args.insert("BACKEND".to_string(), "{backend}".to_string());
        build_args.insert("EXECUTOR".to_string(), "{executor}".to_string());
        Self {
            repository: "localhost/drydock".to_string(),
            dockerfile: "Dockerfile.ci".to_string(),
            context: ".".to_string(),
            base_image: Some("python:{python}-slim-bookworm".to_string()),
            build_args,
            pull: None,
        }
    }
}

/// A declared build input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Logical name used for canonical ordering
    pub name: String,

    /// Path template relative to the project root
    pub path: String,
}

/// Cache ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Override for the ledger directory
    pub dir: Option<PathBuf>,

    /// In-progress builds older than this are treated as failed
    pub stale_after_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: None,
            stale_after_secs: 2 * 60 * 60,
        }
    }
}

/// Provisioning retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Total attempts for transient engine failures (1 = no retry)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling backoff
    pub max_backoff_ms: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// Command dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Cells processed concurrently
    pub concurrency: usize,

    /// Seconds an in-flight command gets after cancellation before it is killed
    pub grace_period_secs: u64,

    /// Working directory inside the container
    pub workdir: String,

    /// Mount the project root at `workdir`
    pub mount_project: bool,

    /// Extra volume mounts (host:container)
    pub volumes: Vec<String>,

    /// Environment for dispatched commands (values accept `{axis}`)
    pub env: BTreeMap<String, String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            grace_period_secs: 10,
            workdir: "/workspace".to_string(),
            mount_project: true,
            volumes: vec![],
            env: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[[axes]]"));
        assert!(toml.contains("[ledger]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.binary, "podman");
        assert_eq!(config.axes.len(), 3);
        assert_eq!(config.ledger.stale_after_secs, 7200);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [[axes]]
            name = "runtime"
            values = ["A", "B"]

            [[exclude]]
            runtime = "B"

            [ledger]
            stale_after_secs = 60
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.axis_names(), vec!["runtime"]);
        assert_eq!(config.exclude.len(), 1);
        assert_eq!(config.ledger.stale_after_secs, 60);
        assert_eq!(config.dispatch.workdir, "/workspace");
    }

    #[test]
    fn config_ignores_unknown_keys() {
        let toml = r#"
            future_setting = true
            [general]
            log_format = "json"
            colour = "auto"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn validate_rejects_default_outside_values() {
        let mut config = Config::default();
        config.axes = vec![AxisConfig::new("runtime", &["A"], Some("Z"))];
        assert!(matches!(config.validate(), Err(DrydockError::MatrixConfig(_))));
    }

    #[test]
    fn validate_rejects_exclusion_on_unknown_axis() {
        let mut config = Config::default();
        let mut rule = BTreeMap::new();
        rule.insert("nope".to_string(), "x".to_string());
        config.exclude = vec![rule];
        assert!(matches!(config.validate(), Err(DrydockError::UnknownAxis(_))));
    }

    #[test]
    fn validate_rejects_duplicate_axis() {
        let mut config = Config::default();
        config.axes = vec![
            AxisConfig::new("runtime", &["A"], None),
            AxisConfig::new("runtime", &["B"], None),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_value_falls_back_to_first() {
        let axis = AxisConfig::new("runtime", &["A", "B"], None);
        assert_eq!(axis.default_value(), Some("A"));
    }
}
