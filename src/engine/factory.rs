//! Engine factory
//!
//! Resolves the configured engine binary and instantiates the engine.

use crate::config::Config;
use crate::engine::podman::PodmanEngine;
use crate::engine::runtime::ContainerEngine;
use crate::error::{DrydockError, DrydockResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Engines probed, in order, when `binary = "auto"`
const AUTO_CANDIDATES: &[&str] = &["podman", "docker"];

/// Resolve the engine binary
///
/// `"auto"` picks the first of podman or docker found on `PATH`; any
/// other value is used as given.
pub fn detect_binary(configured: &str) -> DrydockResult<String> {
    if configured != "auto" {
        return Ok(configured.to_string());
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    let found = AUTO_CANDIDATES.iter().find(|candidate| {
        std::env::split_paths(&path).any(|dir| dir.join(candidate).is_file())
    });

    match found {
        Some(binary) => {
            debug!("Detected container engine: {}", binary);
            Ok(binary.to_string())
        }
        None => Err(DrydockError::EngineNotFound {
            binary: AUTO_CANDIDATES.join(" or "),
        }),
    }
}

/// Create the container engine described by `config`
pub fn create_engine(config: &Config) -> DrydockResult<Arc<dyn ContainerEngine>> {
    let binary = detect_binary(&config.engine.binary)?;
    let grace = Duration::from_secs(config.dispatch.grace_period_secs);
    Ok(Arc::new(PodmanEngine::new(binary, &config.engine, grace)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_binary_is_kept() {
        assert_eq!(detect_binary("docker").unwrap(), "docker");
        assert_eq!(detect_binary("/opt/bin/podman").unwrap(), "/opt/bin/podman");
    }

    #[test]
    fn create_engine_uses_configured_binary() {
        let mut config = Config::default();
        config.engine.binary = "docker".to_string();
        let engine = create_engine(&config).unwrap();
        assert_eq!(engine.engine_name(), "docker");
    }
}
