//! Loading the hardware configuration
//!
//! Sources in priority order:
//! 1. An explicit file given on the command line (`--hw`)
//! 2. Project-local `dfcost.toml`
//! 3. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! num_pes = 256
//! l1_size = 512
//! l2_size = 108000
//! noc_bandwidth = 32
//! noc_latency = 1
//! noc_multicast = true
//! ```
//!
//! Missing keys keep their default values.

use std::path::Path;

use crate::error::{AnalysisError, AnalysisResult};
use crate::hardware::HardwareConfig;

/// Name of the project-local configuration file
pub const LOCAL_CONFIG_FILE: &str = "dfcost.toml";

/// Load the hardware configuration from all sources
pub fn load(explicit: Option<&Path>) -> AnalysisResult<HardwareConfig> {
    if let Some(path) = explicit {
        // An explicitly requested file must exist and parse.
        return load_from_file(path);
    }

    let local = Path::new(LOCAL_CONFIG_FILE);
    if local.exists() {
        match load_from_file(local) {
            Ok(config) => return Ok(config),
            Err(e) => log::warn!("Ignoring {}: {}", local.display(), e),
        }
    }

    log::debug!("Using built-in hardware defaults");
    Ok(HardwareConfig::default())
}

/// Load configuration from a specific file
pub fn load_from_file(path: &Path) -> AnalysisResult<HardwareConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = from_toml(&content)
        .map_err(|e| AnalysisError::config(format!("{}: {}", path.display(), e)))?;
    log::info!("Loaded hardware config from {}", path.display());
    Ok(config)
}

/// Parse a configuration from TOML text
pub fn from_toml(content: &str) -> AnalysisResult<HardwareConfig> {
    let config: HardwareConfig =
        toml::from_str(content).map_err(|e| AnalysisError::config(e.to_string()))?;
    if config.num_pes <= 0 {
        return Err(AnalysisError::config(format!(
            "num_pes must be positive, got {}",
            config.num_pes
        )));
    }
    Ok(config)
}

/// Sample configuration file content
pub fn sample_config() -> String {
    let config = HardwareConfig::default();
    let body = toml::to_string_pretty(&config).unwrap_or_default();
    format!(
        "# dfcost hardware configuration\n# Place this file at ./{} or pass it with --hw\n\n{}",
        LOCAL_CONFIG_FILE, body
    )
}
