//! Configuration loading for the replay tool.

use anyhow::{Context, Result};
use notify_core::EngineConfig;
use std::path::Path;

/// Load engine configuration from a JSON file, or use defaults without one.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        tracing::info!("No config file given, using defaults");
        return Ok(EngineConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = EngineConfig::from_json_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    tracing::info!("Loaded configuration from {:?}", path);
    Ok(config)
}
