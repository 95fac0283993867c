// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for loading configuration
//! and seed data from files.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, Seed};

/// Load configuration from a TOML file and apply environment overrides.
///
/// Falls back to defaults if loading fails.
pub fn load_config(path: &Path) -> Config {
    let mut config = Config::load_or_default(path);
    config.apply_env_overrides();
    config
}

/// Load seed data from a TOML file.
pub fn load_seed(path: &Path) -> Result<Seed> {
    Seed::load(path)
        .map_err(|e| AppError::config(format!("Failed to load seed from {path:?}: {e}")))
}

/// Load and validate both config and seed data.
pub fn load_all(config_path: &Path, seed_path: &Path) -> Result<(Config, Seed)> {
    let config = load_config(config_path);
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration: {e}")))?;

    let seed = load_seed(seed_path)?;
    seed.validate()
        .map_err(|e| AppError::config(format!("Invalid seed data: {e}")))?;

    Ok((config, seed))
}
