//! Config file loading.
//!
//! A missing or malformed config file is never fatal: the loader logs and
//! falls back to [`ParleyConfig::default`].

use std::path::{Path, PathBuf};

use parley_types::config::ParleyConfig;

/// Resolve where `config.toml` lives.
///
/// Priority:
/// 1. `PARLEY_CONFIG` environment variable (path to the file itself)
/// 2. `~/.parley/config.toml`
/// 3. `.parley/config.toml` in the working directory
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        return PathBuf::from(path);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley").join("config.toml");
    }

    PathBuf::from(".parley").join("config.toml")
}

/// Load the config at `path`, or defaults if it is missing or invalid.
pub async fn load_config(path: &Path) -> ParleyConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return ParleyConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return ParleyConfig::default();
        }
    };

    match toml::from_str::<ParleyConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            ParleyConfig::default()
        }
    }
}
