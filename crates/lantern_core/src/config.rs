//! Lighting configuration persistence.
//!
//! [`DeferredLightingConfig`] is stored as pretty-printed JSON. Missing fields
//! take their default values, so a file may set only `ambient`.
//!
//! ```json
//! {
//!   "ambient": [0.2, 0.2, 0.25, 1.0],
//!   "clear_color": [0.0, 0.0, 0.0, 1.0],
//!   "target": "screen"
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::deferred::DeferredLightingConfig;

/// Errors that can occur while loading or saving a lighting config.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error
    Io(std::io::Error),
    /// JSON serialization error
    Json(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load a lighting config from a JSON file.
pub fn load_lighting_config<P: AsRef<Path>>(path: P) -> ConfigResult<DeferredLightingConfig> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let config: DeferredLightingConfig = serde_json::from_reader(reader)?;
    Ok(config)
}

/// Save a lighting config as JSON.
pub fn save_lighting_config<P: AsRef<Path>>(
    config: &DeferredLightingConfig,
    path: P,
) -> ConfigResult<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, config)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::GBufferTarget;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_load() {
        let config = DeferredLightingConfig {
            ambient: [0.3, 0.2, 0.1, 1.0],
            clear_color: [0.05, 0.05, 0.1, 1.0],
            target: GBufferTarget::Screen,
        };
        let temp_file = NamedTempFile::with_suffix(".json").unwrap();

        save_lighting_config(&config, temp_file.path()).unwrap();
        let loaded = load_lighting_config(temp_file.path()).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        temp_file
            .write_all(br#"{ "target": "screen" }"#)
            .unwrap();

        let loaded = load_lighting_config(temp_file.path()).unwrap();
        let defaults = DeferredLightingConfig::default();

        assert_eq!(loaded.target, GBufferTarget::Screen);
        assert_eq!(loaded.ambient, defaults.ambient);
        assert_eq!(loaded.clear_color, defaults.clear_color);
    }

    #[test]
    fn test_invalid_json() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        temp_file.write_all(b"{ not json").unwrap();

        let result = load_lighting_config(temp_file.path());
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_lighting_config(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
