//! Loading session settings from TOML.

use antiphase_io::SessionConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Settings parsed but cannot be used
    #[error("invalid settings: {0}")]
    Invalid(#[from] antiphase_io::Error),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }
}

/// Parse settings from TOML text.
pub fn parse_config(text: &str) -> Result<SessionConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Load settings from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<SessionConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config = parse_config(&text)?;
    tracing::debug!(path = %path.display(), "settings loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_gives_defaults() {
        assert_eq!(load_config(None).unwrap(), SessionConfig::default());
    }

    #[test]
    fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffer_size = 512\n[controls]\ndelay = 20.0").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.controls.delay, 20.0);
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let err = load_config(Some(Path::new("/nonexistent/antiphase.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
        assert!(err.to_string().contains("/nonexistent/antiphase.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = parse_config("sample_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
        assert!(err.to_string().starts_with("failed to parse TOML"));
    }
}
