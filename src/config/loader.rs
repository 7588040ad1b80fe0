//! Configuration file parsing (TOML or JSON, chosen by extension).
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// On-disk format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// TOML (the default for any extension other than `.json`).
    Toml,
    /// JSON.
    Json,
}

impl Format {
    /// Pick the format for `path` from its extension.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Deserialise `content` as `format`, labelling errors with `origin`.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the text is not valid for the target type.
pub fn parse_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    origin: &str,
) -> Result<T, ConfigError> {
    let parsed = match format {
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string().trim_end().to_string()),
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: origin.to_string(),
        message,
    })
}

/// Read and deserialise the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read or
/// [`ConfigError::Parse`] if it cannot be deserialised.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&content, Format::for_path(path), &path.display().to_string())
}
