//! Serialization of task documents to JSON or YAML.

use std::fmt;
use std::path::Path;

use meshplan_common::error::Result;
use serde::Serialize;

/// Output encoding of rendered documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl Format {
    /// Guesses the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }

    /// Serializes `value` in this format.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn render<T: Serialize + ?Sized>(self, value: &T) -> Result<String> {
        match self {
            Self::Json => {
                let mut out = serde_json::to_string_pretty(value)?;
                out.push('\n');
                Ok(out)
            }
            Self::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}
