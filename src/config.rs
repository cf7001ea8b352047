//! Evaluation limits.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::path::Path;

/// Default cap on the number of elements a function may produce
pub const DEFAULT_MAX_ARRAY_SIZE: usize = 1 << 20;

/// Default cap on the byte length of a produced string
pub const DEFAULT_MAX_STRING_SIZE: usize = 10 << 20;

/// Read-only configuration consulted during evaluation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Largest array ARRAY_RANGE, ARRAY_REPEAT and friends may build
    pub max_array_size: usize,
    /// Largest string REPEAT and CONCAT may build
    pub max_string_size: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
        }
    }
}

impl EvalConfig {
    /// Load a configuration from a JSON file. Absent fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid evaluation config")
    }

    pub fn with_max_array_size(mut self, max_array_size: usize) -> Self {
        self.max_array_size = max_array_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.max_array_size, DEFAULT_MAX_ARRAY_SIZE);
        assert_eq!(config.max_string_size, DEFAULT_MAX_STRING_SIZE);
    }

    #[test]
    fn test_partial_json() -> Result<()> {
        let config = EvalConfig::from_json(r#"{"max_array_size": 16}"#)?;
        assert_eq!(config.max_array_size, 16);
        assert_eq!(config.max_string_size, DEFAULT_MAX_STRING_SIZE);

        assert!(EvalConfig::from_json(r#"{"bogus": 1}"#).is_err());
        Ok(())
    }
}
