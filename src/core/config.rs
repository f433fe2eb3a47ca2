/// Generation settings, loadable from RON.
use crate::schema::document::ron_options;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Settings shared by every run of a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base seed; run `n` of an engine is seeded with `seed + n`.
    pub seed: u64,
    /// How many outputs the tools produce per invocation.
    pub runs: usize,
    /// Joins produced fragments in the flattened output.
    pub separator: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            runs: 1,
            separator: "\n".to_string(),
        }
    }
}

impl GenerationConfig {
    /// Load a config from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<GenerationConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a config from a RON string. Missing fields take defaults.
    pub fn parse_ron(input: &str) -> Result<GenerationConfig, ConfigError> {
        Ok(ron_options().from_str(input)?)
    }
}
