//! Engine tuning knobs, loaded the way this codebase's other crates load
//! their `.toml` configuration: `serde` + `toml`, defaults for every field
//! so an absent or partial config file never fails to load.

use serde::Deserialize;

fn default_cheap_tokenization_threshold() -> usize {
    2048
}

fn default_background_slice_budget_millis() -> u64 {
    1
}

/// Tunables referenced by name throughout the scheduler and cheap-query
/// check, rather than inlined as magic numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerEngineConfig {
    /// Lines at or under this many characters are considered "cheap" to
    /// tokenize synchronously even outside a forced range (spec 6).
    #[serde(default = "default_cheap_tokenization_threshold")]
    pub cheap_tokenization_threshold: usize,

    /// Target wall-clock budget for one background slice before yielding
    /// (spec 4.3.1).
    #[serde(default = "default_background_slice_budget_millis")]
    pub background_slice_budget_millis: u64,
}

impl Default for TokenizerEngineConfig {
    fn default() -> Self {
        Self {
            cheap_tokenization_threshold: default_cheap_tokenization_threshold(),
            background_slice_budget_millis: default_background_slice_budget_millis(),
        }
    }
}

impl TokenizerEngineConfig {
    /// Parse from a TOML document, falling back to defaults for any field
    /// the document omits. An empty string yields all-default config.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(s)?)
    }
}
