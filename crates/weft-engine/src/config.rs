//! Weaving configuration (`[weave]` table)
//!
//! ```toml
//! [weave]
//! max_depth = 32
//! trace = true
//! after_on_short_circuit = false
//! after_on_fault = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Fits nested script recursion in a 2 MiB thread stack, the std default
fn default_max_depth() -> usize {
    64
}

fn default_trace() -> bool {
    true
}

/// Weaver settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeaveConfig {
    /// Maximum nested invocations per chain before `CallDepthExceeded`
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Record trace events on call chains
    #[serde(default = "default_trace")]
    pub trace: bool,

    /// Run the exit after-chain when before advice short-circuits
    #[serde(default)]
    pub after_on_short_circuit: bool,

    /// Run the exit after-chain when the body faults
    #[serde(default)]
    pub after_on_fault: bool,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            trace: default_trace(),
            after_on_short_circuit: false,
            after_on_fault: false,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    weave: WeaveConfig,
}

impl WeaveConfig {
    /// Parse the `[weave]` table of a TOML document; missing table means defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        file.weave.validate()?;
        Ok(file.weave)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Set the depth limit
    pub fn max_depth(mut self, limit: usize) -> Self {
        self.max_depth = limit;
        self
    }

    /// Enable or disable tracing
    pub fn trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    /// Run after advice on short-circuit
    pub fn after_on_short_circuit(mut self, enabled: bool) -> Self {
        self.after_on_short_circuit = enabled;
        self
    }

    /// Run after advice on fault
    pub fn after_on_fault(mut self, enabled: bool) -> Self {
        self.after_on_fault = enabled;
        self
    }
}
