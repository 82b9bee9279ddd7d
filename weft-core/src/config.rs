//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning knobs shared by every component mounted on one scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of rebuild rounds a single `Scheduler::flush` may run.
    /// A rebuild that dirties another component (or itself) adds a round.
    pub max_flush_rounds: usize,

    /// Treat a pass that declares fewer slots than the first pass as a fatal
    /// usage error. On by default; turning it off downgrades a shortfall to
    /// a warning. Declaring more than the first pass is always fatal.
    pub strict_slot_counts: bool,

    /// Emit a trace event for every value newly tracked by a render pass.
    pub trace_reads: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: 64,
            strict_slot_counts: true,
            trace_reads: false,
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "max_flush_rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
