//! Runtime configuration for the timer wheel.
//!
//! Wheel geometry (`HZ`, `DEPTH`, `LEVEL_BITS`, `SHIFT`) is compile-time so
//! the bucket math stays branch-free; what remains configurable at runtime
//! are the pacing and capacity knobs. Configuration can be built in code or
//! loaded from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Runtime knobs for a [`TimerWheel`](crate::timer::TimerWheel).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Halve the owed jiffy budget per tick (`n = (n >> 1) + 1`).
    ///
    /// A pacing heuristic for hosts with long frames: instead of running
    /// every owed jiffy in one burst, catch-up is amortised across several
    /// frames. Off by default; not required for correctness.
    pub smooth_catch_up: bool,

    /// Upper bound on concurrently registered timers.
    pub max_timers: usize,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            smooth_catch_up: false,
            max_timers: 1 << 20,
        }
    }
}

impl WheelConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("failed to read config file: {e}")))?;
        Self::from_toml_str(&text)
    }

    /// Check the configuration for inconsistent values.
    pub fn validate(&self) -> Result<()> {
        if self.max_timers == 0 {
            return Err(Error::config("max_timers must be greater than 0"));
        }
        Ok(())
    }
}
