//! Session configuration types
//!
//! Initial state of a session. Every field can later be changed by the
//! corresponding session command; the configuration only sets the defaults a
//! client sees on connect.

use crate::cadence::{CopyMode, WriteMode};
use crate::types::{Result, SessionError};
use serde::{Deserialize, Serialize};

/// Configuration for a variable server session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Send binary messages instead of ascii
    #[serde(default)]
    pub binary: bool,

    /// Omit variable names from binary records
    #[serde(default)]
    pub names_suppressed: bool,

    /// Reverse byte order of binary messages
    #[serde(default)]
    pub byteswap: bool,

    /// Debug verbosity (2 and above traces every message)
    #[serde(default)]
    pub debug_level: i32,

    /// Update period in seconds (default: 0.1)
    #[serde(default = "default_cycle_seconds")]
    pub cycle_seconds: f64,

    #[serde(default)]
    pub copy_mode: CopyMode,

    #[serde(default)]
    pub write_mode: WriteMode,

    #[serde(default = "default_multiple")]
    pub frame_multiple: u32,

    #[serde(default)]
    pub frame_offset: u32,

    #[serde(default = "default_multiple")]
    pub freeze_frame_multiple: u32,

    #[serde(default)]
    pub freeze_frame_offset: u32,

    /// Check addresses before dereferencing (recorded for the resolver)
    #[serde(default)]
    pub validate_address: bool,

    /// Redirect standard output to the client
    #[serde(default)]
    pub send_stdio: bool,
}

fn default_cycle_seconds() -> f64 {
    0.1
}

fn default_multiple() -> u32 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            binary: false,
            names_suppressed: false,
            byteswap: false,
            debug_level: 0,
            cycle_seconds: default_cycle_seconds(),
            copy_mode: CopyMode::default(),
            write_mode: WriteMode::default(),
            frame_multiple: default_multiple(),
            frame_offset: 0,
            freeze_frame_multiple: default_multiple(),
            freeze_frame_offset: 0,
            validate_address: false,
            send_stdio: false,
        }
    }
}

impl SessionConfig {
    /// Create a new session configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: binary output
    pub fn with_binary(mut self, enabled: bool) -> Self {
        self.binary = enabled;
        self
    }

    /// Builder method: binary output without names
    pub fn with_names_suppressed(mut self, suppressed: bool) -> Self {
        self.names_suppressed = suppressed;
        self
    }

    /// Builder method: byte-swapped binary output
    pub fn with_byteswap(mut self, enabled: bool) -> Self {
        self.byteswap = enabled;
        self
    }

    /// Builder method: update period in seconds
    pub fn with_cycle(mut self, seconds: f64) -> Self {
        self.cycle_seconds = seconds;
        self
    }

    /// Builder method: copy and write modes
    pub fn with_modes(mut self, copy_mode: CopyMode, write_mode: WriteMode) -> Self {
        self.copy_mode = copy_mode;
        self.write_mode = write_mode;
        self
    }

    /// Builder method: debug level
    pub fn with_debug_level(mut self, level: i32) -> Self {
        self.debug_level = level;
        self
    }

    /// Reject settings a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.cycle_seconds.is_finite() || self.cycle_seconds <= 0.0 {
            return Err(SessionError::InvalidConfig(format!(
                "cycle_seconds must be positive, got {}",
                self.cycle_seconds
            )));
        }
        if self.frame_multiple == 0 || self.freeze_frame_multiple == 0 {
            return Err(SessionError::InvalidConfig(
                "frame multiples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
