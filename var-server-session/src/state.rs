//! Per-session state
//!
//! Output format switches, debug level, the cadence settings and the
//! cooperative control flags polled by the owning control loop.

use crate::cadence::CadenceController;
use crate::config::SessionConfig;
use crate::external::SimClock;
use crate::wire::BinaryOptions;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub binary_mode: bool,
    pub names_suppressed: bool,
    pub byteswap: bool,
    pub debug_level: i32,
    pub cadence: CadenceController,
    pub paused: bool,
    pub exit_requested: bool,
    pub validate_address: bool,
    pub send_stdio: bool,
}

impl SessionState {
    /// Initial state from configuration
    pub fn from_config(config: &SessionConfig, clock: &dyn SimClock) -> Self {
        let mut cadence = CadenceController::new(config.cycle_seconds, clock);
        cadence.set_frame_multiple(config.frame_multiple);
        cadence.set_frame_offset(config.frame_offset);
        cadence.set_freeze_frame_multiple(config.freeze_frame_multiple);
        cadence.set_freeze_frame_offset(config.freeze_frame_offset);
        cadence.apply_copy_mode(config.copy_mode, clock);
        cadence.apply_write_mode(config.write_mode);

        Self {
            binary_mode: config.binary,
            names_suppressed: config.names_suppressed,
            byteswap: config.byteswap,
            debug_level: config.debug_level,
            cadence,
            paused: false,
            exit_requested: false,
            validate_address: config.validate_address,
            send_stdio: config.send_stdio,
        }
    }

    /// Binary encoding switches for the current state
    pub fn binary_options(&self) -> BinaryOptions {
        BinaryOptions {
            include_names: !self.names_suppressed,
            byteswap: self.byteswap,
        }
    }
}
