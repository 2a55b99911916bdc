//! Copy scheduling for one session
//!
//! The model thread publishes a [`FrameEvent`] at the end of every frame. Each
//! session decides from its cadence whether that frame triggers a copy.

use var_server_session::{CadenceController, CopyMode};

/// End-of-frame notification from the model thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEvent {
    /// Frame counter, starting at 1
    pub frame: u64,
    /// Simulation time at the end of the frame
    pub tics: i64,
    /// Freeze-mode time at the end of the frame
    pub freeze_tics: i64,
    pub frozen: bool,
}

/// Whether `event` triggers a copy, advancing the schedule when it does
pub fn copy_due(cadence: &mut CadenceController, event: &FrameEvent) -> bool {
    match cadence.copy_mode() {
        CopyMode::Async => false,
        CopyMode::Scheduled if event.frozen => {
            if cadence.freeze_next_tics() <= event.freeze_tics {
                cadence.advance_freeze(event.freeze_tics);
                true
            } else {
                false
            }
        }
        CopyMode::Scheduled => {
            if cadence.is_copy_due(event.tics) {
                cadence.advance(event.tics);
                true
            } else {
                false
            }
        }
        CopyMode::TopOfFrame => {
            let (multiple, offset) = if event.frozen {
                (cadence.freeze_frame_multiple(), cadence.freeze_frame_offset())
            } else {
                (cadence.frame_multiple(), cadence.frame_offset())
            };
            event.frame % u64::from(multiple.max(1)) == u64::from(offset)
        }
    }
}
