//! Copy/write cadence
//!
//! Records when the session wants the copy step and the network write to run.
//! It never triggers a copy itself: the host's scheduler polls
//! [`CadenceController::next_tics`] (and the freeze variant) and drives the
//! session accordingly.

use crate::external::SimClock;
use crate::types::{Result, SessionError};
use serde::{Deserialize, Serialize};

/// Tic value meaning "never due via the schedule"
pub const NEVER_TICS: i64 = i64::MAX;

/// When the copy step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    /// Copy from the writer's own loop, every cycle
    #[default]
    Async,
    /// Copy on aligned `cycle_tics` boundaries of simulation time
    Scheduled,
    /// Copy at top-of-frame boundaries
    TopOfFrame,
}

impl TryFrom<i32> for CopyMode {
    type Error = SessionError;

    fn try_from(mode: i32) -> Result<Self> {
        match mode {
            0 => Ok(CopyMode::Async),
            1 => Ok(CopyMode::Scheduled),
            2 => Ok(CopyMode::TopOfFrame),
            other => Err(SessionError::InvalidCopyMode(other)),
        }
    }
}

/// When the network write runs relative to copying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write from the writer's own loop
    #[default]
    Async,
    /// Write right after each copy
    WhenCopied,
}

impl TryFrom<i32> for WriteMode {
    type Error = SessionError;

    fn try_from(mode: i32) -> Result<Self> {
        match mode {
            0 => Ok(WriteMode::Async),
            1 => Ok(WriteMode::WhenCopied),
            other => Err(SessionError::InvalidWriteMode(other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CadenceController {
    copy_mode: CopyMode,
    write_mode: WriteMode,
    update_rate: f64,
    cycle_tics: i64,
    next_tics: i64,
    freeze_next_tics: i64,
    frame_multiple: u32,
    frame_offset: u32,
    freeze_frame_multiple: u32,
    freeze_frame_offset: u32,
}

impl CadenceController {
    /// Controller in (ASYNC, ASYNC) with the given cycle
    pub fn new(update_rate: f64, clock: &dyn SimClock) -> Self {
        let mut cadence = Self {
            copy_mode: CopyMode::Async,
            write_mode: WriteMode::Async,
            update_rate,
            cycle_tics: 1,
            next_tics: NEVER_TICS,
            freeze_next_tics: NEVER_TICS,
            frame_multiple: 1,
            frame_offset: 0,
            freeze_frame_multiple: 1,
            freeze_frame_offset: 0,
        };
        cadence.set_cycle(update_rate, clock);
        cadence
    }

    /// Set the copy mode from its numeric code
    ///
    /// Entering SCHEDULED aligns `next_tics` (and `freeze_next_tics`) on the
    /// next `cycle_tics` boundary strictly after the current clock reading.
    pub fn set_copy_mode(&mut self, mode: i32, clock: &dyn SimClock) -> Result<()> {
        let mode = CopyMode::try_from(mode)?;
        self.apply_copy_mode(mode, clock);
        Ok(())
    }

    pub fn apply_copy_mode(&mut self, mode: CopyMode, clock: &dyn SimClock) {
        self.copy_mode = mode;
        if mode == CopyMode::Scheduled {
            self.next_tics = Self::next_boundary(clock.current_tics(), self.cycle_tics);
            self.freeze_next_tics =
                Self::next_boundary(clock.current_freeze_tics(), self.cycle_tics);
        } else {
            self.next_tics = NEVER_TICS;
        }
    }

    /// Set the write mode from its numeric code
    pub fn set_write_mode(&mut self, mode: i32) -> Result<()> {
        self.write_mode = WriteMode::try_from(mode)?;
        Ok(())
    }

    pub fn apply_write_mode(&mut self, mode: WriteMode) {
        self.write_mode = mode;
    }

    /// Set the update period in seconds and derive `cycle_tics`
    ///
    /// `cycle_tics` never drops below one tic.
    pub fn set_cycle(&mut self, rate_seconds: f64, clock: &dyn SimClock) {
        self.update_rate = rate_seconds;
        let tics = (rate_seconds * clock.tics_per_second() as f64).round();
        self.cycle_tics = if tics.is_finite() && tics >= 1.0 {
            tics as i64
        } else {
            1
        };
    }

    /// Composite mode preset: 1 = scheduled copy, 2 = scheduled copy with
    /// write-when-copied, anything else = fully asynchronous
    pub fn sync(&mut self, preset: i32, clock: &dyn SimClock) {
        let (copy, write) = match preset {
            1 => (CopyMode::Scheduled, WriteMode::Async),
            2 => (CopyMode::Scheduled, WriteMode::WhenCopied),
            _ => (CopyMode::Async, WriteMode::Async),
        };
        self.apply_copy_mode(copy, clock);
        self.apply_write_mode(write);
    }

    /// Move `next_tics` past `now` after the scheduler has served a copy
    pub fn advance(&mut self, now: i64) {
        if self.next_tics == NEVER_TICS {
            return;
        }
        if self.next_tics <= now {
            self.next_tics = Self::next_boundary(now, self.cycle_tics);
        }
    }

    /// Freeze-clock counterpart of [`CadenceController::advance`]
    pub fn advance_freeze(&mut self, now: i64) {
        if self.copy_mode == CopyMode::Scheduled && self.freeze_next_tics <= now {
            self.freeze_next_tics = Self::next_boundary(now, self.cycle_tics);
        }
    }

    /// Whether a scheduled copy is due at `now`
    pub fn is_copy_due(&self, now: i64) -> bool {
        self.copy_mode == CopyMode::Scheduled && now >= self.next_tics
    }

    fn next_boundary(now: i64, cycle_tics: i64) -> i64 {
        let cycle = cycle_tics.max(1);
        now - now.rem_euclid(cycle) + cycle
    }

    pub fn set_frame_multiple(&mut self, multiple: u32) {
        self.frame_multiple = multiple;
    }

    pub fn set_frame_offset(&mut self, offset: u32) {
        self.frame_offset = offset;
    }

    pub fn set_freeze_frame_multiple(&mut self, multiple: u32) {
        self.freeze_frame_multiple = multiple;
    }

    pub fn set_freeze_frame_offset(&mut self, offset: u32) {
        self.freeze_frame_offset = offset;
    }

    pub fn copy_mode(&self) -> CopyMode {
        self.copy_mode
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn update_rate(&self) -> f64 {
        self.update_rate
    }

    pub fn cycle_tics(&self) -> i64 {
        self.cycle_tics
    }

    pub fn next_tics(&self) -> i64 {
        self.next_tics
    }

    pub fn freeze_next_tics(&self) -> i64 {
        self.freeze_next_tics
    }

    pub fn frame_multiple(&self) -> u32 {
        self.frame_multiple
    }

    pub fn frame_offset(&self) -> u32 {
        self.frame_offset
    }

    pub fn freeze_frame_multiple(&self) -> u32 {
        self.freeze_frame_multiple
    }

    pub fn freeze_frame_offset(&self) -> u32 {
        self.freeze_frame_offset
    }
}
