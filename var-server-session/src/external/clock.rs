//! Simulation execution clock

use std::sync::atomic::{AtomicI64, Ordering};

/// Read-only view of the simulation's execution clock
pub trait SimClock: Send + Sync {
    /// Number of tics in one simulated second
    fn tics_per_second(&self) -> i64;

    /// Current simulation time in tics
    fn current_tics(&self) -> i64;

    /// Current freeze-mode time in tics
    fn current_freeze_tics(&self) -> i64;
}

/// Clock whose tic counters are advanced explicitly by the host
#[derive(Debug)]
pub struct ManualClock {
    tics_per_second: i64,
    tics: AtomicI64,
    freeze_tics: AtomicI64,
}

impl ManualClock {
    pub fn new(tics_per_second: i64) -> Self {
        Self {
            tics_per_second: tics_per_second.max(1),
            tics: AtomicI64::new(0),
            freeze_tics: AtomicI64::new(0),
        }
    }

    pub fn set_tics(&self, tics: i64) {
        self.tics.store(tics, Ordering::Release);
    }

    pub fn set_freeze_tics(&self, tics: i64) {
        self.freeze_tics.store(tics, Ordering::Release);
    }

    /// Advance simulation time, returning the new tic count
    pub fn advance(&self, tics: i64) -> i64 {
        self.tics.fetch_add(tics, Ordering::AcqRel) + tics
    }

    /// Current simulation time in seconds
    pub fn seconds(&self) -> f64 {
        self.current_tics() as f64 / self.tics_per_second as f64
    }
}

impl SimClock for ManualClock {
    fn tics_per_second(&self) -> i64 {
        self.tics_per_second
    }

    fn current_tics(&self) -> i64 {
        self.tics.load(Ordering::Acquire)
    }

    fn current_freeze_tics(&self) -> i64 {
        self.freeze_tics.load(Ordering::Acquire)
    }
}
