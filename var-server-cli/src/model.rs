//! Demonstration model: a bouncing ball
//!
//! Runs on its own thread, integrates one frame per `frame_seconds` of wall
//! time, writes its state into the symbol table and publishes a frame event
//! to every connected session.

use crate::scheduler::FrameEvent;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use var_server_session::{ManualClock, SimCell, SimClock, SymbolTable, TypeDescriptor, VarKind};

const GRAVITY: f64 = -9.81;
const RESTITUTION: f64 = 0.8;

/// Fan-out of frame events to sessions
#[derive(Clone, Default)]
pub struct FrameBus {
    subscribers: Arc<Mutex<Vec<Sender<FrameEvent>>>>,
}

impl FrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<FrameEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publish to every live subscriber, forgetting the disconnected ones
    pub fn publish(&self, event: FrameEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

struct BallCells {
    time: SimCell,
    position: [SimCell; 2],
    velocity: [SimCell; 2],
    bounces: SimCell,
    airborne: SimCell,
    flags: SimCell,
}

/// Ball state and the cells it is published through
pub struct BallModel {
    position: [f64; 2],
    velocity: [f64; 2],
    bounces: i32,
    cells: BallCells,
}

impl BallModel {
    /// Register the ball's variables in `table`
    pub fn new(table: &SymbolTable) -> Self {
        let double = |name: &str, units: &str| {
            table.insert(name, TypeDescriptor::scalar(VarKind::Double, units))
        };
        let cells = BallCells {
            time: double("sys.exec.out.time", "s"),
            position: [
                double("ball.state.output_position[0]", "m"),
                double("ball.state.output_position[1]", "m"),
            ],
            velocity: [
                double("ball.state.output_velocity[0]", "m/s"),
                double("ball.state.output_velocity[1]", "m/s"),
            ],
            bounces: table.insert(
                "ball.state.bounce_count",
                TypeDescriptor::scalar(VarKind::Int, "1"),
            ),
            airborne: table.insert(
                "ball.state.airborne",
                TypeDescriptor::scalar(VarKind::Boolean, "1"),
            ),
            flags: table.insert("ball.state.phase", TypeDescriptor::bitfield(false, 4, 0, 3)),
        };

        let model = Self {
            position: [0.0, 10.0],
            velocity: [2.0, 0.0],
            bounces: 0,
            cells,
        };
        model.publish(0.0);
        model
    }

    /// Advance the ball by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        self.velocity[1] += GRAVITY * dt;
        self.position[0] += self.velocity[0] * dt;
        self.position[1] += self.velocity[1] * dt;

        if self.position[1] < 0.0 {
            self.position[1] = -self.position[1];
            self.velocity[1] = -self.velocity[1] * RESTITUTION;
            self.bounces += 1;
        }
    }

    pub fn bounces(&self) -> i32 {
        self.bounces
    }

    /// Write the current state into the symbol table
    pub fn publish(&self, seconds: f64) {
        let cells = &self.cells;
        cells.time.set_f64(seconds);
        for axis in 0..2 {
            cells.position[axis].set_f64(self.position[axis]);
            cells.velocity[axis].set_f64(self.velocity[axis]);
        }
        cells.bounces.set_i32(self.bounces);
        cells.airborne.set_bool(self.position[1] > 0.01);
        cells.flags.set_field(0, 3, (self.bounces % 8) as u64);
    }
}

/// Spawn the model thread
///
/// Runs until `running` is cleared.
pub fn spawn(
    mut model: BallModel,
    clock: Arc<ManualClock>,
    frame_seconds: f64,
    bus: FrameBus,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let frame_tics = ((frame_seconds * clock.tics_per_second() as f64).round() as i64).max(1);
    let period = Duration::from_secs_f64(frame_seconds);

    thread::Builder::new()
        .name("ball-model".to_string())
        .spawn(move || {
            log::info!(
                "Model running: {} tics per frame, {:?} per frame",
                frame_tics,
                period
            );
            let mut frame: u64 = 0;
            let mut deadline = Instant::now() + period;

            while running.load(Ordering::Relaxed) {
                model.step(frame_seconds);
                let tics = clock.advance(frame_tics);
                model.publish(clock.seconds());
                frame += 1;

                bus.publish(FrameEvent {
                    frame,
                    tics,
                    freeze_tics: clock.current_freeze_tics(),
                    frozen: false,
                });

                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
                deadline += period;
            }
            log::info!(
                "Model stopped after {} frames ({} bounces)",
                frame,
                model.bounces()
            );
        })
}
