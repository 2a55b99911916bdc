//! Variable Server Session Library
//!
//! The per-client session engine of a simulation variable server: clients
//! subscribe to named simulation variables and receive their values
//! periodically or on demand, in ascii or binary form.
//!
//! # Architecture
//!
//! - Keeps an ordered registry of subscribed variables
//! - Double-buffers values between the simulation thread and the writer
//! - Schedules copies by wall time, fixed tic cycle, or frame boundary
//! - Converts values to client-requested units at serialization time
//! - Encodes ascii and chunked binary messages
//!
//! The library does NOT:
//! - Parse client commands
//! - Own the socket accept loop or thread scheduling
//! - Know where simulation variables live (a [`SymbolResolver`] does)
//!
//! Those belong to the host (see `var-server-cli`).
//!
//! # Example Usage
//!
//! ```no_run
//! use var_server_session::{
//!     LinearUnitSystem, ManualClock, MockTransport, SessionConfig, SessionServices,
//!     SymbolTable, TypeDescriptor, VarKind, VariableServerSession,
//! };
//! use std::sync::Arc;
//!
//! let table = Arc::new(SymbolTable::new());
//! let altitude = table.insert("ball.altitude", TypeDescriptor::scalar(VarKind::Double, "ft"));
//! altitude.set_f64(10.0);
//!
//! let services = SessionServices {
//!     resolver: table.clone(),
//!     units: Arc::new(LinearUnitSystem::new()),
//!     clock: Arc::new(ManualClock::new(1_000_000)),
//! };
//! let transport = MockTransport::new();
//! let mut session =
//!     VariableServerSession::new(&SessionConfig::new(), services, Box::new(transport.clone()))
//!         .unwrap();
//!
//! session.var_add_with_units("ball.altitude", "m").unwrap();
//! session.var_send().unwrap();
//! println!("{}", String::from_utf8_lossy(&transport.written()));
//! ```

// Public modules
pub mod binding;
pub mod cadence;
pub mod config;
pub mod copier;
pub mod external;
pub mod registry;
pub mod session;
pub mod state;
pub mod types;
pub mod units_converter;
pub mod wire;

// Re-export main types for convenience
pub use binding::VariableBinding;
pub use cadence::{CadenceController, CopyMode, WriteMode};
pub use config::SessionConfig;
pub use copier::{CommitOutcome, DoubleBufferCopier};
pub use external::{
    LinearUnitSystem, ManualClock, MockTransport, SimCell, SimClock, SymbolResolver, SymbolTable,
    Transport, UnitConversion, UnitSystem,
};
pub use registry::SubscriptionRegistry;
pub use session::{SessionServices, VariableServerSession, WriteOutcome};
pub use state::SessionState;
pub use types::{MessageType, Result, SessionError, SimValue, TypeDescriptor, VarKind};
pub use units_converter::{UnitsConverter, UnitsOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
