//! Collaborator contracts consumed by the session
//!
//! The session core never resolves names, parses units, reads the simulation
//! clock or touches sockets itself. Each of those concerns is a trait here,
//! along with one in-memory implementation used by hosts and tests.

pub mod clock;
pub mod resolver;
pub mod transport;
pub mod units;

// Re-export key types for convenience
pub use clock::{ManualClock, SimClock};
pub use resolver::{SimCell, Storage, SymbolResolver, SymbolTable};
pub use transport::{MockTransport, Transport};
pub use units::{Dimension, LinearUnitSystem, Unit, UnitConversion, UnitSystem};
