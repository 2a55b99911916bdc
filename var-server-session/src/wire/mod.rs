//! Wire encoders
//!
//! # Binary format
//!
//! ```text
//! ┌──────────────┬──────────────┬────────────────┬─────────────────────────┐
//! │ message_type │ payload_size │ variable_count │ records...              │
//! │ int32        │ int32        │ int32          │                         │
//! └──────────────┴──────────────┴────────────────┴─────────────────────────┘
//!
//! record: [name_length:int32 name_bytes] type_code:int32 value_size:int32 value_bytes
//! ```
//!
//! - `payload_size` counts every byte after the `payload_size` field
//! - The name pair is omitted when names are suppressed
//! - All integers and value bytes are in host order, reversed when byteswap is on
//! - A packet never exceeds [`MAX_MSG_LEN`]; longer lists span several packets
//!
//! # Ascii format
//!
//! `message_type`, then one tab-separated token per variable, then a newline.
//! Ascii messages are never split.

pub mod ascii;
pub mod binary;
pub mod bits;

pub use ascii::encode_ascii;
pub use binary::{decode_binary, BinaryOptions, BinaryPackets, DecodedPacket, DecodedVariable};

use crate::external::UnitConversion;
use crate::types::{SimValue, VarKind};
use std::sync::Arc;

/// Maximum size of one binary packet in bytes
pub const MAX_MSG_LEN: usize = 8192;

/// Owned snapshot of one variable, ready to encode
#[derive(Debug, Clone, PartialEq)]
pub struct WireValue {
    pub name: Arc<str>,
    pub kind: VarKind,
    /// Native-endian storage bytes as copied from the simulation
    pub bytes: Vec<u8>,
    pub conversion: Option<UnitConversion>,
    /// Units the client asked for, shown in ascii output
    pub units: Option<Arc<str>>,
}

impl WireValue {
    /// Value as sent: bit-fields extracted, units conversion applied
    ///
    /// Conversion is skipped for bit-fields, booleans and unresolved entries.
    pub fn value(&self) -> SimValue {
        let raw = self.kind.read_native(&self.bytes);
        if self.kind.is_bitfield() {
            return raw;
        }
        match raw {
            SimValue::Boolean(_) | SimValue::Unresolved => raw,
            _ => match self.conversion {
                Some(conversion) if !conversion.is_identity() => {
                    SimValue::Float(conversion.apply(raw.as_f64()))
                }
                _ => raw,
            },
        }
    }

    /// Value bytes as sent, in host order
    pub fn value_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.kind.wire_size());
        self.kind.write_native(&self.value(), &mut out);
        out
    }
}
