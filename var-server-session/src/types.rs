//! Core types for the variable server session
//!
//! This module defines the type descriptors attached to resolved variables, the
//! values read out of their buffers, the wire message types, and the error type
//! shared by every session operation.

use byteorder::{ByteOrder, NativeEndian};
use std::fmt;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while serving a session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("units error for [{variable}] [{units}]")]
    UnitParse { variable: String, units: String },

    #[error("[{variable}] cannot convert units from [{from}] to [{to}]")]
    IncompatibleUnits {
        variable: String,
        from: String,
        to: String,
    },

    #[error("Invalid copy mode: {0}")]
    InvalidCopyMode(i32),

    #[error("Invalid write mode: {0}")]
    InvalidWriteMode(i32),

    #[error("Number of variables sent to var_send_once ({given}) does not match num_vars ({expected})")]
    NameCountMismatch { given: usize, expected: i32 },

    #[error("Short write: sent {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("File transfer failed: {0}")]
    FileTransfer(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Wire message types understood by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Values of the subscribed variable list
    VarList,
    /// Reply to an existence query
    VarExists,
    /// Static metadata / file resource transfer
    SieResource,
    /// Reply with the number of subscribed variables
    ListSize,
    /// Redirected standard output
    Stdio,
    /// Values of an ad hoc, one-shot variable list
    SendOnce,
}

impl MessageType {
    /// Numeric code written on the wire
    pub fn code(&self) -> i32 {
        match self {
            MessageType::VarList => 0,
            MessageType::VarExists => 1,
            MessageType::SieResource => 2,
            MessageType::ListSize => 3,
            MessageType::Stdio => 4,
            MessageType::SendOnce => 5,
        }
    }

    /// Look up a message type from its wire code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(MessageType::VarList),
            1 => Some(MessageType::VarExists),
            2 => Some(MessageType::SieResource),
            3 => Some(MessageType::ListSize),
            4 => Some(MessageType::Stdio),
            5 => Some(MessageType::SendOnce),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage kind of a simulation variable
///
/// `long` kinds are 8 bytes wide. Bit-fields live inside a native integer word
/// whose byte size is carried by the owning [`TypeDescriptor`]; `start` is the
/// offset of the field's least significant bit within that word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Char,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    Float,
    Double,
    LongLong,
    UnsignedLongLong,
    Boolean,
    Bitfield { start: u8, width: u8 },
    UnsignedBitfield { start: u8, width: u8 },
    /// The name could not be resolved to storage
    Unresolved,
}

/// Type code written on the wire for unresolved variables
pub const UNRESOLVED_TYPE_CODE: i32 = 25;

impl VarKind {
    /// Wire type code
    pub fn type_code(&self) -> i32 {
        match self {
            VarKind::Char => 1,
            VarKind::UnsignedChar => 2,
            VarKind::Short => 4,
            VarKind::UnsignedShort => 5,
            VarKind::Int => 6,
            VarKind::UnsignedInt => 7,
            VarKind::Long => 8,
            VarKind::UnsignedLong => 9,
            VarKind::Float => 10,
            VarKind::Double => 11,
            VarKind::Bitfield { .. } => 12,
            VarKind::UnsignedBitfield { .. } => 13,
            VarKind::LongLong => 14,
            VarKind::UnsignedLongLong => 15,
            VarKind::Boolean => 17,
            VarKind::Unresolved => UNRESOLVED_TYPE_CODE,
        }
    }

    /// Kind used to read a value that arrived on the wire with `code`
    ///
    /// Bit-fields are already extracted by the sender, so they come back as
    /// plain 4-byte integers.
    pub fn from_wire_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(VarKind::Char),
            2 => Some(VarKind::UnsignedChar),
            4 => Some(VarKind::Short),
            5 => Some(VarKind::UnsignedShort),
            6 | 12 => Some(VarKind::Int),
            7 | 13 => Some(VarKind::UnsignedInt),
            8 => Some(VarKind::Long),
            9 => Some(VarKind::UnsignedLong),
            10 => Some(VarKind::Float),
            11 => Some(VarKind::Double),
            14 => Some(VarKind::LongLong),
            15 => Some(VarKind::UnsignedLongLong),
            17 => Some(VarKind::Boolean),
            UNRESOLVED_TYPE_CODE => Some(VarKind::Unresolved),
            _ => None,
        }
    }

    /// Native byte size of scalar kinds (`None` for bit-fields)
    pub fn native_size(&self) -> Option<usize> {
        match self {
            VarKind::Char | VarKind::UnsignedChar | VarKind::Boolean => Some(1),
            VarKind::Short | VarKind::UnsignedShort => Some(2),
            VarKind::Int | VarKind::UnsignedInt | VarKind::Float => Some(4),
            VarKind::Long
            | VarKind::UnsignedLong
            | VarKind::LongLong
            | VarKind::UnsignedLongLong
            | VarKind::Double => Some(8),
            VarKind::Unresolved => Some(4),
            VarKind::Bitfield { .. } | VarKind::UnsignedBitfield { .. } => None,
        }
    }

    /// Number of value bytes this kind occupies on the wire
    pub fn wire_size(&self) -> usize {
        self.native_size().unwrap_or(4)
    }

    pub fn is_bitfield(&self) -> bool {
        matches!(self, VarKind::Bitfield { .. } | VarKind::UnsignedBitfield { .. })
    }

    /// Read a value of this kind from native-endian storage bytes
    pub fn read_native(&self, bytes: &[u8]) -> SimValue {
        let wanted = match self.native_size() {
            Some(size) => size,
            None => bytes.len().min(8),
        };
        if bytes.len() < wanted || wanted == 0 {
            return SimValue::Unresolved;
        }

        match *self {
            VarKind::Char => SimValue::Integer(bytes[0] as i8 as i64),
            VarKind::UnsignedChar => SimValue::Unsigned(bytes[0] as u64),
            VarKind::Boolean => SimValue::Boolean(bytes[0] != 0),
            VarKind::Short => SimValue::Integer(NativeEndian::read_i16(bytes) as i64),
            VarKind::UnsignedShort => SimValue::Unsigned(NativeEndian::read_u16(bytes) as u64),
            VarKind::Int => SimValue::Integer(NativeEndian::read_i32(bytes) as i64),
            VarKind::UnsignedInt => SimValue::Unsigned(NativeEndian::read_u32(bytes) as u64),
            VarKind::Long | VarKind::LongLong => SimValue::Integer(NativeEndian::read_i64(bytes)),
            VarKind::UnsignedLong | VarKind::UnsignedLongLong => {
                SimValue::Unsigned(NativeEndian::read_u64(bytes))
            }
            VarKind::Float => SimValue::Float(NativeEndian::read_f32(bytes) as f64),
            VarKind::Double => SimValue::Float(NativeEndian::read_f64(bytes)),
            VarKind::Bitfield { start, width } => {
                let word = NativeEndian::read_uint(bytes, wanted);
                let raw = crate::wire::bits::extract_field(word, start as usize, width as usize);
                SimValue::Integer(crate::wire::bits::sign_extend(raw, width as usize))
            }
            VarKind::UnsignedBitfield { start, width } => {
                let word = NativeEndian::read_uint(bytes, wanted);
                SimValue::Unsigned(crate::wire::bits::extract_field(
                    word,
                    start as usize,
                    width as usize,
                ))
            }
            VarKind::Unresolved => SimValue::Unresolved,
        }
    }

    /// Write `value` in this kind's wire representation (native byte order)
    ///
    /// Numeric values are cast into the kind; floating values headed for an
    /// integer kind are rounded first.
    pub fn write_native(&self, value: &SimValue, out: &mut Vec<u8>) {
        let mut word = [0u8; 8];
        let size = self.wire_size();
        match *self {
            VarKind::Char => word[0] = value.as_i64() as i8 as u8,
            VarKind::UnsignedChar => word[0] = value.as_u64() as u8,
            VarKind::Boolean => word[0] = value.as_bool() as u8,
            VarKind::Short => NativeEndian::write_i16(&mut word, value.as_i64() as i16),
            VarKind::UnsignedShort => NativeEndian::write_u16(&mut word, value.as_u64() as u16),
            VarKind::Int | VarKind::Bitfield { .. } => {
                NativeEndian::write_i32(&mut word, value.as_i64() as i32)
            }
            VarKind::UnsignedInt | VarKind::UnsignedBitfield { .. } => {
                NativeEndian::write_u32(&mut word, value.as_u64() as u32)
            }
            VarKind::Long | VarKind::LongLong => NativeEndian::write_i64(&mut word, value.as_i64()),
            VarKind::UnsignedLong | VarKind::UnsignedLongLong => {
                NativeEndian::write_u64(&mut word, value.as_u64())
            }
            VarKind::Float => NativeEndian::write_f32(&mut word, value.as_f64() as f32),
            VarKind::Double => NativeEndian::write_f64(&mut word, value.as_f64()),
            VarKind::Unresolved => {}
        }
        out.extend_from_slice(&word[..size]);
    }
}

/// Type descriptor handed out by the symbol resolver
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Storage kind
    pub kind: VarKind,
    /// Size of the underlying storage in bytes
    pub size: usize,
    /// Units the simulation declares for this variable
    pub units: String,
}

impl TypeDescriptor {
    /// Descriptor for a scalar kind, sized from the kind itself
    pub fn scalar(kind: VarKind, units: impl Into<String>) -> Self {
        Self {
            kind,
            size: kind.native_size().unwrap_or(4),
            units: units.into(),
        }
    }

    /// Descriptor for a bit-field living inside a `word_size`-byte integer
    pub fn bitfield(signed: bool, word_size: usize, start: u8, width: u8) -> Self {
        let kind = if signed {
            VarKind::Bitfield { start, width }
        } else {
            VarKind::UnsignedBitfield { start, width }
        };
        Self {
            kind,
            size: word_size,
            units: "1".to_string(),
        }
    }
}

/// A value read out of a variable buffer
#[derive(Debug, Clone, PartialEq)]
pub enum SimValue {
    /// Signed integer value
    Integer(i64),
    /// Unsigned integer value
    Unsigned(u64),
    /// Floating-point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// The variable could not be resolved
    Unresolved,
}

impl fmt::Display for SimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimValue::Integer(v) => write!(f, "{}", v),
            SimValue::Unsigned(v) => write!(f, "{}", v),
            SimValue::Float(v) => write!(f, "{}", v),
            SimValue::Boolean(v) => write!(f, "{}", if *v { 1 } else { 0 }),
            SimValue::Unresolved => write!(f, "BAD_REF"),
        }
    }
}

impl SimValue {
    /// Convert value to f64
    pub fn as_f64(&self) -> f64 {
        match self {
            SimValue::Integer(v) => *v as f64,
            SimValue::Unsigned(v) => *v as f64,
            SimValue::Float(v) => *v,
            SimValue::Boolean(v) => if *v { 1.0 } else { 0.0 },
            SimValue::Unresolved => 0.0,
        }
    }

    /// Convert value to i64, rounding floats
    pub fn as_i64(&self) -> i64 {
        match self {
            SimValue::Integer(v) => *v,
            SimValue::Unsigned(v) => *v as i64,
            SimValue::Float(v) => v.round() as i64,
            SimValue::Boolean(v) => *v as i64,
            SimValue::Unresolved => 0,
        }
    }

    /// Convert value to u64, rounding floats
    pub fn as_u64(&self) -> u64 {
        match self {
            SimValue::Integer(v) => *v as u64,
            SimValue::Unsigned(v) => *v,
            SimValue::Float(v) => v.round() as u64,
            SimValue::Boolean(v) => *v as u64,
            SimValue::Unresolved => 0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            SimValue::Boolean(v) => *v,
            SimValue::Integer(v) => *v != 0,
            SimValue::Unsigned(v) => *v != 0,
            SimValue::Float(v) => *v != 0.0,
            SimValue::Unresolved => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(VarKind::Double.type_code(), 11);
        assert_eq!(VarKind::Bitfield { start: 0, width: 3 }.type_code(), 12);
        assert_eq!(VarKind::UnsignedBitfield { start: 0, width: 3 }.type_code(), 13);
        assert_eq!(VarKind::Boolean.type_code(), 17);
        assert_eq!(VarKind::Unresolved.type_code(), 25);
        assert_eq!(VarKind::from_wire_code(12), Some(VarKind::Int));
        assert_eq!(VarKind::from_wire_code(3), None);
    }

    #[test]
    fn test_native_round_trip_through_kind() {
        let mut out = Vec::new();
        VarKind::Short.write_native(&SimValue::Integer(-12), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(VarKind::Short.read_native(&out), SimValue::Integer(-12));

        out.clear();
        VarKind::Int.write_native(&SimValue::Float(2.6), &mut out);
        assert_eq!(VarKind::Int.read_native(&out), SimValue::Integer(3));
    }

    #[test]
    fn test_bitfield_read() {
        // 3-bit signed field at bit 4 holding 0b101 (-3)
        let word: u32 = 0b101 << 4;
        let kind = VarKind::Bitfield { start: 4, width: 3 };
        assert_eq!(kind.read_native(&word.to_ne_bytes()), SimValue::Integer(-3));

        let kind = VarKind::UnsignedBitfield { start: 4, width: 3 };
        assert_eq!(kind.read_native(&word.to_ne_bytes()), SimValue::Unsigned(5));
    }

    #[test]
    fn test_short_buffer_is_unresolved() {
        assert_eq!(VarKind::Double.read_native(&[0u8; 4]), SimValue::Unresolved);
    }

    #[test]
    fn test_sim_value_display() {
        assert_eq!(format!("{}", SimValue::Integer(-42)), "-42");
        assert_eq!(format!("{}", SimValue::Float(1.5)), "1.5");
        assert_eq!(format!("{}", SimValue::Boolean(true)), "1");
        assert_eq!(format!("{}", SimValue::Unresolved), "BAD_REF");
    }

    #[test]
    fn test_message_type_codes() {
        assert_eq!(MessageType::VarList.code(), 0);
        assert_eq!(MessageType::SendOnce.code(), 5);
        assert_eq!(MessageType::from_code(3), Some(MessageType::ListSize));
        assert_eq!(MessageType::from_code(9), None);
    }
}
