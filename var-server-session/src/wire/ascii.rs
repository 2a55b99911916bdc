//! Ascii encoder
//!
//! One message per send regardless of size:
//! `<type>\t<value>[ {units}]\t<value>...\n`

use super::WireValue;
use crate::types::{MessageType, SimValue, VarKind};
use std::fmt::Write;

/// Textual token for one variable
///
/// `float` variables print at single precision so they keep their shortest
/// round-trip form.
pub fn format_value(value: &WireValue) -> String {
    let mut token = match (value.kind, value.value()) {
        (VarKind::Float, SimValue::Float(v)) => (v as f32).to_string(),
        (_, v) => v.to_string(),
    };
    if let Some(units) = &value.units {
        let _ = write!(token, " {{{}}}", units);
    }
    token
}

/// Encode a variable list as one ascii message
pub fn encode_ascii(values: &[WireValue], message_type: MessageType) -> Vec<u8> {
    let mut message = message_type.code().to_string();
    for value in values {
        message.push('\t');
        message.push_str(&format_value(value));
    }
    message.push('\n');
    message.into_bytes()
}
