//! Binary encoder and decoder
//!
//! One logical send produces a [`BinaryPackets`] sequence: packets are built
//! lazily, each capped at [`MAX_MSG_LEN`] bytes, and the sequence resumes from
//! the first variable that did not fit in the previous packet.

use super::{WireValue, MAX_MSG_LEN};
use crate::types::{MessageType, Result, SessionError, SimValue, VarKind};
use byteorder::{ByteOrder, NativeEndian};

/// Size of the packet header: message type, payload size, variable count
pub const HEADER_LEN: usize = 12;

/// Binary encoding switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryOptions {
    /// Prefix each record with the variable name
    pub include_names: bool,
    /// Reverse the byte order of every integer field and value
    pub byteswap: bool,
}

impl Default for BinaryOptions {
    fn default() -> Self {
        Self {
            include_names: true,
            byteswap: false,
        }
    }
}

pub(crate) fn encode_i32(value: i32, swap: bool) -> [u8; 4] {
    let mut word = [0u8; 4];
    NativeEndian::write_i32(&mut word, value);
    if swap {
        word.reverse();
    }
    word
}

fn put_i32(out: &mut Vec<u8>, value: i32, swap: bool) {
    out.extend_from_slice(&encode_i32(value, swap));
}

/// Encode one variable record
pub fn encode_record(value: &WireValue, options: BinaryOptions) -> Vec<u8> {
    let mut value_bytes = value.value_bytes();
    if options.byteswap {
        value_bytes.reverse();
    }

    let mut out = Vec::with_capacity(12 + value.name.len() + value_bytes.len());
    if options.include_names {
        put_i32(&mut out, value.name.len() as i32, options.byteswap);
        out.extend_from_slice(value.name.as_bytes());
    }
    put_i32(&mut out, value.kind.type_code(), options.byteswap);
    put_i32(&mut out, value_bytes.len() as i32, options.byteswap);
    out.extend_from_slice(&value_bytes);
    out
}

/// Lazy, bounded packet sequence for one logical send
pub struct BinaryPackets<'a> {
    values: &'a [WireValue],
    next: usize,
    message_type: MessageType,
    options: BinaryOptions,
    debug_level: i32,
    dropped: Vec<String>,
}

impl<'a> BinaryPackets<'a> {
    pub fn new(values: &'a [WireValue], message_type: MessageType, options: BinaryOptions) -> Self {
        Self {
            values,
            next: 0,
            message_type,
            options,
            debug_level: 0,
            dropped: Vec::new(),
        }
    }

    /// Emit per-packet debug traces at level 2 and above
    pub fn with_debug_level(mut self, level: i32) -> Self {
        self.debug_level = level;
        self
    }

    /// Index of the next variable to be emitted
    pub fn resume_index(&self) -> usize {
        self.next
    }

    /// Names of variables dropped because their record alone exceeds a packet
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }
}

impl Iterator for BinaryPackets<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let swap = self.options.byteswap;

        while self.next < self.values.len() {
            let mut packet = Vec::with_capacity(MAX_MSG_LEN);
            put_i32(&mut packet, self.message_type.code(), swap);
            put_i32(&mut packet, 0, swap);
            put_i32(&mut packet, 0, swap);

            let mut count: i32 = 0;
            while self.next < self.values.len() {
                let value = &self.values[self.next];
                let record = encode_record(value, self.options);

                // The record must fit in a packet by itself
                if HEADER_LEN + record.len() > MAX_MSG_LEN {
                    log::warn!(
                        "Variable Server buffer[{}] too small (need {}) for symbol {}, SKIPPING IT.",
                        MAX_MSG_LEN,
                        HEADER_LEN + record.len(),
                        value.name
                    );
                    self.dropped.push(value.name.to_string());
                    self.next += 1;
                    continue;
                }

                if packet.len() + record.len() > MAX_MSG_LEN {
                    if self.debug_level >= 2 {
                        log::debug!(
                            "Variable Server buffer[{}] too small (need {}), sending multiple binary packets.",
                            MAX_MSG_LEN,
                            packet.len() + record.len()
                        );
                    }
                    break;
                }

                packet.extend_from_slice(&record);
                count += 1;
                self.next += 1;
            }

            // Only dropped records were left
            if count == 0 {
                continue;
            }

            let payload_size = (packet.len() - 8) as i32;
            packet[4..8].copy_from_slice(&encode_i32(payload_size, swap));
            packet[8..12].copy_from_slice(&encode_i32(count, swap));

            if self.debug_level >= 2 {
                log::debug!(
                    "var_server sending {} binary bytes containing {} variables.",
                    packet.len(),
                    count
                );
            }
            return Some(packet);
        }

        None
    }
}

/// Encode a whole variable list into its packet sequence
pub fn encode_binary(
    values: &[WireValue],
    message_type: MessageType,
    options: BinaryOptions,
) -> Vec<Vec<u8>> {
    BinaryPackets::new(values, message_type, options).collect()
}

/// One variable parsed back out of a binary packet
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVariable {
    /// Variable name (absent when names were suppressed)
    pub name: Option<String>,
    pub type_code: i32,
    pub value: SimValue,
}

/// A parsed binary packet
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub message_type: i32,
    pub payload_size: i32,
    pub variables: Vec<DecodedVariable>,
}

struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    swap: bool,
}

impl<'a> PacketReader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(SessionError::MalformedMessage(format!(
                "need {} bytes at offset {}, packet has {}",
                n,
                self.pos,
                self.data.len()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn i32(&mut self) -> Result<i32> {
        let swap = self.swap;
        let mut word = [0u8; 4];
        word.copy_from_slice(self.bytes(4)?);
        if swap {
            word.reverse();
        }
        Ok(NativeEndian::read_i32(&word))
    }

    fn length(&mut self, what: &str) -> Result<usize> {
        let value = self.i32()?;
        usize::try_from(value).map_err(|_| {
            SessionError::MalformedMessage(format!("negative {}: {}", what, value))
        })
    }
}

/// Parse one binary packet as a client would
pub fn decode_binary(packet: &[u8], options: BinaryOptions) -> Result<DecodedPacket> {
    let mut reader = PacketReader {
        data: packet,
        pos: 0,
        swap: options.byteswap,
    };

    let message_type = reader.i32()?;
    let payload_size = reader.i32()?;
    if payload_size as i64 != packet.len() as i64 - 8 {
        return Err(SessionError::MalformedMessage(format!(
            "payload size {} does not match packet length {}",
            payload_size,
            packet.len()
        )));
    }
    let count = reader.length("variable count")?;

    let mut variables = Vec::with_capacity(count);
    for _ in 0..count {
        let name = if options.include_names {
            let len = reader.length("name length")?;
            let raw = reader.bytes(len)?;
            Some(String::from_utf8(raw.to_vec()).map_err(|e| {
                SessionError::MalformedMessage(format!("variable name is not UTF-8: {}", e))
            })?)
        } else {
            None
        };

        let type_code = reader.i32()?;
        let size = reader.length("value size")?;
        let mut value_bytes = reader.bytes(size)?.to_vec();
        if options.byteswap {
            value_bytes.reverse();
        }

        let kind = VarKind::from_wire_code(type_code).ok_or_else(|| {
            SessionError::MalformedMessage(format!("unknown type code {}", type_code))
        })?;

        variables.push(DecodedVariable {
            name,
            type_code,
            value: kind.read_native(&value_bytes),
        });
    }

    if reader.pos != packet.len() {
        return Err(SessionError::MalformedMessage(format!(
            "{} trailing bytes after {} variables",
            packet.len() - reader.pos,
            count
        )));
    }

    Ok(DecodedPacket {
        message_type,
        payload_size,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::UnitConversion;

    fn wire(name: &str, kind: VarKind, bytes: Vec<u8>) -> WireValue {
        WireValue {
            name: name.into(),
            kind,
            bytes,
            conversion: None,
            units: None,
        }
    }

    fn mixed_values() -> Vec<WireValue> {
        let flags: u32 = (0b1011 << 3) | 0b1;
        vec![
            wire("pos", VarKind::Double, (-12.75f64).to_ne_bytes().to_vec()),
            wire("count", VarKind::Int, 123_456i32.to_ne_bytes().to_vec()),
            wire("small", VarKind::Short, (-300i16).to_ne_bytes().to_vec()),
            wire(
                "mode",
                VarKind::Bitfield { start: 3, width: 4 },
                flags.to_ne_bytes().to_vec(),
            ),
            wire("on", VarKind::Boolean, vec![1]),
        ]
    }

    fn expected_values() -> Vec<SimValue> {
        vec![
            SimValue::Float(-12.75),
            SimValue::Integer(123_456),
            SimValue::Integer(-300),
            SimValue::Integer(-5),
            SimValue::Boolean(true),
        ]
    }

    #[test]
    fn test_mixed_values_decode_back_with_and_without_byteswap() {
        let values = mixed_values();
        for byteswap in [false, true] {
            let options = BinaryOptions {
                include_names: true,
                byteswap,
            };
            let packets = encode_binary(&values, MessageType::VarList, options);
            assert_eq!(packets.len(), 1);

            let decoded = decode_binary(&packets[0], options).unwrap();
            assert_eq!(decoded.message_type, 0);
            let names: Vec<_> = decoded.variables.iter().map(|v| v.name.clone().unwrap()).collect();
            assert_eq!(names, vec!["pos", "count", "small", "mode", "on"]);
            let got: Vec<_> = decoded.variables.iter().map(|v| v.value.clone()).collect();
            assert_eq!(got, expected_values());
            assert_eq!(decoded.variables[3].type_code, 12);
        }
    }

    #[test]
    fn test_byteswap_reverses_fields() {
        let values = vec![wire("x", VarKind::Int, 1i32.to_ne_bytes().to_vec())];
        let plain = encode_binary(&values, MessageType::VarList, BinaryOptions::default());
        let swapped = encode_binary(
            &values,
            MessageType::VarList,
            BinaryOptions {
                include_names: true,
                byteswap: true,
            },
        );

        assert_eq!(&plain[0][4..8], &encode_i32(plain[0].len() as i32 - 8, false));
        let mut reversed = plain[0][4..8].to_vec();
        reversed.reverse();
        assert_eq!(&swapped[0][4..8], reversed.as_slice());
        // Name bytes are not swapped
        assert_eq!(&swapped[0][16..17], b"x");
    }

    #[test]
    fn test_header_layout() {
        let values = vec![wire("ab", VarKind::Double, 2.5f64.to_ne_bytes().to_vec())];
        let packet = &encode_binary(&values, MessageType::SendOnce, BinaryOptions::default())[0];

        // header 12 + name_len 4 + name 2 + type 4 + size 4 + value 8
        assert_eq!(packet.len(), 34);
        assert_eq!(NativeEndian::read_i32(&packet[0..4]), 5);
        assert_eq!(NativeEndian::read_i32(&packet[4..8]), 26);
        assert_eq!(NativeEndian::read_i32(&packet[8..12]), 1);
        assert_eq!(NativeEndian::read_i32(&packet[12..16]), 2);
        assert_eq!(NativeEndian::read_i32(&packet[18..22]), 11);
        assert_eq!(NativeEndian::read_i32(&packet[22..26]), 8);
    }

    #[test]
    fn test_names_suppressed() {
        let values = mixed_values();
        let options = BinaryOptions {
            include_names: false,
            byteswap: false,
        };
        let packets = encode_binary(&values, MessageType::VarList, options);
        let decoded = decode_binary(&packets[0], options).unwrap();
        assert!(decoded.variables.iter().all(|v| v.name.is_none()));
        let got: Vec<_> = decoded.variables.iter().map(|v| v.value.clone()).collect();
        assert_eq!(got, expected_values());
    }

    #[test]
    fn test_large_list_is_chunked() {
        let values: Vec<WireValue> = (0..600)
            .map(|i| {
                wire(
                    &format!("model.state.element_{:04}", i),
                    VarKind::Double,
                    (i as f64).to_ne_bytes().to_vec(),
                )
            })
            .collect();

        let options = BinaryOptions::default();
        let packets = encode_binary(&values, MessageType::VarList, options);
        assert!(packets.len() >= 2);

        let mut seen = Vec::new();
        for packet in &packets {
            assert!(packet.len() <= MAX_MSG_LEN);
            let decoded = decode_binary(packet, options).unwrap();
            seen.extend(decoded.variables.into_iter().map(|v| v.name.unwrap()));
        }
        let expected: Vec<String> = values.iter().map(|v| v.name.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_oversized_record_dropped() {
        let huge_name = "x".repeat(MAX_MSG_LEN);
        let values = vec![
            wire("first", VarKind::Int, 1i32.to_ne_bytes().to_vec()),
            wire(&huge_name, VarKind::Int, 2i32.to_ne_bytes().to_vec()),
            wire("last", VarKind::Int, 3i32.to_ne_bytes().to_vec()),
        ];

        let options = BinaryOptions::default();
        let mut packets = BinaryPackets::new(&values, MessageType::VarList, options);
        let all: Vec<Vec<u8>> = packets.by_ref().collect();
        assert_eq!(packets.dropped(), &[huge_name.clone()]);
        assert_eq!(packets.resume_index(), 3);

        let names: Vec<String> = all
            .iter()
            .flat_map(|p| decode_binary(p, options).unwrap().variables)
            .map(|v| v.name.unwrap())
            .collect();
        assert_eq!(names, vec!["first", "last"]);
    }

    #[test]
    fn test_only_oversized_produces_no_packets() {
        let values = vec![wire(&"y".repeat(MAX_MSG_LEN), VarKind::Int, vec![0; 4])];
        assert!(encode_binary(&values, MessageType::VarList, BinaryOptions::default()).is_empty());
    }

    #[test]
    fn test_converted_value_on_wire() {
        let mut value = wire("alt", VarKind::Double, 10.0f64.to_ne_bytes().to_vec());
        value.conversion = Some(UnitConversion {
            factor: 0.3048,
            offset: 0.0,
        });
        let options = BinaryOptions::default();
        let packets = encode_binary(&[value], MessageType::VarList, options);
        let decoded = decode_binary(&packets[0], options).unwrap();
        assert!((decoded.variables[0].value.as_f64() - 3.048).abs() < 1e-12);
    }

    #[test]
    fn test_unresolved_encoding() {
        let value = wire("ghost", VarKind::Unresolved, vec![0; 4]);
        let options = BinaryOptions::default();
        let packets = encode_binary(&[value], MessageType::VarList, options);
        let decoded = decode_binary(&packets[0], options).unwrap();
        assert_eq!(decoded.variables[0].type_code, 25);
        assert_eq!(decoded.variables[0].value, SimValue::Unresolved);
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let values = mixed_values();
        let packets = encode_binary(&values, MessageType::VarList, BinaryOptions::default());
        let truncated = &packets[0][..packets[0].len() - 3];
        assert!(decode_binary(truncated, BinaryOptions::default()).is_err());
    }
}
