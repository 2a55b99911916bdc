//! Bit-field extraction helpers
//!
//! Bit-field variables live inside a native integer word. The field is addressed
//! by the position of its least significant bit and its width in bits.

/// Extract `width` bits starting at bit `start` (LSB numbering) from `word`
pub fn extract_field(word: u64, start: usize, width: usize) -> u64 {
    if width == 0 || start >= 64 {
        return 0;
    }

    let shifted = word >> start;
    if width >= 64 {
        shifted
    } else {
        shifted & ((1u64 << width) - 1)
    }
}

/// Insert `value` into `word` as a `width`-bit field starting at bit `start`
pub fn insert_field(word: u64, start: usize, width: usize, value: u64) -> u64 {
    if width == 0 || start >= 64 {
        return word;
    }

    let mask = if width >= 64 { !0u64 } else { (1u64 << width) - 1 };
    (word & !(mask << start)) | ((value & mask) << start)
}

/// Sign-extend a value from N bits to 64 bits
///
/// If the value's MSB is 1, fill the upper bits with 1s.
pub fn sign_extend(value: u64, bit_length: usize) -> i64 {
    if bit_length == 0 {
        return 0;
    }
    if bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_low_bits() {
        assert_eq!(extract_field(0xABCD, 0, 8), 0xCD);
        assert_eq!(extract_field(0xABCD, 8, 8), 0xAB);
    }

    #[test]
    fn test_extract_cross_byte() {
        // 6 bits straddling the byte boundary at bit 5
        let word = 0b1101_1010_0000u64;
        assert_eq!(extract_field(word, 5, 6), 0b10_1101);
    }

    #[test]
    fn test_insert_then_extract() {
        let word = insert_field(0xFFFF_0000, 3, 4, 0b1010);
        assert_eq!(extract_field(word, 3, 4), 0b1010);
        assert_eq!(word & 0xFFFF_0000, 0xFFFF_0000);
    }

    #[test]
    fn test_sign_extend_positive() {
        assert_eq!(sign_extend(0x7F, 8), 127);
    }

    #[test]
    fn test_sign_extend_negative() {
        assert_eq!(sign_extend(0xFF, 8), -1);
        assert_eq!(sign_extend(0x8000, 16), -32768);
        assert_eq!(sign_extend(0b100, 3), -4);
    }
}
