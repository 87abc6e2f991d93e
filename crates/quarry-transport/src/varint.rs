//! Variable-length integers as used by frame headers.
//!
//! Seven data bits per byte, least significant group first, high bit set
//! on every byte except the last. An `i32` never needs more than five bytes.

/// Longest encoding of an `i32`.
pub const MAX_VARINT_LEN: usize = 5;

/// Appends the encoding of `value` to `out`.
pub fn write_varint(out: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            out.push(v as u8);
            return;
        }
        out.push(((v & 0x7F) | 0x80) as u8);
        v >>= 7;
    }
}

/// Number of bytes `value` occupies once encoded.
pub fn varint_len(value: i32) -> usize {
    let mut v = value as u32;
    let mut n = 1;
    while v & !0x7F != 0 {
        v >>= 7;
        n += 1;
    }
    n
}

/// Outcome of decoding a varint from the front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntRead {
    /// The value and the number of bytes it consumed.
    Complete(i32, usize),
    /// The buffer ends before the varint does.
    Incomplete,
    /// More than five bytes carry the continuation bit.
    TooLong,
}

/// Decodes a varint from the start of `buf`.
pub fn read_varint(buf: &[u8]) -> VarIntRead {
    let mut value: u32 = 0;
    for (i, byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return VarIntRead::TooLong;
        }
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return VarIntRead::Complete(value as i32, i + 1);
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        VarIntRead::TooLong
    } else {
        VarIntRead::Incomplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, value);
        out
    }

    #[test]
    fn test_write_varint_known_vectors() {
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(1), vec![0x01]);
        assert_eq!(encoded(127), vec![0x7F]);
        assert_eq!(encoded(128), vec![0x80, 0x01]);
        assert_eq!(encoded(255), vec![0xFF, 0x01]);
        assert_eq!(encoded(25565), vec![0xDD, 0xC7, 0x01]);
        assert_eq!(encoded(2_097_151), vec![0xFF, 0xFF, 0x7F]);
        assert_eq!(encoded(-1), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_read_varint_negative_value() {
        assert_eq!(
            read_varint(&[0x80, 0x80, 0x80, 0x80, 0x08]),
            VarIntRead::Complete(i32::MIN, 5)
        );
    }

    #[test]
    fn test_read_varint_trailing_bytes_ignored() {
        assert_eq!(read_varint(&[0xDD, 0xC7, 0x01, 0xAA]), VarIntRead::Complete(25565, 3));
    }

    #[test]
    fn test_read_varint_truncated_is_incomplete() {
        assert_eq!(read_varint(&[0x80, 0x80]), VarIntRead::Incomplete);
        assert_eq!(read_varint(&[]), VarIntRead::Incomplete);
    }

    #[test]
    fn test_read_varint_six_bytes_is_too_long() {
        assert_eq!(
            read_varint(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
            VarIntRead::TooLong
        );
    }

    #[test]
    fn test_varint_len_matches_encoding() {
        for v in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, i32::MAX, -1] {
            assert_eq!(varint_len(v), encoded(v).len(), "value {v}");
        }
    }
}
