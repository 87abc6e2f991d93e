//! Field-level readers and writers for packet bodies.
//!
//! Every packet body is a varint packet id followed by fields in a fixed
//! order. Numbers are big-endian, strings are a varint byte length plus
//! UTF-8, and block positions are a single packed `i64`.

use quarry_transport::varint::{VarIntRead, read_varint, write_varint};

use crate::{BlockPos, ProtocolError};

/// Longest string the protocol allows, in characters.
pub const MAX_STRING_LEN: usize = 32_767;

// ---------------------------------------------------------------------------
// PacketReader
// ---------------------------------------------------------------------------

/// Cursor over a received packet body.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Takes the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Takes everything that is left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    pub fn read_uuid(&mut self) -> Result<u128, ProtocolError> {
        Ok(u128::from_be_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<i32, ProtocolError> {
        match read_varint(&self.buf[self.pos..]) {
            VarIntRead::Complete(value, used) => {
                self.pos += used;
                Ok(value)
            }
            VarIntRead::Incomplete => Err(ProtocolError::Truncated {
                needed: self.remaining() + 1,
                remaining: self.remaining(),
            }),
            VarIntRead::TooLong => Err(ProtocolError::VarIntTooLong),
        }
    }

    /// Reads a varint that must be a valid length no larger than `max`.
    pub fn read_len(&mut self, max: usize) -> Result<usize, ProtocolError> {
        let len = self.read_varint()?;
        if len < 0 || len as usize > max {
            return Err(ProtocolError::InvalidLength {
                len: len as i64,
                max,
            });
        }
        Ok(len as usize)
    }

    /// Reads a string of at most `max_chars` characters.
    pub fn read_string(&mut self, max_chars: usize) -> Result<String, ProtocolError> {
        // Each character is at most 4 bytes in UTF-8.
        let len = self.read_len(max_chars.saturating_mul(4))?;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub fn read_position(&mut self) -> Result<BlockPos, ProtocolError> {
        Ok(BlockPos::unpack(self.read_i64()?))
    }
}

// ---------------------------------------------------------------------------
// PacketWriter
// ---------------------------------------------------------------------------

/// Builder for an outbound packet body. Starts with the packet id.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new(packet_id: i32) -> Self {
        let mut buf = Vec::with_capacity(32);
        write_varint(&mut buf, packet_id);
        Self { buf }
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    pub fn bool(self, value: bool) -> Self {
        self.u8(value as u8)
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i64(mut self, value: i64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn uuid(mut self, value: u128) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn varint(mut self, value: i32) -> Self {
        write_varint(&mut self.buf, value);
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        write_varint(&mut self.buf, value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn position(self, pos: BlockPos) -> Self {
        self.i64(pos.pack())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_then_reader_preserves_field_order() {
        let body = PacketWriter::new(0x2A)
            .varint(300)
            .string("miner")
            .u16(25565)
            .bool(true)
            .i64(-2)
            .finish();

        let mut r = PacketReader::new(&body);
        assert_eq!(r.read_varint().unwrap(), 0x2A);
        assert_eq!(r.read_varint().unwrap(), 300);
        assert_eq!(r.read_string(16).unwrap(), "miner");
        assert_eq!(r.read_u16().unwrap(), 25565);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_i64().unwrap(), -2);
        assert!(r.is_empty());
    }

    #[test]
    fn test_read_i32_truncated_reports_sizes() {
        let mut r = PacketReader::new(&[0x00, 0x01]);
        match r.read_i32() {
            Err(ProtocolError::Truncated { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 2);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_read_string_longer_than_limit_rejected() {
        let body = PacketWriter::new(0).string("this name is far too long").finish();
        let mut r = PacketReader::new(&body[1..]);
        assert!(matches!(
            r.read_string(4),
            Err(ProtocolError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_read_string_invalid_utf8_rejected() {
        let mut r = PacketReader::new(&[0x02, 0xC3, 0x28]);
        assert!(matches!(
            r.read_string(16),
            Err(ProtocolError::InvalidString(_))
        ));
    }

    #[test]
    fn test_read_f64_big_endian() {
        let bytes = 1.5f64.to_be_bytes();
        let mut r = PacketReader::new(&bytes);
        assert_eq!(r.read_f64().unwrap(), 1.5);
    }

    #[test]
    fn test_read_rest_consumes_everything() {
        let mut r = PacketReader::new(&[1, 2, 3]);
        r.read_u8().unwrap();
        assert_eq!(r.read_rest(), &[2, 3]);
        assert!(r.is_empty());
    }
}
