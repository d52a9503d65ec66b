//! Bit-packed stream writer and reader
//!
//! Booleans cost one bit, fixed-width fields cost exactly their width.
//! The writer never fails; the reader returns [`NetError::StreamOverrun`]
//! when asked for bits past the end of the buffer.

use crate::error::NetError;

/// Append-only bit stream writer
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Write a single bit
    pub fn write_bool(&mut self, value: bool) {
        let byte = self.bit_len / 8;
        if byte == self.bytes.len() {
            self.bytes.push(0);
        }
        if value {
            self.bytes[byte] |= 1 << (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    /// Write the low `count` bits of `value`, least significant first
    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        for i in 0..count {
            self.write_bool(value >> i & 1 == 1);
        }
    }

    /// Write a full byte
    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(value as u32, 8);
    }

    /// Write a 16-bit value
    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(value as u32, 16);
    }

    /// Write a 32-bit value
    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    /// Write a 64-bit value
    pub fn write_u64(&mut self, value: u64) {
        self.write_bits(value as u32, 32);
        self.write_bits((value >> 32) as u32, 32);
    }

    /// Write a 128-bit value
    pub fn write_u128(&mut self, value: u128) {
        self.write_u64(value as u64);
        self.write_u64((value >> 64) as u64);
    }

    /// Write an `f32` by bit pattern
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        for byte in value.bytes() {
            self.write_u8(byte);
        }
    }

    /// Finish the stream, padding the last byte with zero bits
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Bit stream reader over a finished buffer
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader over a byte buffer
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current bit position
    #[inline]
    pub fn bit_pos(&self) -> usize {
        self.pos
    }

    /// Read a single bit
    pub fn read_bool(&mut self) -> Result<bool, NetError> {
        let byte = self.pos / 8;
        if byte >= self.bytes.len() {
            return Err(NetError::StreamOverrun { at: self.pos });
        }
        let bit = self.bytes[byte] >> (self.pos % 8) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    /// Read `count` bits, least significant first
    pub fn read_bits(&mut self, count: u32) -> Result<u32, NetError> {
        debug_assert!(count <= 32);
        let mut value = 0u32;
        for i in 0..count {
            if self.read_bool()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    /// Read a full byte
    pub fn read_u8(&mut self) -> Result<u8, NetError> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Read a 16-bit value
    pub fn read_u16(&mut self) -> Result<u16, NetError> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Read a 32-bit value
    pub fn read_u32(&mut self) -> Result<u32, NetError> {
        self.read_bits(32)
    }

    /// Read a 64-bit value
    pub fn read_u64(&mut self) -> Result<u64, NetError> {
        let lo = self.read_bits(32)? as u64;
        let hi = self.read_bits(32)? as u64;
        Ok(hi << 32 | lo)
    }

    /// Read a 128-bit value
    pub fn read_u128(&mut self) -> Result<u128, NetError> {
        let lo = self.read_u64()? as u128;
        let hi = self.read_u64()? as u128;
        Ok(hi << 64 | lo)
    }

    /// Read an `f32` by bit pattern
    pub fn read_f32(&mut self) -> Result<f32, NetError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_str(&mut self) -> Result<String, NetError> {
        let len = self.read_u32()? as usize;
        let mut bytes = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            bytes.push(self.read_u8()?);
        }
        String::from_utf8(bytes).map_err(|_| NetError::MalformedString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_packing() {
        let mut w = BitWriter::new();
        for i in 0..9 {
            w.write_bool(i % 2 == 0);
        }
        assert_eq!(w.bit_len(), 9);
        let bytes = w.finish();
        assert_eq!(bytes.len(), 2);

        let mut r = BitReader::new(&bytes);
        for i in 0..9 {
            assert_eq!(r.read_bool().unwrap(), i % 2 == 0);
        }
    }

    #[test]
    fn test_mixed_fields() {
        let mut w = BitWriter::new();
        w.write_bool(true);
        w.write_bits(13, 5);
        w.write_u16(0xBEEF);
        w.write_u64(u64::MAX - 7);
        w.write_u128(0x0123_4567_89AB_CDEF_0011_2233_4455_6677);
        w.write_f32(-1.25);
        w.write_str("slot.weapon");
        let bytes = w.finish();

        let mut r = BitReader::new(&bytes);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_bits(5).unwrap(), 13);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_u64().unwrap(), u64::MAX - 7);
        assert_eq!(
            r.read_u128().unwrap(),
            0x0123_4567_89AB_CDEF_0011_2233_4455_6677
        );
        assert_eq!(r.read_f32().unwrap(), -1.25);
        assert_eq!(r.read_str().unwrap(), "slot.weapon");
    }

    #[test]
    fn test_overrun() {
        let mut w = BitWriter::new();
        w.write_bits(3, 3);
        let bytes = w.finish();

        let mut r = BitReader::new(&bytes);
        // Padding bits in the last byte are readable; past the byte is not
        assert!(r.read_bits(8).is_ok());
        assert!(matches!(
            r.read_bool(),
            Err(NetError::StreamOverrun { at: 8 })
        ));
    }

    #[test]
    fn test_empty_reader() {
        let mut r = BitReader::new(&[]);
        assert!(r.read_bool().is_err());
    }
}
