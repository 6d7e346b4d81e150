//! MySQL payload reading primitives.
//!
//! `PacketReader` walks a single packet payload. All primitives return
//! `Option` so decoders can bail out on truncated input, and `finish`
//! enforces that a decoder consumed its payload exactly.

use crate::error::{Error, ProtocolErrorKind};
use crate::protocol::tag;

/// A reader over a single packet payload.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
}

impl<'a> PacketReader<'a> {
    /// Create a reader over a payload slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Check whether all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        let (&byte, rest) = self.data.split_first()?;
        self.data = rest;
        Some(byte)
    }

    /// Read a u16 (little-endian).
    pub fn read_u16_le(&mut self) -> Option<u16> {
        let bytes = self.read_bytes(2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a u24 (little-endian, 3 bytes).
    pub fn read_u24_le(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(3)?;
        Some(u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16))
    }

    /// Read a u32 (little-endian).
    pub fn read_u32_le(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a u64 (little-endian).
    pub fn read_u64_le(&mut self) -> Option<u64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(u64::from_le_bytes(buf))
    }

    /// Read a length-encoded integer.
    ///
    /// Returns `None` on truncation and on the 0xFB NULL marker, which is
    /// not a valid integer prefix.
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        match self.read_u8()? {
            v @ 0..=0xFA => Some(u64::from(v)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            _ => None,
        }
    }

    /// Read a length-encoded byte slice.
    pub fn read_lenenc_bytes(&mut self) -> Option<&'a [u8]> {
        let len = self.read_lenenc_int()?;
        self.read_bytes(usize::try_from(len).ok()?)
    }

    /// Read a length-encoded string (lossy UTF-8).
    pub fn read_lenenc_string(&mut self) -> Option<String> {
        self.read_lenenc_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read a NUL-terminated string (lossy UTF-8).
    pub fn read_null_string(&mut self) -> Option<String> {
        let end = self.data.iter().position(|&b| b == 0)?;
        let (s, rest) = self.data.split_at(end);
        self.data = &rest[1..];
        Some(String::from_utf8_lossy(s).into_owned())
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.data.len() {
            return None;
        }
        let (bytes, rest) = self.data.split_at(len);
        self.data = rest;
        Some(bytes)
    }

    /// Read a fixed-length string (lossy UTF-8).
    pub fn read_string(&mut self, len: usize) -> Option<String> {
        self.read_bytes(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Consume and return everything left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    /// Skip `count` bytes.
    pub fn skip(&mut self, count: usize) -> Option<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Is the next byte the text-protocol NULL cell marker?
    pub fn peek_null_marker(&self) -> bool {
        self.peek() == Some(tag::NULL)
    }

    /// Assert the whole payload was consumed.
    pub fn finish(self) -> Result<(), Error> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(Error::protocol(
                ProtocolErrorKind::TrailingBytes,
                format!("{} unconsumed payload bytes after decode", self.data.len()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_reads() {
        let data = [0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut r = PacketReader::new(&data);
        assert_eq!(r.read_u8(), Some(0x42));
        assert_eq!(r.read_u16_le(), Some(0x1234));
        assert_eq!(r.read_u24_le(), Some(0x12_3456));
        assert_eq!(r.read_u32_le(), Some(0x1234_5678));
        assert_eq!(r.read_u8(), None);
    }

    #[test]
    fn lenenc_int_forms() {
        let mut r = PacketReader::new(&[0xFA]);
        assert_eq!(r.read_lenenc_int(), Some(0xFA));

        let mut r = PacketReader::new(&[0xFC, 0x34, 0x12]);
        assert_eq!(r.read_lenenc_int(), Some(0x1234));

        let mut r = PacketReader::new(&[0xFD, 0x56, 0x34, 0x12]);
        assert_eq!(r.read_lenenc_int(), Some(0x12_3456));

        let mut r = PacketReader::new(&[0xFE, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(r.read_lenenc_int(), Some(1));

        // NULL marker is not an integer.
        let mut r = PacketReader::new(&[0xFB]);
        assert_eq!(r.read_lenenc_int(), None);
    }

    #[test]
    fn lenenc_and_null_strings() {
        let data = [0x05, b'h', b'e', b'l', b'l', b'o', b'h', b'i', 0x00, 0xAA];
        let mut r = PacketReader::new(&data);
        assert_eq!(r.read_lenenc_string().as_deref(), Some("hello"));
        assert_eq!(r.read_null_string().as_deref(), Some("hi"));
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn finish_flags_leftover_bytes() {
        let mut r = PacketReader::new(&[1, 2, 3]);
        r.read_u8();
        assert!(r.finish().is_err());

        let mut r = PacketReader::new(&[1]);
        r.read_u8();
        assert!(r.finish().is_ok());
    }

    #[test]
    fn truncated_reads_return_none() {
        let mut r = PacketReader::new(&[0x03, b'a']);
        assert_eq!(r.read_lenenc_bytes(), None);
    }
}
