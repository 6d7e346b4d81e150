//! MySQL payload writing primitives and packet assembly.

use crate::protocol::{Command, HEADER_SIZE, MAX_PACKET_SIZE, PacketHeader};

/// A writer for MySQL protocol data.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new writer with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the buffer as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a u16 (little-endian).
    pub fn write_u16_le(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u24 (little-endian, 3 bytes).
    pub fn write_u24_le(&mut self, value: u32) {
        self.buffer
            .extend_from_slice(&value.to_le_bytes()[..3]);
    }

    /// Write a u32 (little-endian).
    pub fn write_u32_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u64 (little-endian).
    pub fn write_u64_le(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-encoded integer.
    ///
    /// - values below 251 fit in one byte
    /// - 0xFC prefixes a 2-byte value
    /// - 0xFD prefixes a 3-byte value
    /// - 0xFE prefixes an 8-byte value
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 251 {
            self.write_u8(value as u8);
        } else if value < 0x10000 {
            self.write_u8(0xFC);
            self.write_u16_le(value as u16);
        } else if value < 0x0100_0000 {
            self.write_u8(0xFD);
            self.write_u24_le(value as u32);
        } else {
            self.write_u8(0xFE);
            self.write_u64_le(value);
        }
    }

    /// Write a length-encoded byte slice.
    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.buffer.extend_from_slice(data);
    }

    /// Write a length-encoded string.
    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    /// Write a NUL-terminated string.
    pub fn write_null_string(&mut self, s: &str) {
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write zeros (padding).
    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Build a complete packet from the buffered payload.
    pub fn build_packet(&self, sequence_id: u8) -> Vec<u8> {
        build_packet_from_payload(&self.buffer, sequence_id)
    }
}

/// Frame a payload into one or more packets.
///
/// Payloads over 2^24 - 1 bytes are split; a final chunk of exactly the
/// maximum size is followed by an empty terminator packet.
pub fn build_packet_from_payload(payload: &[u8], mut sequence_id: u8) -> Vec<u8> {
    let mut result = Vec::with_capacity(payload.len() + HEADER_SIZE);

    if payload.len() < MAX_PACKET_SIZE {
        let header = PacketHeader {
            payload_length: payload.len() as u32,
            sequence_id,
        };
        result.extend_from_slice(&header.to_bytes());
        result.extend_from_slice(payload);
        return result;
    }

    let mut offset = 0;
    loop {
        let chunk_len = (payload.len() - offset).min(MAX_PACKET_SIZE);
        let header = PacketHeader {
            payload_length: chunk_len as u32,
            sequence_id,
        };
        result.extend_from_slice(&header.to_bytes());
        result.extend_from_slice(&payload[offset..offset + chunk_len]);
        offset += chunk_len;
        sequence_id = sequence_id.wrapping_add(1);

        if chunk_len < MAX_PACKET_SIZE {
            break;
        }
        if offset == payload.len() {
            // Full-sized final chunk needs an empty terminator.
            let header = PacketHeader {
                payload_length: 0,
                sequence_id,
            };
            result.extend_from_slice(&header.to_bytes());
            break;
        }
    }

    result
}

/// Build a single-packet command: command byte followed by the payload.
pub fn build_command_packet(command: Command, payload: &[u8], sequence_id: u8) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(1 + payload.len());
    writer.write_u8(command as u8);
    writer.write_bytes(payload);
    writer.build_packet(sequence_id)
}
