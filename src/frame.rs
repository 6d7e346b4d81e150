//! Frame extraction from the inbound byte stream.
//!
//! The reader buffers raw bytes as they arrive and yields complete frames
//! only: if the buffer holds less than a full header-plus-payload, nothing
//! is consumed until more bytes arrive. Frame boundaries are therefore
//! independent of how the transport chunks its reads.

use tracing::trace;

use crate::error::{Error, ProtocolErrorKind};
use crate::protocol::{HEADER_SIZE, MAX_PACKET_SIZE, PacketHeader};

/// A complete frame: sequence number plus payload, header stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number from the header
    pub sequence: u8,
    /// Payload bytes (may be empty)
    pub payload: Vec<u8>,
}

/// Accumulates inbound bytes and splits them into frames.
///
/// Each frame is one wire packet. A payload the server splits at the
/// 2^24 - 1 boundary arrives as separate frames and is not reassembled
/// here; only the outbound path splits large payloads (see
/// `build_packet_from_payload`).
#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    max_payload: usize,
    frames_read: u64,
}

impl FrameReader {
    /// Create a reader enforcing the given maximum payload length.
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_payload,
            frames_read: 0,
        }
    }

    /// Append raw bytes from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total number of frames yielded so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Try to extract the next complete frame.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a full frame;
    /// no bytes are consumed in that case. A declared payload length above
    /// the configured maximum is a fatal framing error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = PacketHeader::from_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        let payload_len = header.payload_length as usize;

        if payload_len > self.max_payload {
            return Err(Error::protocol(
                ProtocolErrorKind::FrameTooLarge,
                format!(
                    "frame declares {} payload bytes, maximum is {}",
                    payload_len, self.max_payload
                ),
            ));
        }

        if self.buf.len() < HEADER_SIZE + payload_len {
            return Ok(None);
        }

        let payload = self.buf[HEADER_SIZE..HEADER_SIZE + payload_len].to_vec();
        self.buf.drain(..HEADER_SIZE + payload_len);
        self.frames_read += 1;

        trace!(
            sequence = header.sequence_id,
            len = payload_len,
            total = self.frames_read,
            "frame extracted"
        );

        Ok(Some(Frame {
            sequence: header.sequence_id,
            payload,
        }))
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(sequence: u8, payload: &[u8]) -> Vec<u8> {
        let header = PacketHeader {
            payload_length: payload.len() as u32,
            sequence_id: sequence,
        };
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn yields_nothing_on_partial_frame() {
        let mut reader = FrameReader::default();
        let bytes = frame_bytes(0, &[1, 2, 3, 4, 5]);

        reader.feed(&bytes[..3]);
        assert_eq!(reader.next_frame().unwrap(), None);

        reader.feed(&bytes[3..7]);
        assert_eq!(reader.next_frame().unwrap(), None);
        // Nothing consumed while incomplete.
        assert_eq!(reader.buffered(), 7);

        reader.feed(&bytes[7..]);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.payload, vec![1, 2, 3, 4, 5]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn chunking_does_not_change_frames() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame_bytes(1, b"abc"));
        stream.extend_from_slice(&frame_bytes(2, b""));
        stream.extend_from_slice(&frame_bytes(3, b"defgh"));

        let collect = |chunk: usize| {
            let mut reader = FrameReader::default();
            let mut frames = Vec::new();
            for piece in stream.chunks(chunk) {
                reader.feed(piece);
                while let Some(frame) = reader.next_frame().unwrap() {
                    frames.push(frame);
                }
            }
            frames
        };

        let whole = collect(stream.len());
        assert_eq!(whole.len(), 3);
        assert_eq!(whole[1].payload, Vec::<u8>::new());
        for chunk in [1, 2, 3, 5, 7] {
            assert_eq!(collect(chunk), whole);
        }
    }

    #[test]
    fn oversized_frame_is_fatal() {
        let mut reader = FrameReader::new(16);
        reader.feed(&frame_bytes(0, &[0u8; 17]));
        let err = reader.next_frame().unwrap_err();
        match err {
            Error::Protocol(p) => assert_eq!(p.kind, ProtocolErrorKind::FrameTooLarge),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_frame_blocks_later_frames() {
        let mut reader = FrameReader::new(16);
        reader.feed(&frame_bytes(0, &[0u8; 17]));
        reader.feed(&frame_bytes(1, b"ok"));

        // The bad header is never drained, so the valid frame behind it
        // can never be reached.
        for _ in 0..3 {
            let err = reader.next_frame().unwrap_err();
            match err {
                Error::Protocol(p) => assert_eq!(p.kind, ProtocolErrorKind::FrameTooLarge),
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(reader.frames_read(), 0);
    }
}
