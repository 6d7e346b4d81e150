//! MySQL wire protocol constants and the packet header codec.
//!
//! Every packet on the wire is a 4-byte header (3-byte little-endian payload
//! length plus a 1-byte sequence number) followed by the payload. Payloads of
//! exactly 2^24 - 1 bytes are continued in follow-up packets, terminated by a
//! packet shorter than the maximum (possibly empty).

pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::{PacketWriter, build_command_packet};

/// Maximum payload a single packet can carry (2^24 - 1).
pub const MAX_PACKET_SIZE: usize = 0xFF_FFFF;

/// Size of the packet header in bytes.
pub const HEADER_SIZE: usize = 4;

/// An EOF marker payload is shorter than this; a 0xFE-tagged payload of this
/// length or more is an authentication switch request instead.
pub const EOF_MAX_PAYLOAD: usize = 9;

/// First-byte tags of server messages.
pub mod tag {
    /// OK packet (also the prepare-OK status and the binary row marker)
    pub const OK: u8 = 0x00;
    /// NULL cell marker in text protocol rows
    pub const NULL: u8 = 0xFB;
    /// EOF packet, or auth switch request when the payload is long enough
    pub const EOF: u8 = 0xFE;
    /// ERR packet
    pub const ERR: u8 = 0xFF;
}

/// Client commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// COM_QUIT - close the connection
    Quit = 0x01,
    /// COM_QUERY - text protocol query
    Query = 0x03,
    /// COM_STMT_PREPARE - prepare a statement
    StmtPrepare = 0x16,
    /// COM_STMT_EXECUTE - execute a prepared statement
    StmtExecute = 0x17,
    /// COM_STMT_SEND_LONG_DATA - stream a long parameter (no response)
    StmtSendLongData = 0x18,
}

/// Capability flags exchanged during the handshake.
#[allow(dead_code)]
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 0x0000_0001;
    pub const CLIENT_FOUND_ROWS: u32 = 0x0000_0002;
    pub const CLIENT_LONG_FLAG: u32 = 0x0000_0004;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
    pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
    pub const CLIENT_TRANSACTIONS: u32 = 0x0000_2000;
    pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
    pub const CLIENT_MULTI_RESULTS: u32 = 0x0002_0000;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 0x0004_0000;
    pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;
    pub const CLIENT_DEPRECATE_EOF: u32 = 0x0100_0000;

    /// Default flags sent in the handshake response.
    ///
    /// CLIENT_DEPRECATE_EOF is deliberately absent: the result-set flow relies
    /// on EOF packets separating column definitions from rows.
    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_FOUND_ROWS
        | CLIENT_LONG_FLAG
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH;
}

/// Server status flags carried in OK and EOF packets.
#[allow(dead_code)]
pub mod server_status {
    pub const IN_TRANSACTION: u16 = 0x0001;
    pub const AUTOCOMMIT: u16 = 0x0002;
    pub const MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const NO_GOOD_INDEX_USED: u16 = 0x0010;
    pub const NO_INDEX_USED: u16 = 0x0020;
    pub const CURSOR_EXISTS: u16 = 0x0040;
    pub const LAST_ROW_SENT: u16 = 0x0080;
}

/// Character set identifiers.
#[allow(dead_code)]
pub mod charset {
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const BINARY: u8 = 63;
}

/// The 4-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length (24-bit on the wire)
    pub payload_length: u32,
    /// Sequence number, wrapping at 255
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Parse a header from its wire form.
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            payload_length: u32::from(bytes[0])
                | (u32::from(bytes[1]) << 8)
                | (u32::from(bytes[2]) << 16),
            sequence_id: bytes[3],
        }
    }

    /// Encode the header to its wire form.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        [
            (self.payload_length & 0xFF) as u8,
            ((self.payload_length >> 8) & 0xFF) as u8,
            ((self.payload_length >> 16) & 0xFF) as u8,
            self.sequence_id,
        ]
    }
}

/// Is this payload an EOF marker (as opposed to an auth switch request)?
pub fn is_eof_payload(payload: &[u8]) -> bool {
    payload.first() == Some(&tag::EOF) && payload.len() < EOF_MAX_PAYLOAD
}
