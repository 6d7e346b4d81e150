//! Decoders for server-sent messages.
//!
//! Each decoder takes a full packet payload and must consume it exactly;
//! leftover bytes are a protocol fault. OK, ERR, and EOF also encode, since
//! they are mirrored by test fixtures and proxies.

use crate::error::{Error, ProtocolErrorKind};
use crate::protocol::{PacketReader, PacketWriter, capabilities, tag};
use crate::types::ColumnDef;
use crate::types::FieldType;

/// A decoded server message, tagged with its protocol meaning.
///
/// Terminal markers (`ColumnsFinished`, `ParamsFinished`,
/// `ParamsAndColumnsFinished`) wrap the EOF packet that produced them; the
/// state machine picks the variant from its current phase.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Handshake(HandshakeMessage),
    Ok(OkMessage),
    Error(ErrorMessage),
    Eof(EofMessage),
    AuthSwitch(AuthSwitchRequest),
    PrepareOk(PrepareOkMessage),
    ColumnDefinition(ColumnDef),
    ColumnsFinished(EofMessage),
    ParamsFinished(EofMessage),
    ParamsAndColumnsFinished(EofMessage),
    Row(TextRow),
    BinaryRow(BinaryRow),
}

/// Initial handshake (protocol version 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    /// Auth plugin seed (both scramble halves joined)
    pub auth_data: Vec<u8>,
    pub auth_plugin: String,
}

impl HandshakeMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);

        let protocol_version = r
            .read_u8()
            .ok_or_else(|| malformed("missing protocol version"))?;
        if protocol_version != 10 {
            return Err(malformed(format!(
                "unsupported protocol version {protocol_version}"
            )));
        }

        let server_version = r
            .read_null_string()
            .ok_or_else(|| malformed("missing server version"))?;
        let connection_id = r
            .read_u32_le()
            .ok_or_else(|| malformed("missing connection id"))?;

        let mut auth_data = r
            .read_bytes(8)
            .ok_or_else(|| malformed("missing auth seed"))?
            .to_vec();
        r.skip(1).ok_or_else(|| malformed("missing filler"))?;

        let cap_low = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing capability flags"))?;
        let charset = r.read_u8().ok_or_else(|| malformed("missing charset"))?;
        let status_flags = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing status flags"))?;
        let cap_high = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing capability flags"))?;
        let caps = u32::from(cap_low) | (u32::from(cap_high) << 16);

        let auth_data_len = r
            .read_u8()
            .ok_or_else(|| malformed("missing auth data length"))?;
        r.skip(10).ok_or_else(|| malformed("missing reserved bytes"))?;

        if caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let take = usize::from(auth_data_len.saturating_sub(8)).max(13);
            let part2 = r
                .read_bytes(take)
                .ok_or_else(|| malformed("missing auth seed continuation"))?;
            let part2 = part2.strip_suffix(&[0]).unwrap_or(part2);
            auth_data.extend_from_slice(part2);
        }

        let auth_plugin = if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            r.read_null_string()
                .ok_or_else(|| malformed("missing auth plugin name"))?
        } else {
            String::new()
        };

        r.finish()?;
        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            capabilities: caps,
            charset,
            status_flags,
            auth_data,
            auth_plugin,
        })
    }
}

/// OK packet: statement completed without a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkMessage {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OkMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);
        let header = r.read_u8().ok_or_else(|| malformed("empty OK packet"))?;
        if header != tag::OK {
            return Err(malformed(format!("bad OK header byte 0x{header:02x}")));
        }
        let affected_rows = r
            .read_lenenc_int()
            .ok_or_else(|| malformed("missing affected rows"))?;
        let last_insert_id = r
            .read_lenenc_int()
            .ok_or_else(|| malformed("missing last insert id"))?;
        let status_flags = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing status flags"))?;
        let warnings = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing warning count"))?;
        let info = String::from_utf8_lossy(r.read_rest()).into_owned();
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::with_capacity(16 + self.info.len());
        w.write_u8(tag::OK);
        w.write_lenenc_int(self.affected_rows);
        w.write_lenenc_int(self.last_insert_id);
        w.write_u16_le(self.status_flags);
        w.write_u16_le(self.warnings);
        w.write_bytes(self.info.as_bytes());
        w.into_bytes()
    }
}

/// ERR packet: server-reported error. Not a connection fault by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub code: u16,
    pub sql_state: String,
    pub message: String,
}

impl ErrorMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);
        let header = r.read_u8().ok_or_else(|| malformed("empty ERR packet"))?;
        if header != tag::ERR {
            return Err(malformed(format!("bad ERR header byte 0x{header:02x}")));
        }
        let code = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing error code"))?;
        let sql_state = if r.peek() == Some(b'#') {
            r.skip(1).ok_or_else(|| malformed("truncated SQL state"))?;
            r.read_string(5)
                .ok_or_else(|| malformed("truncated SQL state"))?
        } else {
            String::new()
        };
        let message = String::from_utf8_lossy(r.read_rest()).into_owned();
        Ok(Self {
            code,
            sql_state,
            message,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::with_capacity(9 + self.message.len());
        w.write_u8(tag::ERR);
        w.write_u16_le(self.code);
        if !self.sql_state.is_empty() {
            w.write_u8(b'#');
            w.write_bytes(self.sql_state.as_bytes());
        }
        w.write_bytes(self.message.as_bytes());
        w.into_bytes()
    }
}

/// EOF packet, used as the separator and terminator in result-set flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EofMessage {
    pub warnings: u16,
    pub status_flags: u16,
}

impl EofMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);
        let header = r.read_u8().ok_or_else(|| malformed("empty EOF packet"))?;
        if header != tag::EOF {
            return Err(malformed(format!("bad EOF header byte 0x{header:02x}")));
        }
        // Pre-4.1 servers send a bare 0xFE.
        if r.is_empty() {
            return Ok(Self::default());
        }
        let warnings = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing warning count"))?;
        let status_flags = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing status flags"))?;
        r.finish()?;
        Ok(Self {
            warnings,
            status_flags,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::with_capacity(5);
        w.write_u8(tag::EOF);
        w.write_u16_le(self.warnings);
        w.write_u16_le(self.status_flags);
        w.into_bytes()
    }
}

/// Request to switch to a different auth plugin mid-handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSwitchRequest {
    pub plugin: String,
    pub auth_data: Vec<u8>,
}

impl AuthSwitchRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);
        let header = r
            .read_u8()
            .ok_or_else(|| malformed("empty auth switch packet"))?;
        if header != tag::EOF {
            return Err(malformed(format!(
                "bad auth switch header byte 0x{header:02x}"
            )));
        }
        let plugin = r
            .read_null_string()
            .ok_or_else(|| malformed("missing auth plugin name"))?;
        let data = r.read_rest();
        let data = data.strip_suffix(&[0]).unwrap_or(data);
        Ok(Self {
            plugin,
            auth_data: data.to_vec(),
        })
    }
}

/// First packet of a prepare response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOkMessage {
    pub statement_id: u32,
    pub column_count: u16,
    pub param_count: u16,
    pub warnings: u16,
}

impl PrepareOkMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);
        let status = r
            .read_u8()
            .ok_or_else(|| malformed("empty prepare response"))?;
        if status != 0x00 {
            return Err(malformed(format!(
                "bad prepare response status 0x{status:02x}"
            )));
        }
        let statement_id = r
            .read_u32_le()
            .ok_or_else(|| malformed("missing statement id"))?;
        let column_count = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing column count"))?;
        let param_count = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing parameter count"))?;
        let warnings = if r.remaining() >= 3 {
            r.skip(1)
                .ok_or_else(|| malformed("truncated prepare response"))?;
            r.read_u16_le().unwrap_or(0)
        } else {
            0
        };
        r.finish()?;
        Ok(Self {
            statement_id,
            column_count,
            param_count,
            warnings,
        })
    }
}

impl ColumnDef {
    /// Decode a column definition packet (protocol 4.1 layout).
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);
        let catalog = r
            .read_lenenc_string()
            .ok_or_else(|| malformed("missing catalog"))?;
        let schema = r
            .read_lenenc_string()
            .ok_or_else(|| malformed("missing schema"))?;
        let table = r
            .read_lenenc_string()
            .ok_or_else(|| malformed("missing table"))?;
        let org_table = r
            .read_lenenc_string()
            .ok_or_else(|| malformed("missing original table"))?;
        let name = r
            .read_lenenc_string()
            .ok_or_else(|| malformed("missing column name"))?;
        let org_name = r
            .read_lenenc_string()
            .ok_or_else(|| malformed("missing original column name"))?;

        // Length of the fixed fields, always 0x0C.
        r.read_lenenc_int()
            .ok_or_else(|| malformed("missing fixed-field length"))?;
        let charset = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing column charset"))?;
        let column_length = r
            .read_u32_le()
            .ok_or_else(|| malformed("missing column length"))?;
        let column_type = FieldType::from_u8(
            r.read_u8()
                .ok_or_else(|| malformed("missing column type"))?,
        );
        let flags = r
            .read_u16_le()
            .ok_or_else(|| malformed("missing column flags"))?;
        let decimals = r
            .read_u8()
            .ok_or_else(|| malformed("missing decimal count"))?;
        r.skip(2).ok_or_else(|| malformed("missing filler"))?;
        r.finish()?;

        Ok(Self {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            column_length,
            column_type,
            flags,
            decimals,
        })
    }
}

/// A text protocol row: one optional byte string per column, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRow {
    pub values: Vec<Option<Vec<u8>>>,
}

impl TextRow {
    /// Decode a text row. Cell count is implied by payload exhaustion.
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let mut r = PacketReader::new(payload);
        let mut values = Vec::new();
        while !r.is_empty() {
            if r.peek_null_marker() {
                r.read_u8();
                values.push(None);
            } else {
                let data = r
                    .read_lenenc_bytes()
                    .ok_or_else(|| malformed("truncated row cell"))?;
                values.push(Some(data.to_vec()));
            }
        }
        Ok(Self { values })
    }
}

/// A binary protocol row with its marker byte stripped.
///
/// Cell decoding needs the column definitions, so it happens in the result
/// accumulator rather than here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRow {
    pub payload: Vec<u8>,
}

impl BinaryRow {
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        match payload.split_first() {
            Some((0x00, rest)) => Ok(Self {
                payload: rest.to_vec(),
            }),
            _ => Err(malformed("binary row missing marker byte")),
        }
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::protocol(ProtocolErrorKind::Malformed, message)
}
