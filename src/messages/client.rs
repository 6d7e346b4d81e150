//! Encoders for client-sent commands.
//!
//! Each function returns complete packet bytes, header included. Auth
//! material is supplied by the caller; nothing here computes credentials.

use crate::protocol::{Command, PacketWriter, build_command_packet};
use crate::types::{FieldType, encode_binary_value, value_field_type};
use crate::value::Value;

/// Handshake response carrying externally computed auth bytes.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capabilities: u32,
    pub max_packet_size: u32,
    pub charset: u8,
    pub user: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub auth_plugin: String,
}

impl HandshakeResponse {
    /// Encode as a complete packet continuing the server's sequence.
    pub fn encode(&self, sequence_id: u8) -> Vec<u8> {
        let mut w = PacketWriter::with_capacity(128);
        w.write_u32_le(self.capabilities);
        w.write_u32_le(self.max_packet_size);
        w.write_u8(self.charset);
        w.write_zeros(23);
        w.write_null_string(&self.user);
        w.write_lenenc_bytes(&self.auth_response);
        if let Some(db) = &self.database {
            w.write_null_string(db);
        }
        w.write_null_string(&self.auth_plugin);
        w.build_packet(sequence_id)
    }
}

/// Encode a COM_QUERY packet.
pub fn encode_query(sql: &str, sequence_id: u8) -> Vec<u8> {
    build_command_packet(Command::Query, sql.as_bytes(), sequence_id)
}

/// Encode a COM_STMT_PREPARE packet.
pub fn encode_prepare(sql: &str, sequence_id: u8) -> Vec<u8> {
    build_command_packet(Command::StmtPrepare, sql.as_bytes(), sequence_id)
}

/// Encode a COM_QUIT packet.
pub fn encode_quit(sequence_id: u8) -> Vec<u8> {
    build_command_packet(Command::Quit, &[], sequence_id)
}

/// Encode the response to an auth switch request (raw auth bytes).
pub fn encode_auth_switch_response(auth_data: &[u8], sequence_id: u8) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(auth_data.len());
    w.write_bytes(auth_data);
    w.build_packet(sequence_id)
}

/// Encode a COM_STMT_SEND_LONG_DATA packet.
///
/// The server sends no response; the streamed bytes accumulate into the
/// given parameter slot until the next execute.
pub fn encode_send_long_data(
    statement_id: u32,
    param_index: u16,
    data: &[u8],
    sequence_id: u8,
) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(7 + data.len());
    w.write_u8(Command::StmtSendLongData as u8);
    w.write_u32_le(statement_id);
    w.write_u16_le(param_index);
    w.write_bytes(data);
    w.build_packet(sequence_id)
}

/// Encode a COM_STMT_EXECUTE packet.
///
/// Layout: command byte, statement id, cursor flags (none), iteration count
/// (always 1), then for parameterized statements the NULL bitmap, the
/// new-params-bound flag, type/flag pairs, and the inline values. Values at
/// `long_indices` were already streamed via send-long-data and are omitted
/// inline; their type slots are still written.
pub fn encode_execute(
    statement_id: u32,
    values: &[Value],
    param_types: &[FieldType],
    long_indices: &[usize],
    sequence_id: u8,
) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(64 + values.len() * 16);

    w.write_u8(Command::StmtExecute as u8);
    w.write_u32_le(statement_id);
    w.write_u8(0x00);
    w.write_u32_le(1);

    if !values.is_empty() {
        let mut null_bitmap = vec![0u8; values.len().div_ceil(8)];
        for (i, value) in values.iter().enumerate() {
            if value.is_null() {
                null_bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        w.write_bytes(&null_bitmap);

        // New params bound: types follow.
        w.write_u8(1);

        for (i, value) in values.iter().enumerate() {
            let field_type = param_types
                .get(i)
                .copied()
                .unwrap_or_else(|| value_field_type(value));
            w.write_u8(field_type as u8);
            w.write_u8(0x00);
        }

        for (i, value) in values.iter().enumerate() {
            if value.is_null() || long_indices.contains(&i) {
                continue;
            }
            encode_binary_value(&mut w, value);
        }
    }

    w.build_packet(sequence_id)
}
