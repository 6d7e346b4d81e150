//! The protocol state machine.
//!
//! Dispatches each inbound frame to a decoder based on its first byte and
//! the current phase, and advances the phase. The machine is pure: it never
//! touches a socket, so any flow can be driven from synthetic frames.
//!
//! Result-set flows are count-driven. A column-count frame fixes how many
//! definition frames follow; EOF packets separate definitions from rows and
//! terminate the set. Prepare responses fix the parameter and column
//! definition counts up front.

use tracing::trace;

use crate::error::{Error, ProtocolErrorKind};
use crate::frame::Frame;
use crate::messages::server::{
    AuthSwitchRequest, BinaryRow, EofMessage, ErrorMessage, HandshakeMessage, OkMessage,
    PrepareOkMessage, ServerMessage, TextRow,
};
use crate::protocol::{PacketReader, is_eof_payload, tag};
use crate::types::ColumnDef;

/// Protocol phase. Each variant carries only the counters it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the server's initial handshake
    AwaitingHandshake,
    /// Between commands
    Idle,
    /// Text query sent, expecting a column count or OK/ERR
    QueryAwaitingColumnCount,
    /// Reading text result column definitions
    QueryReadingColumns { total: u64, read: u64 },
    /// Reading text rows until the terminal EOF
    QueryReadingRows,
    /// Prepare sent, expecting the prepare response
    PrepareAwaitingResponse,
    /// Reading parameter definitions from a prepare response
    PrepareReadingParams {
        params_total: u16,
        params_read: u16,
        columns_total: u16,
    },
    /// Reading column definitions from a prepare response
    PrepareReadingColumns { total: u16, read: u16 },
    /// Execute sent, expecting a column count or OK/ERR
    ExecuteAwaitingColumnCount,
    /// Reading binary result column definitions
    ExecuteReadingColumns { total: u64, read: u64 },
    /// Reading binary rows until the terminal EOF
    ExecuteReadingRows,
}

/// Frame-to-message decoder with phase tracking.
#[derive(Debug)]
pub struct ProtocolMachine {
    phase: Phase,
}

impl ProtocolMachine {
    /// Create a machine waiting for the server handshake.
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingHandshake,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record that the handshake response went out; auth results follow.
    pub fn handshake_response_sent(&mut self) {
        if self.phase == Phase::AwaitingHandshake {
            self.phase = Phase::Idle;
        }
    }

    /// Record that a text query command went out.
    pub fn query_started(&mut self) {
        self.phase = Phase::QueryAwaitingColumnCount;
    }

    /// Record that a prepare command went out.
    pub fn prepare_started(&mut self) {
        self.phase = Phase::PrepareAwaitingResponse;
    }

    /// Record that an execute command went out.
    pub fn execute_started(&mut self) {
        self.phase = Phase::ExecuteAwaitingColumnCount;
    }

    /// Decode one frame into zero or more messages and advance the phase.
    ///
    /// Most frames yield exactly one message. Column-count frames yield
    /// none; a prepare response with neither parameters nor columns yields
    /// the prepare-OK plus a synthesized terminal marker, since the server
    /// sends no EOF in that case.
    pub fn decode(&mut self, frame: &Frame) -> Result<Vec<ServerMessage>, Error> {
        let payload = frame.payload.as_slice();
        let Some(&first) = payload.first() else {
            return Err(Error::protocol(
                ProtocolErrorKind::Malformed,
                "empty frame payload",
            ));
        };

        trace!(phase = ?self.phase, first, len = payload.len(), "dispatching frame");

        if self.phase == Phase::AwaitingHandshake {
            if first == tag::ERR {
                self.phase = Phase::Idle;
                return Ok(vec![ServerMessage::Error(ErrorMessage::decode(payload)?)]);
            }
            return Ok(vec![ServerMessage::Handshake(HandshakeMessage::decode(
                payload,
            )?)]);
        }

        if first == tag::ERR {
            self.phase = Phase::Idle;
            return Ok(vec![ServerMessage::Error(ErrorMessage::decode(payload)?)]);
        }

        if is_eof_payload(payload) {
            return self.on_eof(payload);
        }

        if first == tag::EOF && self.phase == Phase::Idle {
            return Ok(vec![ServerMessage::AuthSwitch(AuthSwitchRequest::decode(
                payload,
            )?)]);
        }

        if first == tag::OK {
            match self.phase {
                Phase::PrepareAwaitingResponse => return self.on_prepare_ok(payload),
                // A binary row can legitimately start with 0x00; let it fall
                // through to the row decoder.
                Phase::ExecuteReadingRows => {}
                _ => {
                    self.phase = Phase::Idle;
                    return Ok(vec![ServerMessage::Ok(OkMessage::decode(payload)?)]);
                }
            }
        }

        if self.in_result_flow() {
            self.decode_result_frame(payload)
        } else {
            Err(Error::protocol(
                ProtocolErrorKind::NoDecoder,
                format!(
                    "no decoder for message type 0x{first:02x} in phase {:?}",
                    self.phase
                ),
            ))
        }
    }

    fn in_result_flow(&self) -> bool {
        matches!(
            self.phase,
            Phase::QueryAwaitingColumnCount
                | Phase::QueryReadingColumns { .. }
                | Phase::QueryReadingRows
                | Phase::PrepareReadingParams { .. }
                | Phase::PrepareReadingColumns { .. }
                | Phase::ExecuteAwaitingColumnCount
                | Phase::ExecuteReadingColumns { .. }
                | Phase::ExecuteReadingRows
        )
    }

    fn on_eof(&mut self, payload: &[u8]) -> Result<Vec<ServerMessage>, Error> {
        let eof = EofMessage::decode(payload)?;
        let message = match self.phase {
            Phase::PrepareReadingParams { columns_total, .. } => {
                if columns_total == 0 {
                    self.phase = Phase::Idle;
                    ServerMessage::ParamsAndColumnsFinished(eof)
                } else {
                    self.phase = Phase::PrepareReadingColumns {
                        total: columns_total,
                        read: 0,
                    };
                    ServerMessage::ParamsFinished(eof)
                }
            }
            Phase::PrepareReadingColumns { .. } => {
                self.phase = Phase::Idle;
                ServerMessage::ColumnsFinished(eof)
            }
            Phase::QueryReadingColumns { .. } => {
                self.phase = Phase::QueryReadingRows;
                ServerMessage::ColumnsFinished(eof)
            }
            Phase::ExecuteReadingColumns { .. } => {
                self.phase = Phase::ExecuteReadingRows;
                ServerMessage::ColumnsFinished(eof)
            }
            _ => {
                self.phase = Phase::Idle;
                ServerMessage::Eof(eof)
            }
        };
        Ok(vec![message])
    }

    fn on_prepare_ok(&mut self, payload: &[u8]) -> Result<Vec<ServerMessage>, Error> {
        let msg = PrepareOkMessage::decode(payload)?;
        trace!(
            statement_id = msg.statement_id,
            params = msg.param_count,
            columns = msg.column_count,
            "prepare response"
        );

        let mut out = vec![ServerMessage::PrepareOk(msg)];
        if msg.param_count == 0 && msg.column_count == 0 {
            // No definitions follow, so no EOF will arrive either.
            self.phase = Phase::Idle;
            out.push(ServerMessage::ParamsAndColumnsFinished(EofMessage::default()));
        } else if msg.param_count > 0 {
            self.phase = Phase::PrepareReadingParams {
                params_total: msg.param_count,
                params_read: 0,
                columns_total: msg.column_count,
            };
        } else {
            self.phase = Phase::PrepareReadingColumns {
                total: msg.column_count,
                read: 0,
            };
        }
        Ok(out)
    }

    /// The count-driven descriptor/row sub-protocol shared by all
    /// result-producing flows.
    fn decode_result_frame(&mut self, payload: &[u8]) -> Result<Vec<ServerMessage>, Error> {
        match self.phase {
            Phase::QueryAwaitingColumnCount | Phase::ExecuteAwaitingColumnCount => {
                let mut r = PacketReader::new(payload);
                let total = r.read_lenenc_int().ok_or_else(|| {
                    Error::protocol(ProtocolErrorKind::Malformed, "bad column count")
                })?;
                r.finish()?;
                let execute = self.phase == Phase::ExecuteAwaitingColumnCount;
                self.phase = match (execute, total) {
                    (false, 0) => Phase::QueryReadingRows,
                    (false, n) => Phase::QueryReadingColumns { total: n, read: 0 },
                    (true, 0) => Phase::ExecuteReadingRows,
                    (true, n) => Phase::ExecuteReadingColumns { total: n, read: 0 },
                };
                Ok(Vec::new())
            }

            Phase::PrepareReadingParams {
                params_total,
                params_read,
                columns_total,
            } => {
                let col = ColumnDef::decode(payload)?;
                self.phase = Phase::PrepareReadingParams {
                    params_total,
                    params_read: (params_read + 1).min(params_total),
                    columns_total,
                };
                Ok(vec![ServerMessage::ColumnDefinition(col)])
            }

            Phase::PrepareReadingColumns { total, read } => {
                let col = ColumnDef::decode(payload)?;
                self.phase = Phase::PrepareReadingColumns {
                    total,
                    read: (read + 1).min(total),
                };
                Ok(vec![ServerMessage::ColumnDefinition(col)])
            }

            Phase::QueryReadingColumns { total, read } => {
                if read < total {
                    let col = ColumnDef::decode(payload)?;
                    self.phase = Phase::QueryReadingColumns {
                        total,
                        read: read + 1,
                    };
                    Ok(vec![ServerMessage::ColumnDefinition(col)])
                } else {
                    // Count satisfied: the frame is already a row.
                    self.phase = Phase::QueryReadingRows;
                    Ok(vec![ServerMessage::Row(TextRow::decode(payload)?)])
                }
            }

            Phase::ExecuteReadingColumns { total, read } => {
                if read < total {
                    let col = ColumnDef::decode(payload)?;
                    self.phase = Phase::ExecuteReadingColumns {
                        total,
                        read: read + 1,
                    };
                    Ok(vec![ServerMessage::ColumnDefinition(col)])
                } else {
                    self.phase = Phase::ExecuteReadingRows;
                    Ok(vec![ServerMessage::BinaryRow(BinaryRow::decode(payload)?)])
                }
            }

            Phase::QueryReadingRows => Ok(vec![ServerMessage::Row(TextRow::decode(payload)?)]),
            Phase::ExecuteReadingRows => {
                Ok(vec![ServerMessage::BinaryRow(BinaryRow::decode(payload)?)])
            }

            Phase::AwaitingHandshake | Phase::Idle | Phase::PrepareAwaitingResponse => {
                Err(Error::protocol(
                    ProtocolErrorKind::NoDecoder,
                    format!("no row decoder in phase {:?}", self.phase),
                ))
            }
        }
    }
}

impl Default for ProtocolMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketWriter;
    use crate::types::FieldType;

    fn frame(payload: Vec<u8>) -> Frame {
        Frame {
            sequence: 0,
            payload,
        }
    }

    fn column_def_payload(name: &str, field_type: FieldType) -> Vec<u8> {
        let mut w = PacketWriter::new();
        for part in ["def", "db", "t", "t", name, name] {
            w.write_lenenc_string(part);
        }
        w.write_lenenc_int(0x0C);
        w.write_u16_le(45);
        w.write_u32_le(255);
        w.write_u8(field_type as u8);
        w.write_u16_le(0);
        w.write_u8(0);
        w.write_zeros(2);
        w.into_bytes()
    }

    fn eof_payload() -> Vec<u8> {
        EofMessage::default().encode()
    }

    fn machine_at_idle() -> ProtocolMachine {
        let mut m = ProtocolMachine::new();
        m.handshake_response_sent();
        m
    }

    #[test]
    fn query_flow_two_columns_two_rows() {
        let mut m = machine_at_idle();
        m.query_started();

        assert!(m.decode(&frame(vec![0x02])).unwrap().is_empty());
        assert_eq!(
            m.phase(),
            Phase::QueryReadingColumns { total: 2, read: 0 }
        );

        for name in ["id", "name"] {
            let msgs = m
                .decode(&frame(column_def_payload(name, FieldType::Long)))
                .unwrap();
            assert!(matches!(msgs[0], ServerMessage::ColumnDefinition(_)));
        }

        let msgs = m.decode(&frame(eof_payload())).unwrap();
        assert!(matches!(msgs[0], ServerMessage::ColumnsFinished(_)));
        assert_eq!(m.phase(), Phase::QueryReadingRows);

        let mut row = PacketWriter::new();
        row.write_lenenc_bytes(b"1");
        row.write_lenenc_bytes(b"alice");
        let msgs = m.decode(&frame(row.into_bytes())).unwrap();
        assert!(matches!(msgs[0], ServerMessage::Row(_)));

        let msgs = m.decode(&frame(eof_payload())).unwrap();
        assert!(matches!(msgs[0], ServerMessage::Eof(_)));
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn rowless_query_yields_ok() {
        let mut m = machine_at_idle();
        m.query_started();

        let ok = OkMessage {
            affected_rows: 1,
            last_insert_id: 7,
            status_flags: 0x0002,
            warnings: 0,
            info: String::new(),
        };
        let msgs = m.decode(&frame(ok.encode())).unwrap();
        match &msgs[0] {
            ServerMessage::Ok(decoded) => assert_eq!(decoded.last_insert_id, 7),
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn prepare_with_no_params_or_columns_synthesizes_terminal() {
        let mut m = machine_at_idle();
        m.prepare_started();

        let payload = vec![
            0x00, 0x05, 0x00, 0x00, 0x00, // statement_id = 5
            0x00, 0x00, // columns
            0x00, 0x00, // params
            0x00, 0x00, 0x00, // filler + warnings
        ];
        let msgs = m.decode(&frame(payload)).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[0], ServerMessage::PrepareOk(_)));
        assert!(matches!(msgs[1], ServerMessage::ParamsAndColumnsFinished(_)));
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn prepare_with_params_and_columns() {
        let mut m = machine_at_idle();
        m.prepare_started();

        let payload = vec![
            0x00, 0x01, 0x00, 0x00, 0x00, // statement_id = 1
            0x01, 0x00, // columns = 1
            0x01, 0x00, // params = 1
            0x00, 0x00, 0x00,
        ];
        let msgs = m.decode(&frame(payload)).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            m.phase(),
            Phase::PrepareReadingParams {
                params_total: 1,
                params_read: 0,
                columns_total: 1
            }
        );

        m.decode(&frame(column_def_payload("?", FieldType::Long)))
            .unwrap();
        assert_eq!(
            m.phase(),
            Phase::PrepareReadingParams {
                params_total: 1,
                params_read: 1,
                columns_total: 1
            }
        );
        let msgs = m.decode(&frame(eof_payload())).unwrap();
        assert!(matches!(msgs[0], ServerMessage::ParamsFinished(_)));
        assert_eq!(m.phase(), Phase::PrepareReadingColumns { total: 1, read: 0 });

        m.decode(&frame(column_def_payload("id", FieldType::Long)))
            .unwrap();
        let msgs = m.decode(&frame(eof_payload())).unwrap();
        assert!(matches!(msgs[0], ServerMessage::ColumnsFinished(_)));
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn error_resets_to_idle() {
        let mut m = machine_at_idle();
        m.query_started();
        m.decode(&frame(vec![0x01])).unwrap();

        let err = ErrorMessage {
            code: 1146,
            sql_state: "42S02".into(),
            message: "Table 'db.t' doesn't exist".into(),
        };
        let msgs = m.decode(&frame(err.encode())).unwrap();
        assert!(matches!(msgs[0], ServerMessage::Error(_)));
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn unknown_tag_outside_result_flow_is_fatal() {
        let mut m = machine_at_idle();
        let err = m.decode(&frame(vec![0x42, 0x00])).unwrap_err();
        match err {
            Error::Protocol(p) => assert_eq!(p.kind, ProtocolErrorKind::NoDecoder),
            other => panic!("unexpected error: {other}"),
        }
        // The machine stays where it was.
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn auth_switch_in_idle() {
        let mut m = machine_at_idle();
        let mut w = PacketWriter::new();
        w.write_u8(0xFE);
        w.write_null_string("mysql_native_password");
        w.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let msgs = m.decode(&frame(w.into_bytes())).unwrap();
        assert!(matches!(msgs[0], ServerMessage::AuthSwitch(_)));
    }

    #[test]
    fn binary_row_starting_with_zero_is_not_ok() {
        let mut m = machine_at_idle();
        m.execute_started();
        m.decode(&frame(vec![0x01])).unwrap();
        m.decode(&frame(column_def_payload("n", FieldType::Long)))
            .unwrap();
        m.decode(&frame(eof_payload())).unwrap();
        assert_eq!(m.phase(), Phase::ExecuteReadingRows);

        // Marker byte, null bitmap, 4-byte value.
        let msgs = m.decode(&frame(vec![0x00, 0x00, 42, 0, 0, 0])).unwrap();
        match &msgs[0] {
            ServerMessage::BinaryRow(row) => assert_eq!(row.payload, vec![0x00, 42, 0, 0, 0]),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn empty_payload_is_malformed() {
        let mut m = machine_at_idle();
        assert!(m.decode(&frame(Vec::new())).is_err());
    }
}
