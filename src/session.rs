//! Transport-free connection session.
//!
//! A [`Session`] owns the state machine, the statement cache, and the
//! in-flight result accumulator. It consumes frames and produces
//! [`ConnectionEvent`]s plus any packets that must be written in response,
//! without ever touching a socket. The async handler is a thin pump around
//! it; tests drive it from byte fixtures.

use tracing::debug;

use crate::error::{Error, ProtocolErrorKind};
use crate::frame::Frame;
use crate::machine::ProtocolMachine;
use crate::messages::client::{
    encode_execute, encode_prepare, encode_query, encode_send_long_data,
};
use crate::messages::server::{
    AuthSwitchRequest, EofMessage, ErrorMessage, HandshakeMessage, OkMessage, ServerMessage,
};
use crate::results::{ResultSet, ResultSetBuilder};
use crate::statements::{PendingPrepare, PreparedStatementEntry, StatementCache};
use crate::types::{ColumnDef, FieldType, value_field_type};
use crate::value::Value;

/// What a connection surfaces to its caller. Every command ends in exactly
/// one of `Ok`, `ServerError`, or `ResultSet`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Handshake(HandshakeMessage),
    Ok(OkMessage),
    ServerError(ErrorMessage),
    ResultSet(ResultSet, EofMessage),
    Eof(EofMessage),
    AuthSwitch(AuthSwitchRequest),
}

/// The outcome of feeding one frame: events for the caller and packets to
/// put on the wire.
#[derive(Debug, Default)]
pub struct SessionStep {
    pub events: Vec<ConnectionEvent>,
    pub outgoing: Vec<Vec<u8>>,
}

/// Protocol session decoupled from any transport.
#[derive(Debug)]
pub struct Session {
    machine: ProtocolMachine,
    statements: StatementCache,
    pending: Option<PendingPrepare>,
    current_columns: Vec<ColumnDef>,
    current_result: Option<ResultSetBuilder>,
    long_data_threshold: usize,
}

impl Session {
    pub fn new(long_data_threshold: usize) -> Self {
        Self {
            machine: ProtocolMachine::new(),
            statements: StatementCache::new(),
            pending: None,
            current_columns: Vec::new(),
            current_result: None,
            long_data_threshold,
        }
    }

    pub fn machine(&self) -> &ProtocolMachine {
        &self.machine
    }

    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    /// Record that the handshake response went out.
    pub fn handshake_response_sent(&mut self) {
        self.machine.handshake_response_sent();
    }

    /// Begin a text query. Returns the packet to write.
    pub fn start_query(&mut self, sql: &str) -> Vec<u8> {
        debug!(sql, "query");
        self.clear_command_state();
        self.machine.query_started();
        encode_query(sql, 0)
    }

    /// Begin a prepared statement execution. If the statement is already
    /// cached this goes straight to execute; otherwise a prepare is sent
    /// and the execute follows automatically once the statement is
    /// described.
    pub fn start_prepared(&mut self, sql: &str, values: Vec<Value>) -> Vec<Vec<u8>> {
        debug!(sql, params = values.len(), "prepared statement");
        self.clear_command_state();
        if let Some(entry) = self.statements.get(sql).cloned() {
            self.execute_for(&entry, &values)
        } else {
            self.pending = Some(PendingPrepare::new(sql, values));
            self.machine.prepare_started();
            vec![encode_prepare(sql, 0)]
        }
    }

    /// Build the execute packets for a described statement. Oversized byte
    /// parameters are streamed ahead with send-long-data and omitted from
    /// the execute packet itself.
    fn execute_for(&mut self, entry: &PreparedStatementEntry, values: &[Value]) -> Vec<Vec<u8>> {
        self.current_columns.clear();
        self.machine.execute_started();

        let long_indices: Vec<usize> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                Value::Bytes(b) if b.len() > self.long_data_threshold => Some(i),
                _ => None,
            })
            .collect();

        let param_types: Vec<FieldType> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                entry
                    .params
                    .get(i)
                    .map_or_else(|| value_field_type(v), |p| p.column_type)
            })
            .collect();

        let mut packets = Vec::with_capacity(long_indices.len() + 1);
        for &i in &long_indices {
            if let Value::Bytes(data) = &values[i] {
                packets.push(encode_send_long_data(entry.statement_id, i as u16, data, 0));
            }
        }
        packets.push(encode_execute(
            entry.statement_id,
            values,
            &param_types,
            &long_indices,
            0,
        ));
        packets
    }

    /// Feed one inbound frame through the machine and react to the decoded
    /// messages.
    pub fn on_frame(&mut self, frame: &Frame) -> Result<SessionStep, Error> {
        let mut step = SessionStep::default();
        for message in self.machine.decode(frame)? {
            self.on_message(message, &mut step)?;
        }
        Ok(step)
    }

    fn on_message(&mut self, message: ServerMessage, step: &mut SessionStep) -> Result<(), Error> {
        match message {
            ServerMessage::Handshake(msg) => {
                step.events.push(ConnectionEvent::Handshake(msg));
            }
            ServerMessage::Ok(msg) => {
                self.clear_command_state();
                step.events.push(ConnectionEvent::Ok(msg));
            }
            ServerMessage::Error(msg) => {
                self.clear_command_state();
                step.events.push(ConnectionEvent::ServerError(msg));
            }
            ServerMessage::ColumnDefinition(col) => {
                if let Some(pending) = &mut self.pending {
                    pending.push_descriptor(col.clone());
                }
                self.current_columns.push(col);
            }
            ServerMessage::PrepareOk(msg) => {
                let Some(pending) = &mut self.pending else {
                    return Err(Error::protocol(
                        ProtocolErrorKind::Malformed,
                        "prepare response without a prepare in flight",
                    ));
                };
                pending.response = Some(msg);
            }
            ServerMessage::ColumnsFinished(_) | ServerMessage::ParamsAndColumnsFinished(_) => {
                self.on_columns_finished(step)?;
            }
            // Column definitions follow; nothing to do yet.
            ServerMessage::ParamsFinished(_) => {}
            ServerMessage::Row(row) => {
                if let Some(builder) = &mut self.current_result {
                    builder.add_text_row(&row)?;
                }
            }
            ServerMessage::BinaryRow(row) => {
                if let Some(builder) = &mut self.current_result {
                    builder.add_binary_row(&row)?;
                }
            }
            ServerMessage::Eof(eof) => {
                if let Some(builder) = self.current_result.take() {
                    step.events
                        .push(ConnectionEvent::ResultSet(builder.finish(), eof));
                } else {
                    step.events.push(ConnectionEvent::Eof(eof));
                }
                self.clear_command_state();
            }
            ServerMessage::AuthSwitch(msg) => {
                step.events.push(ConnectionEvent::AuthSwitch(msg));
            }
        }
        Ok(())
    }

    /// Either a prepare just completed (fire the deferred execute) or a
    /// result set's column list just closed (start accumulating rows).
    fn on_columns_finished(&mut self, step: &mut SessionStep) -> Result<(), Error> {
        if let Some(pending) = self.pending.take() {
            let Some((sql, values, entry)) = pending.into_entry() else {
                return Err(Error::protocol(
                    ProtocolErrorKind::Malformed,
                    "prepare finished without a prepare response",
                ));
            };
            debug!(
                statement_id = entry.statement_id,
                params = entry.params.len(),
                columns = entry.columns.len(),
                "statement prepared"
            );
            self.current_result = Some(ResultSetBuilder::new(entry.columns.clone()));
            step.outgoing.extend(self.execute_for(&entry, &values));
            self.statements.insert(sql, entry);
        } else {
            self.current_result = Some(ResultSetBuilder::new(self.current_columns.clone()));
        }
        Ok(())
    }

    fn clear_command_state(&mut self) {
        self.current_columns.clear();
        self.current_result = None;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketWriter;

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

    fn session_at_idle() -> Session {
        let mut s = Session::new(1023);
        s.handshake_response_sent();
        s
    }

    #[test]
    fn query_produces_result_set_event() {
        let mut s = session_at_idle();
        let packet = s.start_query("SELECT id, name FROM users");
        assert_eq!(packet[4], 0x03);

        assert!(s.on_frame(&frame(vec![0x02])).unwrap().events.is_empty());
        s.on_frame(&frame(column_def_payload("id", FieldType::Long)))
            .unwrap();
        s.on_frame(&frame(column_def_payload("name", FieldType::VarString)))
            .unwrap();
        s.on_frame(&frame(EofMessage::default().encode())).unwrap();

        let mut row = PacketWriter::new();
        row.write_lenenc_bytes(b"7");
        row.write_lenenc_bytes(b"bob");
        s.on_frame(&frame(row.into_bytes())).unwrap();

        let step = s.on_frame(&frame(EofMessage::default().encode())).unwrap();
        match &step.events[0] {
            ConnectionEvent::ResultSet(rs, _) => {
                assert_eq!(rs.len(), 1);
                assert_eq!(rs.get(0, 0), Some(&Value::Int(7)));
                assert_eq!(rs.get(0, 1), Some(&Value::Text("bob".into())));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn rowless_query_yields_ok_event() {
        let mut s = session_at_idle();
        s.start_query("DELETE FROM users");

        let ok = OkMessage {
            affected_rows: 2,
            last_insert_id: 0,
            status_flags: 0x0002,
            warnings: 0,
            info: String::new(),
        };
        let step = s.on_frame(&frame(ok.encode())).unwrap();
        assert!(matches!(step.events[0], ConnectionEvent::Ok(_)));
    }

    #[test]
    fn prepare_defers_execute_until_described() {
        let mut s = session_at_idle();
        let packets = s.start_prepared("SELECT id FROM t WHERE id = ?", vec![Value::Int(5)]);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][4], 0x16);

        let prepare_ok = vec![
            0x00, 0x04, 0x00, 0x00, 0x00, // statement_id = 4
            0x01, 0x00, // columns = 1
            0x01, 0x00, // params = 1
            0x00, 0x00, 0x00,
        ];
        assert!(s.on_frame(&frame(prepare_ok)).unwrap().outgoing.is_empty());
        s.on_frame(&frame(column_def_payload("?", FieldType::Long)))
            .unwrap();
        s.on_frame(&frame(EofMessage::default().encode())).unwrap();
        s.on_frame(&frame(column_def_payload("id", FieldType::Long)))
            .unwrap();

        // Terminal EOF fires the deferred execute.
        let step = s.on_frame(&frame(EofMessage::default().encode())).unwrap();
        assert_eq!(step.outgoing.len(), 1);
        assert_eq!(step.outgoing[0][4], 0x17);
        assert!(s.statements().contains("SELECT id FROM t WHERE id = ?"));
    }

    #[test]
    fn cached_statement_executes_directly() {
        let mut s = session_at_idle();
        s.start_prepared("SELECT 1", Vec::new());
        let prepare_ok = vec![
            0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let step = s.on_frame(&frame(prepare_ok)).unwrap();
        assert_eq!(step.outgoing.len(), 1);

        // Second run skips the prepare round trip.
        let packets = s.start_prepared("SELECT 1", Vec::new());
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][4], 0x17);
    }

    #[test]
    fn long_byte_params_are_streamed_ahead() {
        let mut s = session_at_idle();
        s.start_prepared("SELECT 1", Vec::new());
        let prepare_ok = vec![
            0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        s.on_frame(&frame(prepare_ok)).unwrap();
        s.on_frame(&frame(EofMessage::default().encode())).ok();

        let entry = s.statements().get("SELECT 1").unwrap().clone();
        let values = vec![Value::Bytes(vec![0xAB; 2000]), Value::Int(1)];
        let packets = s.execute_for(&entry, &values);

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][4], 0x18); // send-long-data first
        assert_eq!(packets[1][4], 0x17);
    }

    #[test]
    fn server_error_clears_in_flight_result() {
        let mut s = session_at_idle();
        s.start_query("SELECT broken");
        s.on_frame(&frame(vec![0x01])).unwrap();
        s.on_frame(&frame(column_def_payload("x", FieldType::Long)))
            .unwrap();

        let err = ErrorMessage {
            code: 1054,
            sql_state: "42S22".into(),
            message: "Unknown column".into(),
        };
        let step = s.on_frame(&frame(err.encode())).unwrap();
        assert!(matches!(step.events[0], ConnectionEvent::ServerError(_)));

        // The session is reusable straight away.
        s.start_query("SELECT 1");
    }
}
