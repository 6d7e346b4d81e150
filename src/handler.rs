//! Async connection handler.
//!
//! Pumps bytes between a TCP stream and a [`Session`]. All protocol logic
//! lives in the session; this layer only reads, feeds the frame reader,
//! writes whatever the session asks to send, and surfaces events.
//!
//! Any framing or protocol fault marks the handler unusable; subsequent
//! operations fail fast instead of reading a desynchronized stream.

use std::collections::VecDeque;
use std::io;

use asupersync::io::{AsyncRead, AsyncWrite, ReadBuf};
use asupersync::net::TcpStream;
use asupersync::{CancelReason, Cx, Outcome};
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{ConnectionErrorKind, Error};
use crate::frame::FrameReader;
use crate::messages::client::{HandshakeResponse, encode_quit};
use crate::session::{ConnectionEvent, Session};
use crate::value::Value;

const READ_CHUNK: usize = 8192;

/// A connection handler bound to one TCP stream.
pub struct ConnectionHandler {
    stream: TcpStream,
    frames: FrameReader,
    session: Session,
    last_sequence: u8,
    faulted: bool,
    pending_events: VecDeque<ConnectionEvent>,
}

impl ConnectionHandler {
    /// Open a TCP connection. The server speaks first: call
    /// [`next_event`](Self::next_event) to receive its handshake, then
    /// respond with [`send_handshake_response`](Self::send_handshake_response).
    pub async fn connect(cx: &Cx, config: Config) -> Outcome<Self, Error> {
        if let Some(reason) = cancel_requested(cx) {
            return Outcome::Cancelled(reason);
        }
        let addr = config.socket_addr();
        let socket_addr = match addr.parse::<std::net::SocketAddr>() {
            Ok(a) => a,
            Err(e) => {
                return Outcome::Err(Error::connection(
                    ConnectionErrorKind::Connect,
                    format!("invalid socket address {addr}: {e}"),
                ));
            }
        };
        let stream = match TcpStream::connect_timeout(socket_addr, config.connect_timeout).await {
            Ok(s) => s,
            Err(e) => {
                let kind = if e.kind() == io::ErrorKind::ConnectionRefused {
                    ConnectionErrorKind::Refused
                } else {
                    ConnectionErrorKind::Connect
                };
                return Outcome::Err(Error::connection_io(
                    kind,
                    format!("failed to connect to {addr}: {e}"),
                    e,
                ));
            }
        };
        stream.set_nodelay(true).ok();
        debug!(addr, "connected");

        Outcome::Ok(Self {
            stream,
            frames: FrameReader::new(config.max_packet_size),
            session: Session::new(config.long_data_threshold),
            last_sequence: 0,
            faulted: false,
            pending_events: VecDeque::new(),
        })
    }

    /// Wait for the next connection event, reading from the stream as
    /// needed and writing any packets the session produces along the way.
    pub async fn next_event(&mut self, cx: &Cx) -> Outcome<ConnectionEvent, Error> {
        if let Some(reason) = cancel_requested(cx) {
            return Outcome::Cancelled(reason);
        }
        if self.faulted {
            return Outcome::Err(unusable());
        }

        loop {
            if let Some(event) = self.pending_events.pop_front() {
                return Outcome::Ok(event);
            }

            match self.frames.next_frame() {
                Ok(Some(frame)) => {
                    self.last_sequence = frame.sequence;
                    let step = match self.session.on_frame(&frame) {
                        Ok(step) => step,
                        Err(e) => {
                            self.faulted = true;
                            return Outcome::Err(e);
                        }
                    };
                    for packet in &step.outgoing {
                        if let Outcome::Err(e) = self.write_bytes(packet).await {
                            return Outcome::Err(e);
                        }
                    }
                    self.pending_events.extend(step.events);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    self.faulted = true;
                    return Outcome::Err(e);
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let stream = &mut self.stream;
            let mut read_buf = ReadBuf::new(&mut chunk);
            let n = match std::future::poll_fn(|cx| {
                std::pin::Pin::new(&mut *stream).poll_read(cx, &mut read_buf)
            })
            .await
            {
                Ok(()) => read_buf.filled().len(),
                Err(e) => {
                    self.faulted = true;
                    return Outcome::Err(Error::connection_io(
                        ConnectionErrorKind::Disconnected,
                        format!("read failed: {e}"),
                        e,
                    ));
                }
            };
            if n == 0 {
                self.faulted = true;
                return Outcome::Err(Error::connection(
                    ConnectionErrorKind::Disconnected,
                    "connection closed by server",
                ));
            }
            trace!(bytes = n, "read chunk");
            self.frames.feed(&chunk[..n]);
        }
    }

    /// Send the handshake response, continuing the server's sequence.
    pub async fn send_handshake_response(
        &mut self,
        cx: &Cx,
        response: &HandshakeResponse,
    ) -> Outcome<(), Error> {
        if let Some(reason) = cancel_requested(cx) {
            return Outcome::Cancelled(reason);
        }
        if self.faulted {
            return Outcome::Err(unusable());
        }
        let packet = response.encode(self.last_sequence.wrapping_add(1));
        self.session.handshake_response_sent();
        self.write_bytes(&packet).await
    }

    /// Send raw auth bytes in reply to an auth switch request.
    pub async fn send_auth_switch_response(
        &mut self,
        cx: &Cx,
        auth_data: &[u8],
    ) -> Outcome<(), Error> {
        if let Some(reason) = cancel_requested(cx) {
            return Outcome::Cancelled(reason);
        }
        if self.faulted {
            return Outcome::Err(unusable());
        }
        let packet = crate::messages::client::encode_auth_switch_response(
            auth_data,
            self.last_sequence.wrapping_add(1),
        );
        self.write_bytes(&packet).await
    }

    /// Send a text query. The result arrives through `next_event`.
    pub async fn send_query(&mut self, cx: &Cx, sql: &str) -> Outcome<(), Error> {
        if let Some(reason) = cancel_requested(cx) {
            return Outcome::Cancelled(reason);
        }
        if self.faulted {
            return Outcome::Err(unusable());
        }
        let packet = self.session.start_query(sql);
        self.write_bytes(&packet).await
    }

    /// Execute a statement with parameters, preparing it first if this
    /// connection has not seen the SQL before.
    pub async fn send_prepared_statement(
        &mut self,
        cx: &Cx,
        sql: &str,
        values: Vec<Value>,
    ) -> Outcome<(), Error> {
        if let Some(reason) = cancel_requested(cx) {
            return Outcome::Cancelled(reason);
        }
        if self.faulted {
            return Outcome::Err(unusable());
        }
        let packets = self.session.start_prepared(sql, values);
        for packet in &packets {
            if let Outcome::Err(e) = self.write_bytes(packet).await {
                return Outcome::Err(e);
            }
        }
        Outcome::Ok(())
    }

    /// Send COM_QUIT and drop the connection.
    pub async fn disconnect(mut self, cx: &Cx) -> Outcome<(), Error> {
        if let Some(reason) = cancel_requested(cx) {
            return Outcome::Cancelled(reason);
        }
        if self.faulted {
            return Outcome::Err(unusable());
        }
        let packet = encode_quit(0);
        self.write_bytes(&packet).await
    }

    async fn write_bytes(&mut self, packet: &[u8]) -> Outcome<(), Error> {
        let stream = &mut self.stream;
        let mut written = 0;
        while written < packet.len() {
            match std::future::poll_fn(|cx| {
                std::pin::Pin::new(&mut *stream).poll_write(cx, &packet[written..])
            })
            .await
            {
                Ok(0) => {
                    self.faulted = true;
                    return Outcome::Err(Error::connection(
                        ConnectionErrorKind::Disconnected,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => written += n,
                Err(e) => {
                    self.faulted = true;
                    return Outcome::Err(Error::connection_io(
                        ConnectionErrorKind::Disconnected,
                        format!("write failed: {e}"),
                        e,
                    ));
                }
            }
        }

        match std::future::poll_fn(|cx| std::pin::Pin::new(&mut *stream).poll_flush(cx)).await {
            Ok(()) => Outcome::Ok(()),
            Err(e) => {
                self.faulted = true;
                Outcome::Err(Error::connection_io(
                    ConnectionErrorKind::Disconnected,
                    format!("flush failed: {e}"),
                    e,
                ))
            }
        }
    }
}

fn unusable() -> Error {
    Error::connection(
        ConnectionErrorKind::Unusable,
        "connection previously faulted",
    )
}

fn cancel_requested(cx: &Cx) -> Option<CancelReason> {
    if cx.is_cancel_requested() {
        Some(
            cx.cancel_reason()
                .unwrap_or_else(|| CancelReason::user("cancelled")),
        )
    } else {
        None
    }
}
