//! Error types for the protocol core.
//!
//! Server-reported errors (ERR packets) are not represented here: they are
//! decoded messages delivered through the event channel. `Error` covers the
//! faults that make the connection unusable: framing violations, malformed
//! or unroutable messages, and transport failures. Cancellation is not an
//! `Error` either; it travels on the `Outcome::Cancelled` arm.

use std::fmt;

/// The primary error type for protocol operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, read, write, disconnect)
    Connection(ConnectionError),
    /// Wire-level protocol errors
    Protocol(ProtocolError),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection refused
    Refused,
    /// Connection lost during operation
    Disconnected,
    /// Connection already failed; no further operations allowed
    Unusable,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Frame declared a payload larger than the configured maximum
    FrameTooLarge,
    /// A decoder finished with unconsumed payload bytes
    TrailingBytes,
    /// No decoder is registered for the message type in the current phase
    NoDecoder,
    /// Payload contents did not match the expected message layout
    Malformed,
}

impl Error {
    /// Build a protocol error with a kind and message.
    pub fn protocol(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Error::Protocol(ProtocolError {
            kind,
            message: message.into(),
        })
    }

    /// Build a connection error with no underlying source.
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Error::Connection(ConnectionError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Build a connection error wrapping an I/O error.
    pub fn connection_io(
        kind: ConnectionErrorKind,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::Connection(ConnectionError {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        })
    }

    /// Is this a fatal protocol error?
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Protocol(_) => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = Error::protocol(ProtocolErrorKind::NoDecoder, "no decoder for 0x42");
        assert_eq!(err.to_string(), "Protocol error: no decoder for 0x42");
        assert!(err.is_protocol_error());
    }

    #[test]
    fn connection_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = Error::connection_io(ConnectionErrorKind::Disconnected, "write failed", io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_protocol_error());
    }
}
