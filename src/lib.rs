//! Non-blocking MySQL client protocol core.
//!
//! Implements the client side of the MySQL wire protocol as a layered,
//! transport-independent core:
//!
//! - [`frame`]: splits a byte stream into length-prefixed frames
//! - [`machine`]: phase-driven decoding of frames into server messages
//! - [`session`]: command lifecycle, statement cache, result accumulation
//! - [`handler`]: async TCP pump built on asupersync
//!
//! Everything below the handler is synchronous and free of I/O, so complete
//! protocol exchanges can be tested from byte fixtures. Authentication
//! material (password scrambles) is supplied by the caller; this crate
//! moves the bytes but does not compute credentials.

pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
pub mod machine;
pub mod messages;
pub mod protocol;
pub mod results;
pub mod session;
pub mod statements;
pub mod types;
pub mod value;

pub use config::Config;
pub use error::{Error, Result};
pub use frame::{Frame, FrameReader};
pub use handler::ConnectionHandler;
pub use machine::{Phase, ProtocolMachine};
pub use messages::HandshakeResponse;
pub use results::ResultSet;
pub use session::{ConnectionEvent, Session, SessionStep};
pub use value::Value;
