//! Wire message codecs.
//!
//! `server` holds one decoder per inbound message kind; `client` holds the
//! outbound command encoders. Routing between them is the state machine's
//! job, not theirs.

pub mod client;
pub mod server;

pub use client::HandshakeResponse;
pub use server::{
    AuthSwitchRequest, BinaryRow, EofMessage, ErrorMessage, HandshakeMessage, OkMessage,
    PrepareOkMessage, ServerMessage, TextRow,
};
