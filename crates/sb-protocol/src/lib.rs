//! sb-protocol: Line protocol for serverbot
//!
//! This crate defines the newline-delimited text protocol spoken between
//! the controller agent (next to the game server) and the relay client
//! (next to the chat front end).

pub mod chunk;
pub mod codec;
pub mod command;
pub mod envelope;
pub mod error;

pub use chunk::LogChunker;
pub use codec::{LineCodec, DEFAULT_MAX_LINE_LENGTH};
pub use command::CommandRequest;
pub use envelope::{Envelope, Status};
pub use error::ProtocolError;
