//! sb-core: Core abstractions and configuration for serverbot
//!
//! This crate provides the error taxonomy, configuration structures, the
//! shared-secret handshake and the connection slot used by both the
//! controller agent and the relay client.

pub mod auth;
pub mod config;
pub mod error;
pub mod ipc;

pub use error::{ConfigError, ConnectionError, ProcessError, SbError, UsageError};
pub use ipc::{ConnectionSlot, IpcReader, IpcWriter};
