//! sb-relay: Relay client for serverbot
//!
//! The relay runs next to the chat front end. It keeps one authenticated
//! connection to each controller agent, turns the agents' envelopes into
//! chat messages and forwards `!<prefix> <command>` lines to the matching
//! agent.

pub mod client;
pub mod reconnect;
pub mod router;
pub mod sink;

pub use client::RelayClient;
pub use reconnect::FixedBackoff;
pub use router::{CommandRouter, RouteOutcome};
pub use sink::{route, ChannelSink, ConsoleSink, RelaySink, SinkMessage};
