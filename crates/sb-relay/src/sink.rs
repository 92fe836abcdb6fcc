//! Chat-side outputs of the relay
//!
//! Each backend has a primary sink (the bot channel: replies, notices) and
//! a log sink (the server's console output).

use async_trait::async_trait;
use tokio::sync::mpsc;

use sb_protocol::{Envelope, Status};

/// Where relayed messages end up
#[async_trait]
pub trait RelaySink: Send + Sync {
    /// Replies and connectivity notices
    async fn primary(&self, message: &str);

    /// Server console output
    async fn log(&self, message: &str);
}

/// Deliver one envelope: `LOG` to the log sink, `OK` to the primary sink,
/// anything else to the primary sink prefixed with its status.
pub async fn route(envelope: &Envelope, sink: &dyn RelaySink) {
    match &envelope.status {
        Status::Log => sink.log(&envelope.body).await,
        Status::Ok => sink.primary(&envelope.body).await,
        status => sink.primary(&format!("{}: {}", status, envelope.body)).await,
    }
}

/// Prints to stdout, tagging log output with the backend prefix
pub struct ConsoleSink {
    prefix: String,
}

impl ConsoleSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl RelaySink for ConsoleSink {
    async fn primary(&self, message: &str) {
        println!("{}", message);
    }

    async fn log(&self, message: &str) {
        for line in message.lines() {
            println!("[{} log] {}", self.prefix, line);
        }
    }
}

/// A message handed to a [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMessage {
    Primary(String),
    Log(String),
}

/// Forwards messages to a channel, for front ends running their own task
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RelaySink for ChannelSink {
    async fn primary(&self, message: &str) {
        if self.tx.send(SinkMessage::Primary(message.to_string())).is_err() {
            tracing::debug!("Sink receiver dropped");
        }
    }

    async fn log(&self, message: &str) {
        if self.tx.send(SinkMessage::Log(message.to_string())).is_err() {
            tracing::debug!("Sink receiver dropped");
        }
    }
}
