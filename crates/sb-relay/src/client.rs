//! Dialer for one controller agent
//!
//! Connects, announces the connection, routes every received envelope to
//! the sink, and starts over when the connection breaks. Failed connects
//! are retried at a fixed interval forever.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use sb_core::config::{RelayBackend, RelayConfig};
use sb_core::ipc::dial;
use sb_core::{ConnectionSlot, IpcReader};
use sb_protocol::Envelope;

use crate::reconnect::FixedBackoff;
use crate::sink::{route, RelaySink};

/// How a connected session ended
enum SessionEnd {
    Lost,
    Cancelled,
}

/// Relay-side connection to one controller agent
pub struct RelayClient {
    backend: RelayBackend,
    secret: String,
    handshake_timeout: Duration,
    max_line_length: usize,
    backoff: FixedBackoff,
    slot: ConnectionSlot,
    sink: Arc<dyn RelaySink>,
}

impl RelayClient {
    pub fn new(config: &RelayConfig, backend: RelayBackend, sink: Arc<dyn RelaySink>) -> Self {
        Self {
            backend,
            secret: config.secret.clone(),
            handshake_timeout: config.handshake_timeout,
            max_line_length: config.max_line_length,
            backoff: FixedBackoff::new(config.reconnect_interval),
            slot: ConnectionSlot::with_send_timeout(config.send_timeout),
            sink,
        }
    }

    pub fn backend(&self) -> &RelayBackend {
        &self.backend
    }

    pub fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    /// Dial, serve and redial until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let name = &self.backend.name;

        loop {
            let dialed = tokio::select! {
                _ = cancel.cancelled() => break,
                dialed = dial(
                    &self.backend.address,
                    &self.secret,
                    self.handshake_timeout,
                    self.max_line_length,
                ) => dialed,
            };

            let (reader, writer) = match dialed {
                Ok(halves) => halves,
                Err(e) => {
                    tracing::debug!("Could not reach {} controller: {}", name, e);
                    if !self.backoff.wait(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let id = self.slot.install(writer).await;
            tracing::info!("Connected to {} controller at {}", name, self.backend.address);
            self.sink
                .primary(&format!("{} server manager connected!", name))
                .await;

            let end = self.receive(reader, &cancel).await;
            self.slot.release(id).await;

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::Lost => {
                    self.sink
                        .primary(&format!(
                            "ERR: The {} server manager crashed. Attempting to reconnect",
                            name
                        ))
                        .await;
                }
            }
        }

        self.slot.close().await;
        tracing::debug!("{} relay client stopped", name);
    }

    async fn receive(&self, mut reader: IpcReader, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = reader.next() => next,
            };

            match next {
                Some(Ok(line)) => route(&Envelope::decode(&line), self.sink.as_ref()).await,
                Some(Err(e)) => {
                    tracing::warn!("{} controller connection lost: {}", self.backend.name, e);
                    return SessionEnd::Lost;
                }
                None => {
                    tracing::warn!("{} controller closed the connection", self.backend.name);
                    return SessionEnd::Lost;
                }
            }
        }
    }

    /// Forward one command line to the controller.
    ///
    /// A failure is reported to the primary sink; reconnecting is left to
    /// [`run`](Self::run), which sees the broken connection on its own.
    pub async fn try_send(&self, line: &str) -> bool {
        match self.slot.send(line).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Send to {} controller failed: {}", self.backend.name, e);
                self.sink
                    .primary(&format!(
                        "Could not send command to {} server manager",
                        self.backend.name
                    ))
                    .await;
                false
            }
        }
    }
}
