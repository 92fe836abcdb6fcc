//! IPC listener
//!
//! Accepts relay connections on localhost and serves them one at a time.
//! A second dialer waits in the accept backlog until the current one goes
//! away. Losing a connection never touches the game server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use sb_core::auth;
use sb_core::config::ControllerConfig;
use sb_core::ipc::split_tcp;
use sb_core::ConnectionSlot;
use sb_protocol::CommandRequest;

use crate::dispatch::{Dispatcher, ServerControl};

/// Serves the relay's commands over the authenticated IPC channel
pub struct IpcListener<C> {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    secret: String,
    handshake_timeout: Duration,
    max_line_length: usize,
    dispatcher: Arc<Dispatcher<C>>,
    slot: Arc<ConnectionSlot>,
    shutdown: CancellationToken,
}

impl<C: ServerControl> IpcListener<C> {
    pub fn new(
        config: &ControllerConfig,
        dispatcher: Arc<Dispatcher<C>>,
        slot: Arc<ConnectionSlot>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            address: config.listen_address.clone(),
            secret: config.secret.clone(),
            handshake_timeout: config.handshake_timeout,
            max_line_length: config.max_line_length,
            dispatcher,
            slot,
            shutdown,
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind IPC listener to {}", self.address))?;

        self.serve(listener).await
    }

    /// Serve an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("IPC listener has no address")?;
        tracing::info!("IPC listener ready on {}", local);

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    // Only accept connections from localhost
                    if !peer.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer);
                        continue;
                    }
                    self.handle_connection(stream, peer).await;
                }
                Err(e) => {
                    tracing::error!("Failed to accept IPC connection: {}", e);
                }
            }
        }

        self.slot.close().await;
        tracing::info!("IPC listener on {} shut down", local);
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let (mut reader, mut writer) = split_tcp(stream, self.max_line_length);

        let handshake = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            result = auth::accept_handshake(
                &mut reader,
                &mut writer,
                &self.secret,
                self.handshake_timeout,
            ) => result,
        };
        if let Err(e) = handshake {
            tracing::warn!("Handshake with {} failed: {}", peer, e);
            return;
        }

        let id = self.slot.install(writer).await;
        tracing::info!("Relay connected from {}", peer);

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = reader.next() => next,
            };

            match next {
                Some(Ok(line)) => {
                    let Some(request) = CommandRequest::parse(&line) else {
                        continue;
                    };
                    for reply in self.dispatcher.dispatch(&request).await {
                        self.slot.try_send_envelope(&reply).await;
                    }
                    // A stalled or broken write evicted this connection
                    if !self.slot.is_current(id).await {
                        tracing::warn!("Dropping unresponsive relay at {}", peer);
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Connection from {} lost: {}", peer, e);
                    break;
                }
                None => {
                    tracing::info!("Relay at {} disconnected", peer);
                    break;
                }
            }
        }

        self.slot.release(id).await;
    }
}
