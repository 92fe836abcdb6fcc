//! IPC transport shared by the controller agent and the relay client
//!
//! Uses newline-delimited text over TCP on localhost. Each role keeps the
//! write half of its current connection in a [`ConnectionSlot`] so that
//! several tasks (command replies, the stdout drain loop, chat commands)
//! can send over whichever connection is live, while exactly one task owns
//! the read half.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use sb_protocol::{Envelope, LineCodec, ProtocolError};

use crate::auth;
use crate::error::ConnectionError;

/// Default bound on how long one write may wait for the peer to accept data
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Read half of an IPC connection, yielding decoded lines
pub type IpcReader = FramedRead<Box<dyn AsyncRead + Send + Unpin>, LineCodec>;

/// Write half of an IPC connection, accepting lines
pub type IpcWriter = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LineCodec>;

/// Wrap raw read/write halves in the line codec
pub fn framed_halves<R, W>(reader: R, writer: W, max_line_length: usize) -> (IpcReader, IpcWriter)
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
    let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
    (
        FramedRead::new(reader, LineCodec::with_max_length(max_line_length)),
        FramedWrite::new(writer, LineCodec::with_max_length(max_line_length)),
    )
}

/// Split a TCP stream into framed halves
pub fn split_tcp(stream: TcpStream, max_line_length: usize) -> (IpcReader, IpcWriter) {
    let (reader, writer) = stream.into_split();
    framed_halves(reader, writer, max_line_length)
}

/// Connect to a listener and complete the handshake
pub async fn dial(
    address: &str,
    secret: &str,
    handshake_timeout: Duration,
    max_line_length: usize,
) -> Result<(IpcReader, IpcWriter), ConnectionError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| ConnectionError::ConnectionRefused(format!("{}: {}", address, e)))?;

    let (mut reader, mut writer) = split_tcp(stream, max_line_length);
    auth::connect_handshake(&mut reader, &mut writer, secret, handshake_timeout).await?;

    Ok((reader, writer))
}

struct Installed {
    id: u64,
    writer: IpcWriter,
}

/// Holder for the single logically active connection of one role
///
/// Installing a new writer replaces (and closes) any previous one. A failed
/// or stalled send drops the writer so every other sender sees the slot as
/// empty until the owning loop installs a fresh connection.
pub struct ConnectionSlot {
    current: Mutex<Option<Installed>>,
    connected: watch::Sender<bool>,
    next_id: AtomicU64,
    send_timeout: Duration,
}

impl ConnectionSlot {
    /// Create an empty slot with [`DEFAULT_SEND_TIMEOUT`]
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// Create an empty slot whose writes give up after `send_timeout`
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            current: Mutex::new(None),
            connected,
            next_id: AtomicU64::new(1),
            send_timeout,
        }
    }

    /// Install a new connection, returning its id
    pub async fn install(&self, writer: IpcWriter) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut current = self.current.lock().await;
        if let Some(previous) = current.replace(Installed { id, writer }) {
            tracing::debug!("Replacing IPC connection {} with {}", previous.id, id);
        }
        self.connected.send_replace(true);
        id
    }

    /// Remove the connection with the given id, if it is still installed
    pub async fn release(&self, id: u64) -> bool {
        let mut current = self.current.lock().await;
        if current.as_ref().map(|c| c.id) == Some(id) {
            *current = None;
            self.connected.send_replace(false);
            true
        } else {
            false
        }
    }

    /// Whether the connection with the given id is still the installed one
    pub async fn is_current(&self, id: u64) -> bool {
        self.current.lock().await.as_ref().map(|c| c.id) == Some(id)
    }

    /// Drop whatever connection is installed
    pub async fn close(&self) {
        let mut current = self.current.lock().await;
        if let Some(mut installed) = current.take() {
            let closing = SinkExt::<String>::close(&mut installed.writer);
            if tokio::time::timeout(self.send_timeout, closing).await.is_err() {
                tracing::debug!("Peer of connection {} did not drain before close", installed.id);
            }
        }
        self.connected.send_replace(false);
    }

    /// Whether a connection is currently installed
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch connectivity changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Send one line over the current connection
    ///
    /// Fails with [`ConnectionError::NotConnected`] when the slot is empty,
    /// with [`ConnectionError::MessageRejected`] when the line exceeds the
    /// codec limit, and with [`ConnectionError::ConnectionLost`] when the
    /// write fails or the peer stops reading for longer than the send
    /// timeout. In both of those cases the connection is dropped.
    pub async fn send(&self, line: &str) -> Result<(), ConnectionError> {
        let mut current = self.current.lock().await;
        let installed = current.as_mut().ok_or(ConnectionError::NotConnected)?;

        let reason = match tokio::time::timeout(self.send_timeout, installed.writer.send(line)).await
        {
            Ok(Ok(())) => return Ok(()),
            // Rejected by the encoder before anything was written
            Ok(Err(e @ ProtocolError::LineTooLong { .. })) => {
                return Err(ConnectionError::MessageRejected(e.to_string()));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("peer stopped reading for {:?}", self.send_timeout),
        };

        tracing::debug!("IPC send on connection {} failed: {}", installed.id, reason);
        *current = None;
        self.connected.send_replace(false);
        Err(ConnectionError::ConnectionLost(reason))
    }

    /// Send one envelope over the current connection
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        self.send(&envelope.encode()).await
    }

    /// Best-effort send: failures are logged and reported as `false`.
    ///
    /// The loop that owns the read half notices the broken connection on
    /// its own, so senders only need to degrade gracefully.
    pub async fn try_send_envelope(&self, envelope: &Envelope) -> bool {
        match self.send_envelope(envelope).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not send {:?}: {}", envelope.encode(), e);
                false
            }
        }
    }

    /// Poll until a connection is installed or `cancel` fires.
    ///
    /// Returns `false` if cancelled.
    pub async fn wait_connected(&self, poll_interval: Duration, cancel: &CancellationToken) -> bool {
        loop {
            if self.is_connected() {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::new()
    }
}
