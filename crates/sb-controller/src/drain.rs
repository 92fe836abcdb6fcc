//! Stdout drain loop
//!
//! Forwards every line of child output to the relay as `LOG` envelopes.
//! A line longer than the outbound message limit is sent in pieces. Pieces
//! that could not be delivered stay in a retry slot and no new line is read
//! until they have gone out, so nothing is dropped while the relay is away.
//! The bounded output channel behind [`ProcessOutput`] holds back
//! everything after them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sb_core::{ConnectionError, ConnectionSlot};
use sb_protocol::{Envelope, LogChunker};

use crate::process::{Liveness, ProcessOutput};

/// Drain settings
#[derive(Debug, Clone, Copy)]
pub struct DrainOptions {
    /// Largest body of one `LOG` envelope, in characters
    pub max_message_len: usize,
    /// How often to check whether a relay has connected
    pub poll_interval: Duration,
}

/// Split one output line into envelopes no larger than `max_chars`
fn envelopes_for(line: &str, max_chars: usize) -> VecDeque<Envelope> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut chunker = LogChunker::new(max_chars);
    let mut pieces = chunker.push(line);
    pieces.extend(chunker.take());
    if pieces.is_empty() {
        // Blank lines are forwarded too
        pieces.push(String::new());
    }
    pieces.into_iter().map(Envelope::log).collect()
}

/// Run until the child has exited and its output is exhausted, or until
/// `cancel` fires.
pub async fn run(
    mut output: ProcessOutput,
    liveness: Liveness,
    slot: Arc<ConnectionSlot>,
    options: DrainOptions,
    cancel: CancellationToken,
) {
    let mut pending: VecDeque<Envelope> = VecDeque::new();

    loop {
        if pending.is_empty() {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = output.read_line() => read,
            };
            match read {
                Ok(line) => pending = envelopes_for(&line, options.max_message_len),
                Err(_) => {
                    // Pipes are closed; the liveness check decides when to stop
                    if liveness.is_running() {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = liveness.wait_exit() => {}
                        }
                    }
                    break;
                }
            }
        }

        if !slot.wait_connected(options.poll_interval, &cancel).await {
            break;
        }

        while let Some(envelope) = pending.front() {
            match slot.send_envelope(envelope).await {
                Ok(()) => {}
                Err(ConnectionError::MessageRejected(e)) => {
                    tracing::warn!("Dropping unsendable log line: {}", e);
                }
                Err(e) => {
                    tracing::debug!("Log line held for retry: {}", e);
                    break;
                }
            }
            pending.pop_front();
        }
    }

    tracing::debug!("Drain loop finished");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::ProcessHandle;
    use futures::StreamExt;
    use sb_core::ipc::framed_halves;
    use sb_core::{IpcReader, IpcWriter};
    use sb_protocol::Status;
    use std::path::Path;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn options() -> DrainOptions {
        DrainOptions {
            max_message_len: 1990,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn pipe() -> (IpcWriter, IpcReader) {
        let (a, b) = tokio::io::duplex(1 << 16);
        let (_ar, aw) = tokio::io::split(a);
        let (br, _bw) = tokio::io::split(b);
        let (_, writer) = framed_halves(tokio::io::empty(), aw, 1 << 16);
        let (reader, _) = framed_halves(br, tokio::io::sink(), 1 << 16);
        (writer, reader)
    }

    #[tokio::test]
    async fn test_lines_forwarded_in_order() {
        let slot = Arc::new(ConnectionSlot::new());
        let (writer, mut peer) = pipe();
        slot.install(writer).await;

        let mut handle =
            ProcessHandle::spawn(&sh("echo one; echo two 1>&2; echo three"), Path::new(".")).unwrap();
        let output = handle.take_output().unwrap();
        let task = tokio::spawn(run(
            output,
            handle.liveness(),
            Arc::clone(&slot),
            options(),
            CancellationToken::new(),
        ));

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        let mut bodies = Vec::new();
        for _ in 0..3 {
            let envelope = Envelope::decode(&peer.next().await.unwrap().unwrap());
            assert_eq!(envelope.status, Status::Log);
            bodies.push(envelope.body);
        }
        assert_eq!(bodies, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_waits_for_connection_without_dropping() {
        let slot = Arc::new(ConnectionSlot::new());
        let mut handle = ProcessHandle::spawn(&sh("echo early; sleep 0.3"), Path::new(".")).unwrap();
        let output = handle.take_output().unwrap();
        let task = tokio::spawn(run(
            output,
            handle.liveness(),
            Arc::clone(&slot),
            options(),
            CancellationToken::new(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let (writer, mut peer) = pipe();
        slot.install(writer).await;

        let envelope = Envelope::decode(&peer.next().await.unwrap().unwrap());
        assert_eq!(envelope, Envelope::log("early"));
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_send_retried_on_next_connection() {
        let slot = Arc::new(ConnectionSlot::new());
        let (dead_writer, dead_peer) = pipe();
        drop(dead_peer);
        slot.install(dead_writer).await;

        let mut handle = ProcessHandle::spawn(&sh("echo kept; sleep 0.5"), Path::new(".")).unwrap();
        let output = handle.take_output().unwrap();
        let task = tokio::spawn(run(
            output,
            handle.liveness(),
            Arc::clone(&slot),
            options(),
            CancellationToken::new(),
        ));

        // The first send hits the dead peer and clears the slot
        let mut connected = slot.subscribe();
        connected.wait_for(|c| !*c).await.unwrap();

        let (writer, mut peer) = pipe();
        slot.install(writer).await;
        let envelope = Envelope::decode(&peer.next().await.unwrap().unwrap());
        assert_eq!(envelope, Envelope::log("kept"));

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let slot = Arc::new(ConnectionSlot::new());
        let mut handle = ProcessHandle::spawn(&sh("echo stuck; sleep 30"), Path::new(".")).unwrap();
        let output = handle.take_output().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            output,
            handle.liveness(),
            Arc::clone(&slot),
            options(),
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        handle.kill();
    }

    #[test]
    fn test_long_line_split() {
        let line = format!("{}\n", "a".repeat(25));
        let pieces: Vec<_> = envelopes_for(&line, 10).into_iter().collect();
        assert_eq!(
            pieces,
            vec![
                Envelope::log("a".repeat(10)),
                Envelope::log("a".repeat(10)),
                Envelope::log("a".repeat(5)),
            ]
        );
        assert_eq!(envelopes_for("\r\n", 10), vec![Envelope::log("")]);
    }
}
