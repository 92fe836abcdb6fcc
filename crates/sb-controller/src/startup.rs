//! Startup detection
//!
//! Reads the freshly spawned server's output until a line matches the
//! backend's ready pattern. Everything read meanwhile is forwarded to the
//! relay as `LOG` messages no larger than the outbound message limit.

use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sb_core::{ConnectionSlot, ProcessError};
use sb_protocol::{Envelope, LogChunker};

use crate::process::ProcessHandle;

/// Wait for `ready` to match a line of the child's output.
///
/// On success the matching line and everything before it has been sent.
/// On [`ProcessError::StartupTimeout`] or [`ProcessError::ProcessDead`] the
/// buffered output is flushed first so the failure can be diagnosed from
/// the log. The caller decides what to do with the half-started child.
pub async fn await_ready(
    handle: &mut ProcessHandle,
    ready: &Regex,
    timeout: Duration,
    max_message_len: usize,
    slot: &ConnectionSlot,
    cancel: &CancellationToken,
) -> Result<(), ProcessError> {
    let deadline = Instant::now() + timeout;
    let mut chunker = LogChunker::new(max_message_len);

    let result = loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break Err(ProcessError::Cancelled),
            read = tokio::time::timeout_at(deadline, handle.read_line()) => match read {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => break Err(e),
                Err(_) => {
                    tracing::warn!("No ready line within {:?}", timeout);
                    break Err(ProcessError::StartupTimeout(timeout));
                }
            },
        };

        for chunk in chunker.push(&line) {
            slot.try_send_envelope(&Envelope::log(chunk)).await;
        }

        if ready.is_match(line.trim()) {
            tracing::info!("Server reported ready: {}", line.trim());
            break Ok(());
        }
    };

    if let Some(rest) = chunker.take() {
        slot.try_send_envelope(&Envelope::log(rest)).await;
    }
    result
}
