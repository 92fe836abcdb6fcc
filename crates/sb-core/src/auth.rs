//! Shared-secret authentication for IPC connections
//!
//! Both ends of an IPC connection hold the same pre-shared secret. Right
//! after the TCP connection is established each side proves knowledge of
//! the secret to the other with a challenge/response exchange, so the
//! secret itself never crosses the wire:
//!
//! ```text
//! challenger                          responder
//!     #CHALLENGE <nonce>   -------->
//!                          <--------  #DIGEST <hex(sha256(nonce ":" secret))>
//!     #WELCOME | #FAILURE  -------->
//! ```
//!
//! The listener challenges first and then answers the dialer's challenge.
//! Any mismatch fails the connection before a single command is accepted.

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use sb_protocol::ProtocolError;

use crate::error::ConnectionError;

/// Length of a generated shared secret in characters
pub const SECRET_LEN: usize = 32;

/// Length of a challenge nonce in bytes (before hex encoding)
const NONCE_BYTES: usize = 20;

const CHALLENGE: &str = "#CHALLENGE";
const DIGEST: &str = "#DIGEST";
const WELCOME: &str = "#WELCOME";
const FAILURE: &str = "#FAILURE";

/// Generate a new random shared secret
///
/// Returns a 32-character alphanumeric string from the OS-seeded CSPRNG.
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Generate a random hex challenge nonce
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Compute the response to a challenge
pub fn challenge_digest(nonce: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate a token against the expected value
///
/// Uses constant-time comparison to prevent timing attacks.
pub fn validate_token(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in provided.bytes().zip(expected.bytes()) {
        result |= a ^ b;
    }
    result == 0
}

async fn next_line<R>(reader: &mut R) -> Result<String, ConnectionError>
where
    R: Stream<Item = Result<String, ProtocolError>> + Unpin,
{
    match reader.next().await {
        Some(Ok(line)) => Ok(line),
        Some(Err(e)) => Err(ConnectionError::ConnectionLost(e.to_string())),
        None => Err(ConnectionError::ConnectionLost(
            "connection closed during handshake".to_string(),
        )),
    }
}

async fn send_line<W>(writer: &mut W, line: String) -> Result<(), ConnectionError>
where
    W: Sink<String, Error = ProtocolError> + Unpin,
{
    writer
        .send(line)
        .await
        .map_err(|e| ConnectionError::ConnectionLost(e.to_string()))
}

/// Challenge the peer and verify its digest
pub async fn deliver_challenge<R, W>(
    reader: &mut R,
    writer: &mut W,
    secret: &str,
) -> Result<(), ConnectionError>
where
    R: Stream<Item = Result<String, ProtocolError>> + Unpin,
    W: Sink<String, Error = ProtocolError> + Unpin,
{
    let nonce = generate_nonce();
    send_line(writer, format!("{} {}", CHALLENGE, nonce)).await?;

    let line = next_line(reader).await?;
    let provided = line
        .strip_prefix(DIGEST)
        .map(str::trim)
        .ok_or_else(|| ConnectionError::Handshake(format!("expected digest, got {:?}", line)))?;

    if validate_token(provided, &challenge_digest(&nonce, secret)) {
        send_line(writer, WELCOME.to_string()).await
    } else {
        // Best effort: the peer is rejected either way
        let _ = send_line(writer, FAILURE.to_string()).await;
        Err(ConnectionError::AuthenticationFailed)
    }
}

/// Answer the peer's challenge
pub async fn answer_challenge<R, W>(
    reader: &mut R,
    writer: &mut W,
    secret: &str,
) -> Result<(), ConnectionError>
where
    R: Stream<Item = Result<String, ProtocolError>> + Unpin,
    W: Sink<String, Error = ProtocolError> + Unpin,
{
    let line = next_line(reader).await?;
    let nonce = line
        .strip_prefix(CHALLENGE)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ConnectionError::Handshake(format!("expected challenge, got {:?}", line))
        })?;

    send_line(writer, format!("{} {}", DIGEST, challenge_digest(nonce, secret))).await?;

    match next_line(reader).await?.as_str() {
        WELCOME => Ok(()),
        FAILURE => Err(ConnectionError::AuthenticationFailed),
        other => Err(ConnectionError::Handshake(format!(
            "expected welcome, got {:?}",
            other
        ))),
    }
}

/// Listener side of the handshake: challenge first, then answer
pub async fn accept_handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    secret: &str,
    timeout: Duration,
) -> Result<(), ConnectionError>
where
    R: Stream<Item = Result<String, ProtocolError>> + Unpin,
    W: Sink<String, Error = ProtocolError> + Unpin,
{
    tokio::time::timeout(timeout, async {
        deliver_challenge(reader, writer, secret).await?;
        answer_challenge(reader, writer, secret).await
    })
    .await
    .map_err(|_| ConnectionError::HandshakeTimeout)?
}

/// Dialer side of the handshake: answer first, then challenge
pub async fn connect_handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    secret: &str,
    timeout: Duration,
) -> Result<(), ConnectionError>
where
    R: Stream<Item = Result<String, ProtocolError>> + Unpin,
    W: Sink<String, Error = ProtocolError> + Unpin,
{
    tokio::time::timeout(timeout, async {
        answer_challenge(reader, writer, secret).await?;
        deliver_challenge(reader, writer, secret).await
    })
    .await
    .map_err(|_| ConnectionError::HandshakeTimeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::framed_halves;

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_BYTES * 2);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_challenge_digest_depends_on_secret() {
        let a = challenge_digest("00ff", "one");
        assert_eq!(a, challenge_digest("00ff", "one"));
        assert_ne!(a, challenge_digest("00ff", "two"));
        assert_ne!(a, challenge_digest("00fe", "one"));
    }

    #[test]
    fn test_validate_token() {
        let token = "abc123def456";
        assert!(validate_token(token, token));
        assert!(!validate_token(token, "different"));
        assert!(!validate_token(token, "abc123def45"));
    }

    async fn run_handshake(
        listener_secret: &'static str,
        dialer_secret: &'static str,
    ) -> (Result<(), ConnectionError>, Result<(), ConnectionError>) {
        let (a, b) = tokio::io::duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        let (mut lr, mut lw) = framed_halves(ar, aw, 1024);
        let (mut dr, mut dw) = framed_halves(br, bw, 1024);
        let timeout = Duration::from_secs(5);

        tokio::join!(
            accept_handshake(&mut lr, &mut lw, listener_secret, timeout),
            connect_handshake(&mut dr, &mut dw, dialer_secret, timeout),
        )
    }

    #[tokio::test]
    async fn test_handshake_matching_secret() {
        let (listener, dialer) = run_handshake("s3cret", "s3cret").await;
        assert!(listener.is_ok());
        assert!(dialer.is_ok());
    }

    #[tokio::test]
    async fn test_handshake_wrong_secret() {
        let (listener, dialer) = run_handshake("s3cret", "guess").await;
        assert!(matches!(listener, Err(ConnectionError::AuthenticationFailed)));
        assert!(matches!(dialer, Err(ConnectionError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_handshake_times_out_on_silent_peer() {
        let (a, _b) = tokio::io::duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (mut r, mut w) = framed_halves(ar, aw, 1024);

        let result = connect_handshake(&mut r, &mut w, "x", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ConnectionError::HandshakeTimeout)));
    }
}
