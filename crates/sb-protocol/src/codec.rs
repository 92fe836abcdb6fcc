//! Tokio codec for newline-delimited messages
//!
//! One wire message is one `\n`-terminated UTF-8 line. Message bodies may
//! themselves contain line breaks (help text, chunked log output), so the
//! encoder escapes `\`, LF and CR and the decoder reverses the escaping.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Default ceiling on a single encoded line (64 KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Codec for encoding/decoding escaped text lines
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index in the buffer already scanned for a newline
    next_index: usize,
    /// Maximum encoded line length in bytes (excluding the terminator)
    max_length: usize,
}

impl LineCodec {
    /// Create a codec with the default maximum line length
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom maximum line length
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a message so it fits on one line
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse [`escape`]
pub fn unescape(line: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(ProtocolError::InvalidEscape(other)),
            // A lone trailing backslash is kept as-is
            None => out.push('\\'),
        }
    }
    Ok(out)
}

impl LineCodec {
    fn decode_line(&self, mut raw: BytesMut) -> Result<String, ProtocolError> {
        // Tolerate CRLF from hand-typed clients
        if raw.last() == Some(&b'\r') {
            raw.truncate(raw.len() - 1);
        }
        let text = String::from_utf8(raw.to_vec())?;
        unescape(&text)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;

                if end > self.max_length {
                    tracing::warn!("Discarding {} byte line (max {})", end, self.max_length);
                    src.advance(end + 1);
                    return Err(ProtocolError::LineTooLong {
                        size: end,
                        max: self.max_length,
                    });
                }

                let line = src.split_to(end);
                src.advance(1);
                self.decode_line(line).map(Some)
            }
            None => {
                if src.len() > self.max_length {
                    let size = src.len();
                    tracing::warn!("Discarding unterminated {} byte line", size);
                    src.clear();
                    self.next_index = 0;
                    return Err(ProtocolError::LineTooLong {
                        size,
                        max: self.max_length,
                    });
                }
                // Need more data
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                self.next_index = 0;
                let rest = src.split_to(src.len());
                self.decode_line(rest).map(Some)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&str>>::encode(self, item.as_str(), dst)
    }
}

impl Encoder<&str> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = escape(item);
        if line.len() > self.max_length {
            return Err(ProtocolError::LineTooLong {
                size: line.len(),
                max: self.max_length,
            });
        }

        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
