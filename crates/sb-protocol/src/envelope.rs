//! Reply and log envelopes
//!
//! Every line sent from the controller to the relay is an envelope of the
//! form `STATUS|body`. The status is a short token (canonically `LOG`, `OK`
//! or `ERR`) and the body is everything after the first `|`.

use std::fmt;

/// Separator between the status token and the body
pub const SEPARATOR: char = '|';

/// Status token of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    /// A line of child-process output destined for the log sink
    Log,
    /// A successful command reply
    Ok,
    /// A failed command reply
    Err,
    /// Any other token, preserved verbatim (already trimmed)
    Other(String),
}

impl Status {
    /// Parse a status token, trimming surrounding whitespace
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "LOG" => Status::Log,
            "OK" => Status::Ok,
            "ERR" => Status::Err,
            other => Status::Other(other.to_string()),
        }
    }

    /// The wire label for this status
    pub fn as_str(&self) -> &str {
        match self {
            Status::Log => "LOG",
            Status::Ok => "OK",
            Status::Err => "ERR",
            Status::Other(label) => label,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub status: Status,
    pub body: String,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(status: Status, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn log(body: impl Into<String>) -> Self {
        Self::new(Status::Log, body)
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(Status::Ok, body)
    }

    pub fn err(body: impl Into<String>) -> Self {
        Self::new(Status::Err, body)
    }

    /// Decode an envelope from one received line.
    ///
    /// The status is trimmed; the body is kept verbatim, including any
    /// leading space after the separator. A line without a separator yields
    /// an empty [`Status::Other`] and the whole line as body.
    pub fn decode(line: &str) -> Self {
        match line.split_once(SEPARATOR) {
            Some((status, body)) => Self::new(Status::parse(status), body),
            None => Self::new(Status::Other(String::new()), line),
        }
    }

    /// Encode the envelope as a single wire line (without terminator)
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.status, SEPARATOR, self.body)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.status, SEPARATOR, self.body)
    }
}
