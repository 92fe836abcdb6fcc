//! Inbound command lines
//!
//! A command line has the form `<command>[ <args...>]`: the command token,
//! then an optional argument string split off at the first whitespace run.

/// A command received from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub name: String,
    pub args: Option<String>,
}

impl CommandRequest {
    /// Create a new request
    pub fn new(name: impl Into<String>, args: Option<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parse one received line.
    ///
    /// Returns `None` for a blank line. Trailing whitespace is stripped from
    /// the arguments, embedded CR/LF characters are removed so a single
    /// request can never smuggle an extra console line to the child, and an
    /// argument string that ends up empty becomes `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_start();
        if line.trim_end().is_empty() {
            return None;
        }

        let (name, rest) = match line.find(char::is_whitespace) {
            Some(idx) => (&line[..idx], Some(line[idx..].trim_start())),
            None => (line, None),
        };

        let args = rest
            .map(|rest| {
                rest.chars()
                    .filter(|c| *c != '\n' && *c != '\r')
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .filter(|args| !args.is_empty());

        Some(Self::new(name, args))
    }

    /// Render the request back into a command line
    pub fn to_line(&self) -> String {
        match &self.args {
            Some(args) => format!("{} {}", self.name, args),
            None => self.name.clone(),
        }
    }

    /// Split the argument string into whitespace-separated fields
    pub fn arg_fields(&self) -> Vec<&str> {
        self.args
            .as_deref()
            .map(|args| args.split_whitespace().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_command() {
        let req = CommandRequest::parse("status").unwrap();
        assert_eq!(req.name, "status");
        assert_eq!(req.args, None);
    }

    #[test]
    fn test_parse_with_args() {
        let req = CommandRequest::parse("whitelist add  Notch").unwrap();
        assert_eq!(req.name, "whitelist");
        assert_eq!(req.args.as_deref(), Some("add  Notch"));
        assert_eq!(req.arg_fields(), vec!["add", "Notch"]);
    }

    #[test]
    fn test_parse_splits_on_whitespace_run() {
        let req = CommandRequest::parse("whitelist \t  list").unwrap();
        assert_eq!(req.name, "whitelist");
        assert_eq!(req.args.as_deref(), Some("list"));
    }

    #[test]
    fn test_parse_trailing_whitespace_only_args() {
        let req = CommandRequest::parse("start   ").unwrap();
        assert_eq!(req.name, "start");
        assert_eq!(req.args, None);

        let req = CommandRequest::parse("whitelist add   ").unwrap();
        assert_eq!(req.args.as_deref(), Some("add"));
    }

    #[test]
    fn test_parse_strips_embedded_newlines() {
        let req = CommandRequest::parse("whitelist add Notch\nop Notch").unwrap();
        assert_eq!(req.args.as_deref(), Some("add Notchop Notch"));
        assert!(!req.to_line().contains('\n'));
    }

    #[test]
    fn test_parse_blank() {
        assert!(CommandRequest::parse("").is_none());
        assert!(CommandRequest::parse("   \t").is_none());
    }

    #[test]
    fn test_to_line() {
        assert_eq!(CommandRequest::new("ping", None).to_line(), "ping");
        assert_eq!(
            CommandRequest::new("whitelist", Some("list".into())).to_line(),
            "whitelist list"
        );
    }
}
