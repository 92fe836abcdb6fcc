//! Chat command routing
//!
//! Chat lines of the form `!<prefix> <command...>` go to the controller
//! registered under that prefix. `!halp` lists the prefixes. Everything
//! else is left alone, since it may be meant for another bot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::client::RelayClient;

/// Command used to list the configured backends
const HALP: &str = "halp";

/// What the router did with a chat line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// `!halp`: show this text to the user
    Help(String),
    /// Forwarded to the backend with this prefix
    Forwarded(String),
    /// The backend with this prefix is not connected; already reported
    SendFailed(String),
    /// Not a command for this relay
    Ignored,
}

/// Maps chat prefixes to controller connections
pub struct CommandRouter {
    clients: HashMap<String, Arc<RelayClient>>,
    order: Vec<String>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a client under its backend prefix, replacing any previous one
    pub fn register(&mut self, client: Arc<RelayClient>) {
        let prefix = client.backend().prefix.clone();
        if self.clients.insert(prefix.clone(), client).is_none() {
            self.order.push(prefix);
        }
    }

    /// Summary of the available prefixes
    pub fn help_text(&self) -> String {
        let mut text = format!("ServerBot commands:\n!{} - print this message", HALP);
        for prefix in &self.order {
            if let Some(client) = self.clients.get(prefix) {
                text.push_str(&format!(
                    "\n!{} - {} command (\"!{} help\" for more info)",
                    prefix,
                    client.backend().name.to_lowercase(),
                    prefix
                ));
            }
        }
        text
    }

    /// Handle one chat line
    pub async fn handle(&self, line: &str) -> RouteOutcome {
        let Some(content) = line.trim().strip_prefix('!') else {
            return RouteOutcome::Ignored;
        };

        let (command, args) = match content.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim()),
            None => (content, ""),
        };

        if command == HALP {
            return RouteOutcome::Help(self.help_text());
        }

        let Some(client) = self.clients.get(command) else {
            return RouteOutcome::Ignored;
        };

        let forwarded = if args.is_empty() { "help" } else { args };
        if client.try_send(forwarded).await {
            RouteOutcome::Forwarded(command.to_string())
        } else {
            RouteOutcome::SendFailed(command.to_string())
        }
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}
