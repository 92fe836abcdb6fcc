//! Command dispatcher
//!
//! Maps one [`CommandRequest`] to the envelopes sent back to the relay.
//! Process lifecycle and console access sit behind [`ServerControl`] so the
//! reply logic can be exercised without a real game server.

use std::sync::Arc;

use async_trait::async_trait;

use sb_core::config::BackendProfile;
use sb_core::{ProcessError, UsageError};
use sb_protocol::{CommandRequest, Envelope};

/// Lifecycle and console operations on the supervised server
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// Spawn the server, waiting for readiness if the backend defines it
    async fn start(&self) -> Result<(), ProcessError>;

    /// Gracefully stop the server, blocking until it has exited
    async fn stop(&self) -> Result<(), ProcessError>;

    /// Non-blocking liveness check
    fn is_running(&self) -> bool;

    /// Write one console line to the server
    async fn console(&self, line: &str) -> Result<(), ProcessError>;
}

/// Turns command requests into replies for one backend
pub struct Dispatcher<C> {
    control: Arc<C>,
    name: String,
    prefix: String,
    whitelist: bool,
}

impl<C: ServerControl> Dispatcher<C> {
    pub fn new(control: Arc<C>, backend: &BackendProfile) -> Self {
        Self {
            control,
            name: backend.name.clone(),
            prefix: backend.prefix.clone(),
            whitelist: backend.whitelist,
        }
    }

    /// Command summary shown for `help` and after an unknown command
    pub fn help_text(&self) -> String {
        let p = &self.prefix;
        let mut text = format!(
            "ServerBot {} commands:\n\
             !{p} help - print this message\n\
             !{p} ping - ping the server\n\
             !{p} status - check the server status\n\
             !{p} start - start the server\n\
             !{p} stop - stop the server",
            self.name
        );
        if self.whitelist {
            text.push_str(&format!(
                "\n!{p} whitelist <add|remove|list> [player] - list or modify the whitelist"
            ));
        }
        text
    }

    /// Execute one request. Every request yields at least one reply.
    pub async fn dispatch(&self, request: &CommandRequest) -> Vec<Envelope> {
        tracing::info!("Command: {}", request.to_line());

        match request.name.as_str() {
            "help" => vec![Envelope::ok(self.help_text())],
            "ping" => vec![Envelope::ok("pong")],
            "status" => {
                if self.control.is_running() {
                    vec![Envelope::ok(format!("{} server is running", self.name))]
                } else {
                    vec![Envelope::ok(format!("{} server is not running", self.name))]
                }
            }
            "start" => vec![self.start().await],
            "stop" => vec![self.stop().await],
            "whitelist" if self.whitelist => vec![self.whitelist(request).await],
            other => vec![
                Envelope::err(format!("Unknown command: {}", other)),
                Envelope::ok(self.help_text()),
            ],
        }
    }

    async fn start(&self) -> Envelope {
        match self.control.start().await {
            Ok(()) => Envelope::ok(format!("{} server started", self.name)),
            Err(ProcessError::AlreadyRunning) => {
                Envelope::err(format!("{} server is already running", self.name))
            }
            Err(e) => {
                tracing::error!("Start failed: {}", e);
                Envelope::err(format!("Unable to start {} server", self.name))
            }
        }
    }

    async fn stop(&self) -> Envelope {
        match self.control.stop().await {
            Ok(()) => Envelope::ok(format!("{} server stopped", self.name)),
            Err(ProcessError::NotRunning) => self.not_running(),
            Err(e) => {
                tracing::error!("Stop failed: {}", e);
                Envelope::err(format!("Unable to stop {} server", self.name))
            }
        }
    }

    async fn whitelist(&self, request: &CommandRequest) -> Envelope {
        match request.arg_fields().as_slice() {
            ["list", ..] => match self.control.console("whitelist list").await {
                Ok(()) => Envelope::ok("Success - check the log for current whitelist"),
                Err(_) => self.not_running(),
            },
            [action @ ("add" | "remove"), player] => {
                match self.change_whitelist(action, player).await {
                    Ok(()) => Envelope::ok("Change submitted - check the log for success"),
                    Err(_) => self.not_running(),
                }
            }
            _ => Envelope::err(
                UsageError::new(format!(
                    "!{} whitelist <add|remove|list> [player]",
                    self.prefix
                ))
                .to_string(),
            ),
        }
    }

    async fn change_whitelist(&self, action: &str, player: &str) -> Result<(), ProcessError> {
        self.control
            .console(&format!("whitelist {} {}", action, player))
            .await?;
        self.control.console("whitelist reload").await?;
        self.control.console("whitelist list").await
    }

    fn not_running(&self) -> Envelope {
        Envelope::err(format!("{} server is not running", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_protocol::Status;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory stand-in for a game server
    #[derive(Default)]
    struct FakeServer {
        running: AtomicBool,
        fail_start: AtomicBool,
        fail_stop: AtomicBool,
        console: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServerControl for FakeServer {
        async fn start(&self) -> Result<(), ProcessError> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(ProcessError::StartupTimeout(std::time::Duration::from_secs(1)));
            }
            if self.running.swap(true, Ordering::SeqCst) {
                return Err(ProcessError::AlreadyRunning);
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), ProcessError> {
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(ProcessError::Cancelled);
            }
            if !self.running.swap(false, Ordering::SeqCst) {
                return Err(ProcessError::NotRunning);
            }
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        async fn console(&self, line: &str) -> Result<(), ProcessError> {
            if !self.is_running() {
                return Err(ProcessError::ProcessDead);
            }
            self.console.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn dispatcher() -> (Arc<FakeServer>, Dispatcher<FakeServer>) {
        let server = Arc::new(FakeServer::default());
        let dispatcher = Dispatcher::new(Arc::clone(&server), &BackendProfile::minecraft("."));
        (server, dispatcher)
    }

    async fn run(dispatcher: &Dispatcher<FakeServer>, line: &str) -> Vec<Envelope> {
        dispatcher.dispatch(&CommandRequest::parse(line).unwrap()).await
    }

    #[tokio::test]
    async fn test_ping_and_help() {
        let (_, d) = dispatcher();
        assert_eq!(run(&d, "ping").await, vec![Envelope::ok("pong")]);

        let help = run(&d, "help").await;
        assert_eq!(help.len(), 1);
        assert!(help[0].body.starts_with("ServerBot Minecraft commands:"));
        assert!(help[0].body.contains("!mc whitelist"));
    }

    #[tokio::test]
    async fn test_help_omits_whitelist_when_unsupported() {
        let server = Arc::new(FakeServer::default());
        let d = Dispatcher::new(server, &BackendProfile::terraria("."));
        let help = d.help_text();
        assert!(help.contains("!te stop"));
        assert!(!help.contains("whitelist"));

        let replies = run(&d, "whitelist list").await;
        assert_eq!(replies[0], Envelope::err("Unknown command: whitelist"));
    }

    #[tokio::test]
    async fn test_start_stop_status_cycle() {
        let (_, d) = dispatcher();
        assert_eq!(
            run(&d, "status").await,
            vec![Envelope::ok("Minecraft server is not running")]
        );
        assert_eq!(
            run(&d, "stop").await,
            vec![Envelope::err("Minecraft server is not running")]
        );
        assert_eq!(
            run(&d, "start").await,
            vec![Envelope::ok("Minecraft server started")]
        );
        assert_eq!(
            run(&d, "start").await,
            vec![Envelope::err("Minecraft server is already running")]
        );
        assert_eq!(
            run(&d, "status").await,
            vec![Envelope::ok("Minecraft server is running")]
        );
        assert_eq!(
            run(&d, "stop").await,
            vec![Envelope::ok("Minecraft server stopped")]
        );
    }

    #[tokio::test]
    async fn test_start_failure() {
        let (server, d) = dispatcher();
        server.fail_start.store(true, Ordering::SeqCst);
        assert_eq!(
            run(&d, "start").await,
            vec![Envelope::err("Unable to start Minecraft server")]
        );
    }

    #[tokio::test]
    async fn test_stop_failure() {
        let (server, d) = dispatcher();
        run(&d, "start").await;
        server.fail_stop.store(true, Ordering::SeqCst);
        assert_eq!(
            run(&d, "stop").await,
            vec![Envelope::err("Unable to stop Minecraft server")]
        );
    }

    #[tokio::test]
    async fn test_whitelist_list_twice() {
        let (server, d) = dispatcher();
        server.running.store(true, Ordering::SeqCst);

        for _ in 0..2 {
            let replies = run(&d, "whitelist list").await;
            assert_eq!(
                replies,
                vec![Envelope::ok("Success - check the log for current whitelist")]
            );
        }
        assert_eq!(
            *server.console.lock().unwrap(),
            vec!["whitelist list", "whitelist list"]
        );
    }

    #[tokio::test]
    async fn test_whitelist_add_writes_reload_and_list() {
        let (server, d) = dispatcher();
        server.running.store(true, Ordering::SeqCst);

        let replies = run(&d, "whitelist add Notch").await;
        assert_eq!(
            replies,
            vec![Envelope::ok("Change submitted - check the log for success")]
        );
        assert_eq!(
            *server.console.lock().unwrap(),
            vec!["whitelist add Notch", "whitelist reload", "whitelist list"]
        );
    }

    #[tokio::test]
    async fn test_whitelist_not_running() {
        let (_, d) = dispatcher();
        assert_eq!(
            run(&d, "whitelist remove Notch").await,
            vec![Envelope::err("Minecraft server is not running")]
        );
    }

    #[tokio::test]
    async fn test_whitelist_usage() {
        let (server, d) = dispatcher();
        server.running.store(true, Ordering::SeqCst);
        let usage = Envelope::err("Usage: !mc whitelist <add|remove|list> [player]");

        assert_eq!(run(&d, "whitelist").await, vec![usage.clone()]);
        assert_eq!(run(&d, "whitelist add   ").await, vec![usage.clone()]);
        assert_eq!(run(&d, "whitelist add a b").await, vec![usage.clone()]);
        assert_eq!(run(&d, "whitelist ban Notch").await, vec![usage]);
        assert!(server.console.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_followed_by_help() {
        let (_, d) = dispatcher();
        let replies = run(&d, "teleport spawn").await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Envelope::err("Unknown command: teleport"));
        assert_eq!(replies[1].status, Status::Ok);
        assert_eq!(replies[1].body, d.help_text());
    }
}
