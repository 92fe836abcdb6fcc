//! Backend supervisor
//!
//! Owns at most one live [`ProcessHandle`] for the configured backend and
//! implements [`ServerControl`] on top of it. The handle sits behind an
//! async mutex; liveness is kept outside it so `status` answers even while
//! a long `start` or `stop` holds the lock.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sb_core::config::{BackendProfile, ControllerConfig};
use sb_core::{ConfigError, ConnectionSlot, ProcessError};

use crate::dispatch::ServerControl;
use crate::drain::{self, DrainOptions};
use crate::process::{Liveness, ProcessHandle};
use crate::startup;

/// Supervisor for one game server
pub struct Supervisor {
    backend: BackendProfile,
    ready: Option<Regex>,
    process: Mutex<Option<ProcessHandle>>,
    liveness: RwLock<Option<Liveness>>,
    slot: Arc<ConnectionSlot>,
    max_message_len: usize,
    connection_poll_interval: Duration,
    stop_poll_interval: Duration,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Build a supervisor for the configured backend.
    ///
    /// Fails if the backend's ready pattern is not a valid regex.
    pub fn new(
        config: &ControllerConfig,
        slot: Arc<ConnectionSlot>,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let ready = config
            .backend
            .ready_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigError::Invalid(format!("backend.ready_pattern: {}", e)))?;

        Ok(Self {
            backend: config.backend.clone(),
            ready,
            process: Mutex::new(None),
            liveness: RwLock::new(None),
            slot,
            max_message_len: config.max_message_len,
            connection_poll_interval: config.connection_poll_interval,
            stop_poll_interval: config.stop_poll_interval,
            shutdown,
        })
    }

    pub fn backend(&self) -> &BackendProfile {
        &self.backend
    }

    fn set_liveness(&self, liveness: Option<Liveness>) {
        match self.liveness.write() {
            Ok(mut guard) => *guard = liveness,
            Err(poisoned) => *poisoned.into_inner() = liveness,
        }
    }

    /// Stop a running server on agent shutdown.
    ///
    /// Sends the stop directive and waits up to the backend's startup
    /// timeout, then kills whatever is left.
    pub async fn shutdown(&self) {
        let mut process = self.process.lock().await;
        let Some(mut handle) = process.take() else {
            return;
        };

        if handle.is_running() {
            tracing::info!("Stopping {} server before exit", self.backend.name);
            // Own token: the agent-wide one is already cancelled at this point
            let stop_cancel = CancellationToken::new();
            let stopped = tokio::time::timeout(
                self.backend.startup_timeout,
                handle.stop(
                    &self.backend.stop_command,
                    self.stop_poll_interval,
                    &stop_cancel,
                ),
            )
            .await;

            if !matches!(stopped, Ok(Ok(()))) {
                tracing::warn!("{} server did not stop in time, killing it", self.backend.name);
                handle.kill();
                handle.liveness().wait_exit().await;
            }
        }

        self.set_liveness(None);
    }
}

#[async_trait]
impl ServerControl for Supervisor {
    async fn start(&self) -> Result<(), ProcessError> {
        let mut process = self.process.lock().await;
        if process.as_ref().is_some_and(ProcessHandle::is_running) {
            return Err(ProcessError::AlreadyRunning);
        }

        let mut handle = ProcessHandle::spawn(&self.backend.command, &self.backend.working_dir)?;

        if let Some(ready) = &self.ready {
            let waited = startup::await_ready(
                &mut handle,
                ready,
                self.backend.startup_timeout,
                self.max_message_len,
                &self.slot,
                &self.shutdown,
            )
            .await;

            if let Err(e) = waited {
                // Never leave a half-started server behind
                handle.kill();
                handle.liveness().wait_exit().await;
                *process = None;
                self.set_liveness(None);
                return Err(e);
            }
        }

        if let Some(output) = handle.take_output() {
            tokio::spawn(drain::run(
                output,
                handle.liveness(),
                Arc::clone(&self.slot),
                DrainOptions {
                    max_message_len: self.max_message_len,
                    poll_interval: self.connection_poll_interval,
                },
                self.shutdown.child_token(),
            ));
        }

        self.set_liveness(Some(handle.liveness()));
        *process = Some(handle);
        tracing::info!("{} server started", self.backend.name);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        let mut process = self.process.lock().await;
        let handle = process.as_mut().ok_or(ProcessError::NotRunning)?;

        handle
            .stop(
                &self.backend.stop_command,
                self.stop_poll_interval,
                &self.shutdown,
            )
            .await?;

        *process = None;
        self.set_liveness(None);
        Ok(())
    }

    fn is_running(&self) -> bool {
        match self.liveness.read() {
            Ok(guard) => guard.as_ref().is_some_and(Liveness::is_running),
            Err(poisoned) => poisoned.into_inner().as_ref().is_some_and(Liveness::is_running),
        }
    }

    async fn console(&self, line: &str) -> Result<(), ProcessError> {
        let mut process = self.process.lock().await;
        match process.as_mut() {
            Some(handle) => handle.write_line(line).await,
            None => Err(ProcessError::ProcessDead),
        }
    }
}
