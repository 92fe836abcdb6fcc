//! Game server child process
//!
//! Spawns the server with stdin piped and stdout and stderr both attached
//! to the write end of one OS pipe, so the two streams interleave exactly
//! as the child wrote them. A pump task reads that pipe line by line into a
//! bounded channel. A reaper task owns the `Child` and publishes exit
//! through a watch channel, so liveness can be checked without locking the
//! handle.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use sb_core::ProcessError;

/// Lines buffered between the pipe readers and whoever consumes output.
///
/// When the consumer stalls (no relay connected) the pumps block, the OS
/// pipe fills up and the child blocks on write: output is held back, never
/// dropped.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Cheap, cloneable view of whether the child is still alive
#[derive(Clone)]
pub struct Liveness {
    exited: watch::Receiver<bool>,
}

impl Liveness {
    /// `true` until the child has been reaped
    pub fn is_running(&self) -> bool {
        !*self.exited.borrow()
    }

    /// Wait until the child has been reaped
    pub async fn wait_exit(&self) {
        let mut exited = self.exited.clone();
        let _ = exited.wait_for(|exited| *exited).await;
    }
}

/// Readable end of the shared output pipe, registered with the runtime
type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;

#[cfg(unix)]
fn output_pipe(reader: os_pipe::PipeReader) -> io::Result<OutputPipe> {
    let fd = std::os::fd::OwnedFd::from(reader);
    Ok(Box::new(tokio::net::unix::pipe::Receiver::from_owned_fd(fd)?))
}

#[cfg(windows)]
fn output_pipe(reader: os_pipe::PipeReader) -> io::Result<OutputPipe> {
    let handle = std::os::windows::io::OwnedHandle::from(reader);
    Ok(Box::new(tokio::fs::File::from_std(std::fs::File::from(handle))))
}

/// Merged stdout/stderr of the child
pub struct ProcessOutput {
    lines: mpsc::Receiver<String>,
}

impl ProcessOutput {
    /// Read one line, including its terminator if the child wrote one.
    ///
    /// Fails with [`ProcessError::ProcessDead`] once the output pipe is
    /// closed and everything written to it has been read.
    pub async fn read_line(&mut self) -> Result<String, ProcessError> {
        self.lines.recv().await.ok_or(ProcessError::ProcessDead)
    }
}

/// One live child process
pub struct ProcessHandle {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    output: Option<ProcessOutput>,
    liveness: Liveness,
    kill: CancellationToken,
}

impl ProcessHandle {
    /// Spawn `argv[0]` with `argv[1..]` in `working_dir`
    pub fn spawn(argv: &[String], working_dir: &Path) -> Result<Self, ProcessError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ProcessError::InvalidCommand("empty command".to_string()))?;

        let (output_reader, output_writer) = os_pipe::pipe().map_err(ProcessError::Spawn)?;
        let error_writer = output_writer.try_clone().map_err(ProcessError::Spawn)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(output_writer)
            .stderr(error_writer);
        let spawned = command.spawn();
        // The command holds our copies of the write end; EOF needs them gone
        drop(command);
        let mut child = spawned.map_err(ProcessError::Spawn)?;

        let pid = child.id();
        tracing::info!("Spawned {} with PID {:?}", program, pid);

        let output = match output_pipe(output_reader) {
            Ok(output) => output,
            Err(e) => {
                let _ = child.start_kill();
                return Err(ProcessError::Spawn(e));
            }
        };

        let stdin = child.stdin.take();
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        tokio::spawn(pump_lines(output, tx));

        let (exited_tx, exited_rx) = watch::channel(false);
        let kill = CancellationToken::new();
        tokio::spawn(reap(child, exited_tx, kill.clone()));

        Ok(Self {
            pid,
            stdin,
            output: Some(ProcessOutput { lines: rx }),
            liveness: Liveness { exited: exited_rx },
            kill,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Non-blocking liveness check
    pub fn is_running(&self) -> bool {
        self.liveness.is_running()
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Hand the output stream to another task (the drain loop).
    ///
    /// After this, [`read_line`](Self::read_line) reports the process dead.
    pub fn take_output(&mut self) -> Option<ProcessOutput> {
        self.output.take()
    }

    /// Read one line of merged output
    pub async fn read_line(&mut self) -> Result<String, ProcessError> {
        match self.output.as_mut() {
            Some(output) => output.read_line().await,
            None => Err(ProcessError::ProcessDead),
        }
    }

    /// Write one console line to the child and flush it
    pub async fn write_line(&mut self, text: &str) -> Result<(), ProcessError> {
        if !self.is_running() {
            return Err(ProcessError::ProcessDead);
        }
        let stdin = self.stdin.as_mut().ok_or(ProcessError::ProcessDead)?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let result = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Write to server console failed: {}", e);
            self.stdin = None;
            return Err(ProcessError::ProcessDead);
        }
        Ok(())
    }

    /// Ask the child to exit with `stop_command`, then poll until it has.
    ///
    /// Blocks the caller for the whole shutdown. If `cancel` fires while
    /// waiting the child is killed instead.
    pub async fn stop(
        &mut self,
        stop_command: &str,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        if !self.is_running() {
            return Err(ProcessError::NotRunning);
        }

        if let Err(e) = self.write_line(stop_command).await {
            // The child may already be on its way out; keep polling
            tracing::warn!("Could not deliver {:?}: {}", stop_command, e);
        }

        while self.is_running() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::warn!("Stop interrupted, killing PID {:?}", self.pid);
                    self.kill();
                    self.liveness.wait_exit().await;
                    return Err(ProcessError::Cancelled);
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        self.stdin = None;
        tracing::info!("Server process {:?} stopped", self.pid);
        Ok(())
    }

    /// Kill the child without waiting
    pub fn kill(&self) {
        self.kill.cancel();
    }
}

async fn pump_lines(stream: OutputPipe, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Game servers do not always emit clean UTF-8
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Server output read failed: {}", e);
                break;
            }
        }
    }

    tracing::debug!("Server output closed");
}

async fn reap(mut child: Child, exited: watch::Sender<bool>, kill: CancellationToken) {
    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill.cancelled() => None,
    };

    let status = match waited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill server process: {}", e);
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) => tracing::info!("Server process exited: {}", status),
        Err(e) => tracing::error!("Failed to wait for server process: {}", e),
    }
    exited.send_replace(true);
}
