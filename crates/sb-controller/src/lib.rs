//! sb-controller: Controller agent for serverbot
//!
//! The controller agent runs next to the game server binary. It owns the
//! child process, forwards the child's console output to the relay, and
//! executes commands the relay sends over the authenticated IPC channel.

pub mod dispatch;
pub mod drain;
pub mod listener;
pub mod process;
pub mod startup;
pub mod supervisor;

pub use dispatch::{Dispatcher, ServerControl};
pub use listener::IpcListener;
pub use process::{Liveness, ProcessHandle, ProcessOutput};
pub use supervisor::Supervisor;
