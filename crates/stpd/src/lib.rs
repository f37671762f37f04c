//! The PVST+ daemon.
//!
//! Ties the protocol engine to its collaborators: the IPC control channel
//! that delivers configuration messages, the netlink-fed link events, the
//! raw-frame transport, and the application database where computed state
//! is published.
//!
//! The daemon is strictly single-threaded cooperative: one current-thread
//! runtime, one dispatch loop, and every entry point a short
//! run-to-completion step. The 100 ms tick is serviced ahead of frames and
//! configuration, and the low-priority drain is bounded so a BPDU storm
//! cannot starve protocol progress.

pub mod app_db;
pub mod commands;
pub mod daemon;
pub mod ipc;
pub mod manager;
pub mod messages;
pub mod shell;

pub use app_db::{AppDbSync, DbOp, RedisAdapter};
pub use daemon::{Daemon, DaemonChannels, RxFrame};
pub use manager::{LinkEvent, StpManager};
pub use messages::{
    BridgeConfigMsg, ControlMsg, InitMsg, MemberMode, Opcode, PortAttr, PortConfigMsg, StpIpcMessage,
    StpMode, VlanAttr, VlanConfigMsg, VlanMemberConfigMsg, VlanPortConfigMsg,
};

/// Error type for daemon-level failures (IO, database, encoding).
#[derive(Debug, thiserror::Error)]
pub enum StpdError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database operation failed: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("malformed control message: {0}")]
    BadMessage(#[from] serde_json::Error),

    #[error("shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },
}

pub type Result<T> = std::result::Result<T, StpdError>;
