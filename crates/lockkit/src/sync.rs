//! Monitors, their pool, and the native primitives they are built on.

pub mod monitor;
pub mod nat;
pub mod pool;

use thiserror::Error;

/// Errors a monitor operation reports back to the language runtime. All of
/// them are recoverable by the caller; corrupted-state conditions fail fast
/// instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// `exit`, `wait` or `notify` by a thread that does not own the monitor.
    #[error("thread {thread} does not own the monitor (owner: {owner:?})")]
    IllegalMonitorState { thread: u64, owner: Option<u64> },

    /// The thread was interrupted while parked in `wait`. Its interrupted
    /// flag is left set.
    #[error("interrupted while waiting on a monitor")]
    Interrupted,

    /// A private acquire/release was attempted on a monitor flavor that does
    /// not support proxy acquisition.
    #[error("monitor is not proxy-acquirable")]
    NotProxyAcquirable,
}

pub use monitor::{BindingProtection, Monitor};
pub use pool::{MonitorPool, PoolSettings, UnboundWordWriter};
