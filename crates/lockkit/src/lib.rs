//! The inflated-monitor subsystem of a managed-language runtime: a pool of
//! heavyweight per-object locks with Java-style enter/exit/wait/notify
//! semantics, bound to heap objects on demand and reclaimed around
//! collection pauses.

pub mod mock;
pub mod objectmodel;
pub mod runtime;
pub mod sync;
pub mod utils;

pub type ThreadOf<R> = <R as runtime::Runtime>::Thread;
pub type ObjectModelOf<R> = <R as runtime::Runtime>::ObjectModel;

pub use runtime::{LockKit, LockKitBuilder, ProxyHandshake, Runtime};
pub use sync::{BindingProtection, Monitor, MonitorError, MonitorPool, PoolSettings};
