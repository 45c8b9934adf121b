//! Native mutex and condition-variable primitives.
//!
//! Monitors consume these through a narrow contract: a non-reentrant mutex
//! with explicit `lock`/`unlock`, and a condition variable whose `wait`
//! atomically releases the given mutex before blocking and reacquires it
//! before returning, under every outcome (signal, timeout, interruption,
//! spurious wakeup). The concrete backend is resolved once at startup.

pub mod parked;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub mod pthread;
    }
}

use std::sync::atomic::AtomicBool;
use std::sync::OnceLock;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Backend {
    /// libc pthread mutexes and condition variables.
    #[cfg(unix)]
    Pthread,
    /// Portable implementation on top of `parking_lot`.
    Parked,
}

impl Backend {
    pub fn platform_default() -> Backend {
        #[cfg(unix)]
        {
            Backend::Pthread
        }
        #[cfg(not(unix))]
        {
            Backend::Parked
        }
    }
}

static BACKEND: OnceLock<Backend> = OnceLock::new();

/// Resolves the backend for the process lifetime. The first call wins;
/// later calls with a different backend are ignored with a warning.
pub fn initialize(backend: Backend) {
    let chosen = *BACKEND.get_or_init(|| backend);
    if chosen != backend {
        log::warn!(
            "monitor backend already resolved to {:?}; ignoring {:?}",
            chosen,
            backend
        );
    }
}

fn backend() -> Backend {
    *BACKEND.get_or_init(Backend::platform_default)
}

pub struct MutexFactory;

impl MutexFactory {
    pub fn create() -> NativeMutex {
        let mutex = match backend() {
            #[cfg(unix)]
            Backend::Pthread => NativeMutex::Pthread(pthread::PthreadMutex::new()),
            Backend::Parked => NativeMutex::Parked(parked::ParkedMutex::new()),
        };
        mutex.init();
        mutex
    }
}

pub struct ConditionVariableFactory;

impl ConditionVariableFactory {
    pub fn create() -> NativeConditionVariable {
        let condition = match backend() {
            #[cfg(unix)]
            Backend::Pthread => NativeConditionVariable::Pthread(pthread::PthreadCondvar::new()),
            Backend::Parked => NativeConditionVariable::Parked(parked::ParkedCondvar::new()),
        };
        condition.init();
        condition
    }
}

pub enum NativeMutex {
    #[cfg(unix)]
    Pthread(pthread::PthreadMutex),
    Parked(parked::ParkedMutex),
}

impl NativeMutex {
    pub fn init(&self) {
        match self {
            #[cfg(unix)]
            NativeMutex::Pthread(mutex) => mutex.init(),
            NativeMutex::Parked(mutex) => mutex.init(),
        }
    }

    /// Blocks until the mutex is acquired, possibly indefinitely.
    pub fn lock(&self) {
        match self {
            #[cfg(unix)]
            NativeMutex::Pthread(mutex) => mutex.lock(),
            NativeMutex::Parked(mutex) => mutex.lock(),
        }
    }

    /// Must be called by the thread that locked the mutex.
    pub fn unlock(&self) {
        match self {
            #[cfg(unix)]
            NativeMutex::Pthread(mutex) => mutex.unlock(),
            NativeMutex::Parked(mutex) => mutex.unlock(),
        }
    }

    pub fn cleanup(&self) {
        match self {
            #[cfg(unix)]
            NativeMutex::Pthread(mutex) => mutex.cleanup(),
            NativeMutex::Parked(mutex) => mutex.cleanup(),
        }
    }
}

pub enum NativeConditionVariable {
    #[cfg(unix)]
    Pthread(pthread::PthreadCondvar),
    Parked(parked::ParkedCondvar),
}

impl NativeConditionVariable {
    pub fn init(&self) {
        match self {
            #[cfg(unix)]
            NativeConditionVariable::Pthread(condition) => condition.init(),
            NativeConditionVariable::Parked(condition) => condition.init(),
        }
    }

    /// Releases `mutex`, blocks until signaled or `timeout_millis` elapses
    /// (`0` waits without a deadline), then reacquires `mutex`. Returns
    /// whether `interrupted` was set, in which case an already-pending
    /// interrupt returns immediately without releasing the mutex.
    pub fn wait(&self, mutex: &NativeMutex, timeout_millis: u64, interrupted: &AtomicBool) -> bool {
        match (self, mutex) {
            #[cfg(unix)]
            (NativeConditionVariable::Pthread(condition), NativeMutex::Pthread(mutex)) => {
                condition.wait(mutex, timeout_millis, interrupted)
            }
            (NativeConditionVariable::Parked(condition), NativeMutex::Parked(mutex)) => {
                condition.wait(mutex, timeout_millis, interrupted)
            }
            #[cfg(unix)]
            _ => unreachable!("mutex and condition variable from different backends"),
        }
    }

    /// Wakes one waiter, or every waiter when `all` is set. Returns whether
    /// the underlying primitive reported success.
    pub fn notify(&self, all: bool) -> bool {
        match self {
            #[cfg(unix)]
            NativeConditionVariable::Pthread(condition) => condition.notify(all),
            NativeConditionVariable::Parked(condition) => condition.notify(all),
        }
    }

    pub fn cleanup(&self) {
        match self {
            #[cfg(unix)]
            NativeConditionVariable::Pthread(condition) => condition.cleanup(),
            NativeConditionVariable::Parked(condition) => condition.cleanup(),
        }
    }
}
