//! Portable backend built on `parking_lot`.
//!
//! The mutex keeps a `locked` flag behind a `parking_lot` lock so that it can
//! expose the explicit `lock`/`unlock` calling convention of the native
//! contract. The condition variable keeps its own gate lock: a waiter holds
//! the gate from before it releases the caller's mutex until it is parked, so
//! a notification arriving in between cannot be lost.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct ParkedMutex {
    locked: Mutex<bool>,
    available: Condvar,
}

impl ParkedMutex {
    pub fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            available: Condvar::new(),
        }
    }

    pub fn init(&self) {}

    pub fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.available.wait(&mut locked);
        }
        *locked = true;
    }

    pub fn unlock(&self) {
        let mut locked = self.locked.lock();
        debug_assert!(*locked, "unlock of an unlocked mutex");
        *locked = false;
        drop(locked);
        self.available.notify_one();
    }

    pub fn cleanup(&self) {}
}

impl Default for ParkedMutex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ParkedCondvar {
    gate: Mutex<()>,
    signaled: Condvar,
}

impl ParkedCondvar {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            signaled: Condvar::new(),
        }
    }

    pub fn init(&self) {}

    pub fn wait(&self, mutex: &ParkedMutex, timeout_millis: u64, interrupted: &AtomicBool) -> bool {
        let mut gate = self.gate.lock();
        if interrupted.load(Ordering::Relaxed) {
            // Pending interrupt: return without ever releasing the mutex.
            return true;
        }

        mutex.unlock();
        if timeout_millis == 0 {
            self.signaled.wait(&mut gate);
        } else {
            let _ = self
                .signaled
                .wait_for(&mut gate, Duration::from_millis(timeout_millis));
        }
        drop(gate);
        mutex.lock();

        interrupted.load(Ordering::Relaxed)
    }

    pub fn notify(&self, all: bool) -> bool {
        // Taking the gate orders this signal after any in-flight waiter has
        // parked.
        let _gate = self.gate.lock();
        if all {
            self.signaled.notify_all();
        } else {
            self.signaled.notify_one();
        }
        true
    }

    pub fn cleanup(&self) {}
}

impl Default for ParkedCondvar {
    fn default() -> Self {
        Self::new()
    }
}
