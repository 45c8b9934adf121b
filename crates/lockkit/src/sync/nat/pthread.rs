//! pthread backend.
//!
//! The condition variable pairs the pthread condvar with an internal gate
//! mutex rather than parking directly on the caller's mutex: a waiter holds
//! the gate from before it releases the caller's mutex until it is parked in
//! `pthread_cond_wait`, so a signal sent without holding the caller's mutex
//! (thread interruption does this) cannot be lost.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct PthreadMutex {
    raw: UnsafeCell<libc::pthread_mutex_t>,
}

unsafe impl Send for PthreadMutex {}
unsafe impl Sync for PthreadMutex {}

impl PthreadMutex {
    pub fn new() -> Self {
        Self {
            raw: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
        }
    }

    pub fn init(&self) {
        let rc = unsafe { libc::pthread_mutex_init(self.raw.get(), std::ptr::null()) };
        debug_assert_eq!(rc, 0);
    }

    pub fn lock(&self) {
        let rc = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        debug_assert_eq!(rc, 0);
    }

    pub fn unlock(&self) {
        let rc = unsafe { libc::pthread_mutex_unlock(self.raw.get()) };
        debug_assert_eq!(rc, 0);
    }

    pub fn cleanup(&self) {
        unsafe {
            libc::pthread_mutex_destroy(self.raw.get());
        }
    }
}

impl Default for PthreadMutex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PthreadCondvar {
    cond: UnsafeCell<libc::pthread_cond_t>,
    gate: PthreadMutex,
}

unsafe impl Send for PthreadCondvar {}
unsafe impl Sync for PthreadCondvar {}

impl PthreadCondvar {
    pub fn new() -> Self {
        Self {
            cond: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
            gate: PthreadMutex::new(),
        }
    }

    pub fn init(&self) {
        self.gate.init();
        self.init_cond();
    }

    // Timed waits measure against CLOCK_MONOTONIC so a wall clock adjustment
    // cannot stretch or cut a timeout.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn init_cond(&self) {
        unsafe {
            let mut attr: libc::pthread_condattr_t = std::mem::zeroed();
            libc::pthread_condattr_init(&mut attr);
            libc::pthread_condattr_setclock(&mut attr, libc::CLOCK_MONOTONIC);
            libc::pthread_cond_init(self.cond.get(), &attr);
            libc::pthread_condattr_destroy(&mut attr);
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn init_cond(&self) {
        unsafe {
            libc::pthread_cond_init(self.cond.get(), std::ptr::null());
        }
    }

    pub fn wait(&self, mutex: &PthreadMutex, timeout_millis: u64, interrupted: &AtomicBool) -> bool {
        self.gate.lock();
        if interrupted.load(Ordering::Relaxed) {
            // Pending interrupt: return without ever releasing the mutex.
            self.gate.unlock();
            return true;
        }

        mutex.unlock();
        unsafe {
            if timeout_millis == 0 {
                libc::pthread_cond_wait(self.cond.get(), self.gate.raw.get());
            } else {
                let deadline = Self::deadline_after(timeout_millis);
                libc::pthread_cond_timedwait(self.cond.get(), self.gate.raw.get(), &deadline);
            }
        }
        self.gate.unlock();
        mutex.lock();

        interrupted.load(Ordering::Relaxed)
    }

    fn deadline_after(timeout_millis: u64) -> libc::timespec {
        let mut now: libc::timespec = unsafe { std::mem::zeroed() };
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let clock = libc::CLOCK_MONOTONIC;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let clock = libc::CLOCK_REALTIME;
        unsafe {
            libc::clock_gettime(clock, &mut now);
        }

        let mut deadline = now;
        deadline.tv_sec += (timeout_millis / 1000) as libc::time_t;
        deadline.tv_nsec += ((timeout_millis % 1000) * 1_000_000) as libc::c_long;
        if deadline.tv_nsec >= 1_000_000_000 {
            deadline.tv_sec += 1;
            deadline.tv_nsec -= 1_000_000_000;
        }
        deadline
    }

    pub fn notify(&self, all: bool) -> bool {
        // Taking the gate orders this signal after any in-flight waiter has
        // parked.
        self.gate.lock();
        let rc = unsafe {
            if all {
                libc::pthread_cond_broadcast(self.cond.get())
            } else {
                libc::pthread_cond_signal(self.cond.get())
            }
        };
        self.gate.unlock();
        rc == 0
    }

    pub fn cleanup(&self) {
        unsafe {
            libc::pthread_cond_destroy(self.cond.get());
        }
        self.gate.cleanup();
    }
}

impl Default for PthreadCondvar {
    fn default() -> Self {
        Self::new()
    }
}
