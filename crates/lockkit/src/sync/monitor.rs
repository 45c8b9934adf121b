//! The per-object monitor: a recursive lock with a wait set, bindable to a
//! heap object and reclaimable by the collection sweep when unowned.

use crate::{
    objectmodel::{lockword::LockWord, ObjectModel, ObjectReference},
    runtime::threads::{SyncData, Thread, ThreadState, VMThread},
    runtime::Runtime,
    sync::nat::{MutexFactory, NativeMutex},
    sync::MonitorError,
    utils::Address,
    ThreadOf,
};
use std::{
    fmt,
    marker::PhantomData,
    ptr::null_mut,
    sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicU8, AtomicUsize, Ordering},
};

/// Reclamation status of a monitor's binding, inspected by the collection
/// sweep.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum BindingProtection {
    /// On the free list, or one-way bound to an object.
    PreAcquire = 0,
    /// Hard-bound but unowned; the next sweep may reclaim it.
    Unprotected = 1,
    /// Owned, or about to be touched by a thread; never reclaimed.
    Protected = 2,
}

impl From<u8> for BindingProtection {
    fn from(value: u8) -> BindingProtection {
        match value {
            0 => BindingProtection::PreAcquire,
            1 => BindingProtection::Unprotected,
            2 => BindingProtection::Protected,
            _ => unreachable!(),
        }
    }
}

/// Ownership-transfer handshake state, present only on proxy-acquirable
/// monitors.
struct ProxyState {
    /// Whether the native mutex reflects the recorded logical owner. Cleared
    /// by `monitor_private_acquire`; set again once the owner performs its
    /// first operation (or the acquisition is abandoned).
    owner_acquired: AtomicBool,
}

// A monitor-enter is not an interruption point; waits on the proxy handshake
// pass this flag instead of the thread's own.
static UNINTERRUPTIBLE: AtomicBool = AtomicBool::new(false);

pub struct Monitor<R: Runtime> {
    mutex: NativeMutex,
    /// Object this monitor currently represents; zero while on the free
    /// list.
    bound_object: AtomicUsize,
    /// Owning thread's address; zero when unowned.
    owner: AtomicUsize,
    recursion_count: AtomicUsize,
    /// The object's header word as it was before binding, restored on
    /// reclamation.
    displaced_misc: AtomicU64,
    binding_protection: AtomicU8,
    /// Header word this monitor expects its object to carry across a
    /// collection; bindings whose snapshot no longer matches are not
    /// refreshed.
    expected_pre_gc_word: AtomicU64,
    /// Head of the intrusive waiting list (a stack: `wait` pushes and a
    /// single `notify` pops at the head). Guarded by `mutex`.
    waiting_threads: AtomicUsize,
    /// Free-list link; meaningful only while the monitor is unbound.
    next: AtomicPtr<Monitor<R>>,
    sticky: AtomicBool,
    proxy: Option<ProxyState>,
    marker: PhantomData<R>,
}

impl<R: Runtime> Monitor<R> {
    pub(crate) fn standard() -> Self {
        Self::with_proxy(None)
    }

    pub(crate) fn proxy_acquirable() -> Self {
        Self::with_proxy(Some(ProxyState {
            owner_acquired: AtomicBool::new(true),
        }))
    }

    fn with_proxy(proxy: Option<ProxyState>) -> Self {
        Self {
            mutex: MutexFactory::create(),
            bound_object: AtomicUsize::new(0),
            owner: AtomicUsize::new(0),
            recursion_count: AtomicUsize::new(0),
            displaced_misc: AtomicU64::new(0),
            binding_protection: AtomicU8::new(BindingProtection::PreAcquire as u8),
            expected_pre_gc_word: AtomicU64::new(0),
            waiting_threads: AtomicUsize::new(0),
            next: AtomicPtr::new(null_mut()),
            sticky: AtomicBool::new(false),
            proxy,
            marker: PhantomData,
        }
    }

    pub fn is_proxy_acquirable(&self) -> bool {
        self.proxy.is_some()
    }

    /// Acquires the monitor, blocking until it is available. Reentrant for
    /// the owning thread.
    pub fn enter(&self) {
        self.ensure_owner_acquired();

        let current = R::current_thread();
        if self.owner_thread() == Some(current) {
            self.recursion_count.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let sync = ThreadOf::<R>::sync(current);
        sync.set_state(ThreadState::Blocked);
        self.mutex.lock();
        sync.set_state(ThreadState::Running);

        self.set_binding_protection(BindingProtection::Protected);
        self.owner.store(current.raw(), Ordering::Relaxed);
        self.recursion_count.store(1, Ordering::Relaxed);
    }

    /// Releases one recursion level; the monitor becomes available once the
    /// count reaches zero. Callable only by the owner.
    pub fn exit(&self) -> Result<(), MonitorError> {
        self.ensure_owner_acquired();

        let current = R::current_thread();
        if self.owner_thread() != Some(current) {
            return Err(self.illegal_state(current));
        }

        if self.recursion_count.fetch_sub(1, Ordering::Relaxed) == 1 {
            // Parked waiters keep the binding protected; the monitor must
            // not be reclaimed out from under them.
            if self.waiting_threads.load(Ordering::Relaxed) == 0 {
                self.set_binding_protection(BindingProtection::Unprotected);
            }
            self.owner.store(0, Ordering::Relaxed);
            self.mutex.unlock();
        }
        Ok(())
    }

    /// Releases the monitor entirely and parks the calling thread until it
    /// is notified, interrupted, or `timeout_millis` elapses (`0` waits
    /// without a deadline). The prior recursion count is reinstated before
    /// returning. Callable only by the owner.
    pub fn wait(&self, timeout_millis: u64) -> Result<(), MonitorError> {
        self.ensure_owner_acquired();

        let current = R::current_thread();
        if self.owner_thread() != Some(current) {
            return Err(self.illegal_state(current));
        }

        let sync = ThreadOf::<R>::sync(current);
        let recursion = self.recursion_count.load(Ordering::Relaxed);
        let condition = sync.waiting_condition();

        // Push at the head: a single notify wakes the most recent waiter.
        sync.next_waiting
            .store(self.waiting_threads.load(Ordering::Relaxed), Ordering::Relaxed);
        self.waiting_threads.store(current.raw(), Ordering::Relaxed);
        self.owner.store(0, Ordering::Relaxed);
        self.recursion_count.store(0, Ordering::Relaxed);

        sync.set_state(ThreadState::Waiting);
        let interrupted = condition.wait(&self.mutex, timeout_millis, sync.interrupted_flag());
        sync.set_state(ThreadState::Running);

        // The native mutex is held again; reclaim ownership exactly as it
        // was before the wait.
        self.owner.store(current.raw(), Ordering::Relaxed);
        self.recursion_count.store(recursion, Ordering::Relaxed);
        self.set_binding_protection(BindingProtection::Protected);

        // A notified thread was unlinked by the notifier; a timed-out or
        // interrupted one is still on the list.
        self.unlink_waiter(current);

        if interrupted {
            sync.set_interrupted();
            return Err(MonitorError::Interrupted);
        }
        Ok(())
    }

    /// Moves one waiter (or all of them) from the wait set back to
    /// contending for the monitor. Ownership is not transferred. Callable
    /// only by the owner.
    pub fn notify(&self, all: bool) -> Result<(), MonitorError> {
        self.ensure_owner_acquired();

        let current = R::current_thread();
        if self.owner_thread() != Some(current) {
            return Err(self.illegal_state(current));
        }

        let head = self.waiting_threads.load(Ordering::Relaxed);
        if all {
            let mut waiter = head;
            while waiter != 0 {
                waiter = self.wake_waiter(VMThread(Address::from_usize(waiter)));
            }
            self.waiting_threads.store(0, Ordering::Relaxed);
        } else if head != 0 {
            let next = self.wake_waiter(VMThread(Address::from_usize(head)));
            self.waiting_threads.store(next, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Marks `waiter` blocked, signals its private condition variable and
    /// returns the raw link to the next waiter, unlinking `waiter`.
    fn wake_waiter(&self, waiter: VMThread) -> usize {
        let sync = ThreadOf::<R>::sync(waiter);
        let next = sync.next_waiting.swap(waiter.raw(), Ordering::Relaxed);
        sync.set_state(ThreadState::Blocked);
        if let Some(condition) = sync.try_waiting_condition() {
            let _ = condition.notify(false);
        }
        next
    }

    /// Removes `thread` from the waiting list if it is still linked. The
    /// caller must hold the native mutex.
    fn unlink_waiter(&self, thread: VMThread) {
        let sync = ThreadOf::<R>::sync(thread);
        if sync.next_waiting.load(Ordering::Relaxed) == thread.raw() {
            return;
        }

        let mut prev: Option<&SyncData<R>> = None;
        let mut cursor = self.waiting_threads.load(Ordering::Relaxed);
        while cursor != 0 {
            if cursor == thread.raw() {
                let next = sync.next_waiting.swap(thread.raw(), Ordering::Relaxed);
                match prev {
                    None => self.waiting_threads.store(next, Ordering::Relaxed),
                    Some(prev) => prev.next_waiting.store(next, Ordering::Relaxed),
                }
                return;
            }
            let cursor_sync = ThreadOf::<R>::sync(VMThread(Address::from_usize(cursor)));
            cursor = cursor_sync.next_waiting.load(Ordering::Relaxed);
            prev = Some(cursor_sync);
        }
    }

    /// Number of threads parked in `wait` on this monitor. The caller must
    /// own the monitor.
    pub fn waiting_thread_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.waiting_threads.load(Ordering::Relaxed);
        while cursor != 0 {
            count += 1;
            cursor = ThreadOf::<R>::sync(VMThread(Address::from_usize(cursor)))
                .next_waiting
                .load(Ordering::Relaxed);
        }
        count
    }

    /// Records `owner` as the logical owner with `recursion` levels held,
    /// without acquiring the native mutex. The native acquisition is
    /// deferred until the owner's first operation on the monitor.
    pub fn monitor_private_acquire(
        &self,
        owner: VMThread,
        recursion: usize,
    ) -> Result<(), MonitorError> {
        let Some(proxy) = &self.proxy else {
            return Err(MonitorError::NotProxyAcquirable);
        };
        self.owner.store(owner.raw(), Ordering::Relaxed);
        self.recursion_count.store(recursion, Ordering::Relaxed);
        proxy.owner_acquired.store(false, Ordering::Release);
        self.set_binding_protection(BindingProtection::Protected);
        Ok(())
    }

    /// Abandons a private acquisition: the monitor is immediately unowned
    /// and safe to reclaim.
    pub fn monitor_private_release(&self) -> Result<(), MonitorError> {
        let Some(proxy) = &self.proxy else {
            return Err(MonitorError::NotProxyAcquirable);
        };
        self.owner.store(0, Ordering::Relaxed);
        self.recursion_count.store(0, Ordering::Relaxed);
        proxy.owner_acquired.store(true, Ordering::Release);
        self.set_binding_protection(BindingProtection::Unprotected);
        Ok(())
    }

    fn ensure_owner_acquired(&self) {
        if let Some(proxy) = &self.proxy {
            if !proxy.owner_acquired.load(Ordering::Acquire) {
                self.owner_acquire(proxy);
            }
        }
    }

    /// Completes a private acquisition. The recorded logical owner performs
    /// the native lock on its first operation; every other thread parks on
    /// the process-wide handshake pair until that happens. The pair is
    /// shared by all proxy-acquirable monitors, so woken threads re-check
    /// their own monitor's flag.
    fn owner_acquire(&self, proxy: &ProxyState) {
        let current = R::current_thread();
        let handshake = R::lockkit().proxy_handshake();

        handshake.mutex.lock();
        if !proxy.owner_acquired.load(Ordering::Relaxed) {
            if self.owner_thread() == Some(current) {
                self.mutex.lock();
                proxy.owner_acquired.store(true, Ordering::Release);
                let _ = handshake.condition.notify(true);
            } else {
                let sync = ThreadOf::<R>::sync(current);
                while !proxy.owner_acquired.load(Ordering::Relaxed) {
                    sync.set_state(ThreadState::Blocked);
                    let _ = handshake
                        .condition
                        .wait(&handshake.mutex, 0, &UNINTERRUPTIBLE);
                    sync.set_state(ThreadState::Running);
                }
            }
        }
        handshake.mutex.unlock();
    }

    pub fn owner_thread(&self) -> Option<VMThread> {
        let owner = self.owner.load(Ordering::Relaxed);
        if owner == 0 {
            None
        } else {
            Some(VMThread(Address::from_usize(owner)))
        }
    }

    pub fn recursion_count(&self) -> usize {
        self.recursion_count.load(Ordering::Relaxed)
    }

    fn illegal_state(&self, thread: VMThread) -> MonitorError {
        MonitorError::IllegalMonitorState {
            thread: ThreadOf::<R>::id(thread),
            owner: self.owner_thread().map(ThreadOf::<R>::id),
        }
    }

    pub fn address(&self) -> Address {
        Address::from_ref(self)
    }

    pub fn bound_object(&self) -> Option<ObjectReference> {
        ObjectReference::from_address(Address::from_usize(
            self.bound_object.load(Ordering::Relaxed),
        ))
    }

    /// One-way binding: the monitor points at the object. The caller is
    /// responsible for rewriting the object's header to complete the
    /// two-way binding.
    pub(crate) fn set_bound_object(&self, object: ObjectReference) {
        if self.is_bound() {
            log::error!("monitor {:?} is already bound", self);
            panic!("binding an already-bound monitor");
        }
        self.bound_object
            .store(object.to_address().as_usize(), Ordering::Relaxed);
    }

    pub fn is_bound(&self) -> bool {
        self.bound_object.load(Ordering::Relaxed) != 0
    }

    /// Whether the bound object's header also points back at this monitor.
    pub fn is_hard_bound(&self) -> bool {
        match self.bound_object() {
            Some(object) => R::ObjectModel::read_misc(object).is_bound_to(self.address()),
            None => false,
        }
    }

    /// Rewrites the bound object's header to reference this monitor.
    pub(crate) fn refresh_bound_object(&self) {
        if let Some(object) = self.bound_object() {
            R::ObjectModel::write_misc(object, LockWord::bound_from_monitor(self.address()));
        }
    }

    /// Snapshots the header word the bound object is expected to carry
    /// through the collection.
    pub(crate) fn pre_gc_prepare(&self) {
        self.expected_pre_gc_word.store(
            LockWord::bound_from_monitor(self.address()).as_raw(),
            Ordering::Relaxed,
        );
    }

    /// Whether the binding survived the collection and should be refreshed:
    /// the object's current header still matches the pre-collection
    /// snapshot.
    pub(crate) fn requires_post_gc_refresh(&self) -> bool {
        match self.bound_object() {
            Some(object) => {
                R::ObjectModel::read_misc(object).as_raw()
                    == self.expected_pre_gc_word.load(Ordering::Relaxed)
            }
            None => false,
        }
    }

    pub fn binding_protection(&self) -> BindingProtection {
        BindingProtection::from(self.binding_protection.load(Ordering::Relaxed))
    }

    pub(crate) fn set_binding_protection(&self, protection: BindingProtection) {
        self.binding_protection
            .store(protection as u8, Ordering::Relaxed);
    }

    pub fn displaced_misc(&self) -> LockWord {
        LockWord::from_raw(self.displaced_misc.load(Ordering::Relaxed))
    }

    pub fn set_displaced_misc(&self, word: LockWord) {
        self.displaced_misc.store(word.as_raw(), Ordering::Relaxed);
    }

    /// Atomically replaces the displaced word if it still equals `expected`;
    /// returns the witnessed previous value.
    pub fn compare_exchange_displaced_misc(&self, expected: LockWord, desired: LockWord) -> LockWord {
        match self.displaced_misc.compare_exchange(
            expected.as_raw(),
            desired.as_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(previous) | Err(previous) => LockWord::from_raw(previous),
        }
    }

    pub(crate) fn next(&self) -> *mut Monitor<R> {
        self.next.load(Ordering::Relaxed)
    }

    pub(crate) fn set_next(&self, next: *mut Monitor<R>) {
        self.next.store(next, Ordering::Relaxed);
    }

    pub(crate) fn set_sticky(&self) {
        self.sticky.store(true, Ordering::Relaxed);
    }

    pub fn is_sticky(&self) -> bool {
        self.sticky.load(Ordering::Relaxed)
    }

    /// Returns the monitor to its default state. Only valid once no thread
    /// owns it or waits on it.
    pub(crate) fn reset(&self) {
        debug_assert_eq!(self.waiting_threads.load(Ordering::Relaxed), 0);
        self.bound_object.store(0, Ordering::Relaxed);
        self.owner.store(0, Ordering::Relaxed);
        self.recursion_count.store(0, Ordering::Relaxed);
        self.displaced_misc.store(0, Ordering::Relaxed);
        self.expected_pre_gc_word.store(0, Ordering::Relaxed);
        self.set_binding_protection(BindingProtection::PreAcquire);
        if let Some(proxy) = &self.proxy {
            // Quiescent: there is no pending ownership handoff.
            proxy.owner_acquired.store(true, Ordering::Release);
        }
    }
}

impl<R: Runtime> fmt::Debug for Monitor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("address", &self.address())
            .field("object", &self.bound_object())
            .field("owner", &self.owner_thread().map(ThreadOf::<R>::id))
            .field("recursion", &self.recursion_count())
            .field("protection", &self.binding_protection())
            .field("sticky", &self.is_sticky())
            .finish()
    }
}
