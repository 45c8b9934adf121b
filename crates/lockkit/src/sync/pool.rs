//! Manages the pool of monitors and their binding and unbinding to objects.
//!
//! Binding at runtime takes an unbound monitor from a free list. Unbinding
//! happens at global safepoints: every unowned, unprotected, bound monitor
//! is unbound, and writing of the unbound header words is delegated to a
//! registered [`UnboundWordWriter`] so unbinding can transition a lock to
//! any other mode.
//!
//! Collection considerations: monitors keep their bound object reachable (it
//! is just a field), so [`MonitorPool::before_garbage_collection`] must run
//! ahead of the collector to cut dead bindings, and if the collector moves
//! objects, [`MonitorPool::after_garbage_collection`] re-points the survivors'
//! headers at their monitors.

use crate::{
    objectmodel::{lockword::LockWord, ObjectModel, ObjectReference},
    runtime::threads::Thread,
    runtime::Runtime,
    sync::monitor::{BindingProtection, Monitor},
    ThreadOf,
};
use log::{debug, trace};
use parking_lot::Mutex;
use std::{
    ptr::null_mut,
    sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering},
    sync::OnceLock,
};

/// Rewrites the header of an object whose monitor binding is being
/// dissolved, given the header word the object carried before it was bound.
/// Supplied once at startup by the lock-word encoding scheme.
pub trait UnboundWordWriter: Send + Sync {
    fn write_unbound_word(&self, object: ObjectReference, pre_binding_word: LockWord);
}

/// Pool sizing and monitor flavor, fixed for the pool's lifetime.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// Monitors created by `initialize`.
    pub initial_qty: usize,
    /// Monitors added by each expansion.
    pub grow_qty: usize,
    /// Unbound monitors kept in reserve for collection and allocation code
    /// paths. `0` disables the reserve policy entirely: the pool then grows
    /// only when the free list is exhausted.
    pub min_qty: usize,
    /// Whether monitors support acquisition by one thread on behalf of
    /// another.
    pub proxy_acquirable: bool,
    /// Trace binding and reclamation events.
    pub trace: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_qty: 50,
            grow_qty: 50,
            min_qty: 25,
            proxy_acquirable: false,
            trace: false,
        }
    }
}

/// The monitors that can ever be bound: every monitor created, sticky ones
/// included. Enumerated by the collector sweep. Replaced wholesale on
/// growth; superseded registries are leaked because a sweep may only observe
/// the swap at a safepoint boundary and monitors are immortal anyway.
struct BindableRegistry<R: Runtime> {
    slots: Box<[AtomicPtr<Monitor<R>>]>,
    count: AtomicUsize,
}

impl<R: Runtime> BindableRegistry<R> {
    fn with_capacity(capacity: usize) -> &'static Self {
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Box::leak(Box::new(Self {
            slots,
            count: AtomicUsize::new(0),
        }))
    }
}

pub struct MonitorPool<R: Runtime> {
    /// The pool's own lock; guards the free list outside safepoints.
    lock: Mutex<()>,
    /// Head of the intrusive list of unbound monitors.
    unbound_list: AtomicPtr<Monitor<R>>,
    number_of_unbound: AtomicUsize,
    /// Total monitors after the last expansion; the reserve policy grows the
    /// pool back toward the midpoint between this and the minimum.
    unbound_hwm: AtomicUsize,
    bindable: AtomicPtr<BindableRegistry<R>>,
    /// Monitors permanently bound at startup; refreshed unconditionally
    /// after every collection, never reclaimed.
    sticky: Mutex<Vec<&'static Monitor<R>>>,
    in_global_safepoint: AtomicBool,
    unbound_word_writer: OnceLock<Box<dyn UnboundWordWriter>>,
    expansions: AtomicUsize,
    gc_requests: AtomicUsize,
    settings: PoolSettings,
}

impl<R: Runtime> MonitorPool<R> {
    pub(crate) fn new(settings: PoolSettings) -> Self {
        let capacity = settings.initial_qty.max(1);
        Self {
            lock: Mutex::new(()),
            unbound_list: AtomicPtr::new(null_mut()),
            number_of_unbound: AtomicUsize::new(0),
            unbound_hwm: AtomicUsize::new(0),
            bindable: AtomicPtr::new(
                BindableRegistry::<R>::with_capacity(capacity) as *const _ as *mut _
            ),
            sticky: Mutex::new(Vec::new()),
            in_global_safepoint: AtomicBool::new(false),
            unbound_word_writer: OnceLock::new(),
            expansions: AtomicUsize::new(0),
            gc_requests: AtomicUsize::new(0),
            settings,
        }
    }

    /// Creates the initial stock of monitors.
    pub(crate) fn initialize(&self) {
        for _ in 0..self.settings.initial_qty {
            let monitor = self.new_managed_monitor();
            self.add_to_unbound_list(monitor);
            self.add_to_bindable(monitor);
        }
        self.unbound_hwm
            .store(self.settings.initial_qty, Ordering::Relaxed);
        debug!(
            "monitor pool initialized: {} unbound monitors",
            self.settings.initial_qty
        );
    }

    fn new_managed_monitor(&self) -> &'static Monitor<R> {
        let monitor = if self.settings.proxy_acquirable {
            Monitor::proxy_acquirable()
        } else {
            Monitor::standard()
        };
        Box::leak(Box::new(monitor))
    }

    fn bindable(&self) -> &BindableRegistry<R> {
        unsafe { &*self.bindable.load(Ordering::Acquire) }
    }

    /// Appends to the registry, enlarging it first if full. Callers must
    /// hold either the pool lock at startup or have safepoints disabled,
    /// since a full registry is swapped for a larger copy.
    fn add_to_bindable(&self, monitor: &'static Monitor<R>) {
        let registry = self.bindable();
        let count = registry.count.load(Ordering::Relaxed);
        if count == registry.slots.len() {
            self.grow_bindable(registry.slots.len() + self.settings.grow_qty.max(1));
        }

        let registry = self.bindable();
        let count = registry.count.load(Ordering::Relaxed);
        registry.slots[count].store(monitor as *const _ as *mut _, Ordering::Relaxed);
        registry.count.store(count + 1, Ordering::Release);
    }

    fn grow_bindable(&self, new_capacity: usize) {
        let old = self.bindable();
        let new = BindableRegistry::<R>::with_capacity(new_capacity);
        let count = old.count.load(Ordering::Relaxed);
        for i in 0..count {
            new.slots[i].store(old.slots[i].load(Ordering::Relaxed), Ordering::Relaxed);
        }
        new.count.store(count, Ordering::Relaxed);
        self.bindable
            .store(new as *const _ as *mut _, Ordering::Release);
    }

    fn take_from_unbound_list(&self) -> &'static Monitor<R> {
        // No safepoint can land in here, so the free list is safe to touch.
        let head = self.unbound_list.load(Ordering::Relaxed);
        debug_assert!(!head.is_null());
        let monitor: &'static Monitor<R> = unsafe { &*head };
        self.unbound_list.store(monitor.next(), Ordering::Relaxed);
        monitor.set_next(null_mut());
        self.number_of_unbound.fetch_sub(1, Ordering::Relaxed);
        monitor
    }

    fn add_to_unbound_list(&self, monitor: &'static Monitor<R>) {
        monitor.set_next(self.unbound_list.load(Ordering::Relaxed));
        self.unbound_list
            .store(monitor as *const _ as *mut _, Ordering::Relaxed);
        self.number_of_unbound.fetch_add(1, Ordering::Relaxed);
    }

    /// Binds a monitor to `object`.
    ///
    /// The binding is one-way at this stage: the monitor points at the
    /// object, but the object knows nothing about the monitor until the
    /// caller rewrites its header.
    pub fn bind_monitor(&self, object: ObjectReference) -> &'static Monitor<R> {
        let monitor = if self.in_global_safepoint.load(Ordering::Relaxed) {
            // Mutators are parked; the free list is ours.
            self.take_from_unbound_list()
        } else {
            let _guard = self.lock.lock();
            let min = self.settings.min_qty;
            if min > 0 {
                if self.number_of_unbound.load(Ordering::Relaxed) < min {
                    // Recover unowned bindings before allocating more.
                    self.gc_requests.fetch_add(1, Ordering::Relaxed);
                    R::request_gc();
                }
                // If that did not bring us at least midway back between the
                // reserve floor and the high-water mark, expand.
                let midpoint = (self.unbound_hwm.load(Ordering::Relaxed) + min) >> 1;
                if self.number_of_unbound.load(Ordering::Relaxed) < midpoint {
                    self.expand_unbound_list();
                }
            }
            if self.number_of_unbound.load(Ordering::Relaxed) == 0 {
                self.expand_unbound_list();
            }
            self.take_from_unbound_list()
        };

        monitor.set_bound_object(object);
        if self.settings.trace {
            trace!("bound monitor: {:?}", monitor);
        }
        monitor
    }

    /// Places `monitor` back on the free list. Only valid for monitors that
    /// failed to reach a two-way binding.
    pub fn unbind_monitor(&self, monitor: &'static Monitor<R>) {
        if monitor.owner_thread().is_some() {
            log::error!("unbinding owned monitor: {:?}", monitor);
            panic!("unbinding a monitor still owned by a thread");
        }
        if monitor.is_hard_bound() {
            log::error!("unbinding hard-bound monitor: {:?}", monitor);
            panic!("unbinding a hard-bound monitor");
        }

        monitor.reset();
        if self.in_global_safepoint.load(Ordering::Relaxed) {
            self.add_to_unbound_list(monitor);
        } else {
            let _guard = self.lock.lock();
            self.add_to_unbound_list(monitor);
        }
        if self.settings.trace {
            trace!("unbound monitor: {:?}", monitor);
        }
    }

    /// Expands the free list by a growth batch of fresh monitors.
    ///
    /// This is the one place where mutator access to the monitor lists must
    /// be made atomic with respect to a collector sweep. It can run while
    /// the pool lock is already held (exhaustion recovery), so an ordinary
    /// blocking lock is not an option: the safepoint machinery is parked
    /// instead, which keeps a collector pause from starting mid-splice.
    fn expand_unbound_list(&self) {
        let grow_qty = self.settings.grow_qty.max(1);

        // Allocate before disabling safepoints; allocation may block.
        let mut batch = Vec::with_capacity(grow_qty);
        for _ in 0..grow_qty {
            batch.push(self.new_managed_monitor());
        }

        R::disable_safepoints();
        for monitor in batch {
            self.add_to_unbound_list(monitor);
            self.add_to_bindable(monitor);
        }
        self.unbound_hwm
            .store(self.bindable().count.load(Ordering::Relaxed), Ordering::Relaxed);
        R::enable_safepoints();

        self.expansions.fetch_add(1, Ordering::Relaxed);
        if self.settings.trace {
            trace!("expanded unbound monitor list by {}", grow_qty);
        }
    }

    /// Permanently hard-binds a fresh monitor to `object`. Sticky bindings
    /// are for startup-critical objects that must never allocate or block
    /// while binding; they are never reclaimed.
    pub fn bind_sticky_monitor(&self, object: ObjectReference) -> &'static Monitor<R> {
        let monitor: &'static Monitor<R> = Box::leak(Box::new(Monitor::standard()));
        monitor.set_sticky();
        monitor.set_bound_object(object);
        monitor.set_displaced_misc(R::ObjectModel::read_misc(object));
        monitor.refresh_bound_object();

        R::disable_safepoints();
        self.add_to_bindable(monitor);
        R::enable_safepoints();
        self.sticky.lock().push(monitor);

        if self.settings.trace {
            debug!("sticky monitor bound: {:?}", monitor);
        }
        monitor
    }

    /// Records `monitor` in the calling thread's protected slot: the thread
    /// is in-flight on an operation against it, and a concurrent sweep must
    /// not steal the binding. Cleared by protecting a different monitor.
    pub fn protect_binding(&self, monitor: &Monitor<R>) {
        let current = R::current_thread();
        ThreadOf::<R>::sync(current)
            .protected_monitor
            .store(monitor as *const _ as *mut _, Ordering::Relaxed);
    }

    /// Registers the header rewriter used when bindings are dissolved.
    /// Called once at startup by the lock-word encoding scheme.
    pub fn register_unbound_word_writer(&self, writer: Box<dyn UnboundWordWriter>) {
        if self.unbound_word_writer.set(writer).is_err() {
            panic!("unbound word writer registered twice");
        }
    }

    /// Called at a global safepoint before the collector runs.
    pub fn before_garbage_collection(&self) {
        self.in_global_safepoint.store(true, Ordering::Relaxed);
        self.unbind_unowned_monitors();
    }

    /// Called at the same safepoint after the collector has finished.
    pub fn after_garbage_collection(&self) {
        self.refresh_all_bindings();
        self.in_global_safepoint.store(false, Ordering::Relaxed);
    }

    /// Must only run at a global safepoint.
    fn unbind_unowned_monitors(&self) {
        // Mark all protected monitors: an in-flight operation wins over
        // reclamation.
        R::lockkit().threads().for_each(|thread| {
            if let Some(monitor) = ThreadOf::<R>::sync(thread).protected_monitor() {
                if monitor.binding_protection() == BindingProtection::Unprotected {
                    monitor.set_binding_protection(BindingProtection::Protected);
                }
            }
        });

        // One sweep over the registry: demote idle hard bindings, reclaim
        // the unprotected, snapshot the rest.
        let registry = self.bindable();
        let count = registry.count.load(Ordering::Relaxed);
        for i in 0..count {
            let monitor: &'static Monitor<R> =
                unsafe { &*registry.slots[i].load(Ordering::Relaxed) };
            if monitor.is_sticky() {
                continue;
            }

            if monitor.is_hard_bound()
                && monitor.binding_protection() == BindingProtection::PreAcquire
            {
                monitor.set_binding_protection(BindingProtection::Unprotected);
            }

            if monitor.binding_protection() == BindingProtection::Unprotected {
                if self.settings.trace {
                    trace!("unbinding monitor: {:?}", monitor);
                }
                if let Some(object) = monitor.bound_object() {
                    let writer = self
                        .unbound_word_writer
                        .get()
                        .expect("no unbound word writer registered");
                    writer.write_unbound_word(object, monitor.displaced_misc());
                }
                monitor.reset();
                // Mutator free-list access is atomic with respect to the
                // safepoint; no lock is taken here.
                self.add_to_unbound_list(monitor);
            } else if monitor.is_bound() {
                monitor.pre_gc_prepare();
            }
        }
    }

    /// Must only run at a global safepoint.
    fn refresh_all_bindings(&self) {
        let registry = self.bindable();
        let count = registry.count.load(Ordering::Relaxed);
        for i in 0..count {
            let monitor: &'static Monitor<R> =
                unsafe { &*registry.slots[i].load(Ordering::Relaxed) };
            if !monitor.is_sticky() && monitor.requires_post_gc_refresh() {
                monitor.refresh_bound_object();
            }
        }
        for monitor in self.sticky.lock().iter() {
            monitor.refresh_bound_object();
        }
    }

    pub fn unbound_count(&self) -> usize {
        self.number_of_unbound.load(Ordering::Relaxed)
    }

    pub fn unbound_hwm(&self) -> usize {
        self.unbound_hwm.load(Ordering::Relaxed)
    }

    /// Every monitor ever created, sticky ones included.
    pub fn bindable_count(&self) -> usize {
        self.bindable().count.load(Ordering::Relaxed)
    }

    pub fn sticky_count(&self) -> usize {
        self.sticky.lock().len()
    }

    /// Non-sticky monitors currently bound to an object.
    pub fn bound_count(&self) -> usize {
        let registry = self.bindable();
        let count = registry.count.load(Ordering::Relaxed);
        let mut bound = 0;
        for i in 0..count {
            let monitor = unsafe { &*registry.slots[i].load(Ordering::Relaxed) };
            if !monitor.is_sticky() && monitor.is_bound() {
                bound += 1;
            }
        }
        bound
    }

    /// Completed pool expansions.
    pub fn expansions(&self) -> usize {
        self.expansions.load(Ordering::Relaxed)
    }

    /// Collections requested because the free list fell below its reserve.
    pub fn gc_requests(&self) -> usize {
        self.gc_requests.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockObject, MockObjectModel};
    use crate::{mock_runtime, Runtime};

    struct RestoreWriter;

    impl UnboundWordWriter for RestoreWriter {
        fn write_unbound_word(&self, object: ObjectReference, pre_binding_word: LockWord) {
            MockObjectModel::write_misc(object, pre_binding_word);
        }
    }

    fn hard_bind<R: Runtime>(pool: &MonitorPool<R>, object: &'static MockObject) -> &'static Monitor<R> {
        let monitor = pool.bind_monitor(object.reference());
        monitor.set_displaced_misc(R::ObjectModel::read_misc(object.reference()));
        R::ObjectModel::write_misc(
            object.reference(),
            LockWord::bound_from_monitor(monitor.address()),
        );
        monitor
    }

    mock_runtime!(GrowthVM, |builder| {
        builder.settings.initial_qty = 50;
        builder.settings.grow_qty = 50;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn pool_grows_exactly_once_on_exhaustion() {
        mock::attach_current::<GrowthVM>();
        let pool = GrowthVM::lockkit().pool();

        for _ in 0..50 {
            let object = MockObject::new();
            pool.bind_monitor(object.reference());
        }
        assert_eq!(pool.expansions(), 0);
        assert_eq!(pool.unbound_count(), 0);
        assert_eq!(pool.bindable_count(), 50);

        let extra = MockObject::new();
        let monitor = pool.bind_monitor(extra.reference());
        assert_eq!(pool.expansions(), 1);
        assert_eq!(pool.bindable_count(), 100);
        assert_eq!(pool.unbound_count(), 49);
        assert_eq!(pool.unbound_hwm(), 100);
        assert_eq!(monitor.bound_object(), Some(extra.reference()));
    }

    mock_runtime!(ReserveVM, |builder| {
        builder.settings.initial_qty = 50;
        builder.settings.grow_qty = 50;
        builder.settings.min_qty = 25;
    });

    #[test]
    fn reserve_policy_expands_at_the_midpoint() {
        mock::attach_current::<ReserveVM>();
        let pool = ReserveVM::lockkit().pool();

        // The midpoint between the reserve floor (25) and the high-water
        // mark (50) is 37: the expansion fires on the bind that sees only
        // 36 unbound monitors left.
        for _ in 0..14 {
            pool.bind_monitor(MockObject::new().reference());
        }
        assert_eq!(pool.expansions(), 0);

        pool.bind_monitor(MockObject::new().reference());
        assert_eq!(pool.expansions(), 1);
        assert_eq!(pool.gc_requests(), 0);
        assert_eq!(pool.bindable_count(), 100);
        assert_eq!(pool.unbound_hwm(), 100);
    }

    mock_runtime!(ScarceVM, |builder| {
        builder.settings.initial_qty = 10;
        builder.settings.grow_qty = 10;
        builder.settings.min_qty = 25;
    });

    #[test]
    fn collection_requested_below_the_reserve() {
        mock::attach_current::<ScarceVM>();
        let pool = ScarceVM::lockkit().pool();

        pool.bind_monitor(MockObject::new().reference());
        assert_eq!(pool.gc_requests(), 1);
        assert_eq!(pool.expansions(), 1);
    }

    mock_runtime!(AccountingVM, |builder| {
        builder.settings.initial_qty = 10;
        builder.settings.grow_qty = 5;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn pool_accounting_holds() {
        mock::attach_current::<AccountingVM>();
        let pool = AccountingVM::lockkit().pool();

        let sticky_object = MockObject::new();
        pool.bind_sticky_monitor(sticky_object.reference());

        let monitors: Vec<_> = (0..3)
            .map(|_| pool.bind_monitor(MockObject::new().reference()))
            .collect();

        assert_eq!(
            pool.unbound_count() + pool.bound_count() + pool.sticky_count(),
            pool.bindable_count()
        );
        assert_eq!(pool.bindable_count(), 11);

        pool.unbind_monitor(monitors[0]);
        assert_eq!(
            pool.unbound_count() + pool.bound_count() + pool.sticky_count(),
            pool.bindable_count()
        );
        assert_eq!(pool.unbound_count(), 8);
    }

    mock_runtime!(UnbindVM, |builder| {
        builder.settings.initial_qty = 4;
        builder.settings.grow_qty = 4;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn unbind_resets_and_returns_the_monitor() {
        mock::attach_current::<UnbindVM>();
        let pool = UnbindVM::lockkit().pool();

        let object = MockObject::new();
        let monitor = pool.bind_monitor(object.reference());
        assert_eq!(pool.unbound_count(), 3);
        assert!(monitor.is_bound());

        pool.unbind_monitor(monitor);
        assert_eq!(pool.unbound_count(), 4);
        assert!(!monitor.is_bound());
        assert_eq!(monitor.binding_protection(), BindingProtection::PreAcquire);
        assert_eq!(monitor.displaced_misc(), LockWord::ZERO);
    }

    mock_runtime!(UnbindOwnedVM, |builder| {
        builder.settings.min_qty = 0;
    });

    #[test]
    #[should_panic(expected = "unbinding a monitor still owned")]
    fn unbind_of_an_owned_monitor_is_fatal() {
        mock::attach_current::<UnbindOwnedVM>();
        let pool = UnbindOwnedVM::lockkit().pool();
        let monitor = pool.bind_monitor(MockObject::new().reference());
        monitor.enter();
        pool.unbind_monitor(monitor);
    }

    mock_runtime!(SweepVM, |builder| {
        builder.settings.initial_qty = 8;
        builder.settings.grow_qty = 4;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn sweep_reclaims_unowned_hard_bound_monitors() {
        mock::attach_current::<SweepVM>();
        let pool = SweepVM::lockkit().pool();
        pool.register_unbound_word_writer(Box::new(RestoreWriter));

        let object = MockObject::new();
        MockObjectModel::write_misc(object.reference(), LockWord::from_raw(0x1234));
        let monitor = hard_bind(pool, object);

        monitor.enter();
        monitor.enter();
        monitor.exit().unwrap();
        monitor.exit().unwrap();
        assert_eq!(monitor.binding_protection(), BindingProtection::Unprotected);
        assert_eq!(pool.unbound_count(), 7);

        pool.before_garbage_collection();
        assert!(!monitor.is_bound());
        assert_eq!(pool.unbound_count(), 8);
        // The object's header carries its pre-binding word again.
        assert_eq!(
            MockObjectModel::read_misc(object.reference()),
            LockWord::from_raw(0x1234)
        );
        pool.after_garbage_collection();
    }

    mock_runtime!(ProtectVM, |builder| {
        builder.settings.initial_qty = 8;
        builder.settings.grow_qty = 4;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn protected_slot_saves_a_monitor_from_the_sweep() {
        mock::attach_current::<ProtectVM>();
        let pool = ProtectVM::lockkit().pool();
        pool.register_unbound_word_writer(Box::new(RestoreWriter));

        let object = MockObject::new();
        let monitor = hard_bind(pool, object);
        monitor.enter();
        monitor.exit().unwrap();
        assert_eq!(monitor.binding_protection(), BindingProtection::Unprotected);

        pool.protect_binding(monitor);
        pool.before_garbage_collection();
        // Promoted back to protected; the binding is intact.
        assert_eq!(monitor.binding_protection(), BindingProtection::Protected);
        assert!(monitor.is_hard_bound());
        pool.after_garbage_collection();
        assert!(monitor.is_hard_bound());

        mock::clear_protected_binding::<ProtectVM>();
    }

    mock_runtime!(DemoteVM, |builder| {
        builder.settings.initial_qty = 8;
        builder.settings.grow_qty = 4;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn idle_hard_bound_monitor_is_demoted_and_reclaimed() {
        mock::attach_current::<DemoteVM>();
        let pool = DemoteVM::lockkit().pool();
        pool.register_unbound_word_writer(Box::new(RestoreWriter));

        let object = MockObject::new();
        let monitor = hard_bind(pool, object);
        // Hard-bound but never entered.
        assert_eq!(monitor.binding_protection(), BindingProtection::PreAcquire);

        pool.before_garbage_collection();
        assert!(!monitor.is_bound());
        assert_eq!(
            MockObjectModel::read_misc(object.reference()),
            LockWord::ZERO
        );
        pool.after_garbage_collection();
    }

    mock_runtime!(OneWayVM, |builder| {
        builder.settings.initial_qty = 8;
        builder.settings.grow_qty = 4;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn one_way_binding_survives_the_sweep_without_refresh() {
        mock::attach_current::<OneWayVM>();
        let pool = OneWayVM::lockkit().pool();

        let object = MockObject::new();
        let monitor = pool.bind_monitor(object.reference());

        pool.before_garbage_collection();
        assert!(monitor.is_bound());
        pool.after_garbage_collection();

        // The object never pointed back, so it must not be rebound.
        assert!(monitor.is_bound());
        assert!(!monitor.is_hard_bound());
        assert_eq!(
            MockObjectModel::read_misc(object.reference()),
            LockWord::ZERO
        );
    }

    mock_runtime!(StickyVM, |builder| {
        builder.settings.initial_qty = 4;
        builder.settings.grow_qty = 4;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn sticky_monitors_are_never_reclaimed_and_always_refreshed() {
        mock::attach_current::<StickyVM>();
        let pool = StickyVM::lockkit().pool();

        let object = MockObject::new();
        MockObjectModel::write_misc(object.reference(), LockWord::from_raw(0x76));
        let monitor = pool.bind_sticky_monitor(object.reference());
        assert!(monitor.is_sticky());
        assert!(monitor.is_hard_bound());
        assert_eq!(monitor.displaced_misc(), LockWord::from_raw(0x76));
        assert_eq!(pool.bindable_count(), 5);

        // Unowned and hard-bound, yet the sweep must leave it alone.
        pool.before_garbage_collection();
        assert!(monitor.is_hard_bound());
        pool.after_garbage_collection();
        assert!(monitor.is_hard_bound());
    }

    mock_runtime!(SafepointVM, |builder| {
        builder.settings.initial_qty = 4;
        builder.settings.grow_qty = 4;
        builder.settings.min_qty = 0;
    });

    #[test]
    fn binding_inside_a_collection_pause_skips_the_pool_lock() {
        mock::attach_current::<SafepointVM>();
        let pool = SafepointVM::lockkit().pool();

        pool.before_garbage_collection();
        let object = MockObject::new();
        let monitor = pool.bind_monitor(object.reference());
        assert_eq!(monitor.bound_object(), Some(object.reference()));
        pool.unbind_monitor(monitor);
        assert_eq!(pool.unbound_count(), 4);
        pool.after_garbage_collection();
    }
}
