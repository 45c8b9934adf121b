use crate::{
    runtime::Runtime,
    sync::monitor::Monitor,
    sync::nat::{ConditionVariableFactory, NativeConditionVariable},
    utils::Address,
    ThreadOf,
};
use parking_lot::Mutex;
use std::{
    cell::Cell,
    marker::PhantomData,
    sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicU8, AtomicUsize, Ordering},
    sync::OnceLock,
};

/// Opaque handle to a runtime thread. The embedding runtime decides what the
/// address points at; this subsystem only reaches the thread's [`SyncData`]
/// through the [`Thread`] trait.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct VMThread(pub Address);

impl VMThread {
    pub const UNINITIALIZED: VMThread = VMThread(Address::ZERO);

    pub fn is_uninitialized(self) -> bool {
        self.0.is_zero()
    }

    pub fn raw(self) -> usize {
        self.0.as_usize()
    }
}

pub trait Thread<R: Runtime>: 'static {
    /// Unique thread id, used in protocol-violation reports.
    fn id(thread: VMThread) -> u64;

    /// The monitor-subsystem fields of `thread`.
    fn sync<'a>(thread: VMThread) -> &'a SyncData<R>;
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ThreadState {
    New = 0,
    /// Executing ordinary code.
    Running = 1,
    /// Blocked acquiring a monitor's native mutex.
    Blocked = 2,
    /// Parked in `wait` on a monitor.
    Waiting = 3,
    Terminated = 4,
}

impl From<u8> for ThreadState {
    fn from(value: u8) -> ThreadState {
        match value {
            0 => ThreadState::New,
            1 => ThreadState::Running,
            2 => ThreadState::Blocked,
            3 => ThreadState::Waiting,
            4 => ThreadState::Terminated,
            _ => unreachable!(),
        }
    }
}

impl ThreadState {
    pub fn is_running(&self) -> bool {
        matches!(self, ThreadState::Running)
    }

    pub fn not_running(&self) -> bool {
        matches!(self, ThreadState::New | ThreadState::Terminated)
    }
}

/// Per-thread state consumed by the monitor subsystem. Embedded in whatever
/// per-thread structure the runtime keeps, and reached through
/// [`Thread::sync`].
pub struct SyncData<R: Runtime> {
    state: AtomicU8,
    interrupted: AtomicBool,
    /// Private condition variable this thread parks on in `wait`. Created
    /// the first time the thread waits.
    waiting_condition: OnceLock<NativeConditionVariable>,
    /// Intrusive link for a monitor's waiting list: the thread's own address
    /// while unlinked, zero at the end of a list. Guarded by the monitor's
    /// native mutex while linked.
    pub(crate) next_waiting: AtomicUsize,
    /// Monitor this thread is mid-operation on, if any; read by the
    /// reclamation sweep so an in-flight binding is not stolen.
    pub(crate) protected_monitor: AtomicPtr<Monitor<R>>,
    marker: PhantomData<R>,
}

impl<R: Runtime> SyncData<R> {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ThreadState::New as u8),
            interrupted: AtomicBool::new(false),
            waiting_condition: OnceLock::new(),
            next_waiting: AtomicUsize::new(0),
            protected_monitor: AtomicPtr::new(std::ptr::null_mut()),
            marker: PhantomData,
        }
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn set_interrupted(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    /// Reads the interrupted status, clearing it when `clear` is set.
    pub fn is_interrupted(&self, clear: bool) -> bool {
        if clear {
            self.interrupted.swap(false, Ordering::Relaxed)
        } else {
            self.interrupted.load(Ordering::Relaxed)
        }
    }

    pub(crate) fn interrupted_flag(&self) -> &AtomicBool {
        &self.interrupted
    }

    pub(crate) fn waiting_condition(&self) -> &NativeConditionVariable {
        self.waiting_condition
            .get_or_init(ConditionVariableFactory::create)
    }

    pub(crate) fn try_waiting_condition(&self) -> Option<&NativeConditionVariable> {
        self.waiting_condition.get()
    }

    pub fn protected_monitor(&self) -> Option<&Monitor<R>> {
        let monitor = self.protected_monitor.load(Ordering::Relaxed);
        if monitor.is_null() {
            None
        } else {
            Some(unsafe { &*monitor })
        }
    }
}

impl<R: Runtime> Default for SyncData<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of live threads. The reclamation sweep walks it at a safepoint
/// to find protected monitors.
pub struct Threads<R: Runtime> {
    threads: Mutex<Vec<VMThread>>,
    next_thread_id: AtomicU64,
    marker: PhantomData<R>,
}

impl<R: Runtime> Threads<R> {
    pub const fn new() -> Self {
        Self {
            threads: Mutex::new(Vec::new()),
            next_thread_id: AtomicU64::new(1),
            marker: PhantomData,
        }
    }

    pub fn next_thread_id(&self) -> u64 {
        self.next_thread_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `thread` and makes it the calling OS thread's current
    /// thread.
    pub fn attach(&self, thread: VMThread) {
        let sync = ThreadOf::<R>::sync(thread);
        sync.next_waiting.store(thread.raw(), Ordering::Relaxed);
        sync.set_state(ThreadState::Running);
        CURRENT.with(|current| current.set(thread.raw()));
        self.threads.lock().push(thread);
    }

    pub fn detach_current(&self) {
        let thread = lockkit_current_thread();
        if thread.is_uninitialized() {
            return;
        }
        ThreadOf::<R>::sync(thread).set_state(ThreadState::Terminated);
        self.threads.lock().retain(|candidate| *candidate != thread);
        CURRENT.with(|current| current.set(0));
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }

    pub fn for_each(&self, mut f: impl FnMut(VMThread)) {
        for thread in self.threads.lock().iter() {
            f(*thread);
        }
    }
}

thread_local! {
    static CURRENT: Cell<usize> = const { Cell::new(0) };
}

/// Handle of the thread executing the caller, or
/// [`VMThread::UNINITIALIZED`] on an unattached OS thread.
pub fn lockkit_current_thread() -> VMThread {
    VMThread(Address::from_usize(CURRENT.with(|current| current.get())))
}

/// Interrupts `thread`: sets its interrupted flag and signals its private
/// condition variable so a `wait` in progress returns early.
pub fn interrupt<R: Runtime>(thread: VMThread) {
    let sync = ThreadOf::<R>::sync(thread);
    sync.set_interrupted();
    if let Some(condition) = sync.try_waiting_condition() {
        let _ = condition.notify(false);
    }
}
