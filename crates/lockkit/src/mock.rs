//! Simple mock runtime used in tests.

use crate::{
    objectmodel::{lockword::LockWord, ObjectModel, ObjectReference},
    runtime::threads::{SyncData, Thread, VMThread},
    runtime::Runtime,
    utils::Address,
    ThreadOf,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

/// Heap object stand-in: a header word plus a payload. Leaked so references
/// stay valid for the whole test run, like objects in a pinned heap.
pub struct MockObject {
    misc: AtomicU64,
    pub value: usize,
}

impl MockObject {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> &'static MockObject {
        Box::leak(Box::new(MockObject {
            misc: AtomicU64::new(0),
            value: 0,
        }))
    }

    pub fn reference(&self) -> ObjectReference {
        ObjectReference::from_ref(self)
    }
}

pub struct MockObjectModel;

impl ObjectModel for MockObjectModel {
    fn read_misc(object: ObjectReference) -> LockWord {
        let object = unsafe { object.to_address().as_ref::<MockObject>() };
        LockWord::from_raw(object.misc.load(Ordering::Relaxed))
    }

    fn write_misc(object: ObjectReference, word: LockWord) {
        let object = unsafe { object.to_address().as_ref::<MockObject>() };
        object.misc.store(word.as_raw(), Ordering::Relaxed);
    }

    fn compare_exchange_misc(
        object: ObjectReference,
        expected: LockWord,
        desired: LockWord,
    ) -> LockWord {
        let object = unsafe { object.to_address().as_ref::<MockObject>() };
        match object.misc.compare_exchange(
            expected.as_raw(),
            desired.as_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(previous) | Err(previous) => LockWord::from_raw(previous),
        }
    }
}

pub struct MockThread<R: Runtime> {
    sync: SyncData<R>,
    id: u64,
}

impl<R: Runtime> MockThread<R> {
    pub fn create(id: u64) -> VMThread {
        VMThread(Address::from_ptr(Box::into_raw(Box::new(MockThread::<R> {
            sync: SyncData::new(),
            id,
        }))))
    }
}

impl<R: Runtime> Thread<R> for MockThread<R> {
    fn id(thread: VMThread) -> u64 {
        unsafe { thread.0.as_ref::<MockThread<R>>() }.id
    }

    fn sync<'a>(thread: VMThread) -> &'a SyncData<R> {
        &unsafe { thread.0.as_ref::<MockThread<R>>() }.sync
    }
}

/// Registers a fresh mock thread for the calling OS thread.
pub fn attach_current<R>() -> VMThread
where
    R: Runtime<Thread = MockThread<R>>,
{
    let threads = R::lockkit().threads();
    let thread = MockThread::<R>::create(threads.next_thread_id());
    threads.attach(thread);
    thread
}

/// Runs `f` on a new OS thread attached to `R`'s thread registry.
pub fn spawn_mutator<R>(f: impl FnOnce() + Send + 'static) -> JoinHandle<()>
where
    R: Runtime<Thread = MockThread<R>>,
{
    std::thread::spawn(move || {
        attach_current::<R>();
        f();
        R::lockkit().threads().detach_current();
    })
}

/// Marks the calling thread as holding no protected monitor.
pub fn clear_protected_binding<R: Runtime>() {
    let current = R::current_thread();
    ThreadOf::<R>::sync(current)
        .protected_monitor
        .store(std::ptr::null_mut(), Ordering::Relaxed);
}

/// Defines a mock [`Runtime`] with its own static [`LockKit`] instance, so
/// every test scenario gets an isolated pool.
///
/// ```ignore
/// mock_runtime!(MyVM, |builder| {
///     builder.settings.min_qty = 0;
/// });
/// ```
///
/// [`LockKit`]: crate::LockKit
#[macro_export]
macro_rules! mock_runtime {
    ($name:ident, $configure:expr) => {
        #[derive(Default)]
        pub struct $name;

        impl $crate::Runtime for $name {
            type Thread = $crate::mock::MockThread<Self>;
            type ObjectModel = $crate::mock::MockObjectModel;

            fn request_gc() {}

            fn disable_safepoints() {}

            fn enable_safepoints() {}

            fn lockkit() -> &'static $crate::LockKit<Self> {
                static KIT: std::sync::OnceLock<$crate::LockKit<$name>> =
                    std::sync::OnceLock::new();
                KIT.get_or_init(|| {
                    let configure: fn(&mut $crate::LockKitBuilder<$name>) = $configure;
                    let mut builder = $crate::LockKitBuilder::new();
                    configure(&mut builder);
                    let kit = builder.build();
                    kit.initialize();
                    kit
                })
            }
        }
    };
}
