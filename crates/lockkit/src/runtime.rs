pub mod options;
pub mod threads;

use crate::sync::{
    nat::{self, Backend, ConditionVariableFactory, MutexFactory, NativeConditionVariable, NativeMutex},
    pool::{MonitorPool, PoolSettings},
};
use self::threads::{Threads, VMThread};
use std::marker::PhantomData;

/// The embedding runtime. Everything the monitor subsystem consumes from the
/// rest of the VM comes through this trait: thread lookup, the object model,
/// collection requests and the safepoint machinery.
pub trait Runtime: 'static + Sized + Send + Sync {
    type Thread: threads::Thread<Self>;
    type ObjectModel: crate::objectmodel::ObjectModel;

    /// Handle of the thread executing the caller.
    fn current_thread() -> VMThread {
        threads::lockkit_current_thread()
    }

    /// Runs a full collection synchronously. The pool calls this when the
    /// free list falls below its reserve, to recover unowned bindings before
    /// allocating more monitors.
    fn request_gc();

    /// Keeps a collector pause from starting until
    /// [`enable_safepoints`](Self::enable_safepoints) is called. Used where
    /// code must exclude the collector but cannot block, e.g. while already
    /// holding the pool lock during exhaustion recovery.
    fn disable_safepoints();

    fn enable_safepoints();

    /// The process-wide monitor subsystem instance.
    fn lockkit() -> &'static LockKit<Self>;
}

/// The mutex/condition-variable pair shared by the ownership handshake of
/// every proxy-acquirable monitor in the process.
pub struct ProxyHandshake {
    pub(crate) mutex: NativeMutex,
    pub(crate) condition: NativeConditionVariable,
}

/// The monitor subsystem: the monitor pool, the live-thread registry and,
/// when proxy-acquirable monitors are configured, the shared handshake pair.
/// Built once by [`LockKitBuilder`] and owned by the embedding runtime.
pub struct LockKit<R: Runtime> {
    pool: MonitorPool<R>,
    threads: Threads<R>,
    proxy: Option<ProxyHandshake>,
}

impl<R: Runtime> LockKit<R> {
    pub fn pool(&self) -> &MonitorPool<R> {
        &self.pool
    }

    pub fn threads(&self) -> &Threads<R> {
        &self.threads
    }

    pub(crate) fn proxy_handshake(&self) -> &ProxyHandshake {
        self.proxy
            .as_ref()
            .expect("proxy-acquirable monitors not configured")
    }

    /// Creates the initial stock of monitors. Call once at startup, before
    /// any binding.
    pub fn initialize(&self) {
        self.pool.initialize();
    }
}

pub struct LockKitBuilder<R: Runtime> {
    pub settings: PoolSettings,
    pub backend: Backend,
    marker: PhantomData<R>,
}

impl<R: Runtime> LockKitBuilder<R> {
    pub fn new() -> Self {
        Self {
            settings: PoolSettings::default(),
            backend: Backend::platform_default(),
            marker: PhantomData,
        }
    }

    /// Populates the builder from the parsed startup flags.
    pub fn from_options(mut self) -> Self {
        self.settings.initial_qty = options::monitor_pool_size();
        self.settings.grow_qty = options::monitor_pool_grow();
        self.settings.min_qty = options::monitor_pool_min();
        self.settings.proxy_acquirable = options::proxy_monitors();
        self.settings.trace = options::trace_monitors();
        if options::is_monitor_backend_set() {
            self.backend = options::selected_backend();
        }
        self
    }

    pub fn build(self) -> LockKit<R> {
        nat::initialize(self.backend);
        let proxy = if self.settings.proxy_acquirable {
            Some(ProxyHandshake {
                mutex: MutexFactory::create(),
                condition: ConditionVariableFactory::create(),
            })
        } else {
            None
        };

        LockKit {
            pool: MonitorPool::new(self.settings),
            threads: Threads::new(),
            proxy,
        }
    }
}

impl<R: Runtime> Default for LockKitBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}
