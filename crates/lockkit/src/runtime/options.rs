//! Startup flags of the monitor subsystem.

use crate::define_flag;
use crate::sync::nat::Backend;

define_flag!(
    usize,
    monitor_pool_size,
    50,
    "Number of monitors created at startup (default: 50)"
);

define_flag!(
    usize,
    monitor_pool_grow,
    50,
    "Number of monitors added by each pool expansion (default: 50)"
);

define_flag!(
    usize,
    monitor_pool_min,
    25,
    "Unbound monitors kept in reserve for GC and allocation code paths; 0 disables the reserve (default: 25)"
);

define_flag!(
    bool,
    proxy_monitors,
    false,
    "Use proxy-acquirable monitors, required by lock schemes that inflate on behalf of another thread (default: false)"
);

define_flag!(
    String,
    monitor_backend,
    String::new(),
    "Native mutex/condvar backend: pthread or parked (default: platform)"
);

define_flag!(
    bool,
    trace_monitors,
    false,
    "Trace monitor binding and reclamation (default: false)"
);

/// The backend named by `monitor_backend`, or the platform default when the
/// flag is unset or unrecognized.
pub fn selected_backend() -> Backend {
    let name = monitor_backend();
    match name.as_str() {
        #[cfg(unix)]
        "pthread" => Backend::Pthread,
        "parked" => Backend::Parked,
        "" => Backend::platform_default(),
        other => {
            log::warn!("unknown monitor backend `{}`; using platform default", other);
            Backend::platform_default()
        }
    }
}
