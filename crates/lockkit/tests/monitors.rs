//! Multithreaded monitor scenarios against the mock runtime.

use lockkit::mock::{self, MockObject};
use lockkit::runtime::threads::{self, Thread};
use lockkit::{mock_runtime, MonitorError, Runtime, ThreadOf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

mock_runtime!(MutexVM, |builder| {
    builder.settings.min_qty = 0;
});

#[test]
fn mutual_exclusion_between_threads() {
    init_logs();
    mock::attach_current::<MutexVM>();
    let pool = MutexVM::lockkit().pool();
    let monitor = pool.bind_monitor(MockObject::new().reference());

    monitor.enter();
    let entered = Arc::new(AtomicBool::new(false));
    let observer = entered.clone();
    let handle = mock::spawn_mutator::<MutexVM>(move || {
        monitor.enter();
        observer.store(true, Ordering::SeqCst);
        monitor.exit().unwrap();
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!entered.load(Ordering::SeqCst), "contender entered a held monitor");
    assert_eq!(monitor.recursion_count(), 1);

    monitor.exit().unwrap();
    handle.join().unwrap();
    assert!(entered.load(Ordering::SeqCst));
    assert!(monitor.owner_thread().is_none());
}

mock_runtime!(WaitVM, |builder| {
    builder.settings.min_qty = 0;
});

#[test]
fn wait_releases_ownership_and_restores_recursion() {
    init_logs();
    let me = mock::attach_current::<WaitVM>();
    let pool = WaitVM::lockkit().pool();
    let monitor = pool.bind_monitor(MockObject::new().reference());

    monitor.enter();
    monitor.enter();
    assert_eq!(monitor.recursion_count(), 2);

    let saw_it_unowned = Arc::new(AtomicBool::new(false));
    let observer = saw_it_unowned.clone();
    let handle = mock::spawn_mutator::<WaitVM>(move || {
        // Blocks until the waiter has fully released the monitor.
        monitor.enter();
        observer.store(monitor.recursion_count() == 1, Ordering::SeqCst);
        monitor.notify(false).unwrap();
        monitor.exit().unwrap();
    });

    monitor.wait(0).unwrap();
    assert_eq!(monitor.recursion_count(), 2);
    assert_eq!(monitor.owner_thread(), Some(me));

    handle.join().unwrap();
    assert!(saw_it_unowned.load(Ordering::SeqCst));
    monitor.exit().unwrap();
    monitor.exit().unwrap();
}

mock_runtime!(NotifyAllVM, |builder| {
    builder.settings.min_qty = 0;
});

#[test]
fn notify_all_wakes_every_waiter() {
    init_logs();
    mock::attach_current::<NotifyAllVM>();
    let pool = NotifyAllVM::lockkit().pool();
    let monitor = pool.bind_monitor(MockObject::new().reference());

    let woken = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let woken = woken.clone();
            mock::spawn_mutator::<NotifyAllVM>(move || {
                monitor.enter();
                monitor.wait(0).unwrap();
                woken.fetch_add(1, Ordering::SeqCst);
                monitor.exit().unwrap();
            })
        })
        .collect();

    loop {
        monitor.enter();
        let parked = monitor.waiting_thread_count();
        monitor.exit().unwrap();
        if parked == 3 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    monitor.enter();
    monitor.notify(true).unwrap();
    assert_eq!(monitor.waiting_thread_count(), 0);
    monitor.exit().unwrap();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), 3);
}

mock_runtime!(StackOrderVM, |builder| {
    builder.settings.min_qty = 0;
});

#[test]
fn single_notify_wakes_the_most_recent_waiter() {
    init_logs();
    mock::attach_current::<StackOrderVM>();
    let pool = StackOrderVM::lockkit().pool();
    let monitor = pool.bind_monitor(MockObject::new().reference());
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let wait_for_parked = |count: usize| loop {
        monitor.enter();
        let parked = monitor.waiting_thread_count();
        monitor.exit().unwrap();
        if parked == count {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    };

    let first = {
        let order = order.clone();
        mock::spawn_mutator::<StackOrderVM>(move || {
            monitor.enter();
            monitor.wait(0).unwrap();
            order.lock().unwrap().push("first");
            monitor.exit().unwrap();
        })
    };
    wait_for_parked(1);

    let second = {
        let order = order.clone();
        mock::spawn_mutator::<StackOrderVM>(move || {
            monitor.enter();
            monitor.wait(0).unwrap();
            order.lock().unwrap().push("second");
            monitor.exit().unwrap();
        })
    };
    wait_for_parked(2);

    monitor.enter();
    monitor.notify(false).unwrap();
    monitor.exit().unwrap();
    second.join().unwrap();

    monitor.enter();
    assert_eq!(monitor.waiting_thread_count(), 1);
    monitor.notify(false).unwrap();
    monitor.exit().unwrap();
    first.join().unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
}

mock_runtime!(TimeoutVM, |builder| {
    builder.settings.min_qty = 0;
});

#[test]
fn timed_wait_returns_without_a_signal() {
    init_logs();
    let me = mock::attach_current::<TimeoutVM>();
    let pool = TimeoutVM::lockkit().pool();
    let monitor = pool.bind_monitor(MockObject::new().reference());

    monitor.enter();
    let start = Instant::now();
    monitor.wait(100).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(90));

    assert_eq!(monitor.owner_thread(), Some(me));
    assert_eq!(monitor.recursion_count(), 1);
    // The timed-out waiter unlinked itself.
    assert_eq!(monitor.waiting_thread_count(), 0);
    monitor.exit().unwrap();
}

mock_runtime!(InterruptVM, |builder| {
    builder.settings.min_qty = 0;
});

#[test]
fn interruption_unparks_a_waiter() {
    init_logs();
    let me = mock::attach_current::<InterruptVM>();
    let pool = InterruptVM::lockkit().pool();
    let monitor = pool.bind_monitor(MockObject::new().reference());

    monitor.enter();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        threads::interrupt::<InterruptVM>(me);
    });

    assert_eq!(monitor.wait(0), Err(MonitorError::Interrupted));
    assert!(ThreadOf::<InterruptVM>::sync(me).is_interrupted(true));
    assert_eq!(monitor.owner_thread(), Some(me));
    assert_eq!(monitor.recursion_count(), 1);
    monitor.exit().unwrap();
    handle.join().unwrap();
}

mock_runtime!(ProxyVM, |builder| {
    builder.settings.proxy_acquirable = true;
    builder.settings.min_qty = 0;
});

#[test]
fn proxy_enter_blocks_until_the_logical_owner_operates() {
    init_logs();
    let me = mock::attach_current::<ProxyVM>();
    let pool = ProxyVM::lockkit().pool();
    let monitor = pool.bind_monitor(MockObject::new().reference());

    // Recorded as owned by this thread without any native acquisition.
    monitor.monitor_private_acquire(me, 1).unwrap();

    let entered = Arc::new(AtomicBool::new(false));
    let observer = entered.clone();
    let handle = mock::spawn_mutator::<ProxyVM>(move || {
        monitor.enter();
        observer.store(true, Ordering::SeqCst);
        monitor.exit().unwrap();
    });

    thread::sleep(Duration::from_millis(100));
    assert!(
        !entered.load(Ordering::SeqCst),
        "contender bypassed the ownership handshake"
    );

    // The logical owner's first operation completes the handshake; the
    // contender then races for the native mutex as usual.
    monitor.exit().unwrap();

    handle.join().unwrap();
    assert!(entered.load(Ordering::SeqCst));
    assert!(monitor.owner_thread().is_none());
}
