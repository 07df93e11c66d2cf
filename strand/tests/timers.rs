//! Timer scheduler against the real monotonic clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use serial_test::serial;
use strand::sync::Mutex;
use strand::timer::{MonotonicTicks, SchedulerConfig, TickSource, TimerScheduler};

static INIT_TRACING: Once = Once::new();

fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        strand::init_tracing();
    });
}

fn scheduler() -> TimerScheduler {
    init_test_tracing();
    TimerScheduler::init(SchedulerConfig::default()).unwrap()
}

fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
#[serial]
fn one_shot_fires_no_earlier_than_timeout() {
    let sched = scheduler();
    let fired_at = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&fired_at);
    let timer = sched.timer(move || {
        *slot.lock() = Some(Instant::now());
        0
    });

    let started = Instant::now();
    timer.start(100).unwrap();
    assert!(eventually(Duration::from_secs(5), || fired_at.lock().is_some()));

    let Some(at) = *fired_at.lock() else {
        unreachable!()
    };
    assert!(at.duration_since(started) >= Duration::from_millis(100));
    assert!(!timer.is_running());
    assert_eq!(sched.active_timers(), 0);
    sched.shutdown().unwrap();
}

#[test]
#[serial]
fn short_timers_never_fire_early() {
    let sched = scheduler();
    let fired_at = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&fired_at);
    let timer = sched.timer(move || {
        *slot.lock() = Some(Instant::now());
        0
    });

    for _ in 0..200 {
        *fired_at.lock() = None;
        let started = Instant::now();
        timer.start(2).unwrap();
        assert!(eventually(Duration::from_secs(5), || fired_at.lock().is_some()));
        let Some(at) = *fired_at.lock() else {
            unreachable!()
        };
        let elapsed = at.duration_since(started);
        assert!(elapsed >= Duration::from_millis(2), "fired after {elapsed:?}");
    }
    sched.shutdown().unwrap();
}

#[test]
#[serial]
fn periodic_timer_reschedules_until_it_returns_zero() {
    let sched = scheduler();
    let ticks = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&ticks);
    let timer = sched.timer(move || {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 < 5 { 10 } else { 0 }
    });

    let started = Instant::now();
    timer.start(10).unwrap();
    assert!(eventually(Duration::from_secs(5), || ticks.load(Ordering::SeqCst) == 5));
    assert!(started.elapsed() >= Duration::from_millis(50));

    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(ticks.load(Ordering::SeqCst), 5);
    assert!(!timer.is_running());
}

#[test]
#[serial]
fn stopped_timer_never_fires() {
    let sched = scheduler();
    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    let timer = sched.timer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        0
    });

    timer.start(50).unwrap();
    assert!(timer.stop());
    assert!(!timer.stop());
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn stop_from_callback_cancels_reschedule() {
    let sched = scheduler();
    let fired = Arc::new(AtomicU32::new(0));
    let holder: Arc<Mutex<Option<strand::timer::Timer>>> = Arc::new(Mutex::new(None));

    let counter = Arc::clone(&fired);
    let me = Arc::clone(&holder);
    let timer = sched.timer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(t) = me.lock().as_ref() {
            // Not armed while its own callback runs.
            assert!(!t.stop());
        }
        5
    });
    *holder.lock() = Some(timer);
    if let Some(t) = holder.lock().as_ref() {
        t.start(5).unwrap();
    }

    assert!(eventually(Duration::from_secs(5), || fired.load(Ordering::SeqCst) >= 1));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    holder.lock().take();
}

#[test]
#[serial]
fn timers_fire_across_tick_counter_wrap() {
    init_test_tracing();
    let clock = Arc::new(MonotonicTicks::starting_at(u32::MAX - 150));
    let sched = TimerScheduler::init(
        SchedulerConfig::default().with_clock(Arc::clone(&clock) as Arc<dyn TickSource>),
    )
    .unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let make = |name: &'static str| {
        let order = Arc::clone(&order);
        sched.timer(move || {
            order.lock().push(name);
            0
        })
    };
    let before_wrap = make("before");
    let across_wrap = make("across");

    let started = Instant::now();
    before_wrap.start(50).unwrap();
    // Ends numerically below the start tick.
    across_wrap.start(300).unwrap();

    assert!(eventually(Duration::from_secs(5), || order.lock().len() == 2));
    assert_eq!(*order.lock(), vec!["before", "across"]);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(clock.ticks() < u32::MAX / 2);
    sched.shutdown().unwrap();
}
