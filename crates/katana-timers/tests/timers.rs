use pretty_assertions::assert_eq;

use katana_timers::{cycles_to_nano, hz_to_nano, Scheduler};

#[test]
fn timers_fire_in_deadline_order() {
    let mut sched = Scheduler::new();
    sched.start_timer("b", 200);
    sched.start_timer("a", 100);
    sched.start_timer("c", 300);

    let mut fired = Vec::new();
    sched.tick(250, |ev| fired.push((ev.deadline_ns, ev.payload)));

    assert_eq!(fired, vec![(100, "a"), (200, "b")]);
    assert_eq!(sched.now_ns(), 250);

    sched.tick(100, |ev| fired.push((ev.deadline_ns, ev.payload)));
    assert_eq!(fired.last(), Some(&(300, "c")));
}

#[test]
fn equal_deadlines_fire_in_arm_order() {
    let mut sched = Scheduler::new();
    sched.start_timer(1, 100);
    sched.start_timer(2, 100);
    sched.start_timer(3, 100);

    let mut fired = Vec::new();
    sched.tick(100, |ev| fired.push(ev.payload));
    assert_eq!(fired, vec![1, 2, 3]);
}

#[test]
fn cancelled_timers_never_fire() {
    let mut sched = Scheduler::new();
    let keep = sched.start_timer("keep", 50);
    let cancelled = sched.start_timer("drop", 50);

    assert_eq!(sched.cancel_timer(cancelled), Some("drop"));
    // cancelling twice is a no-op
    assert_eq!(sched.cancel_timer(cancelled), None);

    let mut fired = Vec::new();
    sched.tick(100, |ev| fired.push(ev.payload));
    assert_eq!(fired, vec!["keep"]);
    assert_eq!(sched.remaining_time(keep), None);
}

#[test]
fn remaining_time_counts_down() {
    let mut sched = Scheduler::new();
    let id = sched.start_timer((), 500);

    assert_eq!(sched.remaining_time(id), Some(500));
    sched.tick(200, |_| {});
    assert_eq!(sched.remaining_time(id), Some(300));
}

#[test]
fn pop_due_leaves_future_timers() {
    let mut sched = Scheduler::new();
    sched.start_timer("soon", 10);
    sched.start_timer("later", 1000);

    let ev = sched.pop_due(100).unwrap();
    assert_eq!(ev.payload, "soon");
    assert!(sched.pop_due(100).is_none());
    assert_eq!(sched.next_deadline(), Some(1000));
}

#[test]
fn rate_conversions() {
    // one vblank at 60 Hz is ~16.6 ms
    let vblank = hz_to_nano(60);
    assert!((16_600_000..16_700_000).contains(&vblank));

    // 200 MHz CPU: 200 cycles per microsecond
    assert_eq!(cycles_to_nano(200, 200_000_000), 1_000);
}
