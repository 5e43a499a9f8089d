//! Guest-time scheduler.
//!
//! Timers are keyed by absolute guest nanoseconds. Everything is
//! single-threaded and cooperative: the core loop calls [`Scheduler::tick`]
//! (or pops due events itself) once per time slice, fires whatever came due
//! in deadline order, then runs the CPU until the next deadline.

pub const NS_PER_SEC: u64 = 1_000_000_000;

pub fn hz_to_nano(hz: u64) -> u64 {
    (NS_PER_SEC as f64 / hz as f64) as u64
}

pub fn nano_to_cycles(ns: u64, hz: u64) -> u64 {
    (ns as f64 / NS_PER_SEC as f64 * hz as f64) as u64
}

pub fn cycles_to_nano(cycles: u64, hz: u64) -> u64 {
    (cycles as f64 / hz as f64 * NS_PER_SEC as f64) as u64
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimerId(u64);

/// A timer that came due.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerEvent<T> {
    pub id: TimerId,
    pub deadline_ns: u64,
    pub payload: T,
}

struct Entry<T> {
    id: TimerId,
    deadline_ns: u64,
    /// Insertion sequence; keeps equal deadlines in FIFO order.
    seq: u64,
    payload: T,
}

pub struct Scheduler<T> {
    base_ns: u64,
    next_seq: u64,
    /// Sorted by (deadline, seq) ascending.
    entries: Vec<Entry<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Scheduler {
            base_ns: 0,
            next_seq: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current guest time.
    pub fn now_ns(&self) -> u64 {
        self.base_ns
    }

    /// Arm a timer `delta_ns` from now.
    pub fn start_timer(&mut self, payload: T, delta_ns: u64) -> TimerId {
        self.start_timer_at(payload, self.base_ns + delta_ns)
    }

    /// Arm a timer at an absolute guest deadline.
    pub fn start_timer_at(&mut self, payload: T, deadline_ns: u64) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = TimerId(seq);

        let key = (deadline_ns, seq);
        let pos = self
            .entries
            .partition_point(|e| (e.deadline_ns, e.seq) <= key);
        self.entries.insert(
            pos,
            Entry {
                id,
                deadline_ns,
                seq,
                payload,
            },
        );
        id
    }

    /// Time until `id` fires, or `None` if it no longer exists.
    pub fn remaining_time(&self, id: TimerId) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.deadline_ns.saturating_sub(self.base_ns))
    }

    /// Cancel a pending timer. A cancelled timer never fires; cancelling an
    /// already-fired or unknown timer is a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) -> Option<T> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos).payload)
    }

    /// Remove and return the next timer due at or before `now_ns`.
    pub fn pop_due(&mut self, now_ns: u64) -> Option<TimerEvent<T>> {
        if self.entries.first()?.deadline_ns > now_ns {
            return None;
        }
        let e = self.entries.remove(0);
        Some(TimerEvent {
            id: e.id,
            deadline_ns: e.deadline_ns,
            payload: e.payload,
        })
    }

    /// Deadline of the nearest pending timer.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.first().map(|e| e.deadline_ns)
    }

    /// Advance guest time by `delta_ns`, firing everything due on the way.
    pub fn tick(&mut self, delta_ns: u64, mut fire: impl FnMut(TimerEvent<T>)) {
        let target = self.base_ns + delta_ns;
        while let Some(ev) = self.pop_due(target) {
            fire(ev);
        }
        self.base_ns = target;
    }
}
