//! Deadline queue for receive timeouts, sleep wakeups and delayed sends.
//!
//! Timer events never hold the process they concern; they name it by pid
//! (plus a wait token for receive timeouts) and the scheduler checks that the
//! process is still waiting for that exact event before acting on it.
//!
//! A receive that is satisfied by a message cancels its timeout by
//! [`TimerId`]. Cancelled entries are skipped when they reach the head of
//! the heap and the heap is compacted once they make up more than half of it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use rustc_hash::FxHashSet;

use super::process::Pid;
use crate::term::Term;

/// Something to do once a deadline passes.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    /// End a `sleep`.
    Wake(Pid),
    /// Time out the receive identified by `token`.
    ReceiveTimeout { pid: Pid, token: u64 },
    /// Deliver a message scheduled with `send_after`.
    Deliver { pid: Pid, message: Term },
}

/// Handle for cancelling a pushed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Entry {
    deadline: Instant,
    seq: u64,
    event: TimerEvent,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest deadline first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending timer events. Ties fire in insertion order.
///
/// The head of the heap is never a cancelled entry.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
    /// Sequence numbers of cancelled entries still in `heap`.
    cancelled: FxHashSet<u64>,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue::default()
    }

    pub fn push(&mut self, deadline: Instant, event: TimerEvent) -> TimerId {
        self.seq += 1;
        self.heap.push(Entry {
            deadline,
            seq: self.seq,
            event,
        });
        TimerId(self.seq)
    }

    /// Cancel a pending timer. Cancelling one that already fired is a no-op.
    pub fn cancel(&mut self, id: TimerId) {
        if id.0 == 0 || id.0 > self.seq || !self.heap.iter().any(|e| e.seq == id.0) {
            return;
        }
        self.cancelled.insert(id.0);
        if self.cancelled.len() * 2 > self.heap.len() {
            let cancelled = std::mem::take(&mut self.cancelled);
            self.heap.retain(|e| !cancelled.contains(&e.seq));
        } else {
            self.skip_cancelled();
        }
    }

    fn skip_cancelled(&mut self) {
        while let Some(head) = self.heap.peek() {
            if !self.cancelled.remove(&head.seq) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Pop the earliest event whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEvent> {
        if self.heap.peek()?.deadline > now {
            return None;
        }
        self.pop()
    }

    /// The earliest event, due or not.
    pub fn peek(&self) -> Option<&TimerEvent> {
        self.heap.peek().map(|e| &e.event)
    }

    /// Remove the earliest event regardless of its deadline.
    pub fn pop(&mut self) -> Option<TimerEvent> {
        let entry = self.heap.pop()?;
        self.skip_cancelled();
        Some(entry.event)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pending timers, not counting cancelled ones.
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
