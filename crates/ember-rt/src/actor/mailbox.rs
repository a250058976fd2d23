//! Per-process mailbox with selective receive.
//!
//! Messages are appended in delivery order. Receiving is content addressed:
//! [`Mailbox::take_first`] scans from the oldest message and removes exactly
//! the first one the selector accepts, leaving the others in their original
//! relative order. A mailbox is owned by a single process and only touched on
//! the scheduler thread, so it needs no locking.

use std::collections::VecDeque;

use crate::term::Term;

/// An ordered inbox of undelivered messages.
#[derive(Default)]
pub struct Mailbox {
    queue: VecDeque<Term>,
}

impl Mailbox {
    /// Create a new empty mailbox.
    pub fn new() -> Self {
        Mailbox {
            queue: VecDeque::new(),
        }
    }

    /// Append a message to the back of the mailbox.
    pub fn deliver(&mut self, msg: Term) {
        self.queue.push_back(msg);
    }

    /// Remove and return the oldest message regardless of content.
    pub fn pop(&mut self) -> Option<Term> {
        self.queue.pop_front()
    }

    /// Remove the first message for which `select` returns `Some`, returning
    /// the message together with the selector's output.
    pub fn take_first<R>(&mut self, mut select: impl FnMut(&Term) -> Option<R>) -> Option<(Term, R)> {
        let (idx, out) = self
            .queue
            .iter()
            .enumerate()
            .find_map(|(i, msg)| select(msg).map(|out| (i, out)))?;
        let msg = self.queue.remove(idx)?;
        Some((msg, out))
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Iterate over pending messages in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.queue.iter()
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").field("len", &self.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
