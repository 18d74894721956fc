/*
 * Message queue for a single log instance
 *
 * Holds fully rendered lines waiting for the next flush together with the
 * flush-requested state. Both live under the same mutex (the queue lock),
 * which is only ever held long enough to touch the queue, never across file
 * I/O.
 */

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::lock::lock;

/// The kind of timer currently armed for this queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingFlush {
    /// Fires after the flush interval
    Delayed,
    /// Fires right away because the queue reached its limit
    Immediate,
}

#[derive(Default)]
struct QueueState {
    lines: VecDeque<String>,
    pending: Option<PendingFlush>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct MessageQueue {
    state: Mutex<QueueState>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line and decide whether a timer must be armed.
    ///
    /// `arm` runs inside the queue lock, so arm requests reach the scheduler
    /// in the same order their decisions were taken. A delayed timer is
    /// escalated once the queue reaches `max_queue`. Returns false, without
    /// queuing, once the queue has been closed.
    pub fn push<F>(&self, line: String, max_queue: usize, arm: F) -> bool
    where
        F: FnOnce(PendingFlush),
    {
        let mut state = lock(&self.state);
        if state.closed {
            return false;
        }
        state.lines.push_back(line);

        let full = state.lines.len() >= max_queue;
        let next = match state.pending {
            None if full => Some(PendingFlush::Immediate),
            None => Some(PendingFlush::Delayed),
            Some(PendingFlush::Delayed) if full => Some(PendingFlush::Immediate),
            Some(_) => None,
        };

        if let Some(next) = next {
            state.pending = Some(next);
            arm(next);
        }
        true
    }

    /// Refuse every later push. Lines already queued stay for the final drain.
    pub fn close(&self) {
        lock(&self.state).closed = true;
    }

    /// Drop the pending state after an explicit flush emptied the queue.
    ///
    /// `disarm` runs inside the queue lock, ahead of any arm a later push
    /// sends. Lines that slipped in after the drain keep their timer.
    pub fn settle<F>(&self, disarm: F)
    where
        F: FnOnce(),
    {
        let mut state = lock(&self.state);
        if state.lines.is_empty() && state.pending.take().is_some() {
            disarm();
        }
    }

    /// Called after a timer flush has run.
    ///
    /// Clears the pending state, unless lines arrived while the flush was
    /// writing. Those are handed to `rearm`, which picks and arms the next
    /// timer from the current queue length.
    pub fn complete_flush<F>(&self, rearm: F)
    where
        F: FnOnce(usize) -> PendingFlush,
    {
        let mut state = lock(&self.state);
        state.pending = if state.lines.is_empty() {
            None
        } else {
            Some(rearm(state.lines.len()))
        };
    }

    /// Move every queued line out, leaving the queue empty
    pub fn take_all(&self) -> VecDeque<String> {
        std::mem::take(&mut lock(&self.state).lines)
    }

    /// Put back lines a failed flush could not write, ahead of anything
    /// queued since they were taken
    pub fn restore_front(&self, mut unwritten: VecDeque<String>) {
        if unwritten.is_empty() {
            return;
        }
        let mut state = lock(&self.state);
        unwritten.append(&mut state.lines);
        state.lines = unwritten;
    }

    pub fn len(&self) -> usize {
        lock(&self.state).lines.len()
    }

    #[cfg(test)]
    fn pending(&self) -> Option<PendingFlush> {
        lock(&self.state).pending
    }
}
