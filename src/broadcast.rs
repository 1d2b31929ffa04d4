//! The broadcast queue: a Mutex+Condvar mailbox that the session
//! handlers push into and a single broadcaster thread drains.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::protocol::Msg;

pub struct Queue {
    inner: Mutex<VecDeque<Msg>>,
    cond: Condvar,
}

impl Queue {
    pub fn new() -> Queue {
        Queue { inner: Mutex::new(VecDeque::new()), cond: Condvar::new() }
    }

    /// Enqueues `msg` and wakes the broadcaster; session handlers push
    /// and move on without waiting for delivery.
    pub fn push(&self, msg: Msg) {
        let mut q = self.inner.lock().unwrap();
        q.push_back(msg);
        self.cond.notify_one();
    }

    /// Blocks up to `timeout` for a message to become available, waking
    /// early (and spuriously, which is fine) on every push. Returns
    /// `None` on timeout so the broadcaster can re-check the termination
    /// flag.
    pub fn wait_pop(&self, timeout: Duration) -> Option<Msg> {
        let mut q = self.inner.lock().unwrap();
        if let Some(msg) = q.pop_front() {
            return Some(msg);
        }
        let (mut q, _timed_out) =
            self.cond.wait_timeout_while(q, timeout, |q| q.is_empty()).unwrap();
        q.pop_front()
    }
}

impl Default for Queue {
    fn default() -> Queue {
        Queue::new()
    }
}
