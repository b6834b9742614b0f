//! Wait/notify event
//!
//! A notification counter behind a mutex. Waiters remember the counter value
//! (their ticket) before checking their condition, so a notify that lands
//! between the check and the wait is never lost.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Event - broadcast wake-up for threads sharing an object
#[derive(Debug, Default)]
pub struct Event {
    notifications: Mutex<u64>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current notification count
    pub fn ticket(&self) -> u64 {
        *self.notifications.lock()
    }

    /// Block until a notify newer than `ticket`
    pub fn wait_past(&self, ticket: u64) {
        let mut notifications = self.notifications.lock();
        while *notifications == ticket {
            self.cond.wait(&mut notifications);
        }
    }

    /// Like [`wait_past`](Self::wait_past) with a deadline
    ///
    /// Returns `false` on timeout.
    pub fn wait_past_timeout(&self, ticket: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut notifications = self.notifications.lock();
        while *notifications == ticket {
            if self.cond.wait_until(&mut notifications, deadline).timed_out() {
                return *notifications != ticket;
            }
        }
        true
    }

    /// Block until the next notify
    pub fn wait(&self) {
        let ticket = self.ticket();
        self.wait_past(ticket);
    }

    /// Block until the next notify or `timeout`; `false` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let ticket = self.ticket();
        self.wait_past_timeout(ticket, timeout)
    }

    /// Wake every waiter
    pub fn notify(&self) {
        let mut notifications = self.notifications.lock();
        *notifications = notifications.wrapping_add(1);
        self.cond.notify_all();
    }
}
