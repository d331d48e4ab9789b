use std::collections::HashMap;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::model::NotificationId;

#[derive(Debug)]
struct ScheduledRemoval {
    token: u64,
    deadline: Instant,
    handle: AbortHandle,
}

/// Pending removal tasks, at most one per notification.
///
/// Entries are never mutated in place: replacing a timer removes the old
/// entry (aborting its task) and inserts a new one with a fresh token. A task
/// that wakes after being superseded fails [`RemovalTimers::claim`] and does
/// nothing.
#[derive(Debug, Default)]
pub(crate) struct RemovalTimers {
    entries: HashMap<NotificationId, ScheduledRemoval>,
    next_token: u64,
}

impl RemovalTimers {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn deadline(&self, id: NotificationId) -> Option<Instant> {
        self.entries.get(&id).map(|entry| entry.deadline)
    }

    pub fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    pub fn insert(&mut self, id: NotificationId, token: u64, deadline: Instant, handle: AbortHandle) {
        self.cancel(id);
        self.entries.insert(
            id,
            ScheduledRemoval {
                token,
                deadline,
                handle,
            },
        );
    }

    pub fn cancel(&mut self, id: NotificationId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.handle.abort();
        }
    }

    /// Consume the entry for `id` if `token` is still the current one
    pub fn claim(&mut self, id: NotificationId, token: u64) -> bool {
        if self.entries.get(&id).map(|entry| entry.token) == Some(token) {
            self.entries.remove(&id);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idle_task() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    #[tokio::test]
    async fn test_insert_replaces_and_aborts_previous() {
        let mut timers = RemovalTimers::default();
        let id = NotificationId(1);
        let first = tokio::spawn(std::future::pending::<()>());
        let first_token = timers.issue_token();
        timers.insert(id, first_token, Instant::now(), first.abort_handle());

        let second_token = timers.issue_token();
        timers.insert(id, second_token, Instant::now() + Duration::from_secs(1), idle_task());

        assert_eq!(timers.len(), 1);
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(!timers.claim(id, first_token));
        assert!(timers.claim(id, second_token));
        assert_eq!(timers.len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let mut timers = RemovalTimers::default();
        for raw in 0..3 {
            let token = timers.issue_token();
            timers.insert(NotificationId(raw), token, Instant::now(), idle_task());
        }
        assert_eq!(timers.len(), 3);
        timers.cancel_all();
        assert_eq!(timers.len(), 0);
        assert!(!timers.cancel(NotificationId(0)));
    }
}
