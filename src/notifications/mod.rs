//! In-memory store of transient notifications with per-entry expiry timers.
//!
//! The store is an explicit context object: construct one at application
//! start and hand out clones (they share state). Timers run as tasks on the
//! Tokio runtime captured at construction, so mutating operations work from
//! any thread.

mod model;
mod timers;

use parking_lot::{Mutex, MutexGuard, ReentrantMutex};
use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::time::Instant;
use tracing::{debug, trace};

pub use model::{NewNotification, Notification, NotificationId, NotificationUpdate, Variant};
use timers::RemovalTimers;

/// Deadline used when `now + delay` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification timers need a Tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Maximum number of notifications held at once
    pub limit: usize,
    /// Lifetime of a notification added without an explicit duration
    pub default_duration: Duration,
    /// Grace period between dismissal and removal
    pub remove_delay: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            default_duration: Duration::from_millis(5000),
            remove_delay: Duration::from_millis(1000),
        }
    }
}

impl NotificationConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            limit: lookup("NOTIFICATION_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.limit),
            default_duration: lookup("NOTIFICATION_DEFAULT_DURATION_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_duration),
            remove_delay: lookup("NOTIFICATION_REMOVE_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.remove_delay),
        }
    }
}

type Listener = Arc<dyn Fn(&[Notification]) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    notifications: Vec<Notification>,
    timers: RemovalTimers,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
    next_listener: u64,
    /// Bumped on every published change
    revision: u64,
}

impl StoreState {
    fn position(&self, id: NotificationId) -> Option<usize> {
        self.notifications.iter().position(|n| n.id == id)
    }

    fn generate_id(&mut self) -> NotificationId {
        self.next_id += 1;
        NotificationId(self.next_id)
    }
}

struct Shared {
    state: Mutex<StoreState>,
    /// Held while listeners run; records the last revision delivered.
    /// Reentrant so a listener may mutate the store.
    delivery: ReentrantMutex<Cell<u64>>,
}

/// Shared store of currently visible notifications
#[derive(Clone)]
pub struct NotificationStore {
    config: NotificationConfig,
    shared: Arc<Shared>,
    runtime: Handle,
}

impl fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("NotificationStore")
            .field("config", &self.config)
            .field("notifications", &state.notifications)
            .field("pending_timers", &state.timers.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl NotificationStore {
    /// Create a store whose timers run on the current Tokio runtime
    pub fn new(config: NotificationConfig) -> Result<Self, NotificationError> {
        Ok(Self::with_handle(config, Handle::try_current()?))
    }

    pub fn with_handle(config: NotificationConfig, runtime: Handle) -> Self {
        Self {
            config: NotificationConfig {
                limit: config.limit.max(1),
                ..config
            },
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState::default()),
                delivery: ReentrantMutex::new(Cell::new(0)),
            }),
            runtime,
        }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Current notifications, newest first
    pub fn snapshot(&self) -> Vec<Notification> {
        self.shared.state.lock().notifications.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of removal timers currently scheduled
    pub fn pending_timers(&self) -> usize {
        self.shared.state.lock().timers.len()
    }

    /// Show a notification at the front of the list.
    ///
    /// A supplied id that is already present replaces that entry. Entries
    /// beyond the configured limit are evicted from the tail.
    pub fn add(&self, new: NewNotification) -> NotificationId {
        let mut state = self.shared.state.lock();

        let id = match new.id {
            Some(id) => {
                if let Some(index) = state.position(id) {
                    state.notifications.remove(index);
                }
                state.next_id = state.next_id.max(id.0);
                id
            }
            None => state.generate_id(),
        };
        let duration = new.duration.unwrap_or(self.config.default_duration);

        state.notifications.insert(
            0,
            Notification {
                id,
                title: new.title,
                description: new.description,
                variant: new.variant,
                duration,
                open: true,
                created_at: chrono::Utc::now(),
            },
        );

        if state.notifications.len() > self.config.limit {
            let evicted = state.notifications.split_off(self.config.limit);
            for notification in &evicted {
                state.timers.cancel(notification.id);
            }
            debug!(evicted = evicted.len(), "Notification limit reached, evicted oldest");
        }

        if duration.is_zero() {
            state.timers.cancel(id);
        } else {
            self.schedule_removal(&mut state, id, duration);
        }

        debug!(id = %id, duration_ms = model::saturating_millis(duration), "Notification added");
        publish(&self.shared, state);
        id
    }

    /// Merge `update` into an existing notification and re-arm its timer.
    ///
    /// Does nothing when the update carries no id or the id is unknown.
    pub fn update(&self, update: NotificationUpdate) {
        let Some(id) = update.id else {
            return;
        };

        let mut state = self.shared.state.lock();
        let Some(index) = state.position(id) else {
            trace!(id = %id, "Ignoring update for unknown notification");
            return;
        };

        update.apply_to(&mut state.notifications[index]);
        let duration = state.notifications[index].duration;

        state.timers.cancel(id);
        if !duration.is_zero() {
            self.schedule_removal(&mut state, id, duration);
        }

        publish(&self.shared, state);
    }

    /// Close one notification, or every notification when `id` is `None`.
    ///
    /// Persistent notifications (zero duration) stay open. Closed entries are
    /// removed after the remove delay; an entry whose pending timer fires
    /// sooner keeps that timer.
    pub fn dismiss(&self, id: Option<NotificationId>) {
        let mut state = self.shared.state.lock();

        let dismissed: Vec<NotificationId> = state
            .notifications
            .iter_mut()
            .filter(|n| id.map_or(true, |id| n.id == id) && !n.is_persistent())
            .map(|n| {
                n.open = false;
                n.id
            })
            .collect();

        if dismissed.is_empty() {
            return;
        }

        let deadline = deadline_after(self.config.remove_delay);
        for id in dismissed {
            match state.timers.deadline(id) {
                Some(existing) if existing <= deadline => {}
                _ => self.schedule_removal(&mut state, id, self.config.remove_delay),
            }
        }

        publish(&self.shared, state);
    }

    /// Delete one notification, or all of them when `id` is `None`,
    /// cancelling pending timers.
    pub fn remove(&self, id: Option<NotificationId>) {
        let mut state = self.shared.state.lock();

        match id {
            Some(id) => {
                state.timers.cancel(id);
                let Some(index) = state.position(id) else {
                    return;
                };
                state.notifications.remove(index);
            }
            None => {
                state.timers.cancel_all();
                if state.notifications.is_empty() {
                    return;
                }
                state.notifications.clear();
            }
        }

        publish(&self.shared, state);
    }

    /// Register `listener` to receive the full list after every change
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Notification]) + Send + Sync + 'static,
    {
        let mut state = self.shared.state.lock();
        state.next_listener += 1;
        let key = state.next_listener;
        state.listeners.push((key, Arc::new(listener)));

        Subscription {
            key,
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn schedule_removal(&self, state: &mut StoreState, id: NotificationId, delay: Duration) {
        let token = state.timers.issue_token();
        let deadline = deadline_after(delay);
        let shared = Arc::downgrade(&self.shared);

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            expire(&shared, id, token);
        });

        state.timers.insert(id, token, deadline, handle.abort_handle());
    }
}

/// Handle returned by [`NotificationStore::subscribe`]
#[derive(Clone)]
pub struct Subscription {
    key: u64,
    shared: Weak<Shared>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

impl Subscription {
    /// Stop receiving updates. Safe to call from inside a listener and more
    /// than once.
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.state.lock().listeners.retain(|(key, _)| *key != self.key);
        }
    }
}

fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

fn expire(shared: &Weak<Shared>, id: NotificationId, token: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut state = shared.state.lock();
    if !state.timers.claim(id, token) {
        return;
    }
    let Some(index) = state.position(id) else {
        return;
    };
    state.notifications.remove(index);
    debug!(id = %id, "Notification expired");
    publish(&shared, state);
}

/// Stamp the change, release the state lock, then hand the new list to every
/// listener registered at the time of the change.
///
/// Deliveries are serialized and a list older than one already delivered is
/// dropped, so listeners always end on the latest state.
fn publish(shared: &Shared, mut state: MutexGuard<'_, StoreState>) {
    state.revision += 1;
    let revision = state.revision;
    let snapshot = state.notifications.clone();
    let listeners: Vec<Listener> = state
        .listeners
        .iter()
        .map(|(_, listener)| Arc::clone(listener))
        .collect();
    drop(state);

    let delivered = shared.delivery.lock();
    if delivered.get() >= revision {
        trace!(revision, "Skipping superseded notification list");
        return;
    }
    delivered.set(revision);

    for listener in listeners {
        listener(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> NotificationStore {
        NotificationStore::new(NotificationConfig::default()).unwrap()
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn ids(store: &NotificationStore) -> Vec<u64> {
        store.snapshot().iter().map(|n| n.id.0).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_evicts_oldest() {
        let store = store();
        for i in 1..=6 {
            store.add(NewNotification::new(format!("Lead {i} imported")));
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(ids(&store), vec![6, 5, 4, 3, 2]);
        assert_eq!(snapshot[0].title.as_deref(), Some("Lead 6 imported"));
        assert_eq!(store.pending_timers(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_removal_after_default_duration() {
        let store = store();
        store.add(NewNotification::new("Saved"));

        wait(4999).await;
        assert_eq!(store.snapshot().len(), 1);

        wait(2).await;
        assert!(store.snapshot().is_empty());
        assert_eq!(store.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_notification_survives() {
        let store = store();
        store.add(NewNotification::new("Connection lost").persistent());
        assert_eq!(store.pending_timers(), 0);

        wait(60_000).await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supplied_id_replaces_existing_entry() {
        let store = store();
        let id = store.add(NewNotification::new("Uploading"));
        store.add(NewNotification::new("Other"));
        store.add(NewNotification::new("Uploaded").with_id(id));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].title.as_deref(), Some("Uploaded"));
        assert_eq!(store.pending_timers(), 2);

        let fresh = store.add(NewNotification::new("Next"));
        assert!(fresh.0 > id.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_unknown_id_is_noop() {
        let store = store();
        store.add(NewNotification::new("Pinned").persistent());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let before = store.snapshot();

        let mut update = NotificationUpdate::for_id(NotificationId(999));
        update.duration = Some(Duration::from_millis(100));
        store.update(update);
        store.update(NotificationUpdate {
            title: Some("no id".to_string()),
            ..NotificationUpdate::default()
        });

        assert_eq!(store.snapshot(), before);
        assert_eq!(store.pending_timers(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_merges_and_reschedules() {
        let store = store();
        let id = store.add(NewNotification::new("Exporting").persistent());

        store.update(NotificationUpdate {
            description: Some("Done".to_string()),
            duration: Some(Duration::from_millis(1000)),
            ..NotificationUpdate::for_id(id)
        });

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].title.as_deref(), Some("Exporting"));
        assert_eq!(snapshot[0].description.as_deref(), Some("Done"));
        assert_eq!(store.pending_timers(), 1);

        wait(1001).await;
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_restarts_timer() {
        let store = store();
        let id = store.add(NewNotification::new("Syncing"));

        wait(4000).await;
        store.update(NotificationUpdate {
            title: Some("Still syncing".to_string()),
            ..NotificationUpdate::for_id(id)
        });
        assert_eq!(store.pending_timers(), 1);

        wait(4000).await;
        assert_eq!(store.snapshot().len(), 1);

        wait(1001).await;
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_to_zero_duration_cancels_timer() {
        let store = store();
        let id = store.add(NewNotification::new("Retrying"));
        assert_eq!(store.pending_timers(), 1);

        store.update(NotificationUpdate {
            duration: Some(Duration::ZERO),
            ..NotificationUpdate::for_id(id)
        });
        assert_eq!(store.pending_timers(), 0);

        wait(10_000).await;
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_all_skips_persistent() {
        let store = store();
        let first = store.add(NewNotification::new("Lead created"));
        let pinned = store.add(NewNotification::new("Offline").persistent());
        let last = store.add(NewNotification::new("Activity logged"));

        store.dismiss(None);

        let snapshot = store.snapshot();
        let open = |id| snapshot.iter().find(|n| n.id == id).unwrap().open;
        assert!(!open(first));
        assert!(open(pinned));
        assert!(!open(last));
        assert_eq!(store.pending_timers(), 2);

        wait(1001).await;
        assert_eq!(ids(&store), vec![pinned.0]);
        assert!(store.snapshot()[0].open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_coalesces_with_earlier_timer() {
        let store = store();
        let id = store.add(NewNotification::new("Quick").duration(Duration::from_millis(300)));

        store.dismiss(Some(id));
        assert_eq!(store.pending_timers(), 1);
        assert!(!store.snapshot()[0].open);

        wait(301).await;
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_single_leaves_others_open() {
        let store = store();
        let a = store.add(NewNotification::new("A"));
        let b = store.add(NewNotification::new("B"));

        store.dismiss(Some(a));

        let snapshot = store.snapshot();
        assert!(snapshot.iter().find(|n| n.id == b).unwrap().open);
        assert!(!snapshot.iter().find(|n| n.id == a).unwrap().open);
        assert_eq!(store.pending_timers(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_persistent_is_noop() {
        let store = store();
        let id = store.add(NewNotification::new("Pinned").persistent());
        store.dismiss(Some(id));
        assert!(store.snapshot()[0].open);
        assert_eq!(store.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_cancels_timers() {
        let store = store();
        let a = store.add(NewNotification::new("A"));
        store.add(NewNotification::new("B"));
        store.add(NewNotification::new("C").persistent());

        store.remove(Some(a));
        assert_eq!(store.snapshot().len(), 2);
        assert_eq!(store.pending_timers(), 1);

        store.remove(None);
        assert!(store.snapshot().is_empty());
        assert_eq!(store.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listeners_receive_full_list() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |notifications| {
            sink.lock().push(notifications.len());
        });

        let id = store.add(NewNotification::new("One"));
        store.add(NewNotification::new("Two"));
        store.dismiss(Some(id));
        store.remove(Some(id));
        wait(5001).await;

        assert_eq!(*seen.lock(), vec![1, 2, 2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_from_inside_listener() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let counter = calls.clone();
        let own = slot.clone();
        let subscription = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = own.lock().as_ref() {
                subscription.unsubscribe();
            }
        });
        *slot.lock() = Some(subscription);

        let other_calls = Arc::new(AtomicUsize::new(0));
        let other_counter = other_calls.clone();
        store.subscribe(move |_| {
            other_counter.fetch_add(1, Ordering::SeqCst);
        });

        store.add(NewNotification::new("First"));
        store.add(NewNotification::new("Second"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(other_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_state() {
        let store = store();
        let handle = store.clone();
        handle.add(NewNotification::new("Shared"));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = NotificationConfig::from_lookup(|key| match key {
            "NOTIFICATION_LIMIT" => Some("3".to_string()),
            "NOTIFICATION_REMOVE_DELAY_MS" => Some("250".to_string()),
            "NOTIFICATION_DEFAULT_DURATION_MS" => Some("not a number".to_string()),
            _ => None,
        });
        assert_eq!(config.limit, 3);
        assert_eq!(config.remove_delay, Duration::from_millis(250));
        assert_eq!(config.default_duration, Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped() {
        let store = NotificationStore::new(NotificationConfig {
            limit: 0,
            ..NotificationConfig::default()
        })
        .unwrap();
        assert_eq!(store.config().limit, 1);
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = NotificationStore::new(NotificationConfig::default());
        assert!(matches!(result, Err(NotificationError::NoRuntime(_))));
    }

    #[test]
    fn test_mutations_outside_runtime_context() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store =
            NotificationStore::with_handle(NotificationConfig::default(), runtime.handle().clone());

        let id = store.add(NewNotification::new("Imported from a worker thread"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.pending_timers(), 1);

        store.dismiss(Some(id));
        assert_eq!(store.pending_timers(), 1);
        store.remove(None);
        assert!(store.is_empty());
        assert_eq!(store.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_durations_do_not_overflow() {
        let store = NotificationStore::new(NotificationConfig {
            remove_delay: Duration::MAX,
            ..NotificationConfig::default()
        })
        .unwrap();

        let forever = store.add(NewNotification::new("Forever").duration(Duration::MAX));
        let synced = store.add(NewNotification::new("Synced"));
        store.update(NotificationUpdate {
            duration: Some(Duration::MAX),
            ..NotificationUpdate::for_id(synced)
        });
        store.dismiss(Some(forever));
        assert_eq!(store.pending_timers(), 2);

        wait(3_600_000).await;
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_listeners_end_on_latest_list_across_threads() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store =
            NotificationStore::with_handle(NotificationConfig::default(), runtime.handle().clone());

        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (resume_tx, resume_rx) = std::sync::mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let resume_rx = Mutex::new(Some(resume_rx));

        let sink = deliveries.clone();
        store.subscribe(move |notifications| {
            // Hold back the first delivery until the other thread has mutated
            let first = resume_rx.lock().take();
            if let Some(resume) = first {
                entered_tx.lock().send(()).unwrap();
                resume.recv().unwrap();
            }
            sink.lock().push(notifications.len());
        });

        let adder = {
            let store = store.clone();
            std::thread::spawn(move || {
                store.add(NewNotification::new("Offline").persistent());
            })
        };
        entered_rx.recv().unwrap();

        let resumer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            resume_tx.send(()).unwrap();
        });
        store.remove(None);

        adder.join().unwrap();
        resumer.join().unwrap();

        assert!(store.is_empty());
        assert_eq!(deliveries.lock().last(), Some(&0));
        assert_eq!(*deliveries.lock(), vec![1, 0]);
    }
}
