use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use habitfs_types::{DeviceId, Digest, Timestamp};
use tokio::sync::broadcast;
use tracing::debug;

use crate::event::{EventKind, EventPayload, SyncEvent};

/// Filter for subscribing to a subset of sync events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<EventKind>>,
    /// If set, events originating from this device are skipped — a reader
    /// does not need to hear its own broadcasts.
    pub exclude_origin: Option<DeviceId>,
}

impl EventFilter {
    /// Returns `true` if the given event matches this filter.
    pub fn matches(&self, event: &SyncEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(excluded) = self.exclude_origin {
            if event.origin == excluded {
                return false;
            }
        }
        true
    }
}

/// A broadcast channel receiver for sync events.
pub type EventStream = broadcast::Receiver<SyncEvent>;

/// Internal subscriber: a filter paired with a broadcast sender.
struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<SyncEvent>,
}

/// Fan-out router that delivers events to matching subscribers.
struct EventRouter {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventRouter {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a new subscriber with the given filter.
    /// Returns a broadcast receiver for the matching events.
    fn subscribe(&self, filter: EventFilter, capacity: usize) -> EventStream {
        let (tx, rx) = broadcast::channel(capacity);
        let sub = Subscriber { filter, sender: tx };
        self.subscribers
            .write()
            .expect("router lock poisoned")
            .push(sub);
        rx
    }

    /// Route an event to all matching subscribers.
    /// Subscribers whose channels are closed are pruned.
    fn route(&self, event: &SyncEvent) {
        let mut subs = self.subscribers.write().expect("router lock poisoned");
        subs.retain(|sub| {
            if sub.filter.matches(event) {
                // If send fails (no receivers), the subscriber is stale.
                sub.sender.send(event.clone()).is_ok()
            } else {
                // Keep non-matching subscribers; they may match future
                // events. Only prune if the channel itself is closed.
                sub.sender.receiver_count() > 0
            }
        });
    }

    /// Number of active subscribers.
    fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("router lock poisoned")
            .len()
    }
}

/// Configuration for the [`SyncNotifier`].
#[derive(Clone, Debug)]
pub struct NotifierConfig {
    /// Capacity of per-subscriber broadcast channels.
    pub channel_capacity: usize,
    /// Dispatcher poll interval in milliseconds.
    pub dispatch_interval_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
            dispatch_interval_ms: 50,
        }
    }
}

/// Queued, fire-and-forget invalidation broadcast.
///
/// Producers enqueue events; a background dispatcher drains the queue and
/// fans events out to filtered subscribers at-least-once. Nothing here is
/// load-bearing for correctness: a dropped event only delays a remote
/// reader's convergence, bounded by the path index lease.
pub struct SyncNotifier {
    router: EventRouter,
    pending: Mutex<VecDeque<SyncEvent>>,
    config: NotifierConfig,
}

impl SyncNotifier {
    /// Create a notifier with the given configuration.
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            router: EventRouter::new(),
            pending: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Enqueue a cache invalidation for the given entity ids.
    ///
    /// Fire-and-forget: never blocks on, or fails because of, delivery.
    pub fn invalidate(&self, entity_ids: Vec<String>, origin: DeviceId) {
        self.enqueue(SyncEvent::new(
            Timestamp::now(),
            origin,
            EventKind::CacheInvalidation,
            EventPayload::Entities(entity_ids),
        ));
    }

    /// Enqueue a reference-moved notification.
    pub fn publish_ref_updated(
        &self,
        name: &str,
        old_target: Option<Digest>,
        new_target: Digest,
        origin: DeviceId,
    ) {
        self.enqueue(SyncEvent::new(
            Timestamp::now(),
            origin,
            EventKind::RefUpdated,
            EventPayload::RefUpdate {
                name: name.to_string(),
                old_target,
                new_target,
            },
        ));
    }

    /// Enqueue a reclamation notification.
    pub fn publish_reclaimed(&self, count: u64, origin: DeviceId) {
        self.enqueue(SyncEvent::new(
            Timestamp::now(),
            origin,
            EventKind::ObjectsReclaimed,
            EventPayload::Reclaimed { count },
        ));
    }

    /// Enqueue a pre-built event (e.g. one received from a remote device).
    pub fn enqueue(&self, event: SyncEvent) {
        self.pending.lock().expect("lock poisoned").push_back(event);
    }

    /// Drain the queue, routing every event to matching subscribers.
    ///
    /// Returns the number of events dispatched. The background task calls
    /// this on its interval; tests call it directly.
    pub fn dispatch_pending(&self) -> usize {
        let drained: Vec<SyncEvent> = {
            let mut pending = self.pending.lock().expect("lock poisoned");
            pending.drain(..).collect()
        };
        for event in &drained {
            self.router.route(event);
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "events dispatched");
        }
        drained.len()
    }

    /// Subscribe to events matching the given filter.
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        self.router.subscribe(filter, self.config.channel_capacity)
    }

    /// Number of events waiting for the dispatcher.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("lock poisoned").len()
    }

    /// Current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.router.subscriber_count()
    }

    /// Spawn the background dispatcher task.
    ///
    /// Runs until the notifier is dropped by all other holders; never
    /// blocks foreground calls.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let notifier = Arc::downgrade(self);
        let interval = Duration::from_millis(self.config.dispatch_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match notifier.upgrade() {
                    Some(n) => {
                        n.dispatch_pending();
                    }
                    None => break,
                }
            }
        })
    }
}

impl Default for SyncNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl std::fmt::Debug for SyncNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncNotifier")
            .field("pending", &self.pending_len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
