//! Fan-out of the store's change feed to filtered subscribers.
//!
//! One upstream task reads the store's broadcast feed and forwards each
//! event to every registered subscriber whose filter matches, over that
//! subscriber's own bounded `mpsc` channel. A [`Subscription`] removes
//! itself from the registry when dropped.
//!
//! Delivery is best effort. When the upstream feed lags or closes, or a
//! subscriber's channel is full, the affected subscribers get
//! [`RouterMessage::Resync`] and are expected to poll.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use fireline_database::IncidentStore;
use fireline_incident_models::{ChangeEvent, ChatMessage, FeedEvent};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::RouterContext;
use crate::filter::SubscriptionFilter;

/// Messages delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterMessage {
    /// An incident matching the subscriber's filter changed.
    Change(ChangeEvent),
    /// A chat message was posted on the subscribed incident.
    Message(ChatMessage),
    /// Events may have been missed; reconcile by polling.
    Resync,
}

/// Tunables for a [`FanoutRouter`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-subscriber channel capacity.
    pub channel_capacity: usize,
    /// First re-subscribe delay after the upstream feed closes.
    pub initial_backoff: Duration,
    /// Upper bound for the re-subscribe delay.
    pub max_backoff: Duration,
    /// How often a pending resync is retried for a subscriber whose
    /// channel was full, even when no new events arrive.
    pub resync_retry: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
            resync_retry: Duration::from_secs(1),
        }
    }
}

struct Subscriber {
    filter: SubscriptionFilter,
    tx: mpsc::Sender<RouterMessage>,
    needs_resync: bool,
}

type Registry = Arc<Mutex<BTreeMap<u64, Subscriber>>>;

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, BTreeMap<u64, Subscriber>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes store change events to N filtered subscribers.
pub struct FanoutRouter {
    registry: Registry,
    next_id: AtomicU64,
    channel_capacity: usize,
    context: RouterContext,
    task: JoinHandle<()>,
}

impl FanoutRouter {
    /// Starts the upstream listener with default settings and a fresh
    /// [`RouterContext`].
    #[must_use]
    pub fn start(store: Arc<dyn IncidentStore>) -> Self {
        Self::start_with(store, RouterConfig::default(), RouterContext::new())
    }

    /// Starts the upstream listener.
    ///
    /// The store feed is subscribed before this returns, so every event
    /// committed afterwards is seen by the router.
    #[must_use]
    pub fn start_with(
        store: Arc<dyn IncidentStore>,
        config: RouterConfig,
        context: RouterContext,
    ) -> Self {
        let registry: Registry = Arc::default();
        let upstream = store.subscribe();

        let task = tokio::spawn(run_upstream(
            store,
            upstream,
            Arc::clone(&registry),
            config.clone(),
            context.clone(),
        ));

        log::info!("Realtime router started");

        Self {
            registry,
            next_id: AtomicU64::new(1),
            channel_capacity: config.channel_capacity.max(1),
            context,
            task,
        }
    }

    /// Registers a subscriber. Only events routed after this call are
    /// delivered.
    #[must_use]
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        log::debug!("Subscriber {id} registered with filter {filter:?}");
        lock(&self.registry).insert(
            id,
            Subscriber {
                filter,
                tx,
                needs_resync: false,
            },
        );

        Subscription {
            id,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).len()
    }

    /// The context this router records activity on.
    #[must_use]
    pub const fn context(&self) -> &RouterContext {
        &self.context
    }
}

impl Drop for FanoutRouter {
    fn drop(&mut self) {
        self.task.abort();
        // Dropping the senders ends every open subscription.
        lock(&self.registry).clear();
    }
}

/// A live, filtered view of the change feed.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<RouterMessage>,
    registry: Registry,
}

impl Subscription {
    /// Registry key of this subscription.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next message. Returns `None` once the router is gone.
    pub async fn recv(&mut self) -> Option<RouterMessage> {
        self.rx.recv().await
    }

    /// Takes a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<RouterMessage> {
        self.rx.try_recv().ok()
    }

    /// Deregisters the subscription.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.id);
        log::debug!("Subscriber {} deregistered", self.id);
    }
}

async fn run_upstream(
    store: Arc<dyn IncidentStore>,
    mut upstream: broadcast::Receiver<FeedEvent>,
    registry: Registry,
    config: RouterConfig,
    context: RouterContext,
) {
    let mut backoff = config.initial_backoff;
    let mut retry = tokio::time::interval(config.resync_retry.max(Duration::from_millis(1)));
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = upstream.recv() => match received {
                Ok(event) => {
                    backoff = config.initial_backoff;
                    context.touch(Utc::now());
                    route(&registry, &event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Router lagged behind the change feed by {skipped} event(s)");
                    resync_all(&registry);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    log::warn!(
                        "Change feed closed, resubscribing in {}ms",
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(config.max_backoff);
                    upstream = store.subscribe();
                    resync_all(&registry);
                }
            },
            _ = retry.tick() => {
                let mut subscribers = lock(&registry);
                flush_pending(&mut subscribers);
            }
        }
    }
}

/// Sends `Resync` to every subscriber still owed one. Those whose channel
/// is still full stay flagged.
fn flush_pending(subscribers: &mut BTreeMap<u64, Subscriber>) {
    for (id, sub) in subscribers.iter_mut().filter(|(_, sub)| sub.needs_resync) {
        if sub.tx.try_send(RouterMessage::Resync).is_ok() {
            log::debug!("Subscriber {id} resynced");
            sub.needs_resync = false;
        }
    }
}

fn route(registry: &Registry, event: &FeedEvent) {
    let mut subscribers = lock(registry);
    flush_pending(&mut subscribers);
    let mut delivered = 0_usize;

    for (id, sub) in subscribers.iter_mut() {
        if sub.needs_resync {
            continue;
        }

        let message = match event {
            FeedEvent::Incident(change) if sub.filter.matches_change(change) => {
                RouterMessage::Change(change.clone())
            }
            FeedEvent::Message(msg) if sub.filter.matches_message(msg) => {
                RouterMessage::Message(msg.clone())
            }
            _ => continue,
        };

        match sub.tx.try_send(message) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Subscriber {id} is full, dropping event until it resyncs");
                sub.needs_resync = true;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    subscribers.retain(|_, sub| !sub.tx.is_closed());
    log::debug!("Routed change event to {delivered} subscriber(s)");
}

fn resync_all(registry: &Registry) {
    let mut subscribers = lock(registry);
    for sub in subscribers.values_mut() {
        sub.needs_resync = sub.tx.try_send(RouterMessage::Resync).is_err();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fireline_database::memory::MemoryStore;
    use fireline_incident_models::{ChangeKind, Coordinates, Incident, IncidentStatus};

    use super::*;

    fn incident(id: &str, station: &str, dispatcher: Option<&str>) -> Incident {
        let now = Utc::now();
        Incident {
            id: id.to_string(),
            incident_type: "fire".to_string(),
            description: "tyre fire".to_string(),
            location: Coordinates::new(5.6, -0.18),
            address: None,
            reporter_id: "civ-1".to_string(),
            station_id: station.to_string(),
            status: IncidentStatus::Pending,
            dispatcher_id: dispatcher.map(String::from),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    async fn recv(sub: &mut Subscription) -> RouterMessage {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for router")
            .expect("router closed")
    }

    #[tokio::test]
    async fn delivers_only_matching_events() {
        let store = Arc::new(MemoryStore::new());
        let router = FanoutRouter::start(store.clone());
        let mut st1 = router.subscribe(SubscriptionFilter::Station("st-1".into()));
        let mut st2 = router.subscribe(SubscriptionFilter::Station("st-2".into()));

        store.insert_incident(&incident("a", "st-1", None)).await.unwrap();
        store.insert_incident(&incident("b", "st-2", None)).await.unwrap();

        let RouterMessage::Change(event) = recv(&mut st1).await else {
            panic!("expected change");
        };
        assert_eq!(event.incident.id, "a");
        assert_eq!(event.kind, ChangeKind::Insert);

        let RouterMessage::Change(event) = recv(&mut st2).await else {
            panic!("expected change");
        };
        assert_eq!(event.incident.id, "b");
        assert!(st1.try_recv().is_none());
    }

    #[tokio::test]
    async fn chat_messages_reach_incident_subscribers() {
        let store = Arc::new(MemoryStore::new());
        let router = FanoutRouter::start(store.clone());
        let mut chat = router.subscribe(SubscriptionFilter::Incident("inc-1".into()));
        let mut station = router.subscribe(SubscriptionFilter::Station("st-1".into()));

        store
            .insert_message(&ChatMessage {
                id: "m1".to_string(),
                incident_id: "inc-1".to_string(),
                sender_id: "civ-1".to_string(),
                body: "hello".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(matches!(recv(&mut chat).await, RouterMessage::Message(_)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(station.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_deregisters() {
        let store = Arc::new(MemoryStore::new());
        let router = FanoutRouter::start(store);

        let a = router.subscribe(SubscriptionFilter::Station("st-1".into()));
        let b = router.subscribe(SubscriptionFilter::Dispatcher("disp-1".into()));
        assert_eq!(router.subscriber_count(), 2);

        drop(a);
        assert_eq!(router.subscriber_count(), 1);
        b.close();
        assert_eq!(router.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn lagging_feed_triggers_resync() {
        let store = Arc::new(MemoryStore::with_feed(fireline_database::feed::ChangeFeed::new(1)));
        let config = RouterConfig {
            channel_capacity: 64,
            ..RouterConfig::default()
        };
        let router = FanoutRouter::start_with(store.clone(), config, RouterContext::new());
        let mut sub = router.subscribe(SubscriptionFilter::Station("st-1".into()));

        // Publish a burst faster than the upstream task can drain a
        // one-slot feed.
        for i in 0..32 {
            store
                .insert_incident(&incident(&format!("inc-{i}"), "st-1", None))
                .await
                .unwrap();
        }

        let mut saw_resync = false;
        while let Ok(Some(msg)) =
            tokio::time::timeout(Duration::from_millis(500), sub.recv()).await
        {
            if msg == RouterMessage::Resync {
                saw_resync = true;
                break;
            }
        }
        assert!(saw_resync);
    }

    #[tokio::test]
    async fn full_subscriber_is_resynced() {
        let store = Arc::new(MemoryStore::new());
        let config = RouterConfig {
            channel_capacity: 1,
            ..RouterConfig::default()
        };
        let router = FanoutRouter::start_with(store.clone(), config, RouterContext::new());
        let mut sub = router.subscribe(SubscriptionFilter::Station("st-1".into()));

        for id in ["a", "b", "c"] {
            store.insert_incident(&incident(id, "st-1", None)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // "a" fills the channel; "b" and "c" are dropped and flagged.
        assert!(matches!(recv(&mut sub).await, RouterMessage::Change(_)));
        store.insert_incident(&incident("d", "st-2", None)).await.unwrap();
        assert_eq!(recv(&mut sub).await, RouterMessage::Resync);
    }

    #[tokio::test]
    async fn full_subscriber_is_resynced_on_a_quiet_feed() {
        let store = Arc::new(MemoryStore::new());
        let config = RouterConfig {
            channel_capacity: 1,
            resync_retry: Duration::from_millis(25),
            ..RouterConfig::default()
        };
        let router = FanoutRouter::start_with(store.clone(), config, RouterContext::new());
        let mut sub = router.subscribe(SubscriptionFilter::Station("st-1".into()));

        store.insert_incident(&incident("a", "st-1", None)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.insert_incident(&incident("b", "st-1", None)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let RouterMessage::Change(first) = recv(&mut sub).await else {
            panic!("expected change");
        };
        assert_eq!(first.incident.id, "a");

        // Nothing else is published; the retry tick alone must surface the
        // dropped "b".
        assert_eq!(recv(&mut sub).await, RouterMessage::Resync);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn released_dispatcher_receives_the_cancellation() {
        let store = Arc::new(MemoryStore::new());
        let router = FanoutRouter::start(store.clone());
        let mut assigned = incident("a", "st-1", Some("disp-1"));
        assigned.status = IncidentStatus::InProgress;
        store.insert_incident(&assigned).await.unwrap();

        let mut sub = router.subscribe(SubscriptionFilter::Dispatcher("disp-1".into()));

        let mut cancelled = assigned.clone();
        cancelled.status = IncidentStatus::Cancelled;
        cancelled.dispatcher_id = None;
        store.upsert_incident(&cancelled).await.unwrap();

        let RouterMessage::Change(event) = recv(&mut sub).await else {
            panic!("expected change");
        };
        assert_eq!(event.incident.status, IncidentStatus::Cancelled);
        assert_eq!(event.previous_dispatcher_id.as_deref(), Some("disp-1"));
    }

    #[tokio::test]
    async fn context_records_activity() {
        let store = Arc::new(MemoryStore::new());
        let context = RouterContext::new();
        let router = FanoutRouter::start_with(store.clone(), RouterConfig::default(), context.clone());
        let mut sub = router.subscribe(SubscriptionFilter::Station("st-1".into()));

        assert!(context.last_activity().is_none());
        store.insert_incident(&incident("a", "st-1", None)).await.unwrap();
        recv(&mut sub).await;
        assert!(router.context().last_activity().is_some());
    }
}
