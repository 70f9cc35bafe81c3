//! Real-time delivery multiplexer.
//!
//! Maintains a persistent SSE connection to the server and fans typed
//! events out to per-topic listener sets. When the push channel cannot be
//! established or drops, a fixed-interval polling fallback covers the
//! activity topic while reconnect attempts continue in the background. The
//! two transports are mutually exclusive: polling is stopped the moment the
//! stream opens, and started only after it has been torn down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use dashmap::DashMap;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::remote::{RemoteApi, TokenProvider};

use super::types::{ConnectionState, RealtimeConfig, Topic, TransportStatus};

type TopicCallback = Arc<dyn Fn(&Value) + Send + Sync>;
type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Subscription multiplexer for server-pushed events.
///
/// This is a live-view feed, not a durability path: events bypass the local
/// store entirely. Consumers must treat them as idempotent notifications,
/// since switching transports may reorder or duplicate delivery.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<ChannelInner>,
}

impl RealtimeChannel {
    pub fn new(
        config: RealtimeConfig,
        api: Arc<dyn RemoteApi>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                config,
                api,
                tokens,
                next_subscription: AtomicU64::new(1),
                topics: DashMap::new(),
                connection_listeners: DashMap::new(),
                state: RwLock::new(ConnectionState::Disconnected),
                transports: Mutex::new(Transports::default()),
            }),
        }
    }

    /// Subscribe to a topic. The first topic subscriber overall lazily
    /// establishes the push channel.
    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.inner
            .topics
            .entry(topic)
            .or_default()
            .push((id, Arc::new(callback)));
        debug!("subscribed to {} events", topic);

        ensure_push_task(&self.inner);

        Subscription {
            inner: Arc::downgrade(&self.inner),
            kind: SubscriptionKind::Topic(topic),
            id,
            active: true,
        }
    }

    /// Subscribe to connection-state transitions. The current state is
    /// replayed immediately.
    pub fn subscribe_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::SeqCst);
        let callback: StateCallback = Arc::new(callback);
        callback(self.connection_state());
        self.inner.connection_listeners.insert(id, callback);

        Subscription {
            inner: Arc::downgrade(&self.inner),
            kind: SubscriptionKind::Connection,
            id,
            active: true,
        }
    }

    /// Current push-channel state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.read().unwrap()
    }

    /// Which transports are live right now.
    pub fn transport_status(&self) -> TransportStatus {
        self.inner.transport_status()
    }

    /// Tear down both transports regardless of remaining subscribers.
    pub fn shutdown(&self) {
        self.inner.teardown();
    }
}

enum SubscriptionKind {
    Topic(Topic),
    Connection,
}

/// Cancellation handle for one registered callback.
///
/// Dropping the handle unsubscribes. When the last topic subscriber is
/// removed, both transports are torn down so no background work leaks.
#[must_use = "dropping a Subscription immediately unsubscribes its callback"]
pub struct Subscription {
    inner: Weak<ChannelInner>,
    kind: SubscriptionKind,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Remove the callback.
    pub fn cancel(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_subscription(&self.kind, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[derive(Default)]
struct Transports {
    push: Option<CancellationToken>,
    polling: Option<CancellationToken>,
}

struct ChannelInner {
    config: RealtimeConfig,
    api: Arc<dyn RemoteApi>,
    tokens: Arc<dyn TokenProvider>,
    next_subscription: AtomicU64,
    topics: DashMap<Topic, Vec<(u64, TopicCallback)>>,
    connection_listeners: DashMap<u64, StateCallback>,
    state: RwLock<ConnectionState>,
    transports: Mutex<Transports>,
}

impl ChannelInner {
    fn topic_subscriber_count(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }

    fn transport_status(&self) -> TransportStatus {
        let polling_active = self.transports.lock().unwrap().polling.is_some();
        TransportStatus {
            push_connected: *self.state.read().unwrap() == ConnectionState::Connected,
            polling_active,
        }
    }

    /// Update the state and notify observers on a transition.
    fn set_state(&self, state: ConnectionState) {
        {
            let mut current = self.state.write().unwrap();
            if *current == state {
                return;
            }
            *current = state;
        }
        debug!("connection state: {}", state);

        let listeners: Vec<StateCallback> = self
            .connection_listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for listener in listeners {
            listener(state);
        }
    }

    /// Deliver a payload to a topic's listeners, in registration order.
    fn dispatch(&self, topic: Topic, payload: &Value) {
        let listeners: Vec<TopicCallback> = self
            .topics
            .get(&topic)
            .map(|entry| entry.value().iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(payload);
        }
    }

    /// Route one raw stream event. A malformed payload drops that event
    /// only; the channel and the other topics are unaffected.
    fn handle_event(&self, event_name: &str, data: &str) {
        if event_name == "heartbeat" {
            debug!("push channel heartbeat");
            return;
        }
        let Some(topic) = Topic::from_event_name(event_name) else {
            debug!("ignoring unknown push event '{}'", event_name);
            return;
        };
        match serde_json::from_str::<Value>(data) {
            Ok(payload) => self.dispatch(topic, &payload),
            Err(err) => warn!("failed to parse {} event payload: {}", topic, err),
        }
    }

    fn remove_subscription(&self, kind: &SubscriptionKind, id: u64) {
        match kind {
            SubscriptionKind::Topic(topic) => {
                if let Some(mut entry) = self.topics.get_mut(topic) {
                    entry.retain(|(listener_id, _)| *listener_id != id);
                }
                if self.topic_subscriber_count() == 0 {
                    self.teardown();
                }
            }
            SubscriptionKind::Connection => {
                self.connection_listeners.remove(&id);
            }
        }
    }

    fn stop_polling(&self) {
        let token = self.transports.lock().unwrap().polling.take();
        if let Some(token) = token {
            token.cancel();
            info!("polling fallback stopped");
        }
    }

    fn teardown(&self) {
        let (push, polling) = {
            let mut transports = self.transports.lock().unwrap();
            (transports.push.take(), transports.polling.take())
        };
        if let Some(token) = push {
            token.cancel();
        }
        if let Some(token) = polling {
            token.cancel();
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("realtime channel torn down");
    }

    /// Polling fallback. Covers the activity topic only; alert, stats and
    /// workload subscribers receive nothing while degraded.
    async fn run_poll_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.api.recent_activity(self.config.poll_limit).await {
                        Ok(activities) => {
                            for activity in &activities {
                                self.dispatch(Topic::Activity, activity);
                            }
                        }
                        Err(err) => warn!("activity poll failed: {}", err),
                    }
                }
            }
        }
    }

    /// Push-channel loop: connect, stream, and on failure fall back to
    /// polling while retrying after a fixed delay.
    async fn run_push_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.set_state(ConnectionState::Connecting);

            if let Err(err) = self.connect_and_stream(&cancel).await {
                warn!("push channel error: {}", err);
            }

            self.set_state(ConnectionState::Disconnected);
            if cancel.is_cancelled() {
                break;
            }
            if self.topic_subscriber_count() > 0 {
                start_polling(&self);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// One connection attempt: stream events until the channel errors or
    /// the loop is cancelled.
    async fn connect_and_stream(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        let mut request = client
            .get(self.config.stream_url())
            .header("Accept", "text/event-stream");
        if let Some(token) = self.tokens.access_token() {
            request = request.bearer_auth(token);
        }

        let mut stream = EventSource::new(request)?;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    stream.close();
                    return Ok(());
                }
                event = stream.next() => event,
            };

            match event {
                Some(Ok(Event::Open)) => {
                    info!("push channel established");
                    // Push takes priority; never both transports at once.
                    self.stop_polling();
                    self.set_state(ConnectionState::Connected);
                }
                Some(Ok(Event::Message(message))) => {
                    self.handle_event(&message.event, &message.data);
                }
                Some(Err(err)) => {
                    stream.close();
                    return Err(err.into());
                }
                None => return Ok(()),
            }
        }
    }
}

fn start_polling(inner: &Arc<ChannelInner>) {
    let token = {
        let mut transports = inner.transports.lock().unwrap();
        if transports.polling.is_some() {
            return;
        }
        let token = CancellationToken::new();
        transports.polling = Some(token.clone());
        token
    };

    info!("push channel unavailable, starting polling fallback");
    let inner = inner.clone();
    tokio::spawn(async move {
        inner.run_poll_loop(token).await;
    });
}

fn ensure_push_task(inner: &Arc<ChannelInner>) {
    let token = {
        let mut transports = inner.transports.lock().unwrap();
        if transports.push.is_some() {
            return;
        }
        let token = CancellationToken::new();
        transports.push = Some(token.clone());
        token
    };

    let inner = inner.clone();
    tokio::spawn(async move {
        inner.run_push_loop(token).await;
    });
}
