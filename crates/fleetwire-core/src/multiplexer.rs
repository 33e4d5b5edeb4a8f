// ── Subscription multiplexer ──
//
// Maps many `(subscriber, channel)` registrations onto one wire
// subscription per channel, shared over the single push session of the
// `ConnectionManager`. Reference counts per channel decide when the wire
// subscription is requested (0 -> 1) and released (1 -> 0).
//
// Transport completions come in through `handle_event`, normally fed by
// the task started with `spawn_event_pump`. Listener callbacks always run
// after the internal lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use fleetwire_api::{PushTransport, SubscriptionHandle, TransportEvent};

use crate::connection::{ConnectionManager, ConnectionSignal, ConnectionState};
use crate::dispatcher::{EventDispatcher, Listener};
use crate::error::CoreError;
use crate::event::{EventKind, Notification};

// ── SubscriptionStatus ───────────────────────────────────────────

/// Per-subscriber wire status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Waiting for the session or the wire acknowledgement.
    Pending,
    /// The channel's wire subscription is live.
    Subscribed,
    /// The handshake or the wire subscription was rejected.
    Failed(String),
}

/// Handle returned by [`Multiplexer::start`] to observe one registration.
#[derive(Debug, Clone)]
pub struct SubscriptionWatch {
    rx: watch::Receiver<SubscriptionStatus>,
}

impl SubscriptionWatch {
    pub fn status(&self) -> SubscriptionStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the wire subscription is live.
    ///
    /// Fails when it is rejected or the registration is removed first.
    pub async fn subscribed(&mut self) -> Result<(), CoreError> {
        let status = {
            let current = self
                .rx
                .wait_for(|s| *s != SubscriptionStatus::Pending)
                .await
                .map_err(|_| CoreError::Transport {
                    message: "registration removed before the subscription completed".into(),
                    status: None,
                })?;
            (*current).clone()
        };

        match status {
            SubscriptionStatus::Failed(reason) => Err(CoreError::Transport {
                message: reason,
                status: None,
            }),
            SubscriptionStatus::Pending | SubscriptionStatus::Subscribed => Ok(()),
        }
    }

    pub fn receiver(&self) -> watch::Receiver<SubscriptionStatus> {
        self.rx.clone()
    }
}

// ── Multiplexer ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChannelState {
    /// `Some` exactly while `subscriber_count > 0`.
    wire_handle: Option<SubscriptionHandle>,
    subscriber_count: usize,
    /// Wire subscription acknowledged.
    ready: bool,
}

struct MuxState {
    connection: ConnectionManager,
    channels: HashMap<String, ChannelState>,
    dispatcher: EventDispatcher,
}

/// Shares one push session across dynamically created subscribers.
///
/// Cheaply cloneable; all clones drive the same registry and session.
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Mutex<MuxState>>,
}

impl Multiplexer {
    pub fn new(transport: Arc<dyn PushTransport>, idle_abort: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MuxState {
                connection: ConnectionManager::new(transport, idle_abort),
                channels: HashMap::new(),
                dispatcher: EventDispatcher::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MuxState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Registration ─────────────────────────────────────────────

    /// Register `listener` for `kind` notifications on `channel`.
    ///
    /// No wire effect. A listener added to an active registration is live
    /// immediately.
    pub fn add_listener<F>(
        &self,
        subscriber: &str,
        channel: &str,
        kind: EventKind,
        listener: F,
    ) -> Result<(), CoreError>
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        validate(subscriber, channel)?;
        let listener: Listener = Arc::new(listener);
        self.lock()
            .dispatcher
            .add_listener(subscriber, channel, kind, listener);
        trace!(subscriber, channel, %kind, "listener added");
        Ok(())
    }

    /// Activate a registration, subscribing the channel on the wire when it
    /// is the first active subscriber.
    pub fn start(&self, subscriber: &str, channel: &str) -> Result<SubscriptionWatch, CoreError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(rx) = state.dispatcher.watch_status(subscriber, channel) else {
            return Err(CoreError::UnknownRegistration {
                subscriber: subscriber.to_owned(),
                channel: channel.to_owned(),
            });
        };

        if state.dispatcher.set_active(subscriber, channel, true) == Some(true) {
            trace!(subscriber, channel, "start on active registration ignored");
            return Ok(SubscriptionWatch { rx });
        }

        let entry = state.channels.entry(channel.to_owned()).or_default();
        entry.subscriber_count += 1;

        let status = if entry.subscriber_count == 1 {
            let handle = state.connection.allocate_handle();
            entry.wire_handle = Some(handle);
            entry.ready = false;
            debug!(channel, %handle, "first subscriber, requesting wire subscription");
            state.connection.request_subscribe(handle, channel);
            SubscriptionStatus::Pending
        } else if entry.ready {
            SubscriptionStatus::Subscribed
        } else {
            SubscriptionStatus::Pending
        };
        state.dispatcher.set_status(subscriber, channel, status);

        Ok(SubscriptionWatch { rx })
    }

    /// Deactivate a registration. The last active subscriber releases the
    /// wire subscription. Unknown or inactive registrations are ignored.
    pub fn stop(&self, subscriber: &str, channel: &str) {
        let mut guard = self.lock();
        stop_locked(&mut guard, subscriber, channel);
    }

    /// Stop (if active) and delete a registration; channel state goes with
    /// the last registration.
    pub fn remove_subscriber(&self, subscriber: &str, channel: &str) {
        let mut guard = self.lock();
        let state = &mut *guard;
        stop_locked(state, subscriber, channel);
        if state.dispatcher.remove(subscriber, channel) {
            state.channels.remove(channel);
            trace!(channel, "last registration removed");
        }
    }

    /// Whether the registration is active. `false` if unknown.
    pub fn get_status(&self, subscriber: &str, channel: &str) -> bool {
        self.lock().dispatcher.is_active(subscriber, channel)
    }

    /// Remove the registration if it is active; otherwise do nothing.
    pub fn destroy_subscription(&self, subscriber: &str, channel: &str) {
        if self.get_status(subscriber, channel) {
            self.remove_subscriber(subscriber, channel);
        }
    }

    // ── Connection ───────────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.lock().connection.watch_state()
    }

    pub fn signals(&self) -> broadcast::Receiver<ConnectionSignal> {
        self.lock().connection.signals()
    }

    /// Retry the session after a failure (e.g. once credentials rotated).
    pub fn reconnect(&self) -> bool {
        self.lock().connection.reconnect()
    }

    /// Close the push session, dropping queued subscribe requests.
    ///
    /// Returns `true` when the disconnect completion is still to come; the
    /// state watch reads `Disconnected` once it has been handled.
    pub fn shutdown(&self) -> bool {
        self.lock().connection.close()
    }

    /// Number of subscribers currently active on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .channels
            .get(channel)
            .map_or(0, |c| c.subscriber_count)
    }

    // ── Transport events ─────────────────────────────────────────

    /// Apply one transport completion.
    pub fn handle_event(&self, event: TransportEvent) {
        let delivery = {
            let mut guard = self.lock();
            let state = &mut *guard;

            match event {
                TransportEvent::HandshakeSucceeded => {
                    state.connection.on_handshake_succeeded();
                    None
                }
                TransportEvent::HandshakeFailed { reason } => {
                    let queued = state.connection.on_handshake_failed(&reason);
                    let failed = SubscriptionStatus::Failed(reason);
                    for (handle, channel) in queued {
                        if current_handle(state, &channel, handle) {
                            state.dispatcher.set_channel_status(&channel, &failed);
                        }
                    }
                    None
                }
                TransportEvent::ConnectSucceeded => {
                    state.connection.on_connected();
                    None
                }
                TransportEvent::ConnectFailed { code } => {
                    state.connection.on_connect_failed(code);
                    None
                }
                TransportEvent::Subscribed { handle, channel } => {
                    on_subscribed(state, handle, &channel);
                    None
                }
                TransportEvent::SubscribeFailed {
                    handle,
                    channel,
                    reason,
                } => {
                    state
                        .connection
                        .on_subscribe_failed(handle, &channel, &reason);
                    if current_handle(state, &channel, handle) {
                        if let Some(entry) = state.channels.get_mut(&channel) {
                            entry.ready = false;
                        }
                        state
                            .dispatcher
                            .set_channel_status(&channel, &SubscriptionStatus::Failed(reason));
                    }
                    None
                }
                TransportEvent::Unsubscribed { handle, channel } => {
                    trace!(%handle, %channel, "wire unsubscribe completed");
                    state.connection.on_unsubscribed(handle);
                    None
                }
                TransportEvent::Disconnected => {
                    for (handle, channel) in state.connection.on_disconnected() {
                        if current_handle(state, &channel, handle) {
                            if let Some(entry) = state.channels.get_mut(&channel) {
                                entry.ready = false;
                            }
                            state
                                .dispatcher
                                .set_channel_status(&channel, &SubscriptionStatus::Pending);
                        }
                    }
                    None
                }
                TransportEvent::Message { channel, payload } => {
                    state.connection.on_message();
                    match Notification::parse(&channel, payload) {
                        Some(notification) => {
                            let listeners =
                                state.dispatcher.listeners_for(&channel, notification.kind);
                            Some((notification, listeners))
                        }
                        None => {
                            debug!(%channel, "dropping unparseable realtime payload");
                            None
                        }
                    }
                }
            }
        };

        if let Some((notification, listeners)) = delivery {
            for listener in listeners {
                listener(&notification);
            }
        }
    }

    /// Drain transport events until the sender is dropped or `cancel` fires.
    pub fn spawn_event_pump(
        &self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mux = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => mux.handle_event(event),
                        None => break,
                    },
                }
            }
            debug!("transport event pump stopped");
        })
    }
}

// ── Locked helpers ───────────────────────────────────────────────

pub(crate) fn validate(subscriber: &str, channel: &str) -> Result<(), CoreError> {
    if subscriber.is_empty() {
        return Err(CoreError::InvalidArgument {
            message: "subscriber id must not be empty".into(),
        });
    }
    if !channel.starts_with('/') {
        return Err(CoreError::InvalidArgument {
            message: format!("channel '{channel}' must start with '/'"),
        });
    }
    Ok(())
}

fn stop_locked(state: &mut MuxState, subscriber: &str, channel: &str) {
    if state.dispatcher.set_active(subscriber, channel, false) != Some(true) {
        return;
    }
    state
        .dispatcher
        .set_status(subscriber, channel, SubscriptionStatus::Pending);

    let Some(entry) = state.channels.get_mut(channel) else {
        warn!(subscriber, channel, "active registration without channel state");
        return;
    };
    entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
    if entry.subscriber_count == 0 {
        entry.ready = false;
        if let Some(handle) = entry.wire_handle.take() {
            debug!(channel, %handle, "last subscriber gone, releasing wire subscription");
            state.connection.cancel_subscribe(handle, channel);
        }
    }
}

/// Whether `handle` is the channel's live wire handle; acks for older
/// handles (stop then start) are stale.
fn current_handle(state: &MuxState, channel: &str, handle: SubscriptionHandle) -> bool {
    state
        .channels
        .get(channel)
        .is_some_and(|c| c.wire_handle == Some(handle))
}

fn on_subscribed(state: &mut MuxState, handle: SubscriptionHandle, channel: &str) {
    if !state.connection.on_subscribed(handle) || !current_handle(state, channel, handle) {
        trace!(%handle, channel, "stale subscription ack ignored");
        return;
    }
    if let Some(entry) = state.channels.get_mut(channel) {
        entry.ready = true;
    }
    state
        .dispatcher
        .set_channel_status(channel, &SubscriptionStatus::Subscribed);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingTransport};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    const ALARMS: &str = "/alarms/*";

    fn mux() -> (Arc<RecordingTransport>, Multiplexer) {
        let transport = Arc::new(RecordingTransport::default());
        let mux = Multiplexer::new(transport.clone(), Duration::from_secs(60));
        (transport, mux)
    }

    fn listen(mux: &Multiplexer, subscriber: &str, channel: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        mux.add_listener(subscriber, channel, EventKind::Create, move |n| {
            sink.lock().unwrap().push(n.data.clone());
        })
        .unwrap();
        seen
    }

    fn subscribes(transport: &RecordingTransport) -> usize {
        transport.count(|c| matches!(c, Call::Subscribe(..)))
    }

    fn unsubscribes(transport: &RecordingTransport) -> usize {
        transport.count(|c| matches!(c, Call::Unsubscribe(..)))
    }

    fn wire_handle(transport: &RecordingTransport) -> SubscriptionHandle {
        transport
            .calls()
            .iter()
            .rev()
            .find_map(|c| match c {
                Call::Subscribe(h, _) => Some(*h),
                _ => None,
            })
            .unwrap()
    }

    fn create(channel: &str, id: &str) -> TransportEvent {
        TransportEvent::Message {
            channel: channel.into(),
            payload: json!({ "realtimeAction": "CREATE", "data": { "id": id } }),
        }
    }

    #[tokio::test]
    async fn start_requires_registration() {
        let (_t, mux) = mux();
        let err = mux.start("nobody", ALARMS).unwrap_err();
        assert!(matches!(err, CoreError::UnknownRegistration { .. }));
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected() {
        let (_t, mux) = mux();
        let err = mux
            .add_listener("", ALARMS, EventKind::Create, |_| {})
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        let err = mux
            .add_listener("a", "alarms", EventKind::Create, |_| {})
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn three_subscribers_before_connect_subscribe_once() {
        let (transport, mux) = mux();
        for id in ["a", "b", "c"] {
            listen(&mux, id, ALARMS);
            mux.start(id, ALARMS).unwrap();
        }
        assert_eq!(*mux.connection_state().borrow(), ConnectionState::Handshaking);
        assert_eq!(transport.calls(), vec![Call::Handshake]);
        assert_eq!(mux.subscriber_count(ALARMS), 3);

        mux.handle_event(TransportEvent::HandshakeSucceeded);
        mux.handle_event(TransportEvent::ConnectSucceeded);
        assert_eq!(subscribes(&transport), 1);
        assert_eq!(*mux.connection_state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn subscriber_count_tracks_active_subscribers() {
        let (transport, mux) = mux();
        listen(&mux, "a", ALARMS);
        listen(&mux, "b", ALARMS);
        mux.handle_event(TransportEvent::ConnectSucceeded);

        mux.start("a", ALARMS).unwrap();
        mux.start("a", ALARMS).unwrap();
        mux.start("b", ALARMS).unwrap();
        assert_eq!(mux.subscriber_count(ALARMS), 2);

        mux.stop("a", ALARMS);
        mux.stop("a", ALARMS);
        assert_eq!(mux.subscriber_count(ALARMS), 1);
        assert_eq!(unsubscribes(&transport), 0);

        mux.stop("b", ALARMS);
        assert_eq!(mux.subscriber_count(ALARMS), 0);
        assert_eq!(subscribes(&transport), 1);
        assert_eq!(unsubscribes(&transport), 1);

        // Registrations survive stop.
        assert!(!mux.get_status("a", ALARMS));
        mux.start("a", ALARMS).unwrap();
        assert!(mux.get_status("a", ALARMS));
        assert_eq!(subscribes(&transport), 2);
    }

    #[tokio::test]
    async fn ack_signals_every_active_subscriber() {
        let (transport, mux) = mux();
        listen(&mux, "a", ALARMS);
        listen(&mux, "b", ALARMS);
        let mut a = mux.start("a", ALARMS).unwrap();
        let b = mux.start("b", ALARMS).unwrap();
        assert_eq!(a.status(), SubscriptionStatus::Pending);

        mux.handle_event(TransportEvent::ConnectSucceeded);
        let handle = wire_handle(&transport);
        mux.handle_event(TransportEvent::Subscribed {
            handle,
            channel: ALARMS.into(),
        });

        a.subscribed().await.unwrap();
        assert_eq!(b.status(), SubscriptionStatus::Subscribed);

        // Late joiner on a ready channel is signalled synchronously.
        listen(&mux, "c", ALARMS);
        let c = mux.start("c", ALARMS).unwrap();
        assert_eq!(c.status(), SubscriptionStatus::Subscribed);
        assert_eq!(subscribes(&transport), 1);
    }

    #[tokio::test]
    async fn stale_ack_after_restart_is_ignored() {
        let (transport, mux) = mux();
        listen(&mux, "a", ALARMS);
        mux.handle_event(TransportEvent::ConnectSucceeded);

        mux.start("a", ALARMS).unwrap();
        let old = wire_handle(&transport);
        mux.stop("a", ALARMS);
        let watch = mux.start("a", ALARMS).unwrap();
        let new = wire_handle(&transport);
        assert_ne!(old, new);

        mux.handle_event(TransportEvent::Subscribed {
            handle: old,
            channel: ALARMS.into(),
        });
        assert_eq!(watch.status(), SubscriptionStatus::Pending);

        mux.handle_event(TransportEvent::Subscribed {
            handle: new,
            channel: ALARMS.into(),
        });
        assert_eq!(watch.status(), SubscriptionStatus::Subscribed);
    }

    #[tokio::test]
    async fn remove_after_stop_matches_remove_alone() {
        let (t1, m1) = mux();
        listen(&m1, "a", ALARMS);
        m1.start("a", ALARMS).unwrap();
        m1.stop("a", ALARMS);
        m1.remove_subscriber("a", ALARMS);

        let (t2, m2) = mux();
        listen(&m2, "a", ALARMS);
        m2.start("a", ALARMS).unwrap();
        m2.remove_subscriber("a", ALARMS);

        assert_eq!(t1.calls(), t2.calls());
        assert_eq!(m1.subscriber_count(ALARMS), m2.subscriber_count(ALARMS));
        assert!(!m1.get_status("a", ALARMS) && !m2.get_status("a", ALARMS));
        assert!(m1.start("a", ALARMS).is_err());
        assert!(m2.start("a", ALARMS).is_err());
    }

    #[tokio::test]
    async fn destroy_only_removes_active_registrations() {
        let (_t, mux) = mux();
        listen(&mux, "a", ALARMS);
        mux.destroy_subscription("a", ALARMS);
        // Inactive: still registered.
        assert!(mux.start("a", ALARMS).is_ok());

        mux.destroy_subscription("a", ALARMS);
        assert!(matches!(
            mux.start("a", ALARMS),
            Err(CoreError::UnknownRegistration { .. })
        ));
    }

    #[tokio::test]
    async fn messages_reach_active_subscribers_only() {
        let (_t, mux) = mux();
        let a = listen(&mux, "a", ALARMS);
        let b = listen(&mux, "b", ALARMS);
        mux.start("a", ALARMS).unwrap();

        mux.handle_event(create("/alarms/42", "1"));
        mux.handle_event(TransportEvent::Message {
            channel: "/alarms/42".into(),
            payload: json!("not a notification"),
        });
        mux.handle_event(create("/events/42", "2"));

        assert_eq!(*a.lock().unwrap(), vec![json!({ "id": "1" })]);
        assert!(b.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listener_added_to_active_registration_is_live() {
        let (_t, mux) = mux();
        listen(&mux, "a", ALARMS);
        mux.start("a", ALARMS).unwrap();

        let late = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&late);
        mux.add_listener("a", ALARMS, EventKind::Create, move |_| {
            *counter.lock().unwrap() += 1;
        })
        .unwrap();

        mux.handle_event(create("/alarms/1", "1"));
        assert_eq!(*late.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn listeners_may_call_back_into_the_multiplexer() {
        let (_t, mux) = mux();
        let inner = mux.clone();
        mux.add_listener("a", ALARMS, EventKind::Create, move |_| {
            inner.stop("a", ALARMS);
        })
        .unwrap();
        mux.start("a", ALARMS).unwrap();

        mux.handle_event(create("/alarms/1", "1"));
        assert!(!mux.get_status("a", ALARMS));
    }

    #[tokio::test]
    async fn handshake_failure_marks_queued_subscribers_failed() {
        let (transport, mux) = mux();
        let mut signals = mux.signals();
        listen(&mux, "a", ALARMS);
        let mut watch = mux.start("a", ALARMS).unwrap();

        mux.handle_event(TransportEvent::HandshakeFailed {
            reason: "401::Unauthorized".into(),
        });
        assert!(watch.subscribed().await.is_err());
        assert_eq!(
            signals.try_recv().unwrap(),
            ConnectionSignal::HandshakeFailed {
                reason: "401::Unauthorized".into()
            }
        );

        assert!(mux.reconnect());
        mux.handle_event(TransportEvent::ConnectSucceeded);
        assert_eq!(transport.count(|c| *c == Call::Handshake), 2);
        assert_eq!(subscribes(&transport), 1);
    }

    #[tokio::test]
    async fn last_unsubscribe_ack_disconnects() {
        let (transport, mux) = mux();
        listen(&mux, "a", ALARMS);
        mux.start("a", ALARMS).unwrap();
        mux.handle_event(TransportEvent::ConnectSucceeded);
        let handle = wire_handle(&transport);
        mux.handle_event(TransportEvent::Subscribed {
            handle,
            channel: ALARMS.into(),
        });

        mux.remove_subscriber("a", ALARMS);
        mux.handle_event(TransportEvent::Unsubscribed {
            handle,
            channel: ALARMS.into(),
        });
        assert_eq!(transport.count(|c| *c == Call::Disconnect), 1);

        mux.handle_event(TransportEvent::Disconnected);
        assert_eq!(*mux.connection_state().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_goes_through_the_connection_manager() {
        let (transport, mux) = mux();
        listen(&mux, "a", ALARMS);
        mux.start("a", ALARMS).unwrap();
        mux.handle_event(TransportEvent::ConnectSucceeded);
        assert_eq!(*mux.connection_state().borrow(), ConnectionState::Connected);

        assert!(mux.shutdown());
        assert_eq!(transport.count(|c| *c == Call::Disconnect), 1);
        mux.handle_event(TransportEvent::Disconnected);
        assert_eq!(*mux.connection_state().borrow(), ConnectionState::Disconnected);

        // Nothing left to close.
        assert!(!mux.shutdown());
        assert_eq!(transport.count(|c| *c == Call::Disconnect), 1);
    }

    #[tokio::test]
    async fn event_pump_feeds_the_multiplexer() {
        let (_t, mux) = mux();
        let seen = listen(&mux, "a", ALARMS);
        mux.start("a", ALARMS).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let pump = mux.spawn_event_pump(rx, cancel.clone());

        tx.send(create("/alarms/9", "9")).unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
