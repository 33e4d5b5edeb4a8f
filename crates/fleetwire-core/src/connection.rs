// ── Push connection manager ──
//
// Owns the single push session shared by every channel: its observable
// state, the FIFO queue of subscribe requests issued before the session is
// usable, the wire subscriptions in flight or acknowledged, and the
// idle-abort timer. Only the multiplexer drives it; all transitions are
// methods called with the multiplexer lock held, so each one runs to
// completion before the next transport event is looked at.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use fleetwire_api::{PushTransport, SubscriptionHandle};

const SIGNAL_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────

/// Push session state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
    /// No session. The next subscribe request triggers a handshake.
    Disconnected,
    /// Handshake in flight, or the transport is recovering from a failed
    /// connect cycle. Subscribe requests are queued.
    Handshaking,
    /// Connect cycles are succeeding. Subscribe requests go straight out.
    Connected,
}

/// Operational events for callers that want to react to transport trouble
/// (re-authenticate, then [`Multiplexer::reconnect`](crate::Multiplexer::reconnect)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSignal {
    Connected,
    ConnectFailed { code: u16 },
    HandshakeFailed { reason: String },
    SubscribeFailed { channel: String, reason: String },
}

// ── ConnectionManager ────────────────────────────────────────────

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    state: watch::Sender<ConnectionState>,
    signals: broadcast::Sender<ConnectionSignal>,
    /// Subscribe requests waiting for `Connected`, in issue order.
    pending: VecDeque<(SubscriptionHandle, String)>,
    /// Sent on the wire, not yet acknowledged.
    requested: BTreeMap<SubscriptionHandle, String>,
    /// Acknowledged and not yet unsubscribed.
    acknowledged: BTreeMap<SubscriptionHandle, String>,
    /// A disconnect we asked for has not completed yet.
    disconnecting: bool,
    /// Handshake requested while `disconnecting`; runs on completion.
    handshake_deferred: bool,
    idle_abort: Duration,
    idle_timer: Option<JoinHandle<()>>,
    next_handle: u64,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PushTransport>, idle_abort: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_SIZE);
        Self {
            transport,
            state,
            signals,
            pending: VecDeque::new(),
            requested: BTreeMap::new(),
            acknowledged: BTreeMap::new(),
            disconnecting: false,
            handshake_deferred: false,
            idle_abort,
            idle_timer: None,
            next_handle: 1,
        }
    }

    // ── Observers ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn signals(&self) -> broadcast::Receiver<ConnectionSignal> {
        self.signals.subscribe()
    }

    /// Wire subscriptions acknowledged and not yet released.
    pub fn active_wire_subscriptions(&self) -> usize {
        self.acknowledged.len()
    }

    pub fn is_queued(&self, handle: SubscriptionHandle) -> bool {
        self.pending.iter().any(|(h, _)| *h == handle)
    }

    // ── Requests ─────────────────────────────────────────────────

    pub fn allocate_handle(&mut self) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Ask for a wire subscription, queueing it if the session is not usable.
    pub fn request_subscribe(&mut self, handle: SubscriptionHandle, channel: &str) {
        if self.disconnecting {
            debug!(%handle, channel, "disconnect in flight, deferring handshake");
            self.pending.push_back((handle, channel.to_owned()));
            self.handshake_deferred = true;
            return;
        }

        match self.state() {
            ConnectionState::Connected => self.send_subscribe(handle, channel.to_owned()),
            ConnectionState::Handshaking => {
                debug!(%handle, channel, "session not ready, queueing subscribe");
                self.pending.push_back((handle, channel.to_owned()));
            }
            ConnectionState::Disconnected => {
                self.pending.push_back((handle, channel.to_owned()));
                self.begin_handshake();
            }
        }
    }

    /// Withdraw a subscription: drop it from the queue if it never went out,
    /// otherwise unsubscribe on the wire.
    pub fn cancel_subscribe(&mut self, handle: SubscriptionHandle, channel: &str) {
        if let Some(pos) = self.pending.iter().position(|(h, _)| *h == handle) {
            self.pending.remove(pos);
            debug!(%handle, channel, "dropped queued subscribe");
            if self.pending.is_empty() && self.handshake_deferred {
                debug!("queue drained during disconnect, dropping deferred handshake");
                self.handshake_deferred = false;
            }
            return;
        }

        let was_requested = self.requested.remove(&handle).is_some();
        if was_requested || self.acknowledged.contains_key(&handle) {
            debug!(%handle, channel, "releasing wire subscription");
            self.transport.unsubscribe(handle, channel);
        } else {
            trace!(%handle, channel, "cancel for unknown wire handle ignored");
        }
    }

    /// Handshake again after a failure, if work is waiting for a session.
    ///
    /// Returns `true` when a handshake was started or scheduled.
    pub fn reconnect(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        if self.disconnecting {
            self.handshake_deferred = true;
            return true;
        }
        if self.state() == ConnectionState::Disconnected {
            self.begin_handshake();
            return true;
        }
        false
    }

    /// Close the session. The completion arrives as a transport event.
    pub fn disconnect(&mut self) {
        if self.disconnecting {
            return;
        }
        info!("closing push session");
        self.cancel_idle_timer();
        self.disconnecting = true;
        self.transport.disconnect();
    }

    /// Drop all queued work and close the session for good.
    ///
    /// Returns `true` when a disconnect completion is still to come.
    pub fn close(&mut self) -> bool {
        self.pending.clear();
        self.handshake_deferred = false;
        if !self.disconnecting && self.state() == ConnectionState::Disconnected {
            self.cancel_idle_timer();
            return false;
        }
        self.disconnect();
        true
    }

    // ── Transport completions ────────────────────────────────────

    pub fn on_handshake_succeeded(&self) {
        debug!(queued = self.pending.len(), "handshake accepted, waiting for connect");
    }

    /// The session could not be opened. Returns the queued requests, which
    /// stay queued for a later [`reconnect`](Self::reconnect).
    pub fn on_handshake_failed(&mut self, reason: &str) -> Vec<(SubscriptionHandle, String)> {
        warn!(reason, queued = self.pending.len(), "push handshake failed");
        self.set_state(ConnectionState::Disconnected);
        self.signal(ConnectionSignal::HandshakeFailed {
            reason: reason.to_owned(),
        });
        self.pending.iter().cloned().collect()
    }

    /// A connect cycle succeeded: flush the queue in issue order.
    pub fn on_connected(&mut self) {
        if self.disconnecting {
            trace!("connect success while disconnecting ignored");
            return;
        }
        let opened = self.state() == ConnectionState::Handshaking;
        if self.state() != ConnectionState::Connected {
            info!("push session connected");
            self.set_state(ConnectionState::Connected);
            self.signal(ConnectionSignal::Connected);
        }
        while let Some((handle, channel)) = self.pending.pop_front() {
            self.send_subscribe(handle, channel);
        }
        if opened && self.is_idle() {
            debug!("session opened for withdrawn requests only, disconnecting");
            self.disconnect();
        }
    }

    pub fn on_connect_failed(&mut self, code: u16) {
        if self.state() == ConnectionState::Connected && !self.disconnecting {
            self.set_state(ConnectionState::Handshaking);
        }
        self.signal(ConnectionSignal::ConnectFailed { code });
    }

    /// Returns `false` for acks of handles that were withdrawn in the meantime.
    pub fn on_subscribed(&mut self, handle: SubscriptionHandle) -> bool {
        let Some(channel) = self.requested.remove(&handle) else {
            trace!(%handle, "ack for withdrawn subscription");
            return false;
        };
        debug!(%handle, %channel, "wire subscription live");
        self.acknowledged.insert(handle, channel);
        true
    }

    pub fn on_subscribe_failed(&mut self, handle: SubscriptionHandle, channel: &str, reason: &str) {
        self.requested.remove(&handle);
        self.signal(ConnectionSignal::SubscribeFailed {
            channel: channel.to_owned(),
            reason: reason.to_owned(),
        });
        if self.is_idle() {
            debug!("no live wire subscriptions after failure, disconnecting");
            self.disconnect();
        }
    }

    pub fn on_unsubscribed(&mut self, handle: SubscriptionHandle) {
        self.acknowledged.remove(&handle);
        if self.is_idle() {
            debug!("last wire subscription released");
            self.disconnect();
        }
    }

    /// The session is gone.
    ///
    /// Runs a deferred handshake if one was requested meanwhile. When the
    /// transport dropped the session on its own, the live subscriptions are
    /// put back in the queue and returned so the caller can mark them
    /// pending; they are restored by the next [`reconnect`](Self::reconnect).
    pub fn on_disconnected(&mut self) -> Vec<(SubscriptionHandle, String)> {
        let unsolicited = !self.disconnecting;
        self.disconnecting = false;
        self.cancel_idle_timer();

        let mut lost: Vec<(SubscriptionHandle, String)> = Vec::new();
        if unsolicited {
            warn!("push session dropped by transport");
            lost.extend(std::mem::take(&mut self.acknowledged));
            lost.extend(std::mem::take(&mut self.requested));
            lost.sort_by_key(|(handle, _)| *handle);
            for entry in lost.iter().rev() {
                self.pending.push_front(entry.clone());
            }
        } else {
            info!("push session closed");
            self.acknowledged.clear();
            self.requested.clear();
        }

        self.set_state(ConnectionState::Disconnected);

        if self.handshake_deferred {
            self.handshake_deferred = false;
            self.begin_handshake();
        }
        lost
    }

    /// Inbound traffic proves the long-poll is alive.
    pub fn on_message(&mut self) {
        self.arm_idle_timer();
    }

    // ── Internals ────────────────────────────────────────────────

    fn is_idle(&self) -> bool {
        self.acknowledged.is_empty() && self.requested.is_empty() && self.pending.is_empty()
    }

    fn begin_handshake(&mut self) {
        info!("opening push session");
        self.set_state(ConnectionState::Handshaking);
        self.transport.handshake();
    }

    fn send_subscribe(&mut self, handle: SubscriptionHandle, channel: String) {
        debug!(%handle, %channel, "subscribing on the wire");
        self.transport.subscribe(handle, &channel);
        self.requested.insert(handle, channel);
        self.arm_idle_timer();
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    fn signal(&self, signal: ConnectionSignal) {
        if self.signals.send(signal).is_err() {
            trace!("no connection signal receivers");
        }
    }

    /// Single-shot: a rearm replaces the running timer.
    fn arm_idle_timer(&mut self) {
        self.cancel_idle_timer();
        let transport = Arc::clone(&self.transport);
        let period = self.idle_abort;
        self.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(period).await;
            debug!(idle_secs = period.as_secs(), "push channel idle, aborting long-poll");
            transport.abort_connect();
        }));
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel_idle_timer();
    }
}
