//! Push transport capability.
//!
//! A push transport owns one long-lived server-push session. Its operations
//! only *initiate* work and return immediately; every completion, state
//! change and inbound message is reported as a [`TransportEvent`] on the
//! event channel handed to the transport at construction. Consumers drain
//! that channel from a single task, which serializes all reactions to the
//! transport.
//!
//! The repeated long-poll `connect` cycle is driven by the transport itself
//! once a handshake succeeds; callers only observe it through
//! [`TransportEvent::ConnectSucceeded`] and [`TransportEvent::ConnectFailed`].

pub mod long_poll;

use std::fmt;

use serde_json::Value;

/// Identifies one wire-level subscription.
///
/// Allocated by the caller before `subscribe` so a request can be tracked
/// (and cancelled) while it is still queued or in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Everything a push transport reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake accepted; a connect cycle follows.
    HandshakeSucceeded,
    /// Handshake rejected or failed below the protocol.
    HandshakeFailed { reason: String },
    /// A connect cycle succeeded after the session was not (or no longer) connected.
    ConnectSucceeded,
    /// A connect cycle failed; `code` is the HTTP status or `0`.
    ConnectFailed { code: u16 },
    /// Wire subscription acknowledged.
    Subscribed {
        handle: SubscriptionHandle,
        channel: String,
    },
    /// Wire subscription rejected.
    SubscribeFailed {
        handle: SubscriptionHandle,
        channel: String,
        reason: String,
    },
    /// Wire unsubscribe completed (successfully or not, the handle is gone).
    Unsubscribed {
        handle: SubscriptionHandle,
        channel: String,
    },
    /// Disconnect completed; the session is gone.
    Disconnected,
    /// Data message delivered on a concrete channel.
    Message { channel: String, payload: Value },
}

/// A long-lived server-push channel.
///
/// Implementations must be cheap to call from synchronous code: each
/// method schedules its work and returns.
pub trait PushTransport: Send + Sync {
    /// Open a new push session.
    fn handshake(&self);

    /// Request a wire subscription to `channel`.
    fn subscribe(&self, handle: SubscriptionHandle, channel: &str);

    /// Drop a wire subscription previously requested with `subscribe`.
    fn unsubscribe(&self, handle: SubscriptionHandle, channel: &str);

    /// Close the push session.
    fn disconnect(&self);

    /// Abort the in-flight long-poll so a fresh connect cycle is issued.
    fn abort_connect(&self);
}
