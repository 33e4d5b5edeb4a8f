// ── Test doubles ──

use std::sync::{Mutex, PoisonError};

use fleetwire_api::{PushTransport, SubscriptionHandle};

/// One call made on a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Handshake,
    Subscribe(SubscriptionHandle, String),
    Unsubscribe(SubscriptionHandle, String),
    Disconnect,
    AbortConnect,
}

/// Push transport that records calls and never completes anything on its
/// own: tests feed completions back as `TransportEvent`s.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl PushTransport for RecordingTransport {
    fn handshake(&self) {
        self.record(Call::Handshake);
    }

    fn subscribe(&self, handle: SubscriptionHandle, channel: &str) {
        self.record(Call::Subscribe(handle, channel.to_owned()));
    }

    fn unsubscribe(&self, handle: SubscriptionHandle, channel: &str) {
        self.record(Call::Unsubscribe(handle, channel.to_owned()));
    }

    fn disconnect(&self) {
        self.record(Call::Disconnect);
    }

    fn abort_connect(&self) {
        self.record(Call::AbortConnect);
    }
}
