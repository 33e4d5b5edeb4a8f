// ── Event dispatcher ──
//
// Explicit per-channel registry: channel pattern -> ordered subscriber
// registrations, each with its listeners and an active flag. Dispatch
// collects matching callbacks; the caller invokes them once its own lock
// is released.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::event::{EventKind, Notification};
use crate::multiplexer::SubscriptionStatus;

/// Callback invoked for every matching notification.
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Registration {
    listeners: Vec<(EventKind, Listener)>,
    active: bool,
    status: watch::Sender<SubscriptionStatus>,
}

impl Registration {
    fn new() -> Self {
        let (status, _) = watch::channel(SubscriptionStatus::Pending);
        Self {
            listeners: Vec::new(),
            active: false,
            status,
        }
    }
}

#[derive(Default)]
pub struct EventDispatcher {
    registry: HashMap<String, IndexMap<String, Registration>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registry ─────────────────────────────────────────────────

    pub fn add_listener(
        &mut self,
        subscriber: &str,
        channel: &str,
        kind: EventKind,
        listener: Listener,
    ) {
        self.registry
            .entry(channel.to_owned())
            .or_default()
            .entry(subscriber.to_owned())
            .or_insert_with(Registration::new)
            .listeners
            .push((kind, listener));
    }

    pub fn contains(&self, subscriber: &str, channel: &str) -> bool {
        self.registration(subscriber, channel).is_some()
    }

    pub fn is_active(&self, subscriber: &str, channel: &str) -> bool {
        self.registration(subscriber, channel)
            .is_some_and(|r| r.active)
    }

    /// Flip the active flag. Returns the previous value, `None` if unknown.
    pub fn set_active(&mut self, subscriber: &str, channel: &str, active: bool) -> Option<bool> {
        let registration = self.registry.get_mut(channel)?.get_mut(subscriber)?;
        Some(std::mem::replace(&mut registration.active, active))
    }

    /// Delete a registration. Returns `true` if the channel has none left.
    pub fn remove(&mut self, subscriber: &str, channel: &str) -> bool {
        let Some(registrations) = self.registry.get_mut(channel) else {
            return true;
        };
        registrations.shift_remove(subscriber);
        if registrations.is_empty() {
            self.registry.remove(channel);
            return true;
        }
        false
    }

    // ── Status ───────────────────────────────────────────────────

    pub fn watch_status(
        &self,
        subscriber: &str,
        channel: &str,
    ) -> Option<watch::Receiver<SubscriptionStatus>> {
        self.registration(subscriber, channel)
            .map(|r| r.status.subscribe())
    }

    pub fn set_status(&self, subscriber: &str, channel: &str, status: SubscriptionStatus) {
        if let Some(registration) = self.registration(subscriber, channel) {
            registration.status.send_replace(status);
        }
    }

    /// Set the status of every active registration on `channel`.
    pub fn set_channel_status(&self, channel: &str, status: &SubscriptionStatus) {
        let Some(registrations) = self.registry.get(channel) else {
            return;
        };
        for registration in registrations.values().filter(|r| r.active) {
            registration.status.send_replace(status.clone());
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// Listeners for `kind` on every active registration whose channel
    /// pattern matches `channel`, in registration order.
    pub fn listeners_for(&self, channel: &str, kind: EventKind) -> Vec<Listener> {
        let mut patterns: Vec<(&String, &IndexMap<String, Registration>)> = self
            .registry
            .iter()
            .filter(|(pattern, _)| pattern.as_str() != channel && channel_matches(pattern, channel))
            .collect();
        // HashMap order is arbitrary; keep fan-out across patterns stable.
        patterns.sort_by(|a, b| a.0.cmp(b.0));

        self.registry
            .get(channel)
            .into_iter()
            .chain(patterns.into_iter().map(|(_, registrations)| registrations))
            .flat_map(|registrations| registrations.values())
            .filter(|r| r.active)
            .flat_map(|r| r.listeners.iter())
            .filter(|(k, _)| *k == kind)
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn registration(&self, subscriber: &str, channel: &str) -> Option<&Registration> {
        self.registry.get(channel)?.get(subscriber)
    }
}

/// Segment-wise channel match: `*` matches exactly one segment, a trailing
/// `**` matches one or more remaining segments.
pub fn channel_matches(pattern: &str, channel: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut channel_segments = channel.split('/');

    loop {
        match (pattern_segments.next(), channel_segments.next()) {
            (None, None) => return true,
            (Some("**"), Some(_)) => return pattern_segments.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(p), Some(c)) if p == c => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Listener {
        let log = Arc::clone(log);
        let tag = tag.to_owned();
        Arc::new(move |n: &Notification| {
            log.lock().unwrap().push(format!("{tag}:{}", n.data["id"]));
        })
    }

    fn notify(listeners: &[Listener], channel: &str, kind: EventKind) {
        let n = Notification {
            channel: channel.into(),
            kind,
            data: json!({ "id": "1" }),
        };
        for l in listeners {
            l(&n);
        }
    }

    #[test]
    fn wildcard_matching() {
        assert!(channel_matches("/alarms/*", "/alarms/42"));
        assert!(!channel_matches("/alarms/*", "/alarms/42/extra"));
        assert!(!channel_matches("/alarms/*", "/events/42"));
        assert!(channel_matches("/alarms/**", "/alarms/42/extra"));
        assert!(!channel_matches("/alarms/**", "/alarms"));
        assert!(channel_matches("/alarms/42", "/alarms/42"));
        assert!(!channel_matches("/alarms/42", "/alarms/43"));
    }

    #[test]
    fn only_active_registrations_receive() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = EventDispatcher::new();
        d.add_listener("a", "/alarms/*", EventKind::Create, recorder(&log, "a"));
        d.add_listener("b", "/alarms/*", EventKind::Create, recorder(&log, "b"));
        assert_eq!(d.set_active("b", "/alarms/*", true), Some(false));

        notify(&d.listeners_for("/alarms/7", EventKind::Create), "/alarms/7", EventKind::Create);
        assert_eq!(*log.lock().unwrap(), vec!["b:\"1\""]);
    }

    #[test]
    fn fan_out_by_kind_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = EventDispatcher::new();
        d.add_listener("s2", "/alarms/*", EventKind::Update, recorder(&log, "s2-update"));
        d.add_listener("s1", "/alarms/*", EventKind::Update, recorder(&log, "s1-update"));
        d.add_listener("s1", "/alarms/*", EventKind::Delete, recorder(&log, "s1-delete"));
        d.set_active("s1", "/alarms/*", true);
        d.set_active("s2", "/alarms/*", true);

        let listeners = d.listeners_for("/alarms/3", EventKind::Update);
        notify(&listeners, "/alarms/3", EventKind::Update);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["s2-update:\"1\"", "s1-update:\"1\""]
        );
    }

    #[test]
    fn remove_reports_last_registration() {
        let mut d = EventDispatcher::new();
        let noop: Listener = Arc::new(|_: &Notification| {});
        d.add_listener("a", "/events/*", EventKind::Create, Arc::clone(&noop));
        d.add_listener("b", "/events/*", EventKind::Create, noop);

        assert!(!d.remove("a", "/events/*"));
        assert!(d.contains("b", "/events/*"));
        assert!(d.remove("b", "/events/*"));
        assert!(!d.contains("b", "/events/*"));
        assert!(d.set_active("b", "/events/*", true).is_none());
    }

    #[test]
    fn status_is_per_registration() {
        let mut d = EventDispatcher::new();
        d.add_listener("a", "/events/*", EventKind::Create, Arc::new(|_: &Notification| {}));
        d.add_listener("b", "/events/*", EventKind::Create, Arc::new(|_: &Notification| {}));
        d.set_active("a", "/events/*", true);

        let a = d.watch_status("a", "/events/*").unwrap();
        let b = d.watch_status("b", "/events/*").unwrap();
        d.set_channel_status("/events/*", &SubscriptionStatus::Subscribed);

        assert_eq!(*a.borrow(), SubscriptionStatus::Subscribed);
        assert_eq!(*b.borrow(), SubscriptionStatus::Pending);
    }
}
