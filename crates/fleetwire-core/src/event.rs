// ── Realtime event kinds and notifications ──

use std::str::FromStr;

use serde_json::Value;
use strum::IntoEnumIterator;

use fleetwire_api::{RealtimeAction, RealtimeMessage};

use crate::error::CoreError;

/// Kind of change a listener is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    /// Every kind, in dispatch order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    /// Accepts `create`, `update` and `delete` in any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidArgument {
                message: format!("unknown event kind '{s}' (expected create, update or delete)"),
            })
    }
}

impl From<RealtimeAction> for EventKind {
    fn from(action: RealtimeAction) -> Self {
        match action {
            RealtimeAction::Create => Self::Create,
            RealtimeAction::Update => Self::Update,
            RealtimeAction::Delete => Self::Delete,
        }
    }
}

/// One realtime change as seen by listeners.
///
/// Listeners share a single instance per inbound message and must treat
/// it as read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Concrete channel the message arrived on.
    pub channel: String,
    pub kind: EventKind,
    /// The entity carried by the message.
    pub data: Value,
}

impl Notification {
    /// Decode a `{ realtimeAction, data }` payload.
    pub fn parse(channel: &str, payload: Value) -> Option<Self> {
        let message: RealtimeMessage = serde_json::from_value(payload).ok()?;
        Some(Self {
            channel: channel.to_owned(),
            kind: message.realtime_action.into(),
            data: message.data,
        })
    }
}
