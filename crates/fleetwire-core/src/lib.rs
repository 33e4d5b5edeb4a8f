// fleetwire-core: realtime notification layer between fleetwire-api and consumers (CLI).

pub mod config;
pub mod connection;
pub mod counter;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod filter;
pub mod multiplexer;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{AuthCredentials, RealtimeConfig, SessionConfig, TlsVerification};
pub use connection::{ConnectionSignal, ConnectionState};
pub use counter::{Counter, Lifecycle, Mode};
pub use error::CoreError;
pub use event::{EventKind, Notification};
pub use filter::{FilterConfiguration, PropertyMap, compile};
pub use multiplexer::{Multiplexer, SubscriptionStatus, SubscriptionWatch};
pub use session::Session;

// Wire types consumers routinely need alongside the core.
pub use fleetwire_api::{Page, PageStatistics, Resource};
