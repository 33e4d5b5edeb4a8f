// fleetwire-api: wire-level clients (push transport + resource listing)

pub mod error;
pub mod models;
pub mod push;
pub mod resource;
pub mod transport;

pub use error::Error;
pub use models::{Page, PageStatistics, RealtimeAction, RealtimeMessage};
pub use push::long_poll::{LongPollConfig, LongPollTransport, ReconnectConfig};
pub use push::{PushTransport, SubscriptionHandle, TransportEvent};
pub use resource::{Resource, ResourceClient};
pub use transport::{Credentials, SharedCredentials, TlsMode, TransportConfig, shared_credentials};
