// ── Session ──
//
// Composition root for one platform: builds the resource client and the
// long-poll transport around a shared credential slot, owns the single
// multiplexer, and runs the task that feeds transport events into it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetwire_api::{
    LongPollConfig, LongPollTransport, PushTransport, ReconnectConfig, Resource, ResourceClient,
    SharedCredentials, shared_credentials,
};

use crate::config::{AuthCredentials, SessionConfig, credentials_for};
use crate::connection::ConnectionState;
use crate::counter::Counter;
use crate::error::CoreError;
use crate::multiplexer::Multiplexer;

/// Upper bound on waiting for the push disconnect during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Entry point for consumers.
///
/// Cheaply cloneable. Must be created inside a Tokio runtime: the event
/// pump is spawned on construction.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    credentials: SharedCredentials,
    resources: Arc<ResourceClient>,
    transport: LongPollTransport,
    multiplexer: Multiplexer,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let credentials = shared_credentials(config.credentials());
        let http = config.transport().build_client()?;

        let resources = Arc::new(ResourceClient::with_client(
            http.clone(),
            config.url.clone(),
            Arc::clone(&credentials),
        ));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let long_poll = LongPollConfig {
            connect_timeout: config.realtime.connect_timeout,
            reconnect: ReconnectConfig {
                max_retries: config.realtime.max_reconnect_retries,
                ..ReconnectConfig::default()
            },
        };
        let transport = LongPollTransport::with_client(
            http,
            &config.url,
            Arc::clone(&credentials),
            long_poll,
            events_tx,
        )?;

        let push: Arc<dyn PushTransport> = Arc::new(transport.clone());
        let multiplexer = Multiplexer::new(push, config.realtime.idle_abort);
        let cancel = CancellationToken::new();
        let pump = multiplexer.spawn_event_pump(events_rx, cancel.clone());

        info!(url = %config.url, "session ready");

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                credentials,
                resources,
                transport,
                multiplexer,
                cancel,
                pump: Mutex::new(Some(pump)),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.inner.multiplexer
    }

    pub fn resources(&self) -> &ResourceClient {
        &self.inner.resources
    }

    /// Counter over the collection's catch-all channel.
    pub fn counter(&self, resource: Resource, query: Map<String, Value>) -> Counter {
        self.counter_on(resource, resource.channel(), query)
    }

    /// Counter over an explicit channel (e.g. one device's alarms).
    pub fn counter_on(
        &self,
        resource: Resource,
        channel: impl Into<String>,
        query: Map<String, Value>,
    ) -> Counter {
        let client = Arc::clone(&self.inner.resources);
        Counter::new(
            self.inner.multiplexer.clone(),
            channel,
            query,
            move |query: Map<String, Value>| {
                let client = Arc::clone(&client);
                async move { client.list(resource, &query).await }
            },
        )
        .with_page_size(self.inner.config.realtime.snapshot_page_size)
    }

    /// Swap credentials for every following REST and push request, then
    /// retry the push session if it failed.
    pub fn rotate_credentials(&self, auth: &AuthCredentials) {
        let credentials = credentials_for(self.inner.config.tenant.as_deref(), auth);
        self.inner.credentials.store(Arc::new(credentials));
        debug!("credentials rotated");
        self.inner.multiplexer.reconnect();
    }

    /// Close the push session and stop the event pump.
    ///
    /// The disconnect completion is applied before the pump stops, so the
    /// connection state reads `Disconnected` afterwards.
    pub async fn shutdown(&self) {
        let mut state = self.inner.multiplexer.connection_state();
        if self.inner.multiplexer.shutdown() {
            let closed = tokio::time::timeout(
                SHUTDOWN_GRACE,
                state.wait_for(|s| *s == ConnectionState::Disconnected),
            )
            .await
            .map(|r| r.is_ok());
            if !matches!(closed, Ok(true)) {
                warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "push disconnect did not complete");
            }
        }
        self.inner.transport.shutdown();
        self.inner.cancel.cancel();

        let pump = self
            .inner
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            let _ = pump.await;
        }
        info!("session shut down");
    }
}
