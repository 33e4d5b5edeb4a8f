//! HTTP long-poll push transport.
//!
//! Speaks a Bayeux-style JSON exchange against `{base}/notification/realtime`:
//! every request is a JSON array of messages addressed to a meta channel
//! (`/meta/handshake`, `/meta/connect`, `/meta/subscribe`,
//! `/meta/unsubscribe`, `/meta/disconnect`), every response a JSON array of
//! replies, possibly interleaved with data messages.
//!
//! After a successful handshake a background task keeps one `connect`
//! request in flight at all times. Failed cycles are retried with
//! exponential backoff + jitter; when the server forgets the client id the
//! task re-handshakes and re-subscribes every channel it still remembers.
//! Credentials are read from the shared slot before every request, so they
//! can rotate during a long-lived session.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetwire_api::{LongPollConfig, LongPollTransport, PushTransport, TransportConfig};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let transport = LongPollTransport::new(&base_url, &TransportConfig::default(), credentials, LongPollConfig::default(), tx)?;
//! transport.handshake();
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::{PushTransport, SubscriptionHandle, TransportEvent};
use crate::error::Error;
use crate::transport::{SharedCredentials, TransportConfig};

const REALTIME_PATH: &str = "/notification/realtime";

const META_HANDSHAKE: &str = "/meta/handshake";
const META_CONNECT: &str = "/meta/connect";
const META_SUBSCRIBE: &str = "/meta/subscribe";
const META_UNSUBSCRIBE: &str = "/meta/unsubscribe";
const META_DISCONNECT: &str = "/meta/disconnect";

const CONNECTION_TYPE: &str = "long-polling";

// ── Configuration ────────────────────────────────────────────────────

/// Exponential backoff configuration for failed connect cycles.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed cycles before the session is dropped.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Tuning for [`LongPollTransport`].
#[derive(Debug, Clone)]
pub struct LongPollConfig {
    /// Per-request timeout for connect cycles. Must exceed the server's
    /// long-poll hold time. Default: 90s.
    pub connect_timeout: Duration,

    /// Retry policy for failed connect cycles.
    pub reconnect: ReconnectConfig,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(90),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── LongPollTransport ────────────────────────────────────────────────

/// Long-poll implementation of [`PushTransport`].
///
/// Cheaply cloneable; all clones drive the same session.
#[derive(Clone)]
pub struct LongPollTransport {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    endpoint: Url,
    credentials: SharedCredentials,
    events: mpsc::UnboundedSender<TransportEvent>,
    config: LongPollConfig,
    message_id: AtomicU64,
    session: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    client_id: Option<String>,
    /// Cancels the whole connect loop.
    connect_loop: Option<CancellationToken>,
    /// Cancels only the connect request currently in flight.
    cycle: Option<CancellationToken>,
    /// Channels to restore after a forced re-handshake.
    subscriptions: BTreeMap<SubscriptionHandle, String>,
}

impl LongPollTransport {
    /// Create a transport for the platform at `base_url`.
    ///
    /// Completions are delivered on `events`.
    pub fn new(
        base_url: &Url,
        transport: &TransportConfig,
        credentials: SharedCredentials,
        config: LongPollConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url, credentials, config, events)
    }

    /// Create a transport around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: &Url,
        credentials: SharedCredentials,
        config: LongPollConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, Error> {
        let endpoint = Url::parse(&format!(
            "{}{REALTIME_PATH}",
            base_url.as_str().trim_end_matches('/')
        ))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                endpoint,
                credentials,
                events,
                config,
                message_id: AtomicU64::new(1),
                session: Mutex::new(SessionState::default()),
            }),
        })
    }

    /// The client id of the current push session, if any.
    pub fn client_id(&self) -> Option<String> {
        self.inner.session().client_id.clone()
    }

    /// Stop the connect loop without notifying the server.
    pub fn shutdown(&self) {
        let token = self.inner.session().connect_loop.take();
        if let Some(token) = token {
            token.cancel();
        }
    }
}

impl PushTransport for LongPollTransport {
    fn handshake(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.handshake_once().await {
                Ok(client_id) => {
                    info!(%client_id, "push handshake accepted");
                    inner.emit(TransportEvent::HandshakeSucceeded);
                    inner.start_connect_loop(client_id);
                }
                Err(e) => {
                    warn!(error = %e, "push handshake failed");
                    inner.emit(TransportEvent::HandshakeFailed {
                        reason: e.to_string(),
                    });
                }
            }
        });
    }

    fn subscribe(&self, handle: SubscriptionHandle, channel: &str) {
        self.inner
            .session()
            .subscriptions
            .insert(handle, channel.to_owned());
        self.inner.spawn_subscribe(handle, channel.to_owned());
    }

    fn unsubscribe(&self, handle: SubscriptionHandle, channel: &str) {
        self.inner.session().subscriptions.remove(&handle);

        let inner = Arc::clone(&self.inner);
        let channel = channel.to_owned();
        tokio::spawn(async move {
            if let Err(e) = inner.unsubscribe_once(&channel).await {
                warn!(error = %e, %channel, "push unsubscribe failed (non-fatal)");
            }
            inner.emit(TransportEvent::Unsubscribed { handle, channel });
        });
    }

    fn disconnect(&self) {
        let (client_id, loop_token) = {
            let mut session = self.inner.session();
            session.subscriptions.clear();
            session.cycle = None;
            (session.client_id.take(), session.connect_loop.take())
        };
        if let Some(token) = loop_token {
            token.cancel();
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Some(client_id) = client_id {
                if let Err(e) = inner.disconnect_once(&client_id).await {
                    warn!(error = %e, "push disconnect failed (non-fatal)");
                }
            }
            info!("push session closed");
            inner.emit(TransportEvent::Disconnected);
        });
    }

    fn abort_connect(&self) {
        let cycle = self.inner.session().cycle.clone();
        if let Some(cycle) = cycle {
            debug!("aborting in-flight connect cycle");
            cycle.cancel();
        }
    }
}

// ── Session internals ────────────────────────────────────────────────

impl Inner {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("transport event receiver dropped");
        }
    }

    fn next_id(&self) -> String {
        self.message_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn start_connect_loop(self: &Arc<Self>, client_id: String) {
        let stop = CancellationToken::new();
        let previous = {
            let mut session = self.session();
            session.client_id = Some(client_id.clone());
            session.connect_loop.replace(stop.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.connect_loop(client_id, stop).await });
    }

    /// Main loop: connect → deliver → on error, backoff → connect again.
    async fn connect_loop(self: Arc<Self>, mut client_id: String, stop: CancellationToken) {
        let mut attempt: u32 = 0;
        let mut connected = false;

        loop {
            let cycle = stop.child_token();
            self.session().cycle = Some(cycle.clone());

            let outcome = tokio::select! {
                biased;
                () = stop.cancelled() => break,
                () = cycle.cancelled() => {
                    debug!("connect cycle aborted, reissuing");
                    continue;
                }
                result = self.connect_once(&client_id) => result,
            };

            let err = match outcome {
                Ok(messages) => {
                    attempt = 0;
                    if !connected {
                        connected = true;
                        info!("push connect cycle established");
                        self.emit(TransportEvent::ConnectSucceeded);
                    }
                    for message in messages {
                        if let Some(payload) = message.data {
                            self.emit(TransportEvent::Message {
                                channel: message.channel,
                                payload,
                            });
                        }
                    }
                    continue;
                }
                Err(e) => e,
            };

            connected = false;
            warn!(error = %err, attempt, "push connect cycle failed");
            self.emit(TransportEvent::ConnectFailed {
                code: err.status_code(),
            });

            if matches!(err, Error::UnknownClient) {
                match self.handshake_once().await {
                    Ok(new_id) => {
                        info!(client_id = %new_id, "push session re-established");
                        client_id = new_id;
                        self.session().client_id = Some(client_id.clone());
                        self.resubscribe();
                        attempt = 0;
                        continue;
                    }
                    Err(e) => warn!(error = %e, "push re-handshake failed"),
                }
            }

            if let Some(max) = self.config.reconnect.max_retries {
                if attempt >= max {
                    error!(max_retries = max, "push reconnection limit reached, giving up");
                    {
                        let mut session = self.session();
                        session.client_id = None;
                        session.connect_loop = None;
                        session.cycle = None;
                    }
                    self.emit(TransportEvent::Disconnected);
                    break;
                }
            }

            let delay = calculate_backoff(attempt, &self.config.reconnect);
            debug!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "waiting before next connect cycle"
            );

            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }

        debug!("push connect loop exiting");
    }

    fn resubscribe(self: &Arc<Self>) {
        let remembered: Vec<(SubscriptionHandle, String)> = self
            .session()
            .subscriptions
            .iter()
            .map(|(handle, channel)| (*handle, channel.clone()))
            .collect();

        for (handle, channel) in remembered {
            self.spawn_subscribe(handle, channel);
        }
    }

    fn spawn_subscribe(self: &Arc<Self>, handle: SubscriptionHandle, channel: String) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let event = match inner.subscribe_once(&channel).await {
                Ok(()) => {
                    debug!(%handle, %channel, "wire subscription acknowledged");
                    TransportEvent::Subscribed { handle, channel }
                }
                Err(e) => {
                    warn!(error = %e, %handle, %channel, "wire subscription failed");
                    inner.session().subscriptions.remove(&handle);
                    TransportEvent::SubscribeFailed {
                        handle,
                        channel,
                        reason: e.to_string(),
                    }
                }
            };
            inner.emit(event);
        });
    }

    // ── Single exchanges ─────────────────────────────────────────────

    async fn handshake_once(&self) -> Result<String, Error> {
        let request = json!([{
            "channel": META_HANDSHAKE,
            "id": self.next_id(),
            "version": "1.0",
            "minimumVersion": "1.0",
            "supportedConnectionTypes": [CONNECTION_TYPE],
        }]);

        let replies = self.exchange(&request, None).await?;
        let reply = find_reply(&replies, META_HANDSHAKE)?;

        if reply.successful.unwrap_or(false) {
            reply
                .client_id
                .clone()
                .ok_or_else(|| Error::HandshakeRejected {
                    reason: "reply carries no clientId".into(),
                })
        } else {
            Err(Error::HandshakeRejected {
                reason: reply.failure_reason(),
            })
        }
    }

    async fn connect_once(&self, client_id: &str) -> Result<Vec<InboundMessage>, Error> {
        let request = json!([{
            "channel": META_CONNECT,
            "id": self.next_id(),
            "clientId": client_id,
            "connectionType": CONNECTION_TYPE,
        }]);

        let replies = self
            .exchange(&request, Some(self.config.connect_timeout))
            .await?;

        let (meta, data): (Vec<InboundMessage>, Vec<InboundMessage>) = replies
            .into_iter()
            .partition(|m| m.channel == META_CONNECT);

        if let Some(reply) = meta.first() {
            if !reply.successful.unwrap_or(false) {
                if reply.wants_handshake() {
                    return Err(Error::UnknownClient);
                }
                return Err(Error::ConnectRejected {
                    reason: reply.failure_reason(),
                });
            }
        }

        Ok(data)
    }

    async fn subscribe_once(&self, channel: &str) -> Result<(), Error> {
        let client_id = self
            .session()
            .client_id
            .clone()
            .ok_or(Error::UnknownClient)?;

        let request = json!([{
            "channel": META_SUBSCRIBE,
            "id": self.next_id(),
            "clientId": client_id,
            "subscription": channel,
        }]);

        let replies = self.exchange(&request, None).await?;
        let reply = find_reply(&replies, META_SUBSCRIBE)?;

        if reply.successful.unwrap_or(false) {
            Ok(())
        } else {
            Err(Error::SubscriptionRejected {
                channel: channel.to_owned(),
                reason: reply.failure_reason(),
            })
        }
    }

    async fn unsubscribe_once(&self, channel: &str) -> Result<(), Error> {
        let Some(client_id) = self.session().client_id.clone() else {
            // Session already gone: nothing left to undo on the server.
            return Ok(());
        };

        let request = json!([{
            "channel": META_UNSUBSCRIBE,
            "id": self.next_id(),
            "clientId": client_id,
            "subscription": channel,
        }]);

        self.exchange(&request, None).await.map(drop)
    }

    async fn disconnect_once(&self, client_id: &str) -> Result<(), Error> {
        let request = json!([{
            "channel": META_DISCONNECT,
            "id": self.next_id(),
            "clientId": client_id,
        }]);

        self.exchange(&request, None).await.map(drop)
    }

    /// POST one batch of messages and decode the reply array.
    async fn exchange(
        &self,
        messages: &Value,
        timeout: Option<Duration>,
    ) -> Result<Vec<InboundMessage>, Error> {
        trace!(endpoint = %self.endpoint, %messages, "push request");

        let mut request = self.http.post(self.endpoint.clone()).json(messages);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let request = self.credentials.load().apply(request);

        let resp = request.send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "push endpoint rejected credentials".into(),
            });
        }

        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// One element of a reply array: a meta reply or a data message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundMessage {
    channel: String,
    #[serde(default)]
    successful: Option<bool>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    advice: Option<Advice>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Advice {
    #[serde(default)]
    reconnect: Option<String>,
}

impl InboundMessage {
    fn failure_reason(&self) -> String {
        self.error.clone().unwrap_or_else(|| "rejected".into())
    }

    fn wants_handshake(&self) -> bool {
        self.advice
            .as_ref()
            .and_then(|a| a.reconnect.as_deref())
            .is_some_and(|r| r == "handshake")
    }
}

fn find_reply<'a>(replies: &'a [InboundMessage], channel: &str) -> Result<&'a InboundMessage, Error> {
    replies
        .iter()
        .find(|m| m.channel == channel)
        .ok_or_else(|| Error::Deserialization {
            message: format!("no reply on {channel}"),
            body: String::new(),
        })
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
