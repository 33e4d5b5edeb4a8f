// Shared transport configuration for building reqwest::Client instances.
//
// The resource client and the long-poll push transport share TLS, timeout
// and credential settings through this module, avoiding duplicated builder
// logic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// TLS verification mode (api-level mirror of core's TlsVerification).
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed test platforms).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The client-wide timeout applies to plain REST calls; the long-poll
    /// transport overrides it per request for connect cycles.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("fleetwire/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── Credentials ─────────────────────────────────────────────────────

/// Request credentials attached to every REST and push request.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// HTTP basic auth. The username already carries any tenant prefix.
    Basic {
        username: String,
        password: SecretString,
    },
    /// Bearer token (OAuth / JWT).
    Bearer(SecretString),
    /// No authentication header.
    Anonymous,
}

impl Credentials {
    /// Attach the authorization header to a request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Basic { username, password } => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
            Self::Bearer(token) => request.bearer_auth(token.expose_secret()),
            Self::Anonymous => request,
        }
    }
}

/// A rotatable credential slot shared by every client of one session.
///
/// Readers load the current value before each request, so a caller can
/// swap in fresh credentials while a long-lived push session is running.
pub type SharedCredentials = Arc<ArcSwap<Credentials>>;

/// Wrap credentials in a new shared slot.
pub fn shared_credentials(credentials: Credentials) -> SharedCredentials {
    Arc::new(ArcSwap::from_pointee(credentials))
}
