// ── Runtime session configuration ──
//
// These types describe *how* to reach a platform and tune the realtime
// layer. They carry credential data but never touch disk: the CLI (via
// fleetwire-config) constructs a `SessionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use fleetwire_api::{Credentials, TlsMode, TransportConfig};

/// How to authenticate with the platform.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Username + password. Sent as `tenant/username` when a tenant is set.
    Basic {
        username: String,
        password: SecretString,
    },
    /// Bearer token (OAuth / JWT).
    Token(SecretString),
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Tuning for the realtime layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Abort the in-flight long-poll when nothing arrived for this long.
    pub idle_abort: Duration,
    /// Per-request timeout of a long-poll connect cycle.
    pub connect_timeout: Duration,
    /// Page size used by filtered snapshot fetches.
    pub snapshot_page_size: usize,
    /// Consecutive failed connect cycles before the transport gives up.
    /// `None` retries forever.
    pub max_reconnect_retries: Option<u32>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            idle_abort: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(90),
            snapshot_page_size: 2000,
            max_reconnect_retries: None,
        }
    }
}

/// Configuration for one platform session.
///
/// Built by the CLI, passed to `Session` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Platform base URL (e.g., `https://example.fleetwire.io`).
    pub url: Url,
    /// Tenant id, prefixed to basic-auth usernames.
    pub tenant: Option<String>,
    /// Authentication method and credentials.
    pub auth: AuthCredentials,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout for REST calls.
    pub timeout: Duration,
    /// Realtime layer tuning.
    pub realtime: RealtimeConfig,
}

impl SessionConfig {
    pub fn new(url: Url, auth: AuthCredentials) -> Self {
        Self {
            url,
            tenant: None,
            auth,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            realtime: RealtimeConfig::default(),
        }
    }

    /// Wire-level credentials for the configured auth method.
    pub fn credentials(&self) -> Credentials {
        credentials_for(self.tenant.as_deref(), &self.auth)
    }

    /// HTTP transport settings derived from this config.
    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }
}

pub(crate) fn credentials_for(tenant: Option<&str>, auth: &AuthCredentials) -> Credentials {
    match auth {
        AuthCredentials::Basic { username, password } => {
            let username = match tenant {
                Some(tenant) if !username.contains('/') => format!("{tenant}/{username}"),
                _ => username.clone(),
            };
            Credentials::Basic {
                username,
                password: password.clone(),
            }
        }
        AuthCredentials::Token(token) => Credentials::Bearer(token.clone()),
    }
}
