use thiserror::Error;

/// Top-level error type for the `fleetwire-api` crate.
///
/// Covers every failure mode of the wire layer: authentication, HTTP
/// transport, REST status errors, push handshake/connect rejection and
/// payload decoding. `fleetwire-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected by the platform (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST ────────────────────────────────────────────────────────
    /// Non-success status from a REST or push endpoint.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Push ────────────────────────────────────────────────────────
    /// The push endpoint refused the handshake.
    #[error("Handshake rejected: {reason}")]
    HandshakeRejected { reason: String },

    /// A long-poll connect cycle was answered with `successful: false`.
    #[error("Connect rejected: {reason}")]
    ConnectRejected { reason: String },

    /// A wire subscription was refused.
    #[error("Subscription to {channel} rejected: {reason}")]
    SubscriptionRejected { channel: String, reason: String },

    /// The server no longer knows our client id and asks for a new handshake.
    #[error("Push session expired -- new handshake required")]
    UnknownClient,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates auth has expired
    /// and refreshing credentials might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::UnknownClient)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::ConnectRejected { .. } | Self::UnknownClient => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }

    /// HTTP status associated with this error, or `0` when the failure
    /// happened below HTTP (connection refused, decoding, protocol).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication { .. } => 401,
            Self::Api { status, .. } => *status,
            Self::Transport(e) => e.status().map_or(0, |s| s.as_u16()),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let auth = Error::Authentication {
            message: "nope".into(),
        };
        assert_eq!(auth.status_code(), 401);
        assert!(auth.is_auth_expired());

        let api = Error::Api {
            status: 503,
            message: "busy".into(),
        };
        assert_eq!(api.status_code(), 503);
        assert!(api.is_transient());
        assert!(!api.is_not_found());

        assert_eq!(Error::UnknownClient.status_code(), 0);
        assert!(
            Error::Api {
                status: 404,
                message: String::new()
            }
            .is_not_found()
        );
    }
}
