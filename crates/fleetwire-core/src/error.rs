// ── Core error types ──
//
// User-facing errors from fleetwire-core. Consumers never see raw HTTP
// or JSON failures here: the `From<fleetwire_api::Error>` impl translates
// wire-layer errors into the core taxonomy. Push-transport failures are
// operational and mostly surface through `ConnectionSignal`s instead.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Argument errors ──────────────────────────────────────────────
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("No listener registered for subscriber '{subscriber}' on {channel}")]
    UnknownRegistration { subscriber: String, channel: String },

    // ── Lifecycle violations ─────────────────────────────────────────
    #[error("Already started")]
    AlreadyStarted,

    #[error("Already stopped")]
    AlreadyStopped,

    #[error("Not started")]
    NotStarted,

    #[error("Filter already set")]
    FilterAlreadySet,

    // ── Operational errors ───────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Snapshot fetch failed: {message}")]
    SnapshotFetch {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Programmer errors: double start/stop, restart, filter set twice.
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarted | Self::AlreadyStopped | Self::NotStarted | Self::FilterAlreadySet
        )
    }

    pub(crate) fn snapshot(err: &fleetwire_api::Error) -> Self {
        let status = err.status_code();
        Self::SnapshotFetch {
            message: err.to_string(),
            status: (status != 0).then_some(status),
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<fleetwire_api::Error> for CoreError {
    fn from(err: fleetwire_api::Error) -> Self {
        match err {
            fleetwire_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            fleetwire_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            fleetwire_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS setup failed: {msg}"),
            },
            other => {
                let status = other.status_code();
                CoreError::Transport {
                    message: other.to_string(),
                    status: (status != 0).then_some(status),
                }
            }
        }
    }
}
