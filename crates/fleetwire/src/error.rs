//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetwire_config::ConfigError;
use fleetwire_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the platform: {reason}")]
    #[diagnostic(
        code(fleetwire::connection_failed),
        help(
            "Check the platform URL and your network.\n\
             Self-signed certificates need --insecure (-k) or ca_cert in the profile."
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Realtime channel failed: {reason}")]
    #[diagnostic(
        code(fleetwire::realtime),
        help("The push session was rejected. Check credentials and the channel name.")
    )]
    Realtime { reason: String },

    #[error("Snapshot request failed: {message}")]
    #[diagnostic(code(fleetwire::snapshot))]
    Snapshot { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(fleetwire::auth_failed),
        help(
            "Verify username, tenant and password (or token).\n\
             Store a new secret with: fleetwire config set-secret"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(fleetwire::no_credentials),
        help(
            "Set username and store a password with: fleetwire config set-secret\n\
             Or set FLEETWIRE_USERNAME and FLEETWIRE_PASSWORD (or FLEETWIRE_TOKEN)."
        )
    )]
    NoCredentials { profile: String },

    #[error("Keyring access failed: {message}")]
    #[diagnostic(code(fleetwire::keyring))]
    Keyring { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetwire::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetwire::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fleetwire config set url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No platform configured")]
    #[diagnostic(
        code(fleetwire::no_config),
        help(
            "Pass --url (or FLEETWIRE_URL), or create a profile in\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration could not be loaded: {message}")]
    #[diagnostic(code(fleetwire::config))]
    Config { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(fleetwire::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Realtime { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::Keyring { .. } => {
                exit_code::AUTH
            }
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidArgument { message } => Self::Validation {
                field: "argument".into(),
                reason: message,
            },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Transport { message, .. } => Self::ConnectionFailed { reason: message },
            CoreError::SnapshotFetch {
                message,
                status: Some(401 | 403),
            } => Self::AuthFailed { message },
            CoreError::SnapshotFetch {
                message,
                status: None,
            } => Self::ConnectionFailed { reason: message },
            CoreError::SnapshotFetch { message, .. } => Self::Snapshot { message },
            CoreError::Config { message } => Self::Config { message },
            other @ (CoreError::UnknownRegistration { .. }
            | CoreError::AlreadyStarted
            | CoreError::AlreadyStopped
            | CoreError::NotStarted
            | CoreError::FilterAlreadySet) => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => {
                Self::ProfileNotFound { name, available }
            }
            ConfigError::Keyring(message) => Self::Keyring { message },
            ConfigError::Io(err) => Self::Io(err),
            other @ (ConfigError::Serialization(_) | ConfigError::Figment(_)) => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
