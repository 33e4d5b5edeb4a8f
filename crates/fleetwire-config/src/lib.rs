//! Shared configuration for fleetwire tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `fleetwire_core::SessionConfig`. The CLI layers
//! its flag overrides on top of what this crate resolves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use fleetwire_core::{AuthCredentials, RealtimeConfig, SessionConfig, TlsVerification};

/// Keyring service name under which secrets are stored.
pub const KEYRING_SERVICE: &str = "fleetwire";

/// Prefix of environment variables layered over the config file.
pub const ENV_PREFIX: &str = "FLEETWIRE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults, overridden per profile.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named platform profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Profile selected by `requested`, else `default_profile`, else "default".
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.available_profiles(),
            })
    }

    /// Comma-separated sorted profile names, `(none)` when empty.
    pub fn available_profiles(&self) -> String {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        if names.is_empty() {
            return "(none)".into();
        }
        names.sort_unstable();
        names.join(", ")
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_idle_abort")]
    pub idle_abort_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            idle_abort_secs: default_idle_abort(),
            connect_timeout_secs: default_connect_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_idle_abort() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    90
}
fn default_page_size() -> usize {
    2000
}

/// A named platform profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Platform base URL (e.g., "https://tenant.fleetwire.io").
    pub url: String,

    /// Tenant id; basic-auth usernames are sent as `tenant/username`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Auth mode: "basic" or "token".
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Bearer token (plaintext -- prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_abort_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
}

impl Profile {
    /// Empty basic-auth profile for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tenant: None,
            auth_mode: default_auth_mode(),
            username: None,
            password: None,
            password_env: None,
            token: None,
            token_env: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            idle_abort_secs: None,
            page_size: None,
        }
    }
}

fn default_auth_mode() -> String {
    "basic".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "fleetwire", "fleetwire").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetwire");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn file_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
}

/// Load Config from `path` alone, no environment layering. A missing
/// file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    Ok(file_figment(path).extract()?)
}

/// Load the full Config from the canonical file + `FLEETWIRE_` environment.
///
/// Nested keys use a double underscore: `FLEETWIRE_DEFAULTS__TIMEOUT=60`.
pub fn load_config() -> Result<Config, ConfigError> {
    let figment = file_figment(&config_path()).merge(Env::prefixed(ENV_PREFIX).split("__"));
    Ok(figment.extract()?)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Which secret of a profile to resolve or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    Token,
}

impl SecretKind {
    fn label(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Token => "token",
        }
    }

    fn global_env(self) -> String {
        format!("{ENV_PREFIX}{}", self.label().to_uppercase())
    }

    /// Keyring account name for this secret of `profile_name`.
    pub fn keyring_user(self, profile_name: &str) -> String {
        format!("{profile_name}/{}", self.label())
    }
}

/// Resolve a secret through the chain: the profile's `*_env` variable,
/// `FLEETWIRE_PASSWORD` / `FLEETWIRE_TOKEN`, the system keyring, then
/// plaintext in the profile.
pub fn resolve_secret(
    profile: &Profile,
    profile_name: &str,
    kind: SecretKind,
) -> Result<SecretString, ConfigError> {
    let (env_name, plaintext) = match kind {
        SecretKind::Password => (&profile.password_env, &profile.password),
        SecretKind::Token => (&profile.token_env, &profile.token),
    };

    // 1. Profile-named env var
    if let Some(env_name) = env_name {
        if let Ok(val) = std::env::var(env_name) {
            debug!(profile = profile_name, source = "profile env", "{} resolved", kind.label());
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(val) = std::env::var(kind.global_env()) {
        debug!(profile = profile_name, source = "env", "{} resolved", kind.label());
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &kind.keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            debug!(profile = profile_name, source = "keyring", "{} resolved", kind.label());
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(secret) = plaintext {
        debug!(profile = profile_name, source = "config", "{} resolved", kind.label());
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a secret for `profile_name` in the system keyring.
pub fn store_secret(profile_name: &str, kind: SecretKind, secret: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &kind.keyring_user(profile_name))?;
    entry.set_password(secret)?;
    Ok(())
}

/// Resolve `AuthCredentials` from a profile's `auth_mode` field.
pub fn resolve_auth(profile: &Profile, profile_name: &str) -> Result<AuthCredentials, ConfigError> {
    match profile.auth_mode.as_str() {
        "basic" => {
            let username = profile
                .username
                .clone()
                .or_else(|| std::env::var(format!("{ENV_PREFIX}USERNAME")).ok())
                .ok_or_else(|| ConfigError::NoCredentials {
                    profile: profile_name.into(),
                })?;
            let password = resolve_secret(profile, profile_name, SecretKind::Password)?;
            Ok(AuthCredentials::Basic { username, password })
        }
        "token" => {
            let token = resolve_secret(profile, profile_name, SecretKind::Token)?;
            Ok(AuthCredentials::Token(token))
        }
        other => Err(ConfigError::Validation {
            field: "auth_mode".into(),
            reason: format!("expected 'basic' or 'token', got '{other}'"),
        }),
    }
}

/// Parse a platform URL, reporting `field` on failure.
pub fn parse_url(raw: &str, field: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `SessionConfig` from a profile over the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let auth = resolve_auth(profile, profile_name)?;
    session_config_with_auth(profile, defaults, auth)
}

/// Like [`profile_to_session_config`], with credentials already resolved
/// (e.g. from a command-line flag).
pub fn session_config_with_auth(
    profile: &Profile,
    defaults: &Defaults,
    auth: AuthCredentials,
) -> Result<SessionConfig, ConfigError> {
    let url = parse_url(&profile.url, "url")?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let page_size = profile.page_size.unwrap_or(defaults.page_size);
    if page_size == 0 {
        return Err(ConfigError::Validation {
            field: "page_size".into(),
            reason: "must be at least 1".into(),
        });
    }

    let mut config = SessionConfig::new(url, auth);
    config.tenant.clone_from(&profile.tenant);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.realtime = RealtimeConfig {
        idle_abort: Duration::from_secs(profile.idle_abort_secs.unwrap_or(defaults.idle_abort_secs)),
        connect_timeout: Duration::from_secs(defaults.connect_timeout_secs),
        snapshot_page_size: page_size,
        ..RealtimeConfig::default()
    };
    Ok(config)
}
