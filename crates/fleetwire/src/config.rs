//! Flag-aware wrappers over `fleetwire_config`.
//!
//! Precedence per setting: command-line flag > environment > profile >
//! `[defaults]`.

use secrecy::SecretString;

use fleetwire_config::{Config, Profile};
use fleetwire_core::{AuthCredentials, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Build the `SessionConfig` for a platform-bound command.
pub fn build_session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = fleetwire_config::load_config_or_default();
    resolve(&cfg, global)
}

/// Resolution against an already-loaded `Config`.
pub fn resolve(cfg: &Config, global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: cfg.available_profiles(),
            });
        }
        // No profile: flags and environment alone.
        None => {
            let url = global.url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: fleetwire_config::config_path().display().to_string(),
            })?;
            Profile::new(url)
        }
    };
    apply_overrides(&mut profile, global);

    let session = match global.token {
        Some(ref token) => fleetwire_config::session_config_with_auth(
            &profile,
            &cfg.defaults,
            AuthCredentials::Token(SecretString::from(token.clone())),
        )?,
        None => fleetwire_config::profile_to_session_config(&profile, &profile_name, &cfg.defaults)?,
    };
    tracing::debug!(profile = %profile_name, url = %session.url, "session config resolved");
    Ok(session)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
    }
    if global.tenant.is_some() {
        profile.tenant.clone_from(&global.tenant);
    }
    if global.username.is_some() {
        profile.username.clone_from(&global.username);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }
}
