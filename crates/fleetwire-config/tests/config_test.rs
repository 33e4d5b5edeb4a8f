//! File-backed config loading and profile translation.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use fleetwire_config::{
    Config, ConfigError, Profile, load_config_from, profile_to_session_config, save_config_to,
};
use fleetwire_core::{AuthCredentials, TlsVerification};

fn write(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.default_profile.as_deref(), Some("default"));
    assert_eq!(cfg.defaults.timeout, 30);
    assert_eq!(cfg.defaults.page_size, 2000);
    assert!(cfg.profiles.is_empty());
}

#[test]
fn profiles_and_defaults_are_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        r#"
default_profile = "prod"

[defaults]
timeout = 10
idle_abort_secs = 45

[profiles.prod]
url = "https://prod.fleetwire.test"
tenant = "t100"
username = "ops"
password = "hunter2"
page_size = 500

[profiles.lab]
url = "https://lab.fleetwire.test"
auth_mode = "token"
token_env = "LAB_TOKEN"
insecure = true
"#,
    );

    let cfg = load_config_from(&path).unwrap();
    assert_eq!(cfg.active_profile_name(None), "prod");
    assert_eq!(cfg.defaults.timeout, 10);
    assert_eq!(cfg.defaults.idle_abort_secs, 45);
    assert_eq!(cfg.defaults.connect_timeout_secs, 90);

    let prod = cfg.profile("prod").unwrap();
    assert_eq!(prod.auth_mode, "basic");
    assert_eq!(prod.tenant.as_deref(), Some("t100"));
    assert_eq!(prod.page_size, Some(500));

    let lab = cfg.profile("lab").unwrap();
    assert_eq!(lab.auth_mode, "token");
    assert_eq!(lab.token_env.as_deref(), Some("LAB_TOKEN"));
    assert_eq!(lab.insecure, Some(true));
}

#[test]
fn session_config_applies_profile_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        r#"
[defaults]
timeout = 12
idle_abort_secs = 20

[profiles.default]
url = "https://p.fleetwire.test"
tenant = "t7"
username = "alice"
password_env = "CARGO_MANIFEST_DIR"
idle_abort_secs = 5
"#,
    );
    let cfg = load_config_from(&path).unwrap();
    let profile = cfg.profile("default").unwrap();

    let session = profile_to_session_config(profile, "default", &cfg.defaults).unwrap();
    assert_eq!(session.url.as_str(), "https://p.fleetwire.test/");
    assert_eq!(session.tenant.as_deref(), Some("t7"));
    assert_eq!(session.tls, TlsVerification::SystemDefaults);
    assert_eq!(session.timeout, Duration::from_secs(12));
    assert_eq!(session.realtime.idle_abort, Duration::from_secs(5));
    assert_eq!(session.realtime.snapshot_page_size, 2000);

    // cargo exports the manifest dir to test processes.
    match session.auth {
        AuthCredentials::Basic { username, password } => {
            assert_eq!(username, "alice");
            assert_eq!(password.expose_secret(), env!("CARGO_MANIFEST_DIR"));
        }
        AuthCredentials::Token(_) => panic!("expected basic auth"),
    }
}

#[test]
fn tls_settings_translate() {
    let cfg = Config::default();

    let mut insecure = Profile::new("https://a.test");
    insecure.password = Some("pw".into());
    insecure.username = Some("u".into());
    insecure.insecure = Some(true);
    insecure.ca_cert = Some("/etc/ca.pem".into());
    let session = profile_to_session_config(&insecure, "a", &cfg.defaults).unwrap();
    assert_eq!(session.tls, TlsVerification::DangerAcceptInvalid);

    let mut custom = insecure.clone();
    custom.insecure = None;
    let session = profile_to_session_config(&custom, "a", &cfg.defaults).unwrap();
    assert_eq!(session.tls, TlsVerification::CustomCa("/etc/ca.pem".into()));
}

#[test]
fn invalid_profiles_are_rejected() {
    let cfg = Config::default();

    let mut bad_url = Profile::new("not a url");
    bad_url.username = Some("u".into());
    bad_url.password = Some("pw".into());
    assert!(matches!(
        profile_to_session_config(&bad_url, "x", &cfg.defaults),
        Err(ConfigError::Validation { field, .. }) if field == "url"
    ));

    let mut zero_page = Profile::new("https://x.test");
    zero_page.username = Some("u".into());
    zero_page.password = Some("pw".into());
    zero_page.page_size = Some(0);
    assert!(matches!(
        profile_to_session_config(&zero_page, "x", &cfg.defaults),
        Err(ConfigError::Validation { field, .. }) if field == "page_size"
    ));
}

#[test]
fn save_then_load_keeps_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    let mut profile = Profile::new("https://saved.test");
    profile.auth_mode = "token".into();
    profile.token_env = Some("SAVED_TOKEN".into());
    cfg.profiles.insert("saved".into(), profile);
    cfg.default_profile = Some("saved".into());
    save_config_to(&cfg, &path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[profiles.saved]"));
    assert!(!written.contains("password"));

    let loaded = load_config_from(&path).unwrap();
    assert_eq!(loaded.active_profile_name(None), "saved");
    let saved = loaded.profile("saved").unwrap();
    assert_eq!(saved.url, "https://saved.test");
    assert_eq!(saved.token_env.as_deref(), Some("SAVED_TOKEN"));
}
