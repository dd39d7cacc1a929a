//! Integration tests for loading configuration files
//!
//! Files are written to temporary paths and loaded the way a service does at
//! startup. Environment-driven overrides go through `apply_env_with` so the
//! tests never touch the process environment.

mod common;

use clinic_auth::config::{AuthConfig, ConfigError};
use clinic_auth::security::{
    Access, AuthorizationGate, Clock, JwksKeyProvider, ManualClock, TokenVerifier,
    TrustedAlgorithm,
};
use common::keys::{bearer, mint, TestKey, AUDIENCE, ISSUER, NOW};
use common::sources::CountingSource;
use http::Method;
use serde_json::json;
use std::io::Write as _;
use std::sync::Arc;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_file_with_route_table() {
    let file = write_config(
        r#"
domain = "clinic.eu.auth0.com"
audience = "doctors-crm"
algorithm = "ES256"
cache_ttl_secs = 120

[[routes]]
method = "GET"
path = "/reports/{id}"
permission = "get:reports"

[[routes]]
method = "GET"
path = "/health"
"#,
    );
    let settings = AuthConfig::load(file.path()).unwrap().validate().unwrap();

    assert_eq!(settings.algorithm, TrustedAlgorithm::Es256);
    assert_eq!(settings.cache_ttl.as_secs(), 120);
    assert_eq!(
        settings.routes.lookup(&Method::GET, "/reports/9"),
        Some(Access::Requires("get:reports".to_string()))
    );
    assert_eq!(settings.routes.lookup(&Method::GET, "/health"), Some(Access::Public));
    assert_eq!(settings.routes.lookup(&Method::GET, "/patients"), None);
}

#[test]
fn test_load_missing_file() {
    let err = AuthConfig::load("/nonexistent/clinic-auth.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/clinic-auth.toml"));
}

#[test]
fn test_load_rejects_invalid_toml() {
    let file = write_config("audience = [unterminated");
    assert!(matches!(
        AuthConfig::from_toml_str(&std::fs::read_to_string(file.path()).unwrap()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config(
        r#"
jwks_url = "https://clinic.example/.well-known/jwks.json"
issuer = "https://clinic.example/"
audience = "doctors-crm"
"#,
    );
    let mut config =
        AuthConfig::from_toml_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
    config
        .apply_env_with(|name| match name {
            "CLINIC_AUTH_AUDIENCE" => Some("nurses-crm".to_string()),
            "CLINIC_AUTH_FETCH_TIMEOUT_MS" => Some("1500".to_string()),
            _ => None,
        })
        .unwrap();

    let settings = config.validate().unwrap();
    assert_eq!(settings.audience, "nurses-crm");
    assert_eq!(settings.fetch_timeout.as_millis(), 1500);
    assert_eq!(settings.issuer, "https://clinic.example/");
}

#[test]
fn test_insecure_remote_key_set_is_refused() {
    let config = AuthConfig::from_toml_str(
        r#"
jwks_url = "http://clinic.example/.well-known/jwks.json"
issuer = "https://clinic.example/"
audience = "doctors-crm"
"#,
    )
    .unwrap();
    assert!(matches!(
        AuthorizationGate::from_config(&config),
        Err(ConfigError::InsecureUrl(_))
    ));
}

#[test]
fn test_custom_permissions_claim() {
    let config = AuthConfig::from_toml_str(
        r#"
jwks_url = "https://clinic.example/.well-known/jwks.json"
issuer = "https://clinic.example/"
audience = "doctors-crm"
permissions_claim = "scope"
"#,
    )
    .unwrap();
    let settings = config.validate().unwrap();

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(NOW));
    let provider = JwksKeyProvider::new(CountingSource::new(&[TestKey::K1]), settings.algorithm)
        .clock(Arc::clone(&clock));
    let verifier = TokenVerifier::new(Arc::new(provider), settings.algorithm)
        .permissions_claim(settings.permissions_claim.clone())
        .clock(clock);
    let gate = AuthorizationGate::new(verifier, settings.audience.clone(), settings.issuer.clone());

    let token = mint(
        TestKey::K1,
        &json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "exp": NOW + 60,
            "scope": "get:patients patch:patients",
            "permissions": ["delete:doctors"],
        }),
    );
    let header = bearer(&token);
    assert!(gate.authorize(Some(&header), "patch:patients").is_ok());
    assert_eq!(
        gate.authorize(Some(&header), "delete:doctors").unwrap_err().code(),
        "insufficient_permission"
    );
}
