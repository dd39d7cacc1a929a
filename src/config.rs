//! # Configuration Module
//!
//! Authorization settings are read from a TOML file and can be overridden by
//! environment variables. Everything is validated once, at startup, by
//! [`AuthConfig::validate`], which turns the raw values into typed
//! [`AuthSettings`]. A service must refuse to start on a [`ConfigError`].
//!
//! ## File Format
//!
//! ```toml
//! domain = "clinic.eu.auth0.com"      # derives jwks_url and issuer
//! audience = "doctors-crm"
//! algorithm = "RS256"
//! cache_ttl_secs = 600
//! fetch_timeout_ms = 5000
//!
//! [[routes]]
//! method = "GET"
//! path = "/patients"
//! permission = "get:patients"
//! ```
//!
//! Without `[[routes]]` the clinic route table is used.
//!
//! ## Environment Variables
//!
//! | Variable | Key |
//! |---|---|
//! | `CLINIC_AUTH_JWKS_URL` | `jwks_url` |
//! | `CLINIC_AUTH_ISSUER` | `issuer` |
//! | `CLINIC_AUTH_AUDIENCE` | `audience` |
//! | `CLINIC_AUTH_DOMAIN` | `domain` |
//! | `CLINIC_AUTH_ALGORITHM` | `algorithm` |
//! | `CLINIC_AUTH_CACHE_TTL_SECS` | `cache_ttl_secs` |
//! | `CLINIC_AUTH_FETCH_TIMEOUT_MS` | `fetch_timeout_ms` |
//! | `CLINIC_AUTH_LEEWAY_SECS` | `leeway_secs` |
//! | `CLINIC_AUTH_PERMISSIONS_CLAIM` | `permissions_claim` |

use crate::policy::{clinic_rules, PolicyError, RoutePolicy, RouteRule};
use crate::security::{AlgorithmError, KeySourceError, TrustedAlgorithm};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_FETCH_TIMEOUT_MS: u64 = 60_000;

/// Raw configuration as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Key-set endpoint. Derived from `domain` when absent.
    pub jwks_url: Option<String>,
    /// Expected `iss`. Derived from `domain` when absent.
    pub issuer: Option<String>,
    /// Expected `aud`.
    pub audience: Option<String>,
    /// Hosted identity-provider domain.
    pub domain: Option<String>,
    /// Trusted signing algorithm.
    pub algorithm: String,
    /// Key-set cache lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Bound on one key-set request, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Seconds a token stays acceptable past `exp`.
    pub leeway_secs: u64,
    /// Claim holding the permission strings.
    pub permissions_claim: String,
    /// Route access table.
    pub routes: Vec<RouteRule>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            issuer: None,
            audience: None,
            domain: None,
            algorithm: TrustedAlgorithm::default().to_string(),
            cache_ttl_secs: 600,
            fetch_timeout_ms: 5_000,
            leeway_secs: 0,
            permissions_claim: "permissions".to_string(),
            routes: clinic_rules(),
        }
    }
}

/// Why the configuration was refused.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// An environment override does not parse.
    #[error("environment variable {name} has invalid value '{value}'")]
    Env {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// A required setting is absent.
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    /// The key-set URL does not parse or has no host.
    #[error("invalid key set URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as configured.
        url: String,
        /// Parse failure.
        reason: String,
    },
    /// Plain HTTP to anything but the local machine.
    #[error("key set URL must use HTTPS (HTTP only allowed for localhost/127.0.0.1): {0}")]
    InsecureUrl(String),
    /// HMAC algorithms are never trusted.
    #[error("symmetric algorithm '{0}' is not allowed; configure an asymmetric algorithm such as RS256")]
    SymmetricAlgorithm(String),
    /// Not a known algorithm name.
    #[error("unknown signing algorithm '{0}'")]
    UnknownAlgorithm(String),
    /// A numeric or string setting is out of range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Setting name.
        field: &'static str,
        /// Allowed range.
        reason: &'static str,
    },
    /// A route rule is malformed.
    #[error(transparent)]
    Route(#[from] PolicyError),
    /// The HTTP key source could not be built.
    #[error("cannot create key set client: {0}")]
    KeySource(#[source] KeySourceError),
}

impl From<AlgorithmError> for ConfigError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::Symmetric(name) => ConfigError::SymmetricAlgorithm(name),
            AlgorithmError::Unknown(name) => ConfigError::UnknownAlgorithm(name),
        }
    }
}

/// Validated, typed settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Key-set endpoint (HTTPS, or HTTP to localhost).
    pub jwks_url: Url,
    /// Expected `iss`.
    pub issuer: String,
    /// Expected `aud`.
    pub audience: String,
    /// The single trusted algorithm.
    pub algorithm: TrustedAlgorithm,
    /// Key-set cache lifetime.
    pub cache_ttl: Duration,
    /// Bound on one key-set request.
    pub fetch_timeout: Duration,
    /// Seconds of grace past `exp`.
    pub leeway_secs: u64,
    /// Claim holding the permission strings.
    pub permissions_claim: String,
    /// Compiled route table.
    pub routes: RoutePolicy,
}

impl AuthConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read `path`, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for deployments without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override settings from `CLINIC_AUTH_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Override settings from any variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &'static str| lookup(name).filter(|v| !v.is_empty());
        let number = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            match text(name) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::Env { name, value }),
            }
        };

        if let Some(v) = text("CLINIC_AUTH_JWKS_URL") {
            self.jwks_url = Some(v);
        }
        if let Some(v) = text("CLINIC_AUTH_ISSUER") {
            self.issuer = Some(v);
        }
        if let Some(v) = text("CLINIC_AUTH_AUDIENCE") {
            self.audience = Some(v);
        }
        if let Some(v) = text("CLINIC_AUTH_DOMAIN") {
            self.domain = Some(v);
        }
        if let Some(v) = text("CLINIC_AUTH_ALGORITHM") {
            self.algorithm = v;
        }
        if let Some(v) = number("CLINIC_AUTH_CACHE_TTL_SECS")? {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = number("CLINIC_AUTH_FETCH_TIMEOUT_MS")? {
            self.fetch_timeout_ms = v;
        }
        if let Some(v) = number("CLINIC_AUTH_LEEWAY_SECS")? {
            self.leeway_secs = v;
        }
        if let Some(v) = text("CLINIC_AUTH_PERMISSIONS_CLAIM") {
            self.permissions_claim = v;
        }
        Ok(())
    }

    /// Check every setting and produce typed settings.
    pub fn validate(&self) -> Result<AuthSettings, ConfigError> {
        let domain = self
            .domain
            .as_deref()
            .map(|d| d.trim().trim_start_matches("https://").trim_end_matches('/'))
            .filter(|d| !d.is_empty());

        let jwks_url = non_empty(self.jwks_url.as_deref())
            .map(str::to_string)
            .or_else(|| domain.map(|d| format!("https://{d}/.well-known/jwks.json")))
            .ok_or(ConfigError::Missing("jwks_url"))?;
        let jwks_url = parse_key_set_url(&jwks_url)?;

        let issuer = non_empty(self.issuer.as_deref())
            .map(str::to_string)
            .or_else(|| domain.map(|d| format!("https://{d}/")))
            .ok_or(ConfigError::Missing("issuer"))?;
        let audience = non_empty(self.audience.as_deref())
            .map(str::to_string)
            .ok_or(ConfigError::Missing("audience"))?;

        let algorithm: TrustedAlgorithm = self.algorithm.trim().parse()?;

        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl_secs",
                reason: "must be greater than zero",
            });
        }
        if self.fetch_timeout_ms == 0 || self.fetch_timeout_ms > MAX_FETCH_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout_ms",
                reason: "must be between 1 and 60000",
            });
        }
        if self.permissions_claim.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "permissions_claim",
                reason: "must not be empty",
            });
        }
        let routes = RoutePolicy::new(&self.routes)?;

        Ok(AuthSettings {
            jwks_url,
            issuer,
            audience,
            algorithm,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            leeway_secs: self.leeway_secs,
            permissions_claim: self.permissions_claim.trim().to_string(),
            routes,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_key_set_url(raw: &str) -> Result<Url, ConfigError> {
    // Parse properly so `localhost.attacker.com` is not mistaken for localhost
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    let host = url.host_str().ok_or_else(|| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: "no host".to_string(),
    })?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if host == "localhost" || host == "127.0.0.1" => Ok(url),
        "http" => Err(ConfigError::InsecureUrl(raw.to_string())),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
