//! The authorization gate.
//!
//! Runs extraction, verification and the permission check for one request
//! and stops at the first failure. A route calls the gate before doing any
//! work of its own; on success it gets the verified claims back.

use super::error::AuthorizationFailure;
use super::extract::extract_bearer;
use super::jwks::JwksKeyProvider;
use super::permission::check_permission;
use super::verify::{TokenVerifier, VerifiedClaims};
use crate::config::{AuthConfig, AuthSettings, ConfigError};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a route requires from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Anyone may call the route; no header is read.
    Public,
    /// A verified token holding this permission.
    Requires(String),
}

/// Stateless per-request authorization pipeline.
pub struct AuthorizationGate {
    verifier: TokenVerifier,
    audience: String,
    issuer: String,
}

impl AuthorizationGate {
    /// Gate accepting tokens from `issuer` minted for `audience`.
    pub fn new(
        verifier: TokenVerifier,
        audience: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            audience: audience.into(),
            issuer: issuer.into(),
        }
    }

    /// Validate `config` and wire the HTTP key provider and verifier.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        Self::from_settings(&config.validate()?)
    }

    /// Wire the gate from already validated settings.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, ConfigError> {
        let provider = JwksKeyProvider::from_url(
            settings.jwks_url.as_str(),
            settings.algorithm,
            settings.fetch_timeout,
        )
        .map_err(ConfigError::KeySource)?
        .cache_ttl(settings.cache_ttl);

        let verifier = TokenVerifier::new(Arc::new(provider), settings.algorithm)
            .leeway(settings.leeway_secs)
            .permissions_claim(settings.permissions_claim.clone());
        Ok(Self::new(
            verifier,
            settings.audience.clone(),
            settings.issuer.clone(),
        ))
    }

    /// Expected `aud`.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Expected `iss`.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Extract and verify the token, without a permission check.
    pub fn authenticate(&self, header: Option<&str>) -> Result<VerifiedClaims, AuthorizationFailure> {
        let result = extract_bearer(header)
            .and_then(|token| self.verifier.verify(&token, &self.audience, &self.issuer));
        if let Err(failure) = &result {
            log_failure(failure, None);
        }
        result
    }

    /// Full pipeline: extract, verify, then require `permission`.
    pub fn authorize(
        &self,
        header: Option<&str>,
        permission: &str,
    ) -> Result<VerifiedClaims, AuthorizationFailure> {
        let claims = self.authenticate(header)?;
        if let Err(failure) = check_permission(&claims, permission) {
            log_failure(&failure, claims.subject());
            return Err(failure);
        }
        Ok(claims)
    }

    /// [`authorize`](Self::authorize) reading `Authorization` from a header map.
    ///
    /// A header value that is not visible ASCII is a format failure.
    pub fn authorize_headers(
        &self,
        headers: &HeaderMap,
        permission: &str,
    ) -> Result<VerifiedClaims, AuthorizationFailure> {
        let header = match headers.get(AUTHORIZATION) {
            None => None,
            Some(value) => match value.to_str() {
                Ok(value) => Some(value),
                Err(_) => {
                    let failure = AuthorizationFailure::InvalidHeaderFormat {
                        reason: "Authorization header must be bearer token.",
                    };
                    log_failure(&failure, None);
                    return Err(failure);
                }
            },
        };
        self.authorize(header, permission)
    }

    /// Apply a route's access rule. Public routes skip the pipeline.
    pub fn enforce(
        &self,
        access: &Access,
        header: Option<&str>,
    ) -> Result<Option<VerifiedClaims>, AuthorizationFailure> {
        match access {
            Access::Public => Ok(None),
            Access::Requires(permission) => self.authorize(header, permission).map(Some),
        }
    }
}

fn log_failure(failure: &AuthorizationFailure, subject: Option<&str>) {
    match failure {
        AuthorizationFailure::MissingHeader => {
            debug!(code = failure.code(), "authorization failed: no credentials");
        }
        AuthorizationFailure::InsufficientPermission { required } => {
            warn!(
                code = failure.code(),
                status = failure.status().as_u16(),
                permission = %required,
                sub = subject.unwrap_or(""),
                "authorization failed"
            );
        }
        _ => {
            warn!(
                code = failure.code(),
                status = failure.status().as_u16(),
                reason = %failure,
                "authorization failed"
            );
        }
    }
}
