//! Authorization failure taxonomy and its HTTP rendering.
//!
//! Every step of the authorization pipeline fails with exactly one
//! [`AuthorizationFailure`] variant. The variant decides the status code a
//! client sees: 401 for "who you are" failures, 403 for "what you may do".
//!
//! ```rust
//! use clinic_auth::security::AuthorizationFailure;
//!
//! let failure = AuthorizationFailure::InsufficientPermission {
//!     required: "delete:doctors".to_string(),
//! };
//! assert_eq!(failure.status().as_u16(), 403);
//! assert_eq!(failure.to_body().error, 403);
//! ```

use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, WWW_AUTHENTICATE,
};
use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CORS_ALLOW_HEADERS: &str = "Content-Type,Authorization,true";
const CORS_ALLOW_METHODS: &str = "GET,PATCH,POST,DELETE,OPTIONS";

/// Why a request was not authorized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationFailure {
    /// No `Authorization` header, or an empty one.
    #[error("Authorization header is expected.")]
    MissingHeader,

    /// The header is present but is not `Bearer <token>`.
    #[error("{reason}")]
    InvalidHeaderFormat {
        /// What was wrong with the header.
        reason: &'static str,
    },

    /// The token is structurally malformed, declares an untrusted algorithm,
    /// or its signature does not verify.
    #[error("Unable to parse authentication token: {reason}.")]
    InvalidToken {
        /// Which check rejected the token.
        reason: String,
    },

    /// No usable signing key with the token's key identifier, including when
    /// the key set could not be fetched.
    #[error("Unable to find the appropriate key (kid '{kid}').")]
    KeyNotFound {
        /// Key identifier taken from the token header.
        kid: String,
    },

    /// The `exp` claim is missing or in the past.
    #[error("Token expired.")]
    ExpiredToken,

    /// Issuer, audience or claim shape is wrong.
    #[error("Incorrect claims: {reason}.")]
    InvalidClaims {
        /// Which claim check failed.
        reason: String,
    },

    /// The token is valid but lacks the permission the operation requires.
    #[error("Permission '{required}' not found.")]
    InsufficientPermission {
        /// The permission string the route asked for.
        required: String,
    },
}

impl AuthorizationFailure {
    pub(crate) fn invalid_token(reason: impl Into<String>) -> Self {
        AuthorizationFailure::InvalidToken {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_claims(reason: impl Into<String>) -> Self {
        AuthorizationFailure::InvalidClaims {
            reason: reason.into(),
        }
    }

    /// HTTP status the collaborating layer must answer with.
    pub fn status(&self) -> StatusCode {
        if self.is_authentication_failure() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::FORBIDDEN
        }
    }

    /// True for failures about the caller's identity (401), false for the
    /// permission failure (403).
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, AuthorizationFailure::InsufficientPermission { .. })
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthorizationFailure::MissingHeader => "authorization_header_missing",
            AuthorizationFailure::InvalidHeaderFormat { .. } => "invalid_header",
            AuthorizationFailure::InvalidToken { .. } => "invalid_token",
            AuthorizationFailure::KeyNotFound { .. } => "key_not_found",
            AuthorizationFailure::ExpiredToken => "token_expired",
            AuthorizationFailure::InvalidClaims { .. } => "invalid_claims",
            AuthorizationFailure::InsufficientPermission { .. } => "insufficient_permission",
        }
    }

    /// RFC 6750 `WWW-Authenticate` challenge for this failure.
    pub fn challenge(&self) -> &'static str {
        match self {
            AuthorizationFailure::MissingHeader => "Bearer",
            AuthorizationFailure::InvalidHeaderFormat { .. } => r#"Bearer error="invalid_request""#,
            AuthorizationFailure::InsufficientPermission { .. } => {
                r#"Bearer error="insufficient_scope""#
            }
            _ => r#"Bearer error="invalid_token""#,
        }
    }

    /// JSON body in the shape every error response of the service uses.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.status().as_u16(),
            message: self.to_string(),
        }
    }

    /// Render as a complete HTTP response.
    pub fn to_response(&self) -> Response<String> {
        let mut response = Response::new(self.to_body().to_json());
        *response.status_mut() = self.status();

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static(self.challenge()));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        );
        response
    }
}

/// `{"success": false, "error": <status>, "message": <description>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `false` for errors.
    pub success: bool,
    /// Numeric HTTP status.
    pub error: u16,
    /// Human-readable description.
    pub message: String,
}

impl ErrorBody {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        // Plain scalar fields; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}
