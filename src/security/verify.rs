//! Token verification.
//!
//! [`TokenVerifier::verify`] is the only way to obtain [`VerifiedClaims`]. It
//! runs the checks in a fixed order and stops at the first failure:
//!
//! 1. the header decodes (three segments, base64url JSON)
//! 2. the declared `alg` is exactly the trusted algorithm
//! 3. the `kid` resolves to a signing key
//! 4. the signature verifies with that key
//! 5. `exp` is present and not in the past, `iss` and `aud` match
//! 6. the permission claim is read
//!
//! The header is read before the signature is checked but only selects the
//! key; nothing in it grants access.

use super::algorithm::TrustedAlgorithm;
use super::clock::{Clock, SystemClock};
use super::error::AuthorizationFailure;
use super::extract::BearerToken;
use super::jwks::KeyResolver;
use super::permission::PermissionSet;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Default name of the claim carrying permission strings.
pub const DEFAULT_PERMISSIONS_CLAIM: &str = "permissions";

/// Unverified header fields, used only to pick a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared `alg`.
    pub algorithm: Algorithm,
    /// Declared `kid`, if any.
    pub kid: Option<String>,
}

impl TokenHeader {
    /// Decode the header segment without verifying anything.
    pub fn decode(token: &str) -> Result<Self, AuthorizationFailure> {
        if token.split('.').count() != 3 {
            return Err(AuthorizationFailure::invalid_token(
                "token must have three segments",
            ));
        }
        let header = jsonwebtoken::decode_header(token).map_err(|_| {
            AuthorizationFailure::invalid_token("header is not base64url-encoded JSON")
        })?;
        Ok(Self {
            algorithm: header.alg,
            kid: header.kid,
        })
    }
}

/// The `aud` claim: one audience or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "doctors-crm"`
    One(String),
    /// `"aud": ["doctors-crm", "https://clinic.example/userinfo"]`
    Many(Vec<String>),
}

impl Audience {
    /// True when `expected` is, or is among, the audiences.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Payload of a token whose signature, algorithm and registered claims
/// have all been checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedClaims {
    #[serde(rename = "sub", skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(rename = "iss")]
    issuer: String,
    #[serde(rename = "aud")]
    audience: Audience,
    #[serde(rename = "iat", skip_serializing_if = "Option::is_none")]
    issued_at: Option<i64>,
    #[serde(rename = "exp")]
    expires_at: i64,
    permissions: PermissionSet,
    #[serde(skip)]
    payload: Map<String, Value>,
}

impl VerifiedClaims {
    /// `sub`, when the issuer sets one.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// `iss`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `aud`
    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// `iat`
    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    /// `exp`
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Granted permissions.
    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Any other payload member, e.g. a custom profile claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

/// Verifies bearer tokens against keys from a [`KeyResolver`].
pub struct TokenVerifier {
    resolver: Arc<dyn KeyResolver>,
    algorithm: TrustedAlgorithm,
    validation: Validation,
    leeway: i64,
    permissions_claim: String,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Verifier trusting exactly `algorithm`.
    pub fn new(resolver: Arc<dyn KeyResolver>, algorithm: TrustedAlgorithm) -> Self {
        // The library only checks the signature; registered claims are
        // checked below against the injected clock.
        let mut validation = Validation::new(algorithm.jws());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            resolver,
            algorithm,
            validation,
            leeway: 0,
            permissions_claim: DEFAULT_PERMISSIONS_CLAIM.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Accept tokens up to `secs` seconds past `exp`.
    pub fn leeway(mut self, secs: u64) -> Self {
        self.leeway = i64::try_from(secs).unwrap_or(i64::MAX);
        self
    }

    /// Read permissions from `claim` instead of `permissions`.
    pub fn permissions_claim(mut self, claim: impl Into<String>) -> Self {
        self.permissions_claim = claim.into();
        self
    }

    /// Use `clock` for the expiry check.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The single trusted algorithm.
    pub fn algorithm(&self) -> TrustedAlgorithm {
        self.algorithm
    }

    /// Verify `token` and check it was issued by `issuer` for `audience`.
    pub fn verify(
        &self,
        token: &BearerToken,
        audience: &str,
        issuer: &str,
    ) -> Result<VerifiedClaims, AuthorizationFailure> {
        let header = TokenHeader::decode(token.as_str())?;
        if !self.algorithm.matches(header.algorithm) {
            return Err(AuthorizationFailure::invalid_token(format!(
                "algorithm {:?} is not trusted",
                header.algorithm
            )));
        }
        let kid = match header.kid {
            Some(kid) if !kid.is_empty() => kid,
            _ => return Err(AuthorizationFailure::invalid_token("header has no 'kid'")),
        };

        let key = self.resolver.resolve(&kid)?;
        if key.algorithm() != self.algorithm {
            return Err(AuthorizationFailure::invalid_token(format!(
                "key '{kid}' is not a {} key",
                self.algorithm
            )));
        }

        let payload = jsonwebtoken::decode::<Value>(
            token.as_str(),
            key.decoding_key(),
            &self.validation,
        )
        .map_err(|e| signature_failure(e.kind()))?
        .claims;
        let Value::Object(payload) = payload else {
            return Err(AuthorizationFailure::invalid_token(
                "payload is not a JSON object",
            ));
        };

        let claims = self.check_claims(payload, audience, issuer)?;
        debug!(
            kid = %kid,
            sub = claims.subject().unwrap_or(""),
            permissions = claims.permissions().len(),
            "token verified"
        );
        Ok(claims)
    }

    fn check_claims(
        &self,
        payload: Map<String, Value>,
        audience: &str,
        issuer: &str,
    ) -> Result<VerifiedClaims, AuthorizationFailure> {
        let expires_at = match payload.get("exp") {
            None | Some(Value::Null) => return Err(AuthorizationFailure::ExpiredToken),
            Some(exp) => numeric_date(exp, "exp")?,
        };
        if expires_at.saturating_add(self.leeway) < self.clock.now() {
            return Err(AuthorizationFailure::ExpiredToken);
        }

        let token_issuer = match payload.get("iss") {
            None => return Err(AuthorizationFailure::invalid_claims("issuer is missing")),
            Some(Value::String(iss)) => iss.clone(),
            Some(_) => return Err(AuthorizationFailure::invalid_claims("'iss' must be a string")),
        };
        if token_issuer != issuer {
            return Err(AuthorizationFailure::invalid_claims("issuer mismatch"));
        }

        let token_audience = match payload.get("aud") {
            None => return Err(AuthorizationFailure::invalid_claims("audience is missing")),
            Some(aud) => Audience::deserialize(aud).map_err(|_| {
                AuthorizationFailure::invalid_claims("'aud' must be a string or an array of strings")
            })?,
        };
        if !token_audience.contains(audience) {
            return Err(AuthorizationFailure::invalid_claims("audience mismatch"));
        }

        let subject = match payload.get("sub") {
            None | Some(Value::Null) => None,
            Some(Value::String(sub)) => Some(sub.clone()),
            Some(_) => return Err(AuthorizationFailure::invalid_claims("'sub' must be a string")),
        };
        let issued_at = match payload.get("iat") {
            None | Some(Value::Null) => None,
            Some(iat) => Some(numeric_date(iat, "iat")?),
        };
        let permissions = PermissionSet::from_claim(payload.get(&self.permissions_claim))?;

        Ok(VerifiedClaims {
            subject,
            issuer: token_issuer,
            audience: token_audience,
            issued_at,
            expires_at,
            permissions,
            payload,
        })
    }
}

// NumericDate per RFC 7519; fractional seconds are truncated.
fn numeric_date(value: &Value, name: &str) -> Result<i64, AuthorizationFailure> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        .ok_or_else(|| AuthorizationFailure::invalid_claims(format!("'{name}' must be a number")))
}

fn signature_failure(kind: &ErrorKind) -> AuthorizationFailure {
    let reason = match kind {
        ErrorKind::InvalidSignature => "signature does not verify",
        ErrorKind::InvalidAlgorithm => "algorithm is not trusted",
        ErrorKind::Base64(_) => "token segments are not base64url-encoded",
        ErrorKind::Json(_) => "payload is not a JSON object",
        ErrorKind::Utf8(_) => "token is not valid UTF-8",
        _ => "token could not be verified",
    };
    AuthorizationFailure::invalid_token(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;

    fn segment(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json)
    }

    #[test]
    fn test_header_needs_three_segments() {
        for token in ["abc", "a.b", "a.b.c.d", ""] {
            let err = TokenHeader::decode(token).unwrap_err();
            assert_eq!(err.code(), "invalid_token", "{token}");
        }
    }

    #[test]
    fn test_header_must_be_base64_json() {
        let err = TokenHeader::decode("%%%.e30.sig").unwrap_err();
        assert_eq!(err.code(), "invalid_token");

        let not_json = format!("{}.e30.sig", segment("not json"));
        assert_eq!(TokenHeader::decode(&not_json).unwrap_err().code(), "invalid_token");
    }

    #[test]
    fn test_header_fields() {
        let token = format!(
            "{}.e30.sig",
            segment(r#"{"alg":"RS256","typ":"JWT","kid":"clinic-k1"}"#)
        );
        let header = TokenHeader::decode(&token).unwrap();
        assert_eq!(header.algorithm, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("clinic-k1"));
    }

    #[test]
    fn test_alg_none_is_malformed() {
        let token = format!("{}.e30.", segment(r#"{"alg":"none"}"#));
        assert_eq!(TokenHeader::decode(&token).unwrap_err().code(), "invalid_token");
    }

    #[test]
    fn test_audience_forms() {
        let one: Audience = serde_json::from_str(r#""doctors-crm""#).unwrap();
        assert!(one.contains("doctors-crm"));
        assert!(!one.contains("doctors"));

        let many: Audience = serde_json::from_str(r#"["a", "doctors-crm"]"#).unwrap();
        assert!(many.contains("doctors-crm"));
        assert!(!many.contains("b"));
    }

    #[test]
    fn test_numeric_date() {
        assert_eq!(numeric_date(&serde_json::json!(1_700_000_000), "exp").unwrap(), 1_700_000_000);
        assert_eq!(numeric_date(&serde_json::json!(12.9), "exp").unwrap(), 12);
        assert_eq!(
            numeric_date(&serde_json::json!("1700000000"), "exp").unwrap_err().code(),
            "invalid_claims"
        );
    }
}
