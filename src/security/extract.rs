//! Bearer token extraction from the `Authorization` header.
//!
//! The header must be exactly `<scheme><one whitespace><token>` where the
//! scheme is `Bearer` in any letter case. Nothing is trimmed or collapsed: a
//! doubled separator, a leading space or a trailing segment all fail closed.

use super::error::AuthorizationFailure;
use std::fmt;

const NOT_BEARER: &str = "Authorization header must start with \"Bearer\".";
const NO_TOKEN: &str = "Token not found.";
const NOT_TWO_PARTS: &str = "Authorization header must be bearer token.";

/// Raw, still-encoded bearer credential.
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// The encoded token, as presented by the client.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(<{} bytes>)", self.0.len())
    }
}

/// Pull the bearer token out of a raw `Authorization` header value.
///
/// # Errors
///
/// - [`AuthorizationFailure::MissingHeader`] when `header` is `None` or empty
/// - [`AuthorizationFailure::InvalidHeaderFormat`] unless the value is exactly two
///   whitespace-separated parts, the first equal to `Bearer` ignoring case and
///   the second non-empty
pub fn extract_bearer(header: Option<&str>) -> Result<BearerToken, AuthorizationFailure> {
    let value = match header {
        Some(v) if !v.is_empty() => v,
        _ => return Err(AuthorizationFailure::MissingHeader),
    };

    let mut parts = value.split(char::is_whitespace);
    let scheme = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthorizationFailure::InvalidHeaderFormat { reason: NOT_BEARER });
    }

    let token = match parts.next() {
        Some(t) => t,
        None => return Err(AuthorizationFailure::InvalidHeaderFormat { reason: NO_TOKEN }),
    };
    if parts.next().is_some() {
        return Err(AuthorizationFailure::InvalidHeaderFormat {
            reason: NOT_TWO_PARTS,
        });
    }
    if token.is_empty() {
        return Err(AuthorizationFailure::InvalidHeaderFormat { reason: NO_TOKEN });
    }

    Ok(BearerToken(token.to_string()))
}
