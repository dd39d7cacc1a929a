//! Permission sets and the permission check.

use super::error::AuthorizationFailure;
use super::verify::VerifiedClaims;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Permission strings granted by a verified token.
///
/// Matching is exact: no wildcards, no hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    /// Read a permission claim.
    ///
    /// Accepts a JSON array of strings or a space-delimited string (OAuth
    /// `scope` style). An absent or `null` claim is the empty set.
    pub fn from_claim(claim: Option<&Value>) -> Result<Self, AuthorizationFailure> {
        match claim {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::String(scopes)) => Ok(scopes.split_whitespace().collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        AuthorizationFailure::invalid_claims("permission entries must be strings")
                    })
                })
                .collect::<Result<BTreeSet<_>, _>>()
                .map(Self),
            Some(_) => Err(AuthorizationFailure::invalid_claims(
                "permissions must be an array or a space-delimited string",
            )),
        }
    }

    /// Exact membership test.
    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Number of distinct permissions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is granted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Permissions in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Require `required` in the claims' permission set.
///
/// Only ever fails with [`AuthorizationFailure::InsufficientPermission`]: the
/// caller's identity is already established at this point.
pub fn check_permission(claims: &VerifiedClaims, required: &str) -> Result<(), AuthorizationFailure> {
    if claims.permissions().contains(required) {
        debug!(permission = required, "permission granted");
        Ok(())
    } else {
        Err(AuthorizationFailure::InsufficientPermission {
            required: required.to_string(),
        })
    }
}
