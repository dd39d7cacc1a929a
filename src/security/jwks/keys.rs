//! Signing keys and the cached key set.

use crate::security::algorithm::TrustedAlgorithm;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// A public verification key published by the token issuer.
///
/// Only built by [`SigningKey::from_jwk`], which refuses symmetric material
/// and keys from another algorithm family than the trusted one.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: TrustedAlgorithm,
    key: DecodingKey,
}

/// Why a JWK was left out of the key set.
#[derive(Debug, Error)]
pub enum KeyRejected {
    /// Every usable key needs a `kid` to be selectable.
    #[error("key has no 'kid'")]
    MissingKid,
    /// `kty: oct` keys are shared secrets.
    #[error("symmetric key material is never trusted")]
    Symmetric,
    /// `use: enc` keys are not for signatures.
    #[error("key is published for encryption, not signatures")]
    EncryptionUse,
    /// The JWK's own `alg` names another algorithm.
    #[error("key declares algorithm {declared}, expected {expected}")]
    AlgorithmMismatch {
        /// `alg` member of the JWK.
        declared: String,
        /// The trusted algorithm.
        expected: TrustedAlgorithm,
    },
    /// Key type or curve cannot produce signatures for the trusted algorithm.
    #[error("key type does not fit algorithm {0}")]
    WrongFamily(TrustedAlgorithm),
    /// The key parameters do not decode.
    #[error("key material is invalid: {0}")]
    Material(#[source] jsonwebtoken::errors::Error),
}

impl SigningKey {
    /// Build a verification key from one JWK of the issuer's key set.
    pub fn from_jwk(jwk: &Jwk, trusted: TrustedAlgorithm) -> Result<Self, KeyRejected> {
        let kid = match jwk.common.key_id.as_deref() {
            Some(kid) if !kid.is_empty() => kid.to_string(),
            _ => return Err(KeyRejected::MissingKid),
        };
        if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
            return Err(KeyRejected::Symmetric);
        }
        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return Err(KeyRejected::EncryptionUse);
        }
        if let Some(declared) = &jwk.common.key_algorithm {
            let declared = declared.to_string();
            if declared != trusted.as_str() {
                return Err(KeyRejected::AlgorithmMismatch {
                    declared,
                    expected: trusted,
                });
            }
        }
        if !trusted.accepts_key(&jwk.algorithm) {
            return Err(KeyRejected::WrongFamily(trusted));
        }
        let key = DecodingKey::from_jwk(jwk).map_err(KeyRejected::Material)?;
        Ok(Self {
            kid,
            algorithm: trusted,
            key,
        })
    }

    /// Key identifier (`kid`).
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm this key verifies.
    pub fn algorithm(&self) -> TrustedAlgorithm {
        self.algorithm
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Snapshot of the issuer's usable signing keys, keyed by `kid`.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: i64,
}

impl KeySet {
    /// Keep every JWK usable with `trusted`; log and drop the rest.
    ///
    /// When two keys share a `kid` the first one wins.
    pub fn from_jwks(jwks: &JwkSet, trusted: TrustedAlgorithm, fetched_at: i64) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for (index, jwk) in jwks.keys.iter().enumerate() {
            let key = match SigningKey::from_jwk(jwk, trusted) {
                Ok(key) => key,
                Err(reason) => {
                    warn!(
                        index,
                        kid = jwk.common.key_id.as_deref().unwrap_or(""),
                        %reason,
                        "excluding key from signing key set"
                    );
                    continue;
                }
            };
            match keys.entry(key.kid.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(key));
                }
                Entry::Occupied(_) => {
                    warn!(index, kid = %key.kid, "duplicate kid in key set, keeping the first");
                }
            }
        }
        Self { keys, fetched_at }
    }

    /// Look up a key by identifier.
    pub fn get(&self, kid: &str) -> Option<&Arc<SigningKey>> {
        self.keys.get(kid)
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the document held no usable key.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Identifiers of all usable keys, sorted.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }

    /// Unix time the set was fetched.
    pub fn fetched_at(&self) -> i64 {
        self.fetched_at
    }

    /// True once the set has been cached for `ttl` or longer.
    pub fn is_stale(&self, now: i64, ttl: Duration) -> bool {
        let age = now.saturating_sub(self.fetched_at);
        age < 0 || age as u64 >= ttl.as_secs()
    }
}
