//! Trusted signing algorithms.
//!
//! Only asymmetric JWS algorithms can be represented here. A verifier is built
//! from a [`TrustedAlgorithm`], so a configuration that names `HS256` (or `none`)
//! is rejected when it is parsed and never reaches the verification path.

use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve};
use jsonwebtoken::Algorithm;
use std::fmt;
use std::str::FromStr;

/// Asymmetric JWS algorithm accepted by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrustedAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256 (the identity provider default)
    #[default]
    Rs256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    Rs384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    Rs512,
    /// RSASSA-PSS using SHA-256
    Ps256,
    /// RSASSA-PSS using SHA-384
    Ps384,
    /// RSASSA-PSS using SHA-512
    Ps512,
    /// ECDSA on P-256 using SHA-256
    Es256,
    /// ECDSA on P-384 using SHA-384
    Es384,
    /// Ed25519
    EdDsa,
}

/// Why a string could not be turned into a [`TrustedAlgorithm`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlgorithmError {
    /// HMAC algorithms share the verification secret and are never trusted.
    #[error("symmetric algorithm '{0}' cannot be trusted for bearer tokens")]
    Symmetric(String),
    /// Not a JWS algorithm name this crate knows.
    #[error("unknown signing algorithm '{0}'")]
    Unknown(String),
}

impl TrustedAlgorithm {
    /// The JWS `alg` name, e.g. `RS256`.
    pub fn as_str(self) -> &'static str {
        match self {
            TrustedAlgorithm::Rs256 => "RS256",
            TrustedAlgorithm::Rs384 => "RS384",
            TrustedAlgorithm::Rs512 => "RS512",
            TrustedAlgorithm::Ps256 => "PS256",
            TrustedAlgorithm::Ps384 => "PS384",
            TrustedAlgorithm::Ps512 => "PS512",
            TrustedAlgorithm::Es256 => "ES256",
            TrustedAlgorithm::Es384 => "ES384",
            TrustedAlgorithm::EdDsa => "EdDSA",
        }
    }

    /// The matching `jsonwebtoken` algorithm.
    pub fn jws(self) -> Algorithm {
        match self {
            TrustedAlgorithm::Rs256 => Algorithm::RS256,
            TrustedAlgorithm::Rs384 => Algorithm::RS384,
            TrustedAlgorithm::Rs512 => Algorithm::RS512,
            TrustedAlgorithm::Ps256 => Algorithm::PS256,
            TrustedAlgorithm::Ps384 => Algorithm::PS384,
            TrustedAlgorithm::Ps512 => Algorithm::PS512,
            TrustedAlgorithm::Es256 => Algorithm::ES256,
            TrustedAlgorithm::Es384 => Algorithm::ES384,
            TrustedAlgorithm::EdDsa => Algorithm::EdDSA,
        }
    }

    /// True when a token header declares exactly this algorithm.
    pub fn matches(self, declared: Algorithm) -> bool {
        self.jws() == declared
    }

    /// True when the JWK key material belongs to this algorithm's key family.
    ///
    /// Symmetric (`oct`) keys never match.
    pub fn accepts_key(self, params: &AlgorithmParameters) -> bool {
        match (self, params) {
            (
                TrustedAlgorithm::Rs256
                | TrustedAlgorithm::Rs384
                | TrustedAlgorithm::Rs512
                | TrustedAlgorithm::Ps256
                | TrustedAlgorithm::Ps384
                | TrustedAlgorithm::Ps512,
                AlgorithmParameters::RSA(_),
            ) => true,
            (TrustedAlgorithm::Es256, AlgorithmParameters::EllipticCurve(ec)) => {
                ec.curve == EllipticCurve::P256
            }
            (TrustedAlgorithm::Es384, AlgorithmParameters::EllipticCurve(ec)) => {
                ec.curve == EllipticCurve::P384
            }
            (TrustedAlgorithm::EdDsa, AlgorithmParameters::OctetKeyPair(okp)) => {
                okp.curve == EllipticCurve::Ed25519
            }
            _ => false,
        }
    }
}

impl fmt::Display for TrustedAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustedAlgorithm {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(TrustedAlgorithm::Rs256),
            "RS384" => Ok(TrustedAlgorithm::Rs384),
            "RS512" => Ok(TrustedAlgorithm::Rs512),
            "PS256" => Ok(TrustedAlgorithm::Ps256),
            "PS384" => Ok(TrustedAlgorithm::Ps384),
            "PS512" => Ok(TrustedAlgorithm::Ps512),
            "ES256" => Ok(TrustedAlgorithm::Es256),
            "ES384" => Ok(TrustedAlgorithm::Es384),
            "EdDSA" => Ok(TrustedAlgorithm::EdDsa),
            "HS256" | "HS384" | "HS512" => Err(AlgorithmError::Symmetric(s.to_string())),
            other => Err(AlgorithmError::Unknown(other.to_string())),
        }
    }
}
