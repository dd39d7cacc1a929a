//! # Security Module
//!
//! The request authorization core: bearer-token extraction, signing-key
//! acquisition, token verification and permission enforcement.
//!
//! ## Architecture
//!
//! Authorization of one request follows this flow and stops at the first
//! failure:
//!
//! 1. [`extract_bearer`] pulls the token out of the `Authorization` header
//! 2. [`TokenVerifier`] decodes the header, checks the declared algorithm and
//!    resolves the signing key through a [`KeyResolver`]
//! 3. the signature is verified, then `exp`, `iss` and `aud`
//! 4. [`check_permission`] requires the route's permission string
//!
//! [`AuthorizationGate`] wires these steps together. Every failure is one
//! [`AuthorizationFailure`] variant that renders as a 401 or 403 response.
//!
//! ## Key Provider
//!
//! [`JwksKeyProvider`] is the only shared mutable state. Reads are lock-free;
//! a miss or an expired set triggers one single-flight fetch through a
//! [`KeySource`] ([`HttpKeySource`] in production).
//!
//! ## Algorithm Trust
//!
//! The verifier is built from a [`TrustedAlgorithm`], which has no symmetric
//! variants, and keys are admitted to the cache only when their family
//! matches it. A token declaring any other algorithm is rejected before a
//! key is looked up.
//!
//! ```rust,no_run
//! use clinic_auth::security::{
//!     AuthorizationGate, JwksKeyProvider, TokenVerifier, TrustedAlgorithm,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let provider = JwksKeyProvider::from_url(
//!     "https://clinic.eu.auth0.com/.well-known/jwks.json",
//!     TrustedAlgorithm::Rs256,
//!     Duration::from_secs(5),
//! )?;
//! let verifier = TokenVerifier::new(Arc::new(provider), TrustedAlgorithm::Rs256);
//! let gate = AuthorizationGate::new(verifier, "doctors-crm", "https://clinic.eu.auth0.com/");
//!
//! match gate.authorize(Some("Bearer eyJ..."), "get:patients") {
//!     Ok(claims) => println!("hello {:?}", claims.subject()),
//!     Err(failure) => println!("{} {}", failure.status(), failure.to_body().to_json()),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod algorithm;
mod clock;
mod error;
mod extract;
mod gate;
mod jwks;
mod permission;
mod verify;

pub use algorithm::{AlgorithmError, TrustedAlgorithm};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthorizationFailure, ErrorBody};
pub use extract::{extract_bearer, BearerToken};
pub use gate::{Access, AuthorizationGate};
pub use jwks::{
    parse_key_set, HttpKeySource, JwksKeyProvider, KeyRejected, KeyResolver, KeySet, KeySource,
    KeySourceError, SigningKey, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, MAX_DOCUMENT_BYTES,
};
pub use permission::{check_permission, PermissionSet};
pub use verify::{Audience, TokenHeader, TokenVerifier, VerifiedClaims, DEFAULT_PERMISSIONS_CLAIM};
