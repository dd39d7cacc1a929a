//! # clinic-auth
//!
//! Request authorization core of the clinic service (doctors, patients,
//! appointments): bearer-token extraction, JWKS signing-key caching, token
//! verification and per-route permission enforcement.
//!
//! ## Overview
//!
//! The HTTP layer hands the gate one `Authorization` header value and the
//! permission its route requires. The gate answers with the verified claims
//! or an [`AuthorizationFailure`](security::AuthorizationFailure) that
//! renders as a 401 or 403 JSON response.
//!
//! ## Architecture
//!
//! - **[`security`]** - extraction, key provider, verifier, permission check and the gate
//! - **[`policy`]** - route table mapping `(method, path)` to a required permission
//! - **[`config`]** - TOML/environment configuration, validated once at startup
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - the `clinic-auth` operator binary
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clinic_auth::config::AuthConfig;
//! use clinic_auth::security::AuthorizationGate;
//! use http::Method;
//!
//! let settings = AuthConfig::load("clinic-auth.toml")?.validate()?;
//! let gate = AuthorizationGate::from_settings(&settings)?;
//!
//! if let Some(access) = settings.routes.lookup(&Method::DELETE, "/doctors/7") {
//!     match gate.enforce(&access, Some("Bearer eyJ...")) {
//!         Ok(claims) => println!("authorized: {:?}", claims.map(|c| c.permissions().len())),
//!         Err(failure) => {
//!             let response = failure.to_response();
//!             println!("{} {}", response.status(), response.body());
//!         }
//!     }
//! }
//! # Ok::<(), clinic_auth::config::ConfigError>(())
//! ```

pub mod cli;
pub mod config;
pub mod logging;
pub mod policy;
pub mod security;
