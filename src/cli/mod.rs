//! # CLI Module
//!
//! Operator tooling for the authorization core, shipped as the `clinic-auth`
//! binary.
//!
//! ## Commands
//!
//! ### `check-config`
//!
//! Load and validate the configuration, then print the effective settings:
//!
//! ```bash
//! clinic-auth check-config --config clinic-auth.toml
//! ```
//!
//! ### `keys`
//!
//! Fetch the signing key set once and list every usable key:
//!
//! ```bash
//! clinic-auth keys --config clinic-auth.toml
//! ```
//!
//! ### `route`
//!
//! Show which permission a route requires:
//!
//! ```bash
//! clinic-auth route --method DELETE --path /doctors/7
//! ```
//!
//! ### `verify`
//!
//! Run the full authorization pipeline against a header value. The header
//! may also come from `CLINIC_AUTH_HEADER` so it stays out of shell history:
//!
//! ```bash
//! CLINIC_AUTH_HEADER="Bearer eyJ..." clinic-auth verify --config clinic-auth.toml --permission get:patients
//! ```
//!
//! Prints the verified claims and exits 0, or prints the error body and
//! exits 1.
//!
//! Without `--config`, settings come from `CLINIC_AUTH_*` variables alone.

mod commands;


pub use commands::{execute, run_cli, Cli, Commands};
