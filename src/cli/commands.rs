use crate::config::AuthConfig;
use crate::policy::RoutePolicy;
use crate::security::{Access, AuthorizationGate, JwksKeyProvider};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::Method;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Command-line interface for the clinic authorization core
#[derive(Parser, Debug)]
#[command(name = "clinic-auth")]
#[command(about = "Inspect and exercise clinic bearer-token authorization", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and print the effective settings
    CheckConfig {
        /// TOML configuration file
        #[arg(short, long, env = "CLINIC_AUTH_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Fetch the signing key set and list the usable keys
    Keys {
        /// TOML configuration file
        #[arg(short, long, env = "CLINIC_AUTH_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the access rule for a route
    Route {
        /// HTTP method
        #[arg(short, long)]
        method: String,

        /// Request path, e.g. /patients/12
        #[arg(short, long)]
        path: String,

        /// TOML configuration file; the clinic route table when absent
        #[arg(short, long, env = "CLINIC_AUTH_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Authorize an Authorization header value
    Verify {
        /// TOML configuration file
        #[arg(short, long, env = "CLINIC_AUTH_CONFIG")]
        config: Option<PathBuf>,

        /// Required permission; only authenticate when absent
        #[arg(long)]
        permission: Option<String>,

        /// Raw Authorization header value
        #[arg(long, env = "CLINIC_AUTH_HEADER", hide_env_values = true)]
        header: Option<String>,
    },
}

/// Parse the process arguments and run the command.
///
/// Returns `Ok(false)` when the command ran but reported a negative
/// outcome (authorization failure, unknown route).
pub fn run_cli() -> Result<bool> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out)
}

/// Run `cli`, writing the command's output to `out`.
pub fn execute(cli: &Cli, out: &mut dyn Write) -> Result<bool> {
    match &cli.command {
        Commands::CheckConfig { config } => check_config(config.as_deref(), out),
        Commands::Keys { config } => keys(config.as_deref(), out),
        Commands::Route {
            method,
            path,
            config,
        } => route(method, path, config.as_deref(), out),
        Commands::Verify {
            config,
            permission,
            header,
        } => verify(
            config.as_deref(),
            permission.as_deref(),
            header.as_deref(),
            out,
        ),
    }
}

fn load_config(path: Option<&Path>) -> Result<AuthConfig> {
    match path {
        Some(path) => AuthConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => AuthConfig::from_env().context("reading configuration from environment"),
    }
}

fn check_config(path: Option<&Path>, out: &mut dyn Write) -> Result<bool> {
    let settings = load_config(path)?
        .validate()
        .context("configuration is invalid")?;
    let summary = json!({
        "jwks_url": settings.jwks_url.as_str(),
        "issuer": settings.issuer,
        "audience": settings.audience,
        "algorithm": settings.algorithm.as_str(),
        "cache_ttl_secs": settings.cache_ttl.as_secs(),
        "fetch_timeout_ms": settings.fetch_timeout.as_millis() as u64,
        "leeway_secs": settings.leeway_secs,
        "permissions_claim": settings.permissions_claim,
        "routes": settings.routes.len(),
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
    Ok(true)
}

fn keys(path: Option<&Path>, out: &mut dyn Write) -> Result<bool> {
    let settings = load_config(path)?
        .validate()
        .context("configuration is invalid")?;
    let provider = JwksKeyProvider::from_url(
        settings.jwks_url.as_str(),
        settings.algorithm,
        settings.fetch_timeout,
    )?;
    let count = provider
        .refresh()
        .with_context(|| format!("fetching key set from {}", settings.jwks_url))?;
    if let Some(set) = provider.cached() {
        for kid in set.kids() {
            writeln!(out, "{kid}\t{}", settings.algorithm)?;
        }
    }
    writeln!(out, "{count} usable key(s)")?;
    Ok(count > 0)
}

fn route(method: &str, path: &str, config: Option<&Path>, out: &mut dyn Write) -> Result<bool> {
    let policy = match config {
        Some(config) => RoutePolicy::new(&load_config(Some(config))?.routes)?,
        None => RoutePolicy::clinic(),
    };
    let method: Method = method
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("invalid HTTP method '{method}'"))?;
    match policy.lookup(&method, path) {
        Some(Access::Public) => {
            writeln!(out, "{method} {path}: public")?;
            Ok(true)
        }
        Some(Access::Requires(permission)) => {
            writeln!(out, "{method} {path}: requires {permission}")?;
            Ok(true)
        }
        None => {
            writeln!(out, "{method} {path}: no matching route")?;
            Ok(false)
        }
    }
}

fn verify(
    config: Option<&Path>,
    permission: Option<&str>,
    header: Option<&str>,
    out: &mut dyn Write,
) -> Result<bool> {
    let gate = AuthorizationGate::from_config(&load_config(config)?)
        .context("configuration is invalid")?;
    let result = match permission {
        Some(permission) => gate.authorize(header, permission),
        None => gate.authenticate(header),
    };
    match result {
        Ok(claims) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&claims)?)?;
            Ok(true)
        }
        Err(failure) => {
            writeln!(out, "{}", failure.to_body().to_json())?;
            Ok(false)
        }
    }
}
