// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use smorgasbord_auth::handler::{appendix_mutator, HandlerConfig};

/// Default location of the CLI configuration file, relative to `$HOME`.
pub const DEFAULT_CONFIG_FILE: &str = ".smorgasbord";

/// Browser-delegated OIDC login for command line tools.
#[derive(Debug, Parser)]
#[command(name = "smorgasbord", version, about)]
pub struct Cli {
    /// Path of the CLI configuration file [default: $HOME/.smorgasbord].
    #[arg(long, env = "SMORGASBORD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "SMORGASBORD_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, env = "SMORGASBORD_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay server in front of the OIDC provider.
    Server(ServerArgs),
    /// Point the CLI at a relay server.
    Setup(SetupArgs),
    /// Log in through the browser and store the token.
    Login(LoginArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, env = "SMORGASBORD_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// OAuth client id registered with the provider.
    #[arg(long, env = "SMORGASBORD_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret registered with the provider.
    #[arg(long, env = "SMORGASBORD_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Issuer URL of the OIDC provider.
    #[arg(long, env = "SMORGASBORD_ISSUER_URL")]
    pub issuer_url: String,

    /// Public URL of this server's `/auth/callback`.
    #[arg(long, env = "SMORGASBORD_REDIRECT_URL")]
    pub redirect_url: String,

    /// Appended verbatim to every authorization URL (e.g. `&connector_id=ldap`).
    #[arg(long, env = "SMORGASBORD_AUTH_CODE_URL_APPENDIX", default_value = "")]
    pub auth_code_url_appendix: String,

    /// Secret seed for the login nonce. Random per process when unset.
    #[arg(long, env = "SMORGASBORD_NONCE", hide_env_values = true)]
    pub nonce: Option<String>,

    /// Seconds to wait for in-flight requests on shutdown.
    #[arg(long, env = "SMORGASBORD_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct SetupArgs {
    /// Base URL of the relay server.
    #[arg(long)]
    pub base_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// Seconds to wait for the browser login to complete.
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Print the login URL instead of opening a browser.
    #[arg(long)]
    pub no_browser: bool,
}

impl Cli {
    /// Checks clap cannot express. Failures exit with status 2.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        if let Command::Server(ref args) = self.command {
            args.validate()?;
        }
        Ok(())
    }

    /// Configuration file path, falling back to `$HOME/.smorgasbord`.
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref path) = self.config {
            return Ok(path.clone());
        }
        match std::env::var("HOME") {
            Ok(home) if !home.is_empty() => Ok(PathBuf::from(home).join(DEFAULT_CONFIG_FILE)),
            _ => anyhow::bail!("HOME is not set; pass --config"),
        }
    }
}

impl ServerArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid --addr {:?}: {e}", self.addr))?;
        for (flag, value) in [
            ("--client-id", &self.client_id),
            ("--issuer-url", &self.issuer_url),
            ("--redirect-url", &self.redirect_url),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{flag} must not be empty");
            }
        }
        url::Url::parse(&self.redirect_url)
            .map_err(|e| anyhow::anyhow!("invalid --redirect-url: {e}"))?;
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn handler_config(&self, nonce_secret: String) -> HandlerConfig {
        HandlerConfig {
            issuer_url: self.issuer_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_url: self.redirect_url.clone(),
            nonce_secret,
            auth_code_url_mutator: appendix_mutator(self.auth_code_url_appendix.clone()),
        }
    }
}

impl LoginArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
