// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smorgasbord login`: run the browser login and store the token.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use smorgasbord_auth::client::AuthClient;

use crate::config::LoginArgs;
use crate::settings;

/// Something that can show a URL to the user.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Hands the URL to the platform's default browser.
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        // On macOS use `open`, on Linux use `xdg-open`, on Windows use `start`.
        let mut cmd = if cfg!(target_os = "macos") {
            std::process::Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut c = std::process::Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else {
            std::process::Command::new("xdg-open")
        };
        cmd.arg(url).spawn().map(|_| ())
    }
}

pub async fn run(
    config_path: &Path,
    args: &LoginArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let opener: Option<&dyn BrowserOpener> =
        if args.no_browser { None } else { Some(&SystemBrowser) };
    login(config_path, args.timeout(), opener, cancel).await?;
    eprintln!("Login successful, token saved to {}", config_path.display());
    Ok(())
}

/// Full login against the configured relay. The token is written back to
/// the configuration file and returned.
pub async fn login(
    config_path: &Path,
    timeout: Duration,
    opener: Option<&dyn BrowserOpener>,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    let mut settings = settings::load(config_path)?;
    if settings.base_url.is_empty() {
        anyhow::bail!("no base URL configured, run `smorgasbord setup --base-url <url>` first");
    }

    let mut client = AuthClient::new(settings.base_url.as_str())?;
    let result = obtain_token(&mut client, timeout, opener, cancel).await;
    client.close().await;

    settings.token = result?;
    settings::save(config_path, &settings)?;
    info!(base_url = %settings.base_url, "login complete");
    Ok(settings.token)
}

async fn obtain_token(
    client: &mut AuthClient,
    timeout: Duration,
    opener: Option<&dyn BrowserOpener>,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    client.start_callback_server().await?;
    let url = client.get_auth_code_url().await.context("failed to get auth code URL")?;

    match opener {
        Some(opener) => match opener.open(&url) {
            Ok(()) => eprintln!("Opening {url}"),
            Err(e) => {
                warn!(err = %e, "failed to open browser");
                eprintln!("Failed to open browser: {e}");
                eprintln!("Open manually: {url}");
            }
        },
        None => eprintln!("Open this URL to log in:\n  {url}"),
    }

    let token = client.wait_until_token_received(timeout, cancel).await?;
    Ok(token.to_owned())
}

#[cfg(test)]
#[path = "login_tests.rs"]
mod tests;
