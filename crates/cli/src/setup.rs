// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smorgasbord setup`: record which relay server the CLI logs in through.

use std::path::Path;

use tracing::info;

use crate::config::SetupArgs;
use crate::settings;

pub fn run(config_path: &Path, args: &SetupArgs) -> anyhow::Result<()> {
    let base_url = normalize_base_url(&args.base_url)?;
    let mut settings = settings::load(config_path)?;
    settings.base_url = base_url;
    settings::save(config_path, &settings)?;
    info!(path = %config_path.display(), base_url = %settings.base_url, "configuration saved");
    Ok(())
}

/// Absolute http(s) URL without a trailing slash.
pub fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("base URL must not be empty");
    }
    let url = url::Url::parse(trimmed).map_err(|e| anyhow::anyhow!("invalid base URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("invalid base URL: unsupported scheme {:?}", url.scheme());
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "setup_tests.rs"]
mod tests;
