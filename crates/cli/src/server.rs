// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smorgasbord server`: the public relay between CLIs and the OIDC provider.

use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use smorgasbord_auth::handler::AuthHandler;
use smorgasbord_auth::routes::build_router;

use crate::config::ServerArgs;

/// Relay routes plus health check, CORS and request tracing.
pub fn build_app(handler: Arc<AuthHandler>) -> Router {
    build_router(handler)
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Nonce seed from the flags, or a fresh random one.
pub fn nonce_secret(configured: Option<&str>) -> String {
    match configured {
        Some(seed) if !seed.is_empty() => seed.to_owned(),
        _ => {
            warn!("no --nonce configured, using a random seed; logins started before a restart will fail");
            random_seed()
        }
    }
}

fn random_seed() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub async fn run(args: ServerArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    let config = args.handler_config(nonce_secret(args.nonce.as_deref()));
    let handler = AuthHandler::connect(config).await.context("failed to set up auth handler")?;
    let app = build_app(Arc::new(handler));

    let listener =
        TcpListener::bind(&args.addr).await.with_context(|| format!("failed to bind {}", args.addr))?;
    info!(addr = %listener.local_addr()?, "relay listening");

    let sd = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app).with_graceful_shutdown(sd.cancelled_owned()).await
    });

    tokio::select! {
        result = &mut server => {
            result.context("relay task failed")?.context("relay server failed")?;
            return Ok(());
        }
        _ = shutdown.cancelled() => {}
    }

    info!("shutting down relay");
    match tokio::time::timeout(args.shutdown_timeout(), server).await {
        Ok(result) => result.context("relay task failed")?.context("relay server failed")?,
        Err(_) => {
            error!(timeout = ?args.shutdown_timeout(), "relay did not drain in time");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
