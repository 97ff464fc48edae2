// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum_test::TestServer;
use smorgasbord_auth::test_support::MockProvider;

use super::*;

async fn app(provider: &MockProvider) -> anyhow::Result<TestServer> {
    let config = provider.handler_config("http://127.0.0.1:8080/auth/callback");
    let handler = AuthHandler::connect(config).await?;
    TestServer::new(build_app(Arc::new(handler)))
}

#[tokio::test]
async fn healthz_is_ok() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let server = app(&provider).await?;

    let resp = server.get("/healthz").await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.text(), "ok");
    Ok(())
}

#[tokio::test]
async fn auth_routes_are_mounted() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let server = app(&provider).await?;

    let resp = server.get("/auth/login").add_query_param("callback", "http://127.0.0.1:1/cb").await;
    resp.assert_status(StatusCode::SEE_OTHER);
    let resp = server.get("/auth/callback").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[test]
fn configured_nonce_is_used_verbatim() {
    assert_eq!(nonce_secret(Some("fixed")), "fixed");
}

#[test]
fn missing_nonce_gets_random_seed() {
    let a = nonce_secret(None);
    let b = nonce_secret(Some(""));
    assert_eq!(a.len(), 43);
    assert_ne!(a, b);
}

#[tokio::test]
async fn run_stops_on_shutdown() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let args = ServerArgs {
        addr: "127.0.0.1:0".into(),
        client_id: "smorgasbord".into(),
        client_secret: "secret".into(),
        issuer_url: provider.issuer_url().to_owned(),
        redirect_url: "http://127.0.0.1:8080/auth/callback".into(),
        auth_code_url_appendix: String::new(),
        nonce: Some("seed".into()),
        shutdown_timeout_secs: 1,
    };
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(run(args, shutdown.clone()));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), task).await???;
    Ok(())
}

#[tokio::test]
async fn run_fails_when_provider_is_down() -> anyhow::Result<()> {
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let args = ServerArgs {
        addr: "127.0.0.1:0".into(),
        client_id: "smorgasbord".into(),
        client_secret: "secret".into(),
        issuer_url: format!("http://127.0.0.1:{port}"),
        redirect_url: "http://127.0.0.1:8080/auth/callback".into(),
        auth_code_url_appendix: String::new(),
        nonce: None,
        shutdown_timeout_secs: 1,
    };
    let err = run(args, CancellationToken::new())
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected startup failure"))?;
    assert!(format!("{err:#}").contains("failed to set up auth handler"));
    Ok(())
}
