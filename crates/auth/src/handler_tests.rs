// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use super::*;
use crate::test_support::{
    authorize_without_browser, MockProvider, MockSettings, EMAIL, NONCE_SECRET, SUBJECT,
};

const REDIRECT_URL: &str = "http://127.0.0.1:8080/auth/callback";
const CALLBACK: &str = "http://127.0.0.1:4000/callback";

fn query_of(url: &str) -> anyhow::Result<HashMap<String, String>> {
    Ok(url::Url::parse(url)?.query_pairs().into_owned().collect())
}

async fn connect(provider: &MockProvider) -> anyhow::Result<AuthHandler> {
    Ok(AuthHandler::connect(provider.handler_config(REDIRECT_URL)).await?)
}

fn token_with(id_token: String) -> Token {
    Token {
        access_token: "access".into(),
        token_type: "bearer".into(),
        refresh_token: None,
        expires_at: None,
        id_token,
    }
}

#[tokio::test]
async fn authorization_url_binds_state_and_nonce() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;
    assert!(handler.offline_as_scope());

    let url = handler.authorization_url(&AuthState::new(CALLBACK))?;
    assert!(url.starts_with(&format!("{}/auth?", provider.issuer_url())));

    let q = query_of(&url)?;
    let state = q.get("state").cloned().unwrap_or_default();
    let decoded: AuthState = codec::decode(&state)?;
    assert_eq!(decoded.callback, CALLBACK);
    assert_eq!(q.get("nonce"), Some(&codec::bound_nonce(&state, NONCE_SECRET)));
    assert_eq!(q.get("client_id").map(String::as_str), Some("smorgasbord"));
    assert_eq!(q.get("redirect_uri").map(String::as_str), Some(REDIRECT_URL));
    assert_eq!(q.get("response_type").map(String::as_str), Some("code"));

    let scopes: Vec<&str> = q.get("scope").map(|s| s.split(' ').collect()).unwrap_or_default();
    for expected in ["openid", "profile", "email", "offline_access"] {
        assert!(scopes.contains(&expected), "missing scope {expected} in {scopes:?}");
    }
    assert!(!q.contains_key("access_type"));
    Ok(())
}

#[tokio::test]
async fn offline_access_type_when_scope_unsupported() -> anyhow::Result<()> {
    let settings = MockSettings {
        scopes_supported: Some(vec!["openid".into(), "profile".into(), "email".into()]),
        ..MockSettings::default()
    };
    let provider = MockProvider::start_with(settings).await?;
    let handler = connect(&provider).await?;
    assert!(!handler.offline_as_scope());

    let q = query_of(&handler.authorization_url(&AuthState::new(CALLBACK))?)?;
    assert_eq!(q.get("access_type").map(String::as_str), Some("offline"));
    assert!(!q.get("scope").is_some_and(|s| s.contains("offline_access")));
    Ok(())
}

#[yare::parameterized(
    absent = { None },
    empty = { Some(vec![]) },
)]
#[test_macro(tokio::test)]
async fn missing_scopes_assume_offline_scope(scopes: Option<Vec<String>>) {
    let settings = MockSettings { scopes_supported: scopes, ..MockSettings::default() };
    let handler = match MockProvider::start_with(settings).await {
        Ok(provider) => AuthHandler::connect(provider.handler_config(REDIRECT_URL)).await,
        Err(e) => Err(AuthError::InvalidConfig(e.to_string())),
    };
    assert!(matches!(handler, Ok(ref h) if h.offline_as_scope()));
}

#[tokio::test]
async fn mutator_is_applied_last() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let mut config = provider.handler_config(REDIRECT_URL);
    config.auth_code_url_mutator = appendix_mutator("&connector_id=mock");
    let handler = AuthHandler::connect(config).await?;

    let url = handler.authorization_url(&AuthState::new(CALLBACK))?;
    assert!(url.ends_with("&connector_id=mock"), "{url}");
    Ok(())
}

#[test]
fn empty_appendix_has_no_mutator() -> anyhow::Result<()> {
    assert!(appendix_mutator("").is_none());
    let mutate = appendix_mutator("?x=1").ok_or_else(|| anyhow::anyhow!("expected mutator"))?;
    assert_eq!(mutate("http://a".into()), "http://a?x=1");
    Ok(())
}

#[tokio::test]
async fn unreachable_provider_fails_connect() -> anyhow::Result<()> {
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let config = HandlerConfig {
        issuer_url: format!("http://127.0.0.1:{port}"),
        client_id: "id".into(),
        client_secret: "secret".into(),
        redirect_url: REDIRECT_URL.into(),
        nonce_secret: NONCE_SECRET.into(),
        auth_code_url_mutator: None,
    };
    let result = AuthHandler::connect(config).await;
    assert!(matches!(result, Err(AuthError::ProviderUnreachable { .. })));
    Ok(())
}

#[tokio::test]
async fn malformed_discovery_fails_connect() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let issuer = format!("http://{}", listener.local_addr()?);
    let doc = serde_json::json!({ "issuer": issuer });
    let router = axum::Router::new().route(
        "/.well-known/openid-configuration",
        axum::routing::get(move || async move { axum::Json(doc) }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let config = HandlerConfig {
        issuer_url: issuer,
        client_id: "id".into(),
        client_secret: "secret".into(),
        redirect_url: REDIRECT_URL.into(),
        nonce_secret: NONCE_SECRET.into(),
        auth_code_url_mutator: None,
    };
    let result = AuthHandler::connect(config).await;
    assert!(matches!(result, Err(AuthError::DiscoveryMalformed { .. })));
    Ok(())
}

#[tokio::test]
async fn invalid_redirect_url_is_rejected_before_discovery() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let result = AuthHandler::connect(provider.handler_config("not a url")).await;
    assert!(matches!(result, Err(AuthError::InvalidConfig(_))));
    Ok(())
}

#[tokio::test]
async fn verify_recovers_state_and_claims() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;

    let encoded = codec::encode(&AuthState::new(CALLBACK))?;
    let nonce = codec::bound_nonce(&encoded, NONCE_SECRET);
    let token = token_with(provider.mint_id_token(Some(&nonce), true)?);

    let (state, claims) = handler.verify_and_bind_state(&token, &encoded)?;
    assert_eq!(state.callback, CALLBACK);
    assert_eq!(claims.subject, SUBJECT);
    assert_eq!(claims.email, EMAIL);
    assert!(claims.email_verified);
    Ok(())
}

#[tokio::test]
async fn verify_rejects_nonce_for_other_state() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;

    let encoded = codec::encode(&AuthState::new(CALLBACK))?;
    let other = codec::encode(&AuthState::new("http://evil.example/callback"))?;
    let nonce = codec::bound_nonce(&other, NONCE_SECRET);
    let token = token_with(provider.mint_id_token(Some(&nonce), true)?);

    let result = handler.verify_and_bind_state(&token, &encoded);
    assert!(matches!(result, Err(AuthError::NonceMismatch)));
    Ok(())
}

#[tokio::test]
async fn verify_rejects_missing_nonce() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;

    let encoded = codec::encode(&AuthState::new(CALLBACK))?;
    let token = token_with(provider.mint_id_token(None, true)?);
    assert!(handler.verify_and_bind_state(&token, &encoded).is_err());
    Ok(())
}

#[tokio::test]
async fn verify_rejects_unverified_email_with_valid_signature() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;

    let encoded = codec::encode(&AuthState::new(CALLBACK))?;
    let nonce = codec::bound_nonce(&encoded, NONCE_SECRET);
    let token = token_with(provider.mint_id_token(Some(&nonce), false)?);

    let result = handler.verify_and_bind_state(&token, &encoded);
    assert!(matches!(result, Err(AuthError::EmailNotVerified)));
    Ok(())
}

#[tokio::test]
async fn verify_rejects_tampered_signature() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;

    let encoded = codec::encode(&AuthState::new(CALLBACK))?;
    let nonce = codec::bound_nonce(&encoded, NONCE_SECRET);
    let id_token = provider.mint_id_token(Some(&nonce), true)?;
    // Swap one signature character well away from the trailing padding bits.
    let at = id_token.len() - 20;
    let swapped = if id_token.as_bytes()[at] == b'A' { "B" } else { "A" };
    let tampered = format!("{}{}{}", &id_token[..at], swapped, &id_token[at + 1..]);

    let result = handler.verify_and_bind_state(&token_with(tampered), &encoded);
    assert!(matches!(result, Err(AuthError::IdTokenInvalid(_))));
    Ok(())
}

#[tokio::test]
async fn verify_rejects_corrupt_state_with_matching_nonce() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;

    let encoded = "not*base64";
    let nonce = codec::bound_nonce(encoded, NONCE_SECRET);
    let token = token_with(provider.mint_id_token(Some(&nonce), true)?);

    let result = handler.verify_and_bind_state(&token, encoded);
    assert!(matches!(result, Err(AuthError::StateDecodeFailed(_))));
    Ok(())
}

#[tokio::test]
async fn verify_requires_id_token() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;
    let result = handler.verify_and_bind_state(&token_with(String::new()), "e30");
    assert!(matches!(result, Err(AuthError::MissingIdToken)));
    Ok(())
}

#[tokio::test]
async fn exchange_unknown_code_fails() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;
    match handler.exchange_code("never-issued").await {
        Err(AuthError::ExchangeFailed(msg)) => assert!(msg.contains("invalid_grant"), "{msg}"),
        other => anyhow::bail!("expected ExchangeFailed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn exchange_without_id_token_fails() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    provider.update(|s| s.omit_id_token = true);
    let handler = connect(&provider).await?;

    let url = handler.authorization_url(&AuthState::new(CALLBACK))?;
    let code = authorize_without_browser(&url).await?;
    let result = handler.exchange_code(&code).await;
    assert!(matches!(result, Err(AuthError::MissingIdToken)));
    Ok(())
}

#[tokio::test]
async fn exchange_then_verify() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;

    let url = handler.authorization_url(&AuthState::new(CALLBACK))?;
    let state = query_of(&url)?.remove("state").unwrap_or_default();
    let code = authorize_without_browser(&url).await?;

    let token = handler.exchange_code(&code).await?;
    assert!(!token.access_token.is_empty());
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-mock"));
    assert!(!token.is_expired());

    let (recovered, claims) = handler.verify_and_bind_state(&token, &state)?;
    assert_eq!(recovered.callback, CALLBACK);
    assert_eq!(claims.email, EMAIL);
    Ok(())
}

#[tokio::test]
async fn refresh_issues_new_access_token() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let handler = connect(&provider).await?;
    let token = handler.refresh("refresh-mock").await?;
    assert!(token.access_token.starts_with("access-"));
    Ok(())
}

#[tokio::test]
async fn refresh_surfaces_provider_error() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    provider.update(|s| s.token_error = Some("invalid_grant".into()));
    let handler = connect(&provider).await?;
    let result = handler.refresh("refresh-mock").await;
    assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
    Ok(())
}
