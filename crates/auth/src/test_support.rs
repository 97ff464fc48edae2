// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process OIDC provider for tests.
//!
//! Serves discovery, JWKS, an authorization endpoint that approves every
//! request without user interaction, and a token endpoint that mints RS256
//! ID tokens. Behaviour is tweaked through [`MockSettings`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::handler::HandlerConfig;
use crate::types::epoch_secs;

pub const CLIENT_ID: &str = "smorgasbord";
pub const CLIENT_SECRET: &str = "ZXhhbXBsZS1hcHAtc2VjcmV0";
pub const NONCE_SECRET: &str = "test";
pub const SUBJECT: &str = "CgVhZG1pbhIFbG9jYWw";
pub const EMAIL: &str = "kilgore@kilgore.trout";

const KEY_ID: &str = "mock-key";
const KEY_PEM: &str = include_str!("../testdata/provider_key.pem");
const KEY_N: &str = "pPB_DnDtc8okt4IQ-8BE4bUquOjSFnClumEwoh1QyqEyBooRputlqMEWV0zLHugnouoRJ1PNCF16Ic5wzQb-UrQ6zrDGutJvC1ITRl6GCYSI_ZroSXEYM-VvhUJ6GU-ChyDi1x2n8RKkyE1tkfT1Zq1TPcVZ2GQdfk1-pKPKAuC34Vq558wh7hERrm6S9JYlG_MmUVXUJx1OEjiywpAY_w3B972KFR-mtCcT08dUNwv-IZhupdKn3z1EDq2Jfzl8v0HaeH7WoD6gUUZA7ng_z9b5r1XCOf_d7s33i7iPYCk7KEFzyF-ZlwMaUong3HHhgGC44gOhBp91_mCM9aXKAw";
const KEY_E: &str = "AQAB";

/// Knobs for the simulated provider.
#[derive(Debug, Clone)]
pub struct MockSettings {
    /// `None` omits `scopes_supported` from discovery entirely.
    pub scopes_supported: Option<Vec<String>>,
    pub email_verified: bool,
    /// Flip the last character of the nonce in issued ID tokens.
    pub tamper_nonce: bool,
    pub omit_id_token: bool,
    /// Reject every token request with this OAuth error code.
    pub token_error: Option<String>,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            scopes_supported: Some(
                ["openid", "profile", "email", "offline_access"].map(String::from).to_vec(),
            ),
            email_verified: true,
            tamper_nonce: false,
            omit_id_token: false,
            token_error: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    settings: MockSettings,
    /// code -> nonce from the authorization request.
    pending: HashMap<String, Option<String>>,
    last_authorization: Option<HashMap<String, String>>,
    token_requests: u64,
}

struct ProviderState {
    issuer: String,
    inner: Mutex<Inner>,
    next_code: AtomicU64,
}

impl ProviderState {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A running simulated provider. Shuts down on drop.
pub struct MockProvider {
    state: Arc<ProviderState>,
    shutdown: CancellationToken,
}

impl MockProvider {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(MockSettings::default()).await
    }

    pub async fn start_with(settings: MockSettings) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let issuer = format!("http://{}", listener.local_addr()?);
        let state = Arc::new(ProviderState {
            issuer,
            inner: Mutex::new(Inner { settings, ..Inner::default() }),
            next_code: AtomicU64::new(1),
        });

        let router = Router::new()
            .route("/.well-known/openid-configuration", get(discovery))
            .route("/keys", get(jwks))
            .route("/auth", get(authorize))
            .route("/token", post(token))
            .with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
        });
        Ok(Self { state, shutdown })
    }

    pub fn issuer_url(&self) -> &str {
        &self.state.issuer
    }

    /// Relay configuration pointing at this provider.
    pub fn handler_config(&self, redirect_url: impl Into<String>) -> HandlerConfig {
        HandlerConfig {
            issuer_url: self.state.issuer.clone(),
            client_id: CLIENT_ID.to_owned(),
            client_secret: CLIENT_SECRET.to_owned(),
            redirect_url: redirect_url.into(),
            nonce_secret: NONCE_SECRET.to_owned(),
            auth_code_url_mutator: None,
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut MockSettings)) {
        f(&mut self.state.lock().settings);
    }

    /// Query parameters of the most recent authorization request.
    pub fn last_authorization(&self) -> Option<HashMap<String, String>> {
        self.state.lock().last_authorization.clone()
    }

    pub fn token_requests(&self) -> u64 {
        self.state.lock().token_requests
    }

    /// Mint a signed ID token directly, bypassing the browser leg.
    pub fn mint_id_token(
        &self,
        nonce: Option<&str>,
        email_verified: bool,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        sign_id_token(&self.state.issuer, nonce, email_verified)
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Follow the whole redirect chain starting at `auth_code_url`, the way a
/// browser would after the user approves the login.
pub async fn simulate_browser_login(auth_code_url: &str) -> reqwest::Result<reqwest::Response> {
    reqwest::Client::new().get(auth_code_url).send().await
}

/// Hit the provider's authorization endpoint and pull the code out of its
/// redirect without following it.
pub async fn authorize_without_browser(auth_code_url: &str) -> std::io::Result<String> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(std::io::Error::other)?;
    let resp = client.get(auth_code_url).send().await.map_err(std::io::Error::other)?;
    let location = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| std::io::Error::other("no redirect from provider"))?;
    let url = url::Url::parse(location).map_err(std::io::Error::other)?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| std::io::Error::other("no code in redirect"))
}

#[derive(Serialize)]
struct IdTokenClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    exp: u64,
    iat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
    email: &'a str,
    email_verified: bool,
}

fn sign_id_token(
    issuer: &str,
    nonce: Option<&str>,
    email_verified: bool,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = epoch_secs();
    let claims = IdTokenClaims {
        iss: issuer,
        sub: SUBJECT,
        aud: CLIENT_ID,
        exp: now + 3600,
        iat: now,
        nonce,
        email: EMAIL,
        email_verified,
    };
    let header = Header { kid: Some(KEY_ID.to_owned()), ..Header::new(Algorithm::RS256) };
    let key = EncodingKey::from_rsa_pem(KEY_PEM.as_bytes())?;
    jsonwebtoken::encode(&header, &claims, &key)
}

fn flip_last_char(s: &str) -> String {
    let mut out = s.to_owned();
    match out.pop() {
        Some('0') => out.push('1'),
        Some(_) => out.push('0'),
        None => out.push('0'),
    }
    out
}

async fn discovery(State(s): State<Arc<ProviderState>>) -> impl IntoResponse {
    let issuer = &s.issuer;
    let mut doc = serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/auth"),
        "token_endpoint": format!("{issuer}/token"),
        "jwks_uri": format!("{issuer}/keys"),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic"],
        "claims_supported": ["aud", "email", "email_verified", "exp", "iat", "iss", "sub"],
    });
    if let Some(scopes) = s.lock().settings.scopes_supported.clone() {
        doc["scopes_supported"] = serde_json::json!(scopes);
    }
    Json(doc)
}

async fn jwks() -> impl IntoResponse {
    Json(serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": KEY_ID,
            "n": KEY_N,
            "e": KEY_E,
        }]
    }))
}

async fn authorize(
    State(s): State<Arc<ProviderState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (Some(redirect_uri), Some(state)) = (params.get("redirect_uri"), params.get("state"))
    else {
        return (StatusCode::BAD_REQUEST, "missing redirect_uri or state").into_response();
    };
    let Ok(mut target) = url::Url::parse(redirect_uri) else {
        return (StatusCode::BAD_REQUEST, "invalid redirect_uri").into_response();
    };

    let code = format!("code-{}", s.next_code.fetch_add(1, Ordering::Relaxed));
    {
        let mut inner = s.lock();
        inner.pending.insert(code.clone(), params.get("nonce").cloned());
        inner.last_authorization = Some(params.clone());
    }
    target.query_pairs_mut().append_pair("code", &code).append_pair("state", state);
    Redirect::to(target.as_str()).into_response()
}

fn oauth_error(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": error, "error_description": description })),
    )
        .into_response()
}

async fn token(
    State(s): State<Arc<ProviderState>>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let (settings, nonce) = {
        let mut inner = s.lock();
        inner.token_requests += 1;
        let settings = inner.settings.clone();
        if let Some(ref error) = settings.token_error {
            return oauth_error(error, "rejected by mock provider");
        }
        let nonce = match params.get("grant_type").map(String::as_str) {
            Some("authorization_code") => {
                let code = params.get("code").cloned().unwrap_or_default();
                match inner.pending.remove(&code) {
                    Some(nonce) => nonce,
                    None => return oauth_error("invalid_grant", "unknown code"),
                }
            }
            Some("refresh_token") => None,
            _ => return oauth_error("unsupported_grant_type", "unsupported grant"),
        };
        (settings, nonce)
    };

    let nonce = nonce.map(|n| if settings.tamper_nonce { flip_last_char(&n) } else { n });
    let mut body = serde_json::json!({
        "access_token": format!("access-{}", s.next_code.fetch_add(1, Ordering::Relaxed)),
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-mock",
    });
    if !settings.omit_id_token {
        match sign_id_token(&s.issuer, nonce.as_deref(), settings.email_verified) {
            Ok(id_token) => body["id_token"] = serde_json::json!(id_token),
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
        }
    }
    Json(body).into_response()
}
