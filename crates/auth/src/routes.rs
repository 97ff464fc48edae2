// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface of the relay: `/auth/login` and `/auth/callback`.
//!
//! Both endpoints read their parameters from the query string and, when the
//! request carries one, a url-encoded form body. See [`FormValues`].

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use tracing::{info, warn};
use url::Url;

use crate::codec;
use crate::error::AuthError;
use crate::handler::AuthHandler;
use crate::params::FormValues;
use crate::types::{AuthState, Token};
use crate::QUERY_TOKEN_KEY;

/// Build the relay router. Callers add their own layers (CORS, tracing).
pub fn build_router(handler: Arc<AuthHandler>) -> Router {
    Router::new()
        .route("/auth/login", get(login).post(login))
        .route("/auth/callback", get(callback).post(callback))
        .with_state(handler)
}

// -- Handlers -----------------------------------------------------------------

/// `GET|POST /auth/login`: send the browser to the provider.
pub async fn login(State(handler): State<Arc<AuthHandler>>, params: FormValues) -> Response {
    let callback = params.get("callback").unwrap_or_default().to_owned();
    if let Err(msg) = validate_callback(&callback) {
        return bad_request(msg);
    }

    match handler.authorization_url(&AuthState::new(callback)) {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET|POST /auth/callback`: redirect target registered with the provider.
pub async fn callback(State(handler): State<Arc<AuthHandler>>, params: FormValues) -> Response {
    if let Some(error) = params.non_empty("error") {
        let description = params.get("error_description").unwrap_or_default();
        warn!(%error, %description, "provider returned an error");
        return bad_request(format!("{error}: {description}"));
    }
    let Some(code) = params.non_empty("code") else {
        return bad_request("no code in request".to_owned());
    };
    let Some(encoded_state) = params.non_empty("state") else {
        return bad_request("no state in request".to_owned());
    };

    let token = match handler.exchange_code(code).await {
        Ok(token) => token,
        Err(e) => return error_response(e),
    };
    let (state, claims) = match handler.verify_and_bind_state(&token, encoded_state) {
        Ok(bound) => bound,
        Err(e) => return error_response(e),
    };

    let mut target = match validate_callback(&state.callback) {
        Ok(url) => url,
        Err(msg) => return bad_request(msg),
    };
    if let Err(e) = append_token(&mut target, &token) {
        return error_response(e);
    }
    info!(subject = %claims.subject, email = %claims.email, "login verified");
    Redirect::to(target.as_str()).into_response()
}

// -- Helpers ------------------------------------------------------------------

/// Only absolute http(s) URLs are accepted as the final browser destination.
pub fn validate_callback(callback: &str) -> Result<Url, String> {
    if callback.is_empty() {
        return Err("no callback in request".to_owned());
    }
    let url = Url::parse(callback).map_err(|e| format!("invalid callback url: {e}"))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        scheme => Err(format!("invalid callback url: unsupported scheme {scheme:?}")),
    }
}

/// Append the encoded token to `callback`, keeping any existing query.
pub fn append_token(callback: &mut Url, token: &Token) -> Result<(), AuthError> {
    let encoded = codec::encode(token).map_err(AuthError::Encoding)?;
    callback.query_pairs_mut().append_pair(QUERY_TOKEN_KEY, &encoded);
    Ok(())
}

fn bad_request(msg: String) -> Response {
    warn!(%msg, "rejected auth request");
    (StatusCode::BAD_REQUEST, msg).into_response()
}

fn error_response(err: AuthError) -> Response {
    let status = err.http_status();
    warn!(code = err.as_str(), err = %err, "auth request failed");
    (status, err.to_string()).into_response()
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
