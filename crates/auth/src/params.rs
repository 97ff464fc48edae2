// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request parameters merged from a url-encoded body and the query string.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use tracing::warn;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// All `key=value` pairs of a request, body pairs ahead of query pairs.
///
/// Repeated keys are kept; [`FormValues::get`] answers with the first one.
#[derive(Debug, Default, Clone)]
pub struct FormValues(Vec<(String, String)>);

impl FormValues {
    pub fn from_parts(query: Option<&str>, body: Option<&[u8]>) -> Self {
        let mut pairs = Vec::new();
        if let Some(body) = body {
            pairs.extend(url::form_urlencoded::parse(body).into_owned());
        }
        if let Some(query) = query {
            pairs.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }
        Self(pairs)
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// First value for `key`, treating an empty value as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

impl<S: Send + Sync> FromRequest<S> for FormValues {
    type Rejection = (StatusCode, String);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = req.uri().query().map(str::to_owned);
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));

        let body = if is_form {
            let bytes = Bytes::from_request(req, state).await.map_err(|e| {
                warn!(err = %e, "failed to read form body");
                (StatusCode::BAD_REQUEST, format!("failed to read request body: {e}"))
            })?;
            Some(bytes)
        } else {
            None
        };
        Ok(Self::from_parts(query.as_deref(), body.as_deref()))
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
