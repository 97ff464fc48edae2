// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Values that cross the wire between the CLI, the relay and the provider.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// State carried through the upstream provider inside the `state` parameter.
///
/// The provider never interprets it; the relay gets it back on the callback
/// and uses `callback` as the browser's final destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub callback: String,
}

impl AuthState {
    pub fn new(callback: impl Into<String>) -> Self {
        Self { callback: callback.into() }
    }
}

/// Claims the relay requires from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraClaims {
    pub subject: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
}

/// Bearer credential handed to the CLI, with the raw ID token embedded.
///
/// Travels as an encoded blob in the `token` query parameter of the final
/// redirect. `Debug` is redacted so it never ends up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    pub id_token: String,
}

impl Token {
    /// Whether the access token has passed its expiry. Tokens without an
    /// expiry never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => epoch_secs() >= at,
            None => false,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("id_token", &"<redacted>")
            .finish()
    }
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}
