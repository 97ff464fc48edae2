// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use thiserror::Error;

/// Failure to encode or decode an opaque blob.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("error marshalling: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("error decoding: {0}")]
    Base64(#[source] base64::DecodeError),
    #[error("error unmarshalling: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Errors raised by the relay's [`AuthHandler`](crate::handler::AuthHandler).
///
/// None of these are retried; each one ends the current login attempt.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to query provider {issuer:?}: {message}")]
    ProviderUnreachable { issuer: String, message: String },
    #[error("malformed discovery document from {issuer:?}: {message}")]
    DiscoveryMalformed { issuer: String, message: String },
    #[error("failed to encode state: {0}")]
    Encoding(#[source] CodecError),
    #[error("failed to get token: {0}")]
    ExchangeFailed(String),
    #[error("no id_token in token response")]
    MissingIdToken,
    #[error("failed to verify ID token: {0}")]
    IdTokenInvalid(String),
    #[error("invalid id_token nonce")]
    NonceMismatch,
    #[error("failed to decode state: {0}")]
    StateDecodeFailed(#[source] CodecError),
    #[error("email not verified")]
    EmailNotVerified,
    #[error("failed to refresh token: {0}")]
    RefreshFailed(String),
}

impl AuthError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidConfig(_)
            | Self::ProviderUnreachable { .. }
            | Self::DiscoveryMalformed { .. }
            | Self::Encoding(_)
            | Self::ExchangeFailed(_)
            | Self::MissingIdToken
            | Self::RefreshFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IdTokenInvalid(_)
            | Self::NonceMismatch
            | Self::StateDecodeFailed(_)
            | Self::EmailNotVerified => StatusCode::BAD_REQUEST,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ProviderUnreachable { .. } => "PROVIDER_UNREACHABLE",
            Self::DiscoveryMalformed { .. } => "DISCOVERY_MALFORMED",
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::ExchangeFailed(_) => "EXCHANGE_FAILED",
            Self::MissingIdToken => "MISSING_ID_TOKEN",
            Self::IdTokenInvalid(_) => "ID_TOKEN_INVALID",
            Self::NonceMismatch => "NONCE_MISMATCH",
            Self::StateDecodeFailed(_) => "STATE_DECODE_FAILED",
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            Self::RefreshFailed(_) => "REFRESH_FAILED",
        }
    }
}

/// Errors raised by the CLI-side [`AuthClient`](crate::client::AuthClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to start callback server: {0}")]
    Listen(#[source] std::io::Error),
    #[error("callback server already running")]
    AlreadyStarted,
    #[error("callback URL not available, make sure to start the callback server first")]
    CallbackServerNotStarted,
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status code received: {0}")]
    UnexpectedStatus(u16),
    #[error("no redirect location in login response")]
    MissingLocation,
    #[error("failed to receive token within {0:?}")]
    Timeout(std::time::Duration),
    #[error("login cancelled before token was received")]
    Cancelled,
    #[error("token channel closed")]
    ChannelClosed,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
