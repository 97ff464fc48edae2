// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream OIDC provider integration for the relay server.
//!
//! [`AuthHandler::connect`] runs discovery exactly once; the resulting handler
//! is read-only and shared across request workers behind an `Arc`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use openidconnect::core::{
    CoreClient, CoreIdToken, CoreProviderMetadata, CoreResponseType, CoreTokenResponse,
};
use openidconnect::reqwest::async_http_client;
use openidconnect::{
    AuthenticationFlow, AuthorizationCode, ClaimsVerificationError, ClientId, ClientSecret,
    CsrfToken, DiscoveryError, ErrorResponse, IssuerUrl, Nonce, OAuth2TokenResponse, RedirectUrl,
    RefreshToken, RequestTokenError, Scope,
};
use tracing::{debug, info};

use crate::codec;
use crate::error::AuthError;
use crate::types::{epoch_secs, AuthState, ExtraClaims, Token};

const SCOPE_PROFILE: &str = "profile";
const SCOPE_EMAIL: &str = "email";
const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// Post-processing applied to every authorization URL. Must be side-effect free.
pub type UrlMutator = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Immutable relay configuration for talking to the upstream provider.
#[derive(Clone)]
pub struct HandlerConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Public URL of the relay's `/auth/callback`, as registered with the provider.
    pub redirect_url: String,
    /// Secret seed mixed into the nonce bound to each authorization request.
    pub nonce_secret: String,
    pub auth_code_url_mutator: Option<UrlMutator>,
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .field("nonce_secret", &"<redacted>")
            .field("auth_code_url_mutator", &self.auth_code_url_mutator.is_some())
            .finish()
    }
}

/// Mutator that appends `appendix` verbatim, e.g. `&connector_id=mock` for
/// providers that need a connector preselected. `None` when empty.
pub fn appendix_mutator(appendix: impl Into<String>) -> Option<UrlMutator> {
    let appendix = appendix.into();
    if appendix.is_empty() {
        return None;
    }
    Some(Arc::new(move |url: String| url + &appendix))
}

/// Provider connection plus the token verifier bound to our client id.
pub struct AuthHandler {
    config: HandlerConfig,
    client: CoreClient,
    offline_as_scope: bool,
}

impl AuthHandler {
    /// Fetch the provider's discovery document and JWKS and build the client.
    pub async fn connect(config: HandlerConfig) -> Result<Self, AuthError> {
        let issuer = IssuerUrl::new(config.issuer_url.clone())
            .map_err(|e| AuthError::InvalidConfig(format!("issuer url: {e}")))?;
        let redirect = RedirectUrl::new(config.redirect_url.clone())
            .map_err(|e| AuthError::InvalidConfig(format!("redirect url: {e}")))?;

        let metadata = CoreProviderMetadata::discover_async(issuer, async_http_client)
            .await
            .map_err(|e| discovery_error(&config.issuer_url, e))?;

        // scopes_supported is only RECOMMENDED by OIDC discovery; without it,
        // offline_access is assumed to be accepted.
        let offline_as_scope = match metadata.scopes_supported() {
            Some(scopes) if !scopes.is_empty() => {
                scopes.iter().any(|s| s.as_str() == SCOPE_OFFLINE_ACCESS)
            }
            _ => true,
        };

        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
        )
        .set_redirect_uri(redirect);

        info!(issuer = %config.issuer_url, offline_as_scope, "connected to OIDC provider");
        Ok(Self { config, client, offline_as_scope })
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Whether `offline_access` is requested as a scope (otherwise
    /// `access_type=offline` is sent).
    pub fn offline_as_scope(&self) -> bool {
        self.offline_as_scope
    }

    /// Build the provider URL the browser is sent to, with `state` encoded
    /// into the `state` parameter and the bound nonce attached.
    pub fn authorization_url(&self, state: &AuthState) -> Result<String, AuthError> {
        let encoded = codec::encode(state).map_err(AuthError::Encoding)?;
        let nonce = codec::bound_nonce(&encoded, &self.config.nonce_secret);

        let mut request = self
            .client
            .authorize_url(
                AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
                move || CsrfToken::new(encoded),
                move || Nonce::new(nonce),
            )
            .add_scope(Scope::new(SCOPE_PROFILE.to_owned()))
            .add_scope(Scope::new(SCOPE_EMAIL.to_owned()));
        request = if self.offline_as_scope {
            request.add_scope(Scope::new(SCOPE_OFFLINE_ACCESS.to_owned()))
        } else {
            request.add_extra_param("access_type", "offline")
        };
        let (url, _, _) = request.url();

        let url = match self.config.auth_code_url_mutator {
            Some(ref mutate) => mutate(url.to_string()),
            None => url.to_string(),
        };
        debug!(callback = %state.callback, "built authorization url");
        Ok(url)
    }

    /// Trade an authorization code for a token at the provider's token endpoint.
    pub async fn exchange_code(&self, code: &str) -> Result<Token, AuthError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::ExchangeFailed(describe_token_error(&e)))?;
        let id_token = response
            .extra_fields()
            .id_token()
            .map(|t| t.to_string())
            .ok_or(AuthError::MissingIdToken)?;
        Ok(token_from_response(&response, id_token))
    }

    /// Verify the embedded ID token, check its nonce against `encoded_state`
    /// and recover the state and claims.
    pub fn verify_and_bind_state(
        &self,
        token: &Token,
        encoded_state: &str,
    ) -> Result<(AuthState, ExtraClaims), AuthError> {
        if token.id_token.is_empty() {
            return Err(AuthError::MissingIdToken);
        }
        let id_token = CoreIdToken::from_str(&token.id_token)
            .map_err(|e| AuthError::IdTokenInvalid(e.to_string()))?;

        let expected = Nonce::new(codec::bound_nonce(encoded_state, &self.config.nonce_secret));
        let verifier = self.client.id_token_verifier();
        let claims = id_token.claims(&verifier, &expected).map_err(|e| match e {
            ClaimsVerificationError::InvalidNonce(_) => AuthError::NonceMismatch,
            other => AuthError::IdTokenInvalid(other.to_string()),
        })?;

        let state: AuthState =
            codec::decode(encoded_state).map_err(AuthError::StateDecodeFailed)?;

        let extra = ExtraClaims {
            subject: claims.subject().as_str().to_owned(),
            email: claims.email().map(|e| e.as_str().to_owned()).unwrap_or_default(),
            email_verified: claims.email_verified().unwrap_or(false),
        };
        if !extra.email_verified {
            return Err(AuthError::EmailNotVerified);
        }
        Ok((state, extra))
    }

    /// Trade a refresh token for a fresh token. Not used by the login flow.
    ///
    /// Providers may omit the ID token on refresh; `id_token` is then empty.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_owned()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::RefreshFailed(describe_token_error(&e)))?;
        let id_token =
            response.extra_fields().id_token().map(|t| t.to_string()).unwrap_or_default();
        Ok(token_from_response(&response, id_token))
    }
}

fn token_from_response(response: &CoreTokenResponse, id_token: String) -> Token {
    Token {
        access_token: response.access_token().secret().clone(),
        token_type: response.token_type().as_ref().to_owned(),
        refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        expires_at: response.expires_in().map(|d| epoch_secs() + d.as_secs()),
        id_token,
    }
}

fn discovery_error<RE>(issuer: &str, err: DiscoveryError<RE>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    let issuer = issuer.to_owned();
    match err {
        DiscoveryError::Request(e) => {
            AuthError::ProviderUnreachable { issuer, message: error_chain(&e) }
        }
        DiscoveryError::Response(status, _, message) => {
            AuthError::ProviderUnreachable { issuer, message: format!("{status}: {message}") }
        }
        other => AuthError::DiscoveryMalformed { issuer, message: error_chain(&other) },
    }
}

/// Server error responses carry the provider's `error`/`error_description`,
/// which the generic `Display` drops.
fn describe_token_error<RE, T>(err: &RequestTokenError<RE, T>) -> String
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => {
            serde_json::to_string(resp).unwrap_or_else(|_| err.to_string())
        }
        other => error_chain(other),
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
