// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI side of the login flow.
//!
//! The client runs a throwaway loopback listener that the relay redirects the
//! browser to once the provider leg completes. The listener hands the token
//! to [`AuthClient::wait_until_token_received`] through a single-slot channel.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{ClientError, CodecError};
use crate::params::FormValues;
use crate::types::Token;
use crate::QUERY_TOKEN_KEY;

pub const CALLBACK_PATH: &str = "/callback";
pub const LOGIN_SUCCESS_BODY: &str = "Successfully logged in, navigate back to the terminal.";
pub const LOGIN_FAILURE_BODY: &str = "Did not receive token";

/// How long a stopping listener may spend draining open connections.
const STOP_GRACE: Duration = Duration::from_secs(2);

struct CallbackServer {
    addr: SocketAddr,
    callback_url: String,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// One login attempt against a relay at `base_url`.
pub struct AuthClient {
    base_url: String,
    http: reqwest::Client,
    token_tx: mpsc::Sender<String>,
    token_rx: mpsc::Receiver<String>,
    server: Option<CallbackServer>,
    token: Option<String>,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|source| ClientError::Request { url: base_url.clone(), source })?;
        let (token_tx, token_rx) = mpsc::channel(1);
        Ok(Self { base_url, http, token_tx, token_rx, server: None, token: None })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bind a free loopback port and serve `/callback` on it.
    ///
    /// Returns the callback URL to hand to the relay. A client supports a
    /// single listener lifetime; starting twice fails.
    pub async fn start_callback_server(&mut self) -> Result<&str, ClientError> {
        if self.server.is_some() {
            return Err(ClientError::AlreadyStarted);
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(ClientError::Listen)?;
        let addr = listener.local_addr().map_err(ClientError::Listen)?;
        let callback_url = format!("http://{addr}{CALLBACK_PATH}");

        let router = Router::new()
            .route(CALLBACK_PATH, get(receive_token).post(receive_token))
            .with_state(self.token_tx.clone());
        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(e) =
                axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await
            {
                warn!(err = %e, "callback server exited with error");
            }
        });

        debug!(%addr, "callback server listening");
        let server = self.server.insert(CallbackServer { addr, callback_url, shutdown, task });
        Ok(server.callback_url.as_str())
    }

    pub fn callback_url(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.callback_url.as_str())
    }

    pub fn callback_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.addr)
    }

    /// Ask the relay for the provider URL the user has to open.
    pub async fn get_auth_code_url(&self) -> Result<String, ClientError> {
        let callback = self.callback_url().ok_or(ClientError::CallbackServerNotStarted)?;
        let url = format!("{}/auth/login", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[("callback", callback)])
            .send()
            .await
            .map_err(|source| ClientError::Request { url: url.clone(), source })?;
        if resp.status() != reqwest::StatusCode::SEE_OTHER {
            return Err(ClientError::UnexpectedStatus(resp.status().as_u16()));
        }
        resp.headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .ok_or(ClientError::MissingLocation)
    }

    /// Block until the callback listener receives a token, `timeout`
    /// elapses, or `cancel` fires.
    pub async fn wait_until_token_received(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<&str, ClientError> {
        let received = tokio::select! {
            r = tokio::time::timeout(timeout, self.token_rx.recv()) => r,
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        };
        let token = match received {
            Ok(Some(token)) => token,
            Ok(None) => return Err(ClientError::ChannelClosed),
            Err(_) => return Err(ClientError::Timeout(timeout)),
        };
        info!("token received from callback");
        Ok(self.token.insert(token).as_str())
    }

    /// Shut down the listener and release its port. Safe to call repeatedly
    /// or before the listener was ever started.
    pub async fn stop_callback_server(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };
        server.shutdown.cancel();
        let abort = server.task.abort_handle();
        match tokio::time::timeout(STOP_GRACE, server.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(err = %e, "callback server task failed"),
            Err(_) => {
                warn!("callback server did not drain in time, aborting");
                abort.abort();
            }
        }
        debug!(addr = %server.addr, "callback server stopped");
    }

    /// Stop the listener and close the token channel; the client is spent
    /// afterwards.
    pub async fn close(&mut self) {
        self.stop_callback_server().await;
        self.token_rx.close();
    }

    /// Encoded token as delivered by the relay.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The received token, decoded.
    pub fn decoded_token(&self) -> Option<Result<Token, CodecError>> {
        self.token.as_deref().map(codec::decode)
    }
}

impl Drop for AuthClient {
    fn drop(&mut self) {
        if let Some(ref server) = self.server {
            server.shutdown.cancel();
        }
    }
}

async fn receive_token(
    State(tx): State<mpsc::Sender<String>>,
    params: FormValues,
) -> impl IntoResponse {
    let Some(token) = params.non_empty(QUERY_TOKEN_KEY) else {
        warn!("callback hit without a token");
        return (StatusCode::BAD_REQUEST, LOGIN_FAILURE_BODY);
    };
    match tx.try_send(token.to_owned()) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => debug!("token already received, discarding"),
        Err(mpsc::error::TrySendError::Closed(_)) => warn!("token receiver gone, discarding"),
    }
    (StatusCode::OK, LOGIN_SUCCESS_BODY)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
