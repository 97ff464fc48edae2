// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-delegated OIDC login bridge.
//!
//! The relay server side ([`handler`], [`routes`]) talks to the upstream
//! identity provider. The CLI side ([`client`]) runs a short-lived loopback
//! listener that receives the final token once the user finishes the flow in
//! a browser. The two sides only share the query-parameter contract and the
//! [`codec`] used for the opaque `state` and `token` blobs.

pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod params;
pub mod routes;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod types;

/// Query parameter carrying the encoded token on the final redirect.
pub const QUERY_TOKEN_KEY: &str = "token";
