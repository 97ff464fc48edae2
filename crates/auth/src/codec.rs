// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque blob encoding (`base64url_nopad(json)`) and nonce hashing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Serialize `value` as JSON and wrap it in unpadded base64url.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value).map_err(CodecError::Serialize)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Inverse of [`encode`].
pub fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T, CodecError> {
    let json = URL_SAFE_NO_PAD.decode(encoded).map_err(CodecError::Base64)?;
    serde_json::from_slice(&json).map_err(CodecError::Deserialize)
}

/// Lowercase hex sha256 of `input`.
pub fn hash_string(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Nonce bound into an authorization request for `encoded_state`.
///
/// The callback recomputes this from the returned `state` and the server
/// secret; an ID token carrying any other nonce is rejected.
pub fn bound_nonce(encoded_state: &str, secret: &str) -> String {
    let mut input = String::with_capacity(encoded_state.len() + secret.len());
    input.push_str(encoded_state);
    input.push_str(secret);
    hash_string(&input)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
