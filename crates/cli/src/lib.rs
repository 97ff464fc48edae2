// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod config;
pub mod login;
pub mod server;
pub mod settings;
pub mod setup;
