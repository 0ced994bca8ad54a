// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application layer for the netboot server.

pub mod server;

pub use server::{NetbootConfig, NetbootServer, ServerError};
