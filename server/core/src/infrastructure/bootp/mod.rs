// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! BOOTP Daemon Infrastructure
//!
//! Stateless address-assignment responder for diskless clients. The
//! server plays a proxy role: it hands a client back the address the
//! client already claims instead of allocating from a lease pool, and
//! identifies itself as both boot server and gateway. Reliability is the
//! client's problem: one request, one reply, retransmission over UDP.

pub mod server;
pub mod wire;

pub use server::BootpDaemon;
