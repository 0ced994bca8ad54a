// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Netboot Core
//!
//! Protocol daemons and asset store for serving legacy diskless
//! workstations their boot image and installer payload over the network.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** BOOTP / TFTP / BFS / RSH emulation over one asset archive

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
