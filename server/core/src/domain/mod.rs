// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer for the netboot server.
//!
//! Holds the asset-store contract, the binary patch table, and the
//! per-client session state shared by the protocol daemons.

pub mod patch;
pub mod session;
pub mod store;

pub use patch::{PatchRule, PatchSet};
pub use session::{BlockSession, SessionTable, TransferSession};
pub use store::{AssetStore, MemberKind, MemberMeta, StoreError};
