// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Binary Patch Table
//!
//! Static, offset-addressed byte substitutions applied to specific assets
//! after they are read from the archive. The shipped rules rewrite the
//! broadcast address hard-coded inside the standalone boot shells so
//! installed clients use the `.255` form.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Content fix-ups as configuration, not protocol logic

/// A single fixed-offset byte substitution, keyed by member basename.
#[derive(Debug, Clone, Copy)]
pub struct PatchRule {
    /// Basename of the member the rule applies to
    pub basename: &'static str,
    /// Byte offset of the substitution inside the member
    pub offset: usize,
    /// Replacement bytes spliced at `offset`
    pub bytes: [u8; 4],
}

/// The set of patch rules consulted by the asset store.
#[derive(Debug, Clone)]
pub struct PatchSet {
    rules: Vec<PatchRule>,
}

impl PatchSet {
    /// The built-in rules: both boot shell variants carry a `li a2`
    /// broadcast-address immediate that must become `0x2406ffff`.
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                PatchRule {
                    basename: "sash.2030",
                    offset: 0x15d90,
                    bytes: [0x24, 0x06, 0xff, 0xff],
                },
                PatchRule {
                    basename: "sash.std",
                    offset: 0x293e4,
                    bytes: [0x24, 0x06, 0xff, 0xff],
                },
            ],
        }
    }

    /// An empty set, for stores that serve content verbatim.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Apply every rule matching `basename` to `data` in place.
    ///
    /// A rule whose span does not fit inside the member is skipped with a
    /// warning rather than truncating the splice.
    pub fn apply(&self, basename: &str, data: &mut [u8]) {
        for rule in self.rules.iter().filter(|r| r.basename == basename) {
            let end = rule.offset + rule.bytes.len();
            if end > data.len() {
                tracing::warn!(
                    basename,
                    offset = rule.offset,
                    len = data.len(),
                    "patch rule does not fit inside member, skipping"
                );
                continue;
            }
            data[rule.offset..end].copy_from_slice(&rule.bytes);
        }
    }
}
