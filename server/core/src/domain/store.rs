// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Asset Store Trait - Anti-Corruption Layer for the boot archive
//!
//! Provides abstraction over the backing install archive to isolate the
//! protocol daemons from the archive format. Enables testing with mocks
//! and keeps content-specific patching out of protocol logic.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Kind of an archive member, as needed for tar re-export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Hard link to another member (archive-absolute target name)
    HardLink { target: String },
}

/// POSIX-style metadata of an archive member
///
/// Carries enough of the original member header to re-export it into a
/// new tar stream with hard-link relationships intact.
#[derive(Debug, Clone)]
pub struct MemberMeta {
    /// Member kind (file, directory, hard link)
    pub kind: MemberKind,
    /// Content size in bytes (0 for directories and links)
    pub size: u64,
    /// POSIX permissions (e.g., 0o755)
    pub mode: u32,
    /// Owner user ID
    pub uid: u64,
    /// Owner group ID
    pub gid: u64,
    /// Last modification time (Unix timestamp)
    pub mtime: u64,
}

impl MemberMeta {
    /// Whether this member is a hard link to another member.
    pub fn is_hardlink(&self) -> bool {
        matches!(self.kind, MemberKind::HardLink { .. })
    }

    /// Link target for hard-link members.
    pub fn link_target(&self) -> Option<&str> {
        match &self.kind {
            MemberKind::HardLink { target } => Some(target),
            _ => None,
        }
    }
}

/// Asset store trait abstracting the read-only boot archive
///
/// Implementations resolve slash-separated logical paths (relative to the
/// archive's boot root) to member content and metadata. Content returned
/// by `lookup` has the binary patch table already applied and is immutable
/// for the remainder of its use.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Read a member's content.
    ///
    /// Hard-link members resolve to their target's content.
    ///
    /// # Arguments
    /// * `path` - Logical path (e.g., "boot.bin" or "/install/sash.2030")
    ///
    /// # Returns
    /// * `Ok(Bytes)` - Patched member content
    /// * `Err(StoreError::NotFound)` - No matching member
    async fn lookup(&self, path: &str) -> Result<Bytes, StoreError>;

    /// Read a member's metadata for tar re-export.
    ///
    /// Unlike `lookup`, hard links are NOT followed: the returned metadata
    /// describes the link member itself, target name included.
    async fn member_meta(&self, path: &str) -> Result<MemberMeta, StoreError>;
}

/// Asset store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("member not found: {0}")]
    NotFound(String),

    #[error("invalid asset path: {0}")]
    InvalidPath(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validate a logical asset path before archive resolution.
///
/// Rejects traversal components and NUL bytes; the daemons treat a
/// rejected path like a missing member on the wire.
pub fn validate_path(path: &str) -> Result<(), StoreError> {
    if path.split('/').any(|part| part == "..") {
        tracing::warn!(path = %path, "rejecting traversal in asset path");
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    if path.contains('\0') {
        tracing::warn!("rejecting NUL byte in asset path");
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_plain_paths() {
        assert!(validate_path("boot.bin").is_ok());
        assert!(validate_path("/install/sash.2030").is_ok());
        assert!(validate_path("a/b.c/d").is_ok());
    }

    #[test]
    fn test_validate_rejects_traversal() {
        assert!(matches!(
            validate_path("../etc/passwd"),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            validate_path("a/../../b"),
            Err(StoreError::InvalidPath(_))
        ));
        // ".." as a name fragment is fine, only whole components are rejected
        assert!(validate_path("a..b/c").is_ok());
    }

    #[test]
    fn test_validate_rejects_nul() {
        assert!(matches!(
            validate_path("a\0b"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_member_meta_hardlink_accessors() {
        let meta = MemberMeta {
            kind: MemberKind::HardLink {
                target: "tftpboot/install/unix".into(),
            },
            size: 0,
            mode: 0o755,
            uid: 0,
            gid: 0,
            mtime: 0,
        };
        assert!(meta.is_hardlink());
        assert_eq!(meta.link_target(), Some("tftpboot/install/unix"));

        let plain = MemberMeta {
            kind: MemberKind::File,
            size: 4,
            mode: 0o644,
            uid: 0,
            gid: 0,
            mtime: 0,
        };
        assert!(!plain.is_hardlink());
        assert_eq!(plain.link_target(), None);
    }
}
