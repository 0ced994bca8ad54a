// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tar Archive Asset Store
//!
//! Filesystem-free implementation of `AssetStore` over a single tar
//! archive of install assets. The archive is read and indexed once at
//! startup; every member under the `tftpboot/` boot root is held in
//! memory with its metadata, patch rules already applied. Repeat lookups
//! therefore return identical bytes, and hard links resolve through the
//! index without touching the archive again.
//!
//! **Limitations:**
//! - The whole asset tree is resident in memory (install trees for the
//!   supported workstation class are tens of megabytes)
//! - The archive is not re-read while the server runs; replacing assets
//!   requires a restart

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tar::EntryType;

use crate::domain::patch::PatchSet;
use crate::domain::store::{
    validate_path, AssetStore, MemberKind, MemberMeta, StoreError,
};

/// Root prefix of the boot asset tree inside the archive.
pub const BOOT_ROOT: &str = "tftpboot";

struct Record {
    meta: MemberMeta,
    data: Bytes,
}

/// In-memory index of the boot archive.
pub struct TarArchiveStore {
    index: HashMap<String, Record>,
}

impl TarArchiveStore {
    /// Open and index an archive from the filesystem, with the built-in
    /// patch table applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Index an archive from any reader, with the built-in patch table.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StoreError> {
        Self::with_patches(reader, PatchSet::builtin())
    }

    /// Index an archive from any reader with an explicit patch table.
    pub fn with_patches<R: Read>(reader: R, patches: PatchSet) -> Result<Self, StoreError> {
        let mut archive = tar::Archive::new(reader);
        let mut index = HashMap::new();

        for entry in archive
            .entries()
            .map_err(|e| StoreError::Archive(e.to_string()))?
        {
            let mut entry = entry.map_err(|e| StoreError::Archive(e.to_string()))?;
            let name = entry
                .path()
                .map_err(|e| StoreError::Archive(e.to_string()))?
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string();

            let header = entry.header();
            let kind = match header.entry_type() {
                EntryType::Regular | EntryType::GNUSparse | EntryType::Continuous => {
                    MemberKind::File
                }
                EntryType::Directory => MemberKind::Directory,
                EntryType::Link => {
                    let target = header
                        .link_name()
                        .map_err(|e| StoreError::Archive(e.to_string()))?
                        .ok_or_else(|| {
                            StoreError::Archive(format!("link member {name} has no target"))
                        })?
                        .to_string_lossy()
                        .trim_end_matches('/')
                        .to_string();
                    MemberKind::HardLink { target }
                }
                other => {
                    tracing::debug!(member = %name, ?other, "skipping unsupported member kind");
                    continue;
                }
            };

            let meta = MemberMeta {
                size: header.size().map_err(|e| StoreError::Archive(e.to_string()))?,
                mode: header.mode().map_err(|e| StoreError::Archive(e.to_string()))?,
                uid: header.uid().map_err(|e| StoreError::Archive(e.to_string()))?,
                gid: header.gid().map_err(|e| StoreError::Archive(e.to_string()))?,
                mtime: header.mtime().map_err(|e| StoreError::Archive(e.to_string()))?,
                kind,
            };

            let data = if matches!(meta.kind, MemberKind::File) {
                let mut buf = Vec::with_capacity(meta.size as usize);
                entry.read_to_end(&mut buf)?;
                let basename = name.rsplit('/').next().unwrap_or(&name);
                patches.apply(basename, &mut buf);
                Bytes::from(buf)
            } else {
                Bytes::new()
            };

            index.insert(name, Record { meta, data });
        }

        tracing::info!(members = index.len(), "indexed boot archive");
        Ok(Self { index })
    }

    /// Resolve a logical path to its archive member name.
    fn member_name(path: &str) -> Result<String, StoreError> {
        validate_path(path)?;
        Ok(format!("{}/{}", BOOT_ROOT, path.trim_start_matches('/')))
    }

    fn record(&self, path: &str) -> Result<&Record, StoreError> {
        let name = Self::member_name(path)?;
        self.index
            .get(&name)
            .ok_or(StoreError::NotFound(name))
    }
}

#[async_trait]
impl AssetStore for TarArchiveStore {
    async fn lookup(&self, path: &str) -> Result<Bytes, StoreError> {
        let record = self.record(path)?;
        match &record.meta.kind {
            MemberKind::File => Ok(record.data.clone()),
            MemberKind::HardLink { target } => {
                let resolved = self
                    .index
                    .get(target.as_str())
                    .ok_or_else(|| StoreError::NotFound(target.clone()))?;
                match resolved.meta.kind {
                    MemberKind::File => Ok(resolved.data.clone()),
                    _ => Err(StoreError::Archive(format!(
                        "link target {target} is not a file"
                    ))),
                }
            }
            MemberKind::Directory => Err(StoreError::Archive(format!(
                "member {path} is a directory"
            ))),
        }
    }

    async fn member_meta(&self, path: &str) -> Result<MemberMeta, StoreError> {
        self.record(path).map(|record| record.meta.clone())
    }
}
