// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tar Re-Export
//!
//! Builds the in-memory archive the installer's `tar cf -` command
//! streams back over the session. Listed members are re-exported under
//! their command-relative names: the boot root and working directory
//! prefixes are stripped, direct parent directories are emitted first,
//! and hard-link relationships are preserved with their targets
//! relativized the same way.

use std::collections::BTreeSet;
use std::io;

use tar::{Builder, EntryType, Header};
use tracing::warn;

use crate::domain::store::{AssetStore, MemberKind, MemberMeta};
use crate::infrastructure::archive::BOOT_ROOT;

/// Build a tar stream containing `paths`, resolved under `workdir`.
///
/// A member that cannot be resolved is logged and skipped; the rest of
/// the archive is still produced.
pub async fn build_archive(
    store: &dyn AssetStore,
    workdir: &str,
    paths: &[&str],
) -> io::Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());

    // the prefix hard-link targets carry in the backing archive
    let strip_prefix = format!("{BOOT_ROOT}{workdir}");

    // direct parent directories first, deduplicated, stable order
    let parents: BTreeSet<&str> = paths
        .iter()
        .filter_map(|path| path.rsplit_once('/').map(|(dir, _)| dir))
        .filter(|dir| !dir.is_empty())
        .collect();

    for dir in parents {
        let logical = format!("{workdir}{dir}");
        match store.member_meta(&logical).await {
            Ok(meta) => {
                let mut header = header_from_meta(&meta, EntryType::Directory, 0);
                builder.append_data(&mut header, dir, io::empty())?;
            }
            Err(e) => warn!(dir = %logical, error = %e, "tar: parent directory skipped"),
        }
    }

    for path in paths {
        let logical = format!("{workdir}{path}");
        let meta = match store.member_meta(&logical).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(member = %logical, error = %e, "tar: member skipped");
                continue;
            }
        };

        match &meta.kind {
            MemberKind::HardLink { target } => {
                let relative = target.strip_prefix(&strip_prefix).unwrap_or(target.as_str());
                let mut header = header_from_meta(&meta, EntryType::Link, 0);
                builder.append_link(&mut header, path, relative)?;
            }
            MemberKind::Directory => {
                let mut header = header_from_meta(&meta, EntryType::Directory, 0);
                builder.append_data(&mut header, path, io::empty())?;
            }
            MemberKind::File => match store.lookup(&logical).await {
                Ok(data) => {
                    let mut header =
                        header_from_meta(&meta, EntryType::Regular, data.len() as u64);
                    builder.append_data(&mut header, path, data.as_ref())?;
                }
                Err(e) => warn!(member = %logical, error = %e, "tar: content skipped"),
            },
        }
    }

    builder.into_inner()
}

fn header_from_meta(meta: &MemberMeta, entry_type: EntryType, size: u64) -> Header {
    let mut header = Header::new_ustar();
    header.set_entry_type(entry_type);
    header.set_mode(meta.mode);
    header.set_uid(meta.uid);
    header.set_gid(meta.gid);
    header.set_mtime(meta.mtime);
    header.set_size(size);
    header
}
