// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Per-Client Protocol Sessions
//!
//! The block-transfer daemons key their in-flight state by client peer
//! address so concurrent clients cannot corrupt each other's transfer.
//! Sessions are discarded on completion, on a client-reported error, or
//! after idling past the table's prune window.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Session values and the peer-keyed table holding them

use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Default idle window after which a session is pruned.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(300);

/// In-flight TFTP transfer: the full patched buffer being served.
///
/// Block content is always recomputed from the buffer by block number,
/// never via a cursor, so duplicate acks reproduce identical data.
#[derive(Debug, Clone)]
pub struct TransferSession {
    /// Full content of the file under transfer
    pub data: Bytes,
}

/// In-flight BFS transfer: the enquired buffer and the offset-echo state.
#[derive(Debug, Clone)]
pub struct BlockSession {
    /// Buffer resolved by the enquire step
    pub data: Bytes,
    /// Last byte offset served; `None` until the first read (the
    /// original protocol's `-1` sentinel) and again after a duplicate
    /// read signalled end-of-transfer.
    pub last_offset: Option<u32>,
}

struct Entry<S> {
    session: S,
    last_seen: Instant,
}

/// Peer-keyed session table with idle pruning.
///
/// Owned by a single daemon task; no interior synchronization.
pub struct SessionTable<S> {
    entries: HashMap<SocketAddr, Entry<S>>,
    idle: Duration,
}

impl<S> SessionTable<S> {
    /// Create a table with the default idle window.
    pub fn new() -> Self {
        Self::with_idle(DEFAULT_SESSION_IDLE)
    }

    /// Create a table with a custom idle window.
    pub fn with_idle(idle: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            idle,
        }
    }

    /// Insert or replace the peer's session.
    pub fn insert(&mut self, peer: SocketAddr, session: S) {
        self.entries.insert(
            peer,
            Entry {
                session,
                last_seen: Instant::now(),
            },
        );
    }

    /// Borrow the peer's session mutably, refreshing its idle clock.
    pub fn get_mut(&mut self, peer: &SocketAddr) -> Option<&mut S> {
        self.entries.get_mut(peer).map(|entry| {
            entry.last_seen = Instant::now();
            &mut entry.session
        })
    }

    /// Remove and return the peer's session.
    pub fn remove(&mut self, peer: &SocketAddr) -> Option<S> {
        self.entries.remove(peer).map(|entry| entry.session)
    }

    /// Drop sessions idle past the table's window.
    ///
    /// Called by the owning daemon once per processed datagram; tables
    /// hold at most a handful of concurrent installs so a full sweep is
    /// cheap.
    pub fn prune(&mut self) {
        let idle = self.idle;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.last_seen.elapsed() < idle);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "pruned idle sessions");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S> Default for SessionTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        format!("192.0.2.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_sessions_are_keyed_per_peer() {
        let mut table = SessionTable::new();
        table.insert(
            peer(1000),
            TransferSession {
                data: Bytes::from_static(b"first"),
            },
        );
        table.insert(
            peer(1001),
            TransferSession {
                data: Bytes::from_static(b"second"),
            },
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.get_mut(&peer(1000)).unwrap().data.as_ref(), b"first");
        assert_eq!(table.get_mut(&peer(1001)).unwrap().data.as_ref(), b"second");
    }

    #[test]
    fn test_insert_replaces_stale_session() {
        let mut table = SessionTable::new();
        table.insert(
            peer(1000),
            TransferSession {
                data: Bytes::from_static(b"old"),
            },
        );
        table.insert(
            peer(1000),
            TransferSession {
                data: Bytes::from_static(b"new"),
            },
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_mut(&peer(1000)).unwrap().data.as_ref(), b"new");
    }

    #[test]
    fn test_prune_drops_idle_sessions() {
        let mut table = SessionTable::with_idle(Duration::from_millis(0));
        table.insert(
            peer(1000),
            BlockSession {
                data: Bytes::new(),
                last_offset: None,
            },
        );
        table.prune();
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_returns_session() {
        let mut table = SessionTable::new();
        table.insert(
            peer(7),
            BlockSession {
                data: Bytes::from_static(b"x"),
                last_offset: Some(512),
            },
        );
        let session = table.remove(&peer(7)).unwrap();
        assert_eq!(session.last_offset, Some(512));
        assert!(table.remove(&peer(7)).is_none());
    }
}
