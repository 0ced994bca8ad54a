// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! BFS Daemon
//!
//! Enquire/read block server with per-peer sessions. The offset-echo
//! comparison against the session's recorded last offset is reproduced
//! exactly: a repeated offset resets the sentinel and stays silent, a
//! fresh offset is served and recorded. The protocol has no error
//! message type, so a failed enquire answers with a nonzero `flags`
//! field instead of killing the daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::wire::{encode, BfsHeader, BfsType, Reply};
use crate::domain::session::{BlockSession, SessionTable};
use crate::domain::store::AssetStore;

const MAX_DATAGRAM: usize = 1522;

/// Flags value answering an enquire whose lookup failed.
const FLAG_LOOKUP_FAILED: u32 = 1;

/// Vendor block-protocol server bound to one socket.
pub struct BfsDaemon {
    socket: UdpSocket,
    store: Arc<dyn AssetStore>,
    host: String,
    sessions: SessionTable<BlockSession>,
}

impl BfsDaemon {
    /// Create a daemon over an already-bound socket.
    pub fn new(socket: UdpSocket, store: Arc<dyn AssetStore>, host: String) -> Self {
        Self {
            socket,
            store,
            host,
            sessions: SessionTable::new(),
        }
    }

    /// Serve forever; per-datagram failures are logged, never fatal.
    pub async fn run(mut self) {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!(error = %e, "bfs: receive failed");
                    continue;
                }
            };

            self.sessions.prune();
            if let Some(reply) = self.handle(&buf[..len], peer).await {
                if let Err(e) = self.socket.send_to(&reply, peer).await {
                    warn!(%peer, error = %e, "bfs: send failed");
                }
            }
        }
    }

    /// Process one datagram; returns the reply to send, if any.
    async fn handle(&mut self, datagram: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let (header, payload) = match BfsHeader::decode(datagram) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(%peer, error = %e, "bfs: dropping malformed datagram");
                return None;
            }
        };

        debug!(
            %peer,
            len = datagram.len(),
            msg_type = ?header.msg_type,
            offset = header.offset,
            data_len = header.data_len,
            "bfs: datagram"
        );

        match header.msg_type {
            BfsType::Enquire => self.enquire(peer, &header, payload).await,
            BfsType::Read => self.read(peer, &header, payload),
            BfsType::EnquireAck | BfsType::Data => {
                warn!(%peer, msg_type = ?header.msg_type, "bfs: server-side message from peer");
                None
            }
        }
    }

    async fn enquire(
        &mut self,
        peer: SocketAddr,
        header: &BfsHeader,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        let path_len = header.path_len as usize;
        if path_len == 0 || path_len > payload.len() {
            warn!(%peer, path_len, payload = payload.len(), "bfs: bad enquire path length");
            return None;
        }

        // path is NUL-terminated inside the declared length
        let name = &payload[..path_len - 1];
        let path = String::from_utf8_lossy(name).into_owned();
        info!(%peer, file = %path, "bfs: enquire");

        let mut echo = Vec::with_capacity(name.len() + 1);
        echo.extend_from_slice(name);
        echo.push(0);

        match self.store.lookup(&path).await {
            Ok(data) => {
                self.sessions.insert(
                    peer,
                    BlockSession {
                        data,
                        last_offset: None,
                    },
                );
                Some(encode(&Reply {
                    rev: header.rev,
                    msg_type: BfsType::EnquireAck,
                    path_len: (name.len() + 1) as u16,
                    data_len: 0,
                    offset: 0,
                    flags: 0,
                    server_id: &self.host,
                    payload: &echo,
                }))
            }
            Err(e) => {
                warn!(%peer, file = %path, error = %e, "bfs: enquire failed");
                Some(encode(&Reply {
                    rev: header.rev,
                    msg_type: BfsType::EnquireAck,
                    path_len: (name.len() + 1) as u16,
                    data_len: 0,
                    offset: 0,
                    flags: FLAG_LOOKUP_FAILED,
                    server_id: &self.host,
                    payload: &echo,
                }))
            }
        }
    }

    fn read(&mut self, peer: SocketAddr, header: &BfsHeader, payload: &[u8]) -> Option<Vec<u8>> {
        let Some(session) = self.sessions.get_mut(&peer) else {
            warn!(%peer, "bfs: read without enquire");
            return None;
        };

        let path_len = header.path_len as usize;
        if path_len > payload.len() {
            warn!(%peer, path_len, payload = payload.len(), "bfs: bad read path length");
            return None;
        }
        let echo = &payload[..path_len];

        if session.last_offset == Some(header.offset) {
            // duplicate: the ROM's end-of-transfer signal
            debug!(%peer, offset = header.offset, "bfs: duplicate read, transfer done");
            session.last_offset = None;
            return None;
        }

        let start = (header.offset as usize).min(session.data.len());
        let end = (start + header.data_len as usize).min(session.data.len());
        let chunk = session.data.slice(start..end);
        session.last_offset = Some(header.offset);

        let mut body = Vec::with_capacity(echo.len() + chunk.len());
        body.extend_from_slice(echo);
        body.extend_from_slice(&chunk);

        Some(encode(&Reply {
            rev: header.rev,
            msg_type: BfsType::Data,
            path_len: header.path_len,
            data_len: chunk.len() as u16,
            offset: header.offset,
            flags: 0,
            server_id: &self.host,
            payload: &body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::{MemberMeta, StoreError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;

    struct MemStore {
        files: HashMap<String, Bytes>,
    }

    #[async_trait]
    impl AssetStore for MemStore {
        async fn lookup(&self, path: &str) -> Result<Bytes, StoreError> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(path.to_string()))
        }

        async fn member_meta(&self, path: &str) -> Result<MemberMeta, StoreError> {
            Err(StoreError::NotFound(path.to_string()))
        }
    }

    async fn daemon(files: &[(&str, &[u8])]) -> BfsDaemon {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let store = Arc::new(MemStore {
            files: files
                .iter()
                .map(|(name, data)| (name.to_string(), Bytes::copy_from_slice(data)))
                .collect(),
        });
        BfsDaemon::new(socket, store, "bootserv".into())
    }

    fn peer(port: u16) -> SocketAddr {
        format!("192.0.2.30:{port}").parse().unwrap()
    }

    fn enquire(name: &str) -> Vec<u8> {
        let mut payload = name.as_bytes().to_vec();
        payload.push(0);
        encode(&Reply {
            rev: 1,
            msg_type: BfsType::Enquire,
            path_len: payload.len() as u16,
            data_len: 0,
            offset: 0,
            flags: 0,
            server_id: "",
            payload: &payload,
        })
    }

    fn read(name: &str, offset: u32, data_len: u16) -> Vec<u8> {
        let mut payload = name.as_bytes().to_vec();
        payload.push(0);
        encode(&Reply {
            rev: 1,
            msg_type: BfsType::Read,
            path_len: payload.len() as u16,
            data_len,
            offset,
            flags: 0,
            server_id: "",
            payload: &payload,
        })
    }

    #[tokio::test]
    async fn test_enquire_then_read() {
        let body: Vec<u8> = (0..1024u32).map(|i| i as u8).collect();
        let mut daemon = daemon(&[("boot.bin", &body)]).await;

        let ack = daemon.handle(&enquire("boot.bin"), peer(1)).await.unwrap();
        let (header, payload) = BfsHeader::decode(&ack).unwrap();
        assert_eq!(header.msg_type, BfsType::EnquireAck);
        assert_eq!(header.flags, 0);
        assert_eq!(header.path_len, 9);
        assert_eq!(payload, b"boot.bin\0");
        assert_eq!(&header.server_id[..8], b"bootserv");

        let data = daemon
            .handle(&read("boot.bin", 512, 256), peer(1))
            .await
            .unwrap();
        let (header, payload) = BfsHeader::decode(&data).unwrap();
        assert_eq!(header.msg_type, BfsType::Data);
        assert_eq!(header.offset, 512);
        assert_eq!(header.data_len, 256);
        assert_eq!(&payload[9..], &body[512..768]);
    }

    #[tokio::test]
    async fn test_duplicate_read_suppressed() {
        let body = vec![7u8; 1024];
        let mut daemon = daemon(&[("boot.bin", &body)]).await;
        daemon.handle(&enquire("boot.bin"), peer(1)).await.unwrap();

        assert!(daemon.handle(&read("boot.bin", 0, 512), peer(1)).await.is_some());
        // same offset again: one reply then silence
        assert!(daemon.handle(&read("boot.bin", 0, 512), peer(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_fresh_offset_after_suppression_served() {
        let body = vec![7u8; 1024];
        let mut daemon = daemon(&[("boot.bin", &body)]).await;
        daemon.handle(&enquire("boot.bin"), peer(1)).await.unwrap();

        daemon.handle(&read("boot.bin", 0, 512), peer(1)).await.unwrap();
        assert!(daemon.handle(&read("boot.bin", 0, 512), peer(1)).await.is_none());

        // the sentinel was reset, so the same offset counts as fresh again
        let again = daemon.handle(&read("boot.bin", 0, 512), peer(1)).await;
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn test_enquire_missing_file_sets_flags() {
        let mut daemon = daemon(&[]).await;
        let ack = daemon.handle(&enquire("absent"), peer(1)).await.unwrap();
        let (header, _) = BfsHeader::decode(&ack).unwrap();
        assert_eq!(header.msg_type, BfsType::EnquireAck);
        assert_eq!(header.flags, 1);

        // no session was created
        assert!(daemon.handle(&read("absent", 0, 512), peer(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_read_without_enquire_dropped() {
        let mut daemon = daemon(&[("boot.bin", b"data")]).await;
        assert!(daemon.handle(&read("boot.bin", 0, 4), peer(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_read_clamped_at_end_of_buffer() {
        let body = vec![3u8; 100];
        let mut daemon = daemon(&[("small", &body)]).await;
        daemon.handle(&enquire("small"), peer(1)).await.unwrap();

        let data = daemon.handle(&read("small", 64, 512), peer(1)).await.unwrap();
        let (header, payload) = BfsHeader::decode(&data).unwrap();
        assert_eq!(header.data_len, 36);
        assert_eq!(payload.len(), 6 + 36); // "small\0" echo + clamped chunk
    }

    #[tokio::test]
    async fn test_peers_do_not_share_sessions() {
        let one = vec![1u8; 512];
        let two = vec![2u8; 512];
        let mut daemon = daemon(&[("one", &one), ("two", &two)]).await;

        daemon.handle(&enquire("one"), peer(1)).await.unwrap();
        daemon.handle(&enquire("two"), peer(2)).await.unwrap();

        let data = daemon.handle(&read("one", 0, 16), peer(1)).await.unwrap();
        let (_, payload) = BfsHeader::decode(&data).unwrap();
        assert_eq!(&payload[4..], &[1u8; 16]);

        let data = daemon.handle(&read("two", 0, 16), peer(2)).await.unwrap();
        let (_, payload) = BfsHeader::decode(&data).unwrap();
        assert_eq!(&payload[4..], &[2u8; 16]);
    }
}
