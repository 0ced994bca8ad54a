// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! TFTP Daemon
//!
//! Per-peer read transfers over one socket. Sessions are keyed by client
//! address so concurrent installs do not clobber each other's buffer;
//! each session holds the whole patched asset and block content is
//! sliced by acknowledged block number, never via a cursor.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::wire::{encode_data, encode_error, ErrorCode, Packet};
use crate::domain::session::{SessionTable, TransferSession};
use crate::domain::store::{AssetStore, StoreError};

const MAX_DATAGRAM: usize = 1522;

/// Fixed TFTP block size.
pub const BLOCK_SIZE: usize = 512;

/// Read-only TFTP server bound to one socket.
pub struct TftpDaemon {
    socket: UdpSocket,
    store: Arc<dyn AssetStore>,
    sessions: SessionTable<TransferSession>,
}

impl TftpDaemon {
    /// Create a daemon over an already-bound socket.
    pub fn new(socket: UdpSocket, store: Arc<dyn AssetStore>) -> Self {
        Self {
            socket,
            store,
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
                    error!(error = %e, "tftp: receive failed");
                    continue;
                }
            };

            self.sessions.prune();
            if let Some(reply) = self.handle(&buf[..len], peer).await {
                if let Err(e) = self.socket.send_to(&reply, peer).await {
                    warn!(%peer, error = %e, "tftp: send failed");
                }
            }
        }
    }

    /// Process one datagram; returns the reply to send, if any.
    async fn handle(&mut self, datagram: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(super::wire::WireError::UnknownOp(op)) => {
                warn!(%peer, op, "tftp: unknown opcode");
                return Some(encode_error(
                    ErrorCode::IllegalOperation,
                    ErrorCode::IllegalOperation.message(),
                ));
            }
            Err(e) => {
                warn!(%peer, error = %e, "tftp: dropping malformed datagram");
                return None;
            }
        };

        match packet {
            Packet::ReadRequest { filename, mode } => self.start_transfer(peer, &filename, &mode).await,
            Packet::Ack { block } => self.continue_transfer(peer, block),
            Packet::Error { code, message } => {
                match ErrorCode::lookup(code) {
                    Some(text) => warn!(%peer, code, "tftp: client error '{text}'"),
                    None => warn!(%peer, code, message = %message, "tftp: client error"),
                }
                self.sessions.remove(&peer);
                None
            }
            Packet::WriteRequest { filename, .. } => {
                warn!(%peer, file = %filename, "tftp: write request refused");
                Some(encode_error(
                    ErrorCode::IllegalOperation,
                    ErrorCode::IllegalOperation.message(),
                ))
            }
            Packet::Data { block } => {
                warn!(%peer, block, "tftp: unexpected data packet");
                Some(encode_error(
                    ErrorCode::IllegalOperation,
                    ErrorCode::IllegalOperation.message(),
                ))
            }
        }
    }

    async fn start_transfer(
        &mut self,
        peer: SocketAddr,
        filename: &str,
        mode: &str,
    ) -> Option<Vec<u8>> {
        info!(%peer, file = %filename, mode = %mode, "tftp: read request");

        let data = match self.store.lookup(filename).await {
            Ok(data) => data,
            Err(e @ (StoreError::NotFound(_) | StoreError::InvalidPath(_))) => {
                warn!(%peer, file = %filename, error = %e, "tftp: asset not found");
                return Some(encode_error(
                    ErrorCode::FileNotFound,
                    ErrorCode::FileNotFound.message(),
                ));
            }
            Err(e) => {
                error!(%peer, file = %filename, error = %e, "tftp: lookup failed");
                return Some(encode_error(ErrorCode::NotDefined, &e.to_string()));
            }
        };

        let first = block_slice(&data, 0);
        self.sessions.insert(peer, TransferSession { data });
        Some(encode_data(1, &first))
    }

    fn continue_transfer(&mut self, peer: SocketAddr, block: u16) -> Option<Vec<u8>> {
        let Some(session) = self.sessions.get_mut(&peer) else {
            debug!(%peer, block, "tftp: ack without active transfer");
            return None;
        };

        let chunk = block_slice(&session.data, block);
        let reply = encode_data(block.wrapping_add(1), &chunk);
        if chunk.len() < BLOCK_SIZE {
            debug!(%peer, final_block = block.wrapping_add(1), "tftp: transfer complete");
            self.sessions.remove(&peer);
        }
        Some(reply)
    }
}

/// Content of the block that follows acknowledged block `block`.
///
/// Computed directly from the buffer so repeating an ack reproduces the
/// identical reply.
fn block_slice(data: &Bytes, block: u16) -> Bytes {
    let start = (block as usize * BLOCK_SIZE).min(data.len());
    let end = (start + BLOCK_SIZE).min(data.len());
    data.slice(start..end)
}
