// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! BOOTP Daemon
//!
//! One-shot request/reply responder. Decoding, policy and encoding live
//! in `handle` so the daemon can be exercised without sockets; `run`
//! owns the receive loop and never terminates on a per-datagram failure.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::wire::{encode_reply, BootOp, BootPacket};

const MAX_DATAGRAM: usize = 1522;

/// Stateless BOOTP responder bound to one socket.
pub struct BootpDaemon {
    socket: UdpSocket,
    server_ip: Ipv4Addr,
    host: String,
}

impl BootpDaemon {
    /// Create a daemon over an already-bound socket.
    pub fn new(socket: UdpSocket, server_ip: Ipv4Addr, host: String) -> Self {
        Self {
            socket,
            server_ip,
            host,
        }
    }

    /// Serve forever; per-datagram failures are logged, never fatal.
    pub async fn run(self) {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!(error = %e, "bootp: receive failed");
                    continue;
                }
            };

            if let Some(reply) = self.handle(&buf[..len], peer) {
                if let Err(e) = self.socket.send_to(&reply, peer).await {
                    warn!(%peer, error = %e, "bootp: send failed");
                }
            }
        }
    }

    /// Process one datagram; returns the reply to send, if any.
    fn handle(&self, datagram: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let packet = match BootPacket::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(%peer, error = %e, "bootp: ignoring datagram");
                return None;
            }
        };

        if packet.op != BootOp::Request {
            debug!(%peer, op = ?packet.op, "bootp: not a boot request");
            return None;
        }

        info!(
            address = %packet.ciaddr,
            mac = %packet.mac_string(),
            "bootp: address assigned"
        );
        Some(encode_reply(&packet, self.server_ip, &self.host))
    }
}
