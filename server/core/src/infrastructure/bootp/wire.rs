// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! BOOTP Wire Codec
//!
//! Fixed 300-byte packet layout, big-endian:
//! `op(1) htype(1) hlen(1) hops(1) xid(4) secs(2) pad(2) ciaddr(4)
//! yiaddr(4) siaddr(4) giaddr(4) chaddr(16) sname(64) file(128) vend(64)`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements encode/decode for the BOOTP packet format

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Total size of a BOOTP packet.
pub const PACKET_LEN: usize = 300;

const CHADDR_LEN: usize = 16;
const SNAME_LEN: usize = 64;
const FILE_LEN: usize = 128;
const VEND_LEN: usize = 64;

/// BOOTP operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOp {
    /// Client boot request
    Request = 1,
    /// Server boot reply
    Reply = 2,
}

impl TryFrom<u8> for BootOp {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BootOp::Request),
            2 => Ok(BootOp::Reply),
            other => Err(WireError::UnknownOp(other)),
        }
    }
}

/// BOOTP codec errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("short BOOTP packet: {0} bytes")]
    Short(usize),

    #[error("unknown BOOTP op {0}")]
    UnknownOp(u8),
}

/// A decoded BOOTP packet, fields the responder needs only.
#[derive(Debug, Clone)]
pub struct BootPacket {
    pub op: BootOp,
    pub htype: u8,
    pub hlen: u8,
    pub xid: u32,
    pub ciaddr: Ipv4Addr,
    pub chaddr: [u8; CHADDR_LEN],
    pub file: [u8; FILE_LEN],
    pub vend: [u8; VEND_LEN],
}

impl BootPacket {
    /// Decode a request datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < PACKET_LEN {
            return Err(WireError::Short(buf.len()));
        }

        let op = BootOp::try_from(buf[0])?;
        let mut xid = [0u8; 4];
        xid.copy_from_slice(&buf[4..8]);
        let mut ciaddr = [0u8; 4];
        ciaddr.copy_from_slice(&buf[12..16]);
        let mut chaddr = [0u8; CHADDR_LEN];
        chaddr.copy_from_slice(&buf[28..44]);
        let mut file = [0u8; FILE_LEN];
        file.copy_from_slice(&buf[108..236]);
        let mut vend = [0u8; VEND_LEN];
        vend.copy_from_slice(&buf[236..300]);

        Ok(Self {
            op,
            htype: buf[1],
            hlen: buf[2],
            xid: u32::from_be_bytes(xid),
            ciaddr: Ipv4Addr::from(ciaddr),
            chaddr,
            file,
            vend,
        })
    }

    /// Dash-separated hex rendering of the client hardware address
    /// (first six bytes, the ethernet portion of the field).
    pub fn mac_string(&self) -> String {
        let mut out = String::with_capacity(6 * 3);
        for (i, byte) in self.chaddr[..6].iter().enumerate() {
            if i > 0 {
                out.push('-');
            }
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

/// Encode the reply to a boot request.
///
/// The client's claimed address is echoed into both `ciaddr` and
/// `yiaddr`; the server's bound address fills `siaddr` and `giaddr`;
/// `chaddr`, `file` and `vend` pass through unchanged; `sname` carries
/// the server's host name.
pub fn encode_reply(request: &BootPacket, server: Ipv4Addr, host: &str) -> Vec<u8> {
    let mut buf = vec![0u8; PACKET_LEN];
    buf[0] = BootOp::Reply as u8;
    buf[1] = request.htype;
    buf[2] = request.hlen;
    // hops and secs are zeroed in the reply
    buf[4..8].copy_from_slice(&request.xid.to_be_bytes());
    buf[12..16].copy_from_slice(&request.ciaddr.octets());
    buf[16..20].copy_from_slice(&request.ciaddr.octets());
    buf[20..24].copy_from_slice(&server.octets());
    buf[24..28].copy_from_slice(&server.octets());
    buf[28..44].copy_from_slice(&request.chaddr);

    let name = host.as_bytes();
    let len = name.len().min(SNAME_LEN - 1);
    buf[44..44 + len].copy_from_slice(&name[..len]);

    buf[108..236].copy_from_slice(&request.file);
    buf[236..300].copy_from_slice(&request.vend);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_datagram() -> Vec<u8> {
        let mut buf = vec![0u8; PACKET_LEN];
        buf[0] = 1; // request
        buf[1] = 1; // ethernet
        buf[2] = 6;
        buf[3] = 2; // hops, zeroed in the reply
        buf[4..8].copy_from_slice(&0xdeadbeefu32.to_be_bytes());
        buf[8..10].copy_from_slice(&7u16.to_be_bytes()); // secs
        buf[12..16].copy_from_slice(&[192, 0, 2, 40]);
        buf[28..34].copy_from_slice(&[0x08, 0x00, 0x69, 0x02, 0x01, 0xfc]);
        buf[108] = b'b'; // boot file
        buf[236] = 0x63; // vendor magic
        buf
    }

    #[test]
    fn test_decode_request() {
        let packet = BootPacket::decode(&request_datagram()).unwrap();
        assert_eq!(packet.op, BootOp::Request);
        assert_eq!(packet.htype, 1);
        assert_eq!(packet.hlen, 6);
        assert_eq!(packet.xid, 0xdeadbeef);
        assert_eq!(packet.ciaddr, Ipv4Addr::new(192, 0, 2, 40));
        assert_eq!(packet.mac_string(), "08-00-69-02-01-fc");
    }

    #[test]
    fn test_decode_short_packet() {
        assert!(matches!(
            BootPacket::decode(&[1, 2, 3]),
            Err(WireError::Short(3))
        ));
    }

    #[test]
    fn test_decode_unknown_op() {
        let mut buf = request_datagram();
        buf[0] = 9;
        assert!(matches!(
            BootPacket::decode(&buf),
            Err(WireError::UnknownOp(9))
        ));
    }

    #[test]
    fn test_reply_echoes_client_address() {
        let request = BootPacket::decode(&request_datagram()).unwrap();
        let reply = encode_reply(&request, Ipv4Addr::new(192, 0, 2, 1), "bootserv");

        assert_eq!(reply.len(), PACKET_LEN);
        assert_eq!(reply[0], BootOp::Reply as u8);
        assert_eq!(reply[3], 0); // hops zeroed
        assert_eq!(&reply[8..10], &[0, 0]); // secs zeroed
        assert_eq!(&reply[4..8], &0xdeadbeefu32.to_be_bytes());
        // yiaddr equals the request's ciaddr
        assert_eq!(&reply[12..16], &[192, 0, 2, 40]);
        assert_eq!(&reply[16..20], &[192, 0, 2, 40]);
        // siaddr and giaddr carry the server address
        assert_eq!(&reply[20..24], &[192, 0, 2, 1]);
        assert_eq!(&reply[24..28], &[192, 0, 2, 1]);
        // chaddr echoed unchanged
        assert_eq!(&reply[28..34], &[0x08, 0x00, 0x69, 0x02, 0x01, 0xfc]);
        // sname carries the host name, NUL padded
        assert_eq!(&reply[44..52], b"bootserv");
        assert_eq!(reply[52], 0);
        // file and vend echoed
        assert_eq!(reply[108], b'b');
        assert_eq!(reply[236], 0x63);
    }
}
