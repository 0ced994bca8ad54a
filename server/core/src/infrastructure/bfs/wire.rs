// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! BFS Wire Codec
//!
//! Fixed 32-byte big-endian header, payload follows:
//! `rev(1) type(1) path_len(2) data_len(2) reserved(2) offset(4)
//! flags(4) server_id(16)`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements encode/decode for the vendor block protocol

use thiserror::Error;

/// Total size of the fixed header.
pub const HEADER_LEN: usize = 32;

/// Size of the server identifier field.
pub const SERVER_ID_LEN: usize = 16;

/// BFS message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BfsType {
    /// Client path resolution request
    Enquire = 1,
    /// Server answer to an enquire
    EnquireAck = 2,
    /// Client byte-range request
    Read = 3,
    /// Server data reply
    Data = 4,
}

impl TryFrom<u8> for BfsType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            1 => Ok(BfsType::Enquire),
            2 => Ok(BfsType::EnquireAck),
            3 => Ok(BfsType::Read),
            4 => Ok(BfsType::Data),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// BFS codec errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("short BFS datagram: {0} bytes")]
    Short(usize),

    #[error("unknown BFS message type {0}")]
    UnknownType(u8),
}

/// A decoded BFS header.
#[derive(Debug, Clone)]
pub struct BfsHeader {
    pub rev: u8,
    pub msg_type: BfsType,
    pub path_len: u16,
    pub data_len: u16,
    pub offset: u32,
    pub flags: u32,
    pub server_id: [u8; SERVER_ID_LEN],
}

impl BfsHeader {
    /// Decode the header, returning it with the trailing payload.
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::Short(buf.len()));
        }
        let msg_type = BfsType::try_from(buf[1])?;
        let mut server_id = [0u8; SERVER_ID_LEN];
        server_id.copy_from_slice(&buf[16..32]);

        let header = Self {
            rev: buf[0],
            msg_type,
            path_len: u16::from_be_bytes([buf[2], buf[3]]),
            data_len: u16::from_be_bytes([buf[4], buf[5]]),
            offset: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            flags: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            server_id,
        };
        Ok((header, &buf[HEADER_LEN..]))
    }
}

/// Parameters of an outgoing message.
pub struct Reply<'a> {
    pub rev: u8,
    pub msg_type: BfsType,
    pub path_len: u16,
    pub data_len: u16,
    pub offset: u32,
    pub flags: u32,
    pub server_id: &'a str,
    pub payload: &'a [u8],
}

/// Encode a message: header (reserved field zeroed) plus payload.
pub fn encode(reply: &Reply<'_>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + reply.payload.len());
    buf.push(reply.rev);
    buf.push(reply.msg_type as u8);
    buf.extend_from_slice(&reply.path_len.to_be_bytes());
    buf.extend_from_slice(&reply.data_len.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&reply.offset.to_be_bytes());
    buf.extend_from_slice(&reply.flags.to_be_bytes());

    let mut server_id = [0u8; SERVER_ID_LEN];
    let name = reply.server_id.as_bytes();
    let len = name.len().min(SERVER_ID_LEN - 1);
    server_id[..len].copy_from_slice(&name[..len]);
    buf.extend_from_slice(&server_id);

    buf.extend_from_slice(reply.payload);
    buf
}
