// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! TFTP Wire Codec
//!
//! RFC 1350 packet formats: two-byte big-endian opcode, then
//! opcode-specific fields. Strings are NUL-terminated ASCII.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements encode/decode for TFTP packets

use thiserror::Error;

/// TFTP opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    ReadRequest = 1,
    WriteRequest = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

impl TryFrom<u16> for Opcode {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, WireError> {
        match value {
            1 => Ok(Opcode::ReadRequest),
            2 => Ok(Opcode::WriteRequest),
            3 => Ok(Opcode::Data),
            4 => Ok(Opcode::Ack),
            5 => Ok(Opcode::Error),
            other => Err(WireError::UnknownOp(other)),
        }
    }
}

/// Standard TFTP error codes with their canonical messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileExists = 6,
    NoSuchUser = 7,
}

impl ErrorCode {
    /// Canonical message for the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::NotDefined => "Not defined, see error message (if any).",
            ErrorCode::FileNotFound => "File not found.",
            ErrorCode::AccessViolation => "Access violation.",
            ErrorCode::DiskFull => "Disk full or allocation exceeded.",
            ErrorCode::IllegalOperation => "Illegal TFTP operation.",
            ErrorCode::UnknownTransferId => "Unknown transfer ID.",
            ErrorCode::FileExists => "File already exists.",
            ErrorCode::NoSuchUser => "No such user.",
        }
    }

    /// Message for a code received from a client, if it is in the table.
    pub fn lookup(code: u16) -> Option<&'static str> {
        let known = match code {
            0 => ErrorCode::NotDefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileExists,
            7 => ErrorCode::NoSuchUser,
            _ => return None,
        };
        Some(known.message())
    }
}

/// A decoded TFTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest { filename: String, mode: String },
    WriteRequest { filename: String, mode: String },
    Data { block: u16 },
    Ack { block: u16 },
    Error { code: u16, message: String },
}

/// TFTP codec errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("short TFTP packet: {0} bytes")]
    Short(usize),

    #[error("unknown TFTP opcode {0}")]
    UnknownOp(u16),

    #[error("truncated {0} packet")]
    Truncated(&'static str),
}

impl Packet {
    /// Decode one datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < 2 {
            return Err(WireError::Short(buf.len()));
        }
        let opcode = Opcode::try_from(u16::from_be_bytes([buf[0], buf[1]]))?;

        match opcode {
            Opcode::ReadRequest => {
                let (filename, mode) = decode_request_strings(&buf[2..], "RRQ")?;
                Ok(Packet::ReadRequest { filename, mode })
            }
            Opcode::WriteRequest => {
                let (filename, mode) = decode_request_strings(&buf[2..], "WRQ")?;
                Ok(Packet::WriteRequest { filename, mode })
            }
            Opcode::Data => {
                let block = decode_block(buf, "DATA")?;
                Ok(Packet::Data { block })
            }
            Opcode::Ack => {
                let block = decode_block(buf, "ACK")?;
                Ok(Packet::Ack { block })
            }
            Opcode::Error => {
                if buf.len() < 4 {
                    return Err(WireError::Truncated("ERROR"));
                }
                let code = u16::from_be_bytes([buf[2], buf[3]]);
                let raw = &buf[4..];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                let message = String::from_utf8_lossy(&raw[..end]).into_owned();
                Ok(Packet::Error { code, message })
            }
        }
    }
}

fn decode_block(buf: &[u8], kind: &'static str) -> Result<u16, WireError> {
    if buf.len() < 4 {
        return Err(WireError::Truncated(kind));
    }
    Ok(u16::from_be_bytes([buf[2], buf[3]]))
}

fn decode_request_strings(body: &[u8], kind: &'static str) -> Result<(String, String), WireError> {
    let mut parts = body.split(|&b| b == 0);
    let filename = parts.next().ok_or(WireError::Truncated(kind))?;
    let mode = parts.next().ok_or(WireError::Truncated(kind))?;
    if body.iter().filter(|&&b| b == 0).count() < 2 {
        // the mode string itself must be NUL-terminated
        return Err(WireError::Truncated(kind));
    }
    Ok((
        String::from_utf8_lossy(filename).into_owned(),
        String::from_utf8_lossy(mode).into_owned(),
    ))
}

/// Encode a DATA packet for `block` carrying `chunk`.
pub fn encode_data(block: u16, chunk: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + chunk.len());
    buf.extend_from_slice(&(Opcode::Data as u16).to_be_bytes());
    buf.extend_from_slice(&block.to_be_bytes());
    buf.extend_from_slice(chunk);
    buf
}

/// Encode an ERROR packet with a NUL-terminated message.
pub fn encode_error(code: ErrorCode, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + message.len());
    buf.extend_from_slice(&(Opcode::Error as u16).to_be_bytes());
    buf.extend_from_slice(&(code as u16).to_be_bytes());
    buf.extend_from_slice(message.as_bytes());
    buf.push(0);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rrq() {
        let packet = Packet::decode(b"\x00\x01boot.bin\x00octet\x00").unwrap();
        assert_eq!(
            packet,
            Packet::ReadRequest {
                filename: "boot.bin".into(),
                mode: "octet".into()
            }
        );
    }

    #[test]
    fn test_decode_rrq_missing_mode_terminator() {
        assert!(matches!(
            Packet::decode(b"\x00\x01boot.bin\x00octet"),
            Err(WireError::Truncated("RRQ"))
        ));
    }

    #[test]
    fn test_decode_ack() {
        let packet = Packet::decode(b"\x00\x04\x00\x07").unwrap();
        assert_eq!(packet, Packet::Ack { block: 7 });
    }

    #[test]
    fn test_decode_error_packet() {
        let packet = Packet::decode(b"\x00\x05\x00\x01File not found.\x00").unwrap();
        assert_eq!(
            packet,
            Packet::Error {
                code: 1,
                message: "File not found.".into()
            }
        );
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert!(matches!(
            Packet::decode(b"\x00\x09\x00\x00"),
            Err(WireError::UnknownOp(9))
        ));
    }

    #[test]
    fn test_decode_short() {
        assert!(matches!(Packet::decode(b"\x00"), Err(WireError::Short(1))));
    }

    #[test]
    fn test_encode_data() {
        let buf = encode_data(2, b"abc");
        assert_eq!(buf, b"\x00\x03\x00\x02abc");
    }

    #[test]
    fn test_encode_error_nul_terminated() {
        let buf = encode_error(ErrorCode::IllegalOperation, ErrorCode::IllegalOperation.message());
        assert_eq!(&buf[..4], b"\x00\x05\x00\x04");
        assert_eq!(buf.last(), Some(&0u8));
        assert_eq!(&buf[4..buf.len() - 1], b"Illegal TFTP operation.");
    }

    #[test]
    fn test_error_code_table() {
        assert_eq!(ErrorCode::lookup(1), Some("File not found."));
        assert_eq!(ErrorCode::lookup(7), Some("No such user."));
        assert_eq!(ErrorCode::lookup(8), None);
    }
}
