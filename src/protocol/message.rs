//! Command/reply message framing
//!
//! Every message starts with a fixed header:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬───────────┐
//! │ body_len │ msg_type │ ident    │ status   │ params    │
//! │ u32 LE   │ u32 LE   │ u32 LE   │ u32 LE   │ 16 bytes  │
//! └──────────┴──────────┴──────────┴──────────┴───────────┘
//! ```
//!
//! followed by `body_len` bytes of body. `ident` is chosen by the requester
//! and echoed in the reply; the params area carries small type-specific
//! values (e.g. the three version numbers of a GetVersion reply) without
//! needing a body.

use crate::error::{Error, Result};

/// Wire size of the fixed message header
pub const HEADER_SIZE: usize = 32;

/// Maximum allowed body size.
///
/// Large enough for one full-resolution frame plus the feed header.
pub const MAX_BODY_SIZE: usize = 0x8_0000;

/// Request the protocol, feed and software versions
pub const MSG_GET_VERSION: u32 = 1;
/// Write a batch of configuration registers
pub const MSG_SET_CONFIG: u32 = 10;
/// Read the complete register table
pub const MSG_GET_COMPLETE_CONFIG: u32 = 20;
/// One captured frame pushed on the feed channel
pub const MSG_FEED_DATA: u32 = 30;

/// Host-to-target request
pub const STATUS_REQUEST: u32 = 20;
/// Reply to a successfully executed request
pub const STATUS_REPLY_SUCCESS: u32 = 21;
/// Reply to a failed request
pub const STATUS_REPLY_FAIL: u32 = 22;
/// Unsolicited feed message
pub const STATUS_FEED: u32 = 30;

/// Fixed message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    pub body_len: u32,
    pub msg_type: u32,
    pub ident: u32,
    pub status: u32,
    pub params: [u8; 16],
}

impl MsgHeader {
    /// Create a header with an empty params area
    pub fn new(msg_type: u32, ident: u32, status: u32, body_len: u32) -> Self {
        Self {
            body_len,
            msg_type,
            ident,
            status,
            params: [0u8; 16],
        }
    }

    /// Reply header echoing the request type and ident
    pub fn reply_to(req: &MsgHeader, status: u32, body_len: u32) -> Self {
        Self::new(req.msg_type, req.ident, status, body_len)
    }

    /// Store a `u32` into params slot `slot` (0..=3)
    pub fn set_param(&mut self, slot: usize, value: u32) {
        self.params[slot * 4..slot * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read the `u32` in params slot `slot` (0..=3)
    pub fn param(&self, slot: usize) -> u32 {
        let p = &self.params;
        u32::from_le_bytes([p[slot * 4], p[slot * 4 + 1], p[slot * 4 + 2], p[slot * 4 + 3]])
    }

    /// Encode the header into its wire form
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.body_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.msg_type.to_le_bytes());
        buf[8..12].copy_from_slice(&self.ident.to_le_bytes());
        buf[12..16].copy_from_slice(&self.status.to_le_bytes());
        buf[16..32].copy_from_slice(&self.params);
        buf
    }

    /// Decode and validate a header.
    ///
    /// A `body_len` above [`MAX_BODY_SIZE`] is rejected, never truncated.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Header too short: {} bytes",
                buf.len()
            )));
        }
        let body_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if body_len as usize > MAX_BODY_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Body length {} exceeds maximum {}",
                body_len, MAX_BODY_SIZE
            )));
        }
        let mut params = [0u8; 16];
        params.copy_from_slice(&buf[16..32]);
        Ok(Self {
            body_len,
            msg_type: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ident: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            status: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = MsgHeader::new(MSG_SET_CONFIG, 42, STATUS_REQUEST, 16);
        header.set_param(0, 0xDEAD_BEEF);
        header.set_param(3, 7);

        let decoded = MsgHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.param(0), 0xDEAD_BEEF);
        assert_eq!(decoded.param(3), 7);
    }

    #[test]
    fn test_encoded_layout_is_little_endian() {
        let header = MsgHeader::new(MSG_GET_VERSION, 0x0102_0304, STATUS_REQUEST, 5);
        let buf = header.encode();
        // body_len = 5 at offset 0
        assert_eq!(&buf[0..4], &[5, 0, 0, 0]);
        // ident at offset 8, LSB first
        assert_eq!(&buf[8..12], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_decode_rejects_oversized_body() {
        let mut header = MsgHeader::new(MSG_SET_CONFIG, 1, STATUS_REQUEST, 0);
        header.body_len = (MAX_BODY_SIZE + 1) as u32;
        assert!(MsgHeader::decode(&header.encode()).is_err());
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert!(MsgHeader::decode(&[0u8; HEADER_SIZE - 1]).is_err());
    }

    #[test]
    fn test_reply_echoes_type_and_ident() {
        let req = MsgHeader::new(MSG_GET_VERSION, 99, STATUS_REQUEST, 0);
        let reply = MsgHeader::reply_to(&req, STATUS_REPLY_SUCCESS, 0);
        assert_eq!(reply.msg_type, req.msg_type);
        assert_eq!(reply.ident, req.ident);
        assert_eq!(reply.status, STATUS_REPLY_SUCCESS);
    }
}
