//! Frame feed messages
//!
//! Captured frames are pushed to the feed client as `FeedData` messages whose
//! body is a 20-byte feed header followed by the raw pixel payload:
//!
//! ```text
//! ┌────────┬────────────┬───────────┬────────────┬─────────┬─────────────┐
//! │ seq_nr │ time_stamp │ img_width │ img_height │ pix_fmt │ pixels ...  │
//! │ u32 LE │ u32 LE     │ u32 LE    │ u32 LE     │ u32 LE  │             │
//! └────────┴────────────┴───────────┴────────────┴─────────┴─────────────┘
//! ```

use crate::error::{Error, Result};

/// Wire size of the feed header
pub const FEED_HEADER_SIZE: usize = 20;

/// Four-character pixel format code, V4L2 style
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// 8-bit greyscale
pub const PIX_FMT_GREY: u32 = fourcc(b"GREY");
/// 8-bit Bayer pattern, BGGR order
pub const PIX_FMT_SBGGR8: u32 = fourcc(b"BA81");

/// Per-frame feed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedHeader {
    /// Frame sequence number, strictly increasing from 1
    pub seq_nr: u32,
    /// Milliseconds since device start
    pub time_stamp: u32,
    pub img_width: u32,
    pub img_height: u32,
    /// Pixel format fourcc, e.g. `GREY` or `BA81`
    pub pix_fmt: u32,
}

impl FeedHeader {
    /// Encode the feed header into its wire form
    pub fn encode(&self) -> [u8; FEED_HEADER_SIZE] {
        let mut buf = [0u8; FEED_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.seq_nr.to_le_bytes());
        buf[4..8].copy_from_slice(&self.time_stamp.to_le_bytes());
        buf[8..12].copy_from_slice(&self.img_width.to_le_bytes());
        buf[12..16].copy_from_slice(&self.img_height.to_le_bytes());
        buf[16..20].copy_from_slice(&self.pix_fmt.to_le_bytes());
        buf
    }

    /// Decode a feed header (client side and tests)
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FEED_HEADER_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Feed header too short: {} bytes",
                buf.len()
            )));
        }
        Ok(Self {
            seq_nr: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            time_stamp: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            img_width: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            img_height: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            pix_fmt: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_values() {
        // 'G' 'R' 'E' 'Y' spelled LSB first
        assert_eq!(PIX_FMT_GREY, 0x5945_5247);
        assert_eq!(PIX_FMT_SBGGR8, 0x3138_4142);
    }

    #[test]
    fn test_feed_header_roundtrip() {
        let header = FeedHeader {
            seq_nr: 1,
            time_stamp: 123_456,
            img_width: 752,
            img_height: 480,
            pix_fmt: PIX_FMT_GREY,
        };
        assert_eq!(FeedHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn test_feed_header_layout() {
        let header = FeedHeader {
            seq_nr: 2,
            time_stamp: 0,
            img_width: 0x0100,
            img_height: 0,
            pix_fmt: PIX_FMT_GREY,
        };
        let buf = header.encode();
        assert_eq!(&buf[0..4], &[2, 0, 0, 0]);
        assert_eq!(&buf[8..12], &[0x00, 0x01, 0, 0]);
        assert_eq!(&buf[16..20], b"GREY");
    }
}
