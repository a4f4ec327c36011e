//! Host-target wire protocol
//!
//! All command, reply and feed traffic shares one framing scheme: a fixed
//! 32-byte message header followed by up to [`MAX_BODY_SIZE`](message::MAX_BODY_SIZE)
//! bytes of body. Feed messages additionally carry a 20-byte feed header at the
//! start of the body. This module is a pure transform layer; no sockets, no
//! side effects.
//!
//! All multi-byte integers are little-endian on the wire.

pub mod feed;
pub mod message;

pub use feed::{fourcc, FeedHeader, FEED_HEADER_SIZE, PIX_FMT_GREY, PIX_FMT_SBGGR8};
pub use message::{
    MsgHeader, HEADER_SIZE, MAX_BODY_SIZE, MSG_FEED_DATA, MSG_GET_COMPLETE_CONFIG,
    MSG_GET_VERSION, MSG_SET_CONFIG, STATUS_FEED, STATUS_REPLY_FAIL, STATUS_REPLY_SUCCESS,
    STATUS_REQUEST,
};

/// Version of the structured request/reply command protocol
pub const PROTOCOL_VERSION: u32 = 2;

/// Version of the one-way frame feed protocol
pub const FEED_PROTOCOL_VERSION: u32 = 1;
