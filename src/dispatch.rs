//! Command dispatcher
//!
//! Decodes one inbound command message per call, answers version and
//! configuration queries directly and routes register writes through the
//! capture state machine:
//!
//! | Message | Reply |
//! |---------|-------|
//! | `GetVersion` | protocol, feed and software versions in the params area |
//! | `GetCompleteConfig` | the full register table as `{id, value}` pairs |
//! | `SetConfig` | ReplySuccess only when every processed pair was acknowledged |
//!
//! Unknown message types are logged and get no reply; the requester times
//! out. Replies go out synchronously on the command connection; without an
//! attached command client the send fails soft and the host retries.

use crate::comm::Channel;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::hsm::{MainState, RequestOutcome};
use crate::protocol::{
    self, MsgHeader, MSG_GET_COMPLETE_CONFIG, MSG_GET_VERSION, MSG_SET_CONFIG,
    STATUS_REPLY_FAIL, STATUS_REPLY_SUCCESS,
};
use crate::registers::REG_PAIR_SIZE;
use crate::version;

/// A reply ready to be sent over the command connection
#[derive(Debug)]
pub struct Reply {
    pub header: MsgHeader,
    pub body: Vec<u8>,
}

/// Handle one decoded command message, sending any reply synchronously.
pub fn handle_message(
    ctx: &mut Context,
    hsm: &mut MainState,
    header: &MsgHeader,
    body: &[u8],
) -> Result<()> {
    match process_message(ctx, hsm, header, body)? {
        Some(reply) => send_reply(ctx, &reply),
        None => Ok(()),
    }
}

/// Process a command message and build the reply, if any.
///
/// Split from [`handle_message`] so command semantics are testable without
/// sockets.
pub fn process_message(
    ctx: &mut Context,
    hsm: &mut MainState,
    header: &MsgHeader,
    body: &[u8],
) -> Result<Option<Reply>> {
    match header.msg_type {
        MSG_GET_VERSION => Ok(Some(get_version(header))),
        MSG_GET_COMPLETE_CONFIG => Ok(Some(get_complete_config(ctx, header))),
        MSG_SET_CONFIG => set_config(ctx, hsm, header, body).map(Some),
        other => {
            // No reply for unknown types; the host request times out
            log::warn!("Unknown message type {} (ident {})", other, header.ident);
            Ok(None)
        }
    }
}

fn get_version(req: &MsgHeader) -> Reply {
    let mut header = MsgHeader::reply_to(req, STATUS_REPLY_SUCCESS, 0);
    header.set_param(0, protocol::PROTOCOL_VERSION);
    header.set_param(1, protocol::FEED_PROTOCOL_VERSION);
    header.set_param(2, version::software_version());
    Reply {
        header,
        body: Vec::new(),
    }
}

fn get_complete_config(ctx: &Context, req: &MsgHeader) -> Reply {
    let body = ctx.registers.encode();
    let header = MsgHeader::reply_to(req, STATUS_REPLY_SUCCESS, body.len() as u32);
    Reply { header, body }
}

/// Apply a batch of register writes in order.
///
/// The first pair the state machine does not acknowledge aborts the rest of
/// the batch; side effects of earlier pairs stay applied and are not rolled
/// back.
fn set_config(
    ctx: &mut Context,
    hsm: &mut MainState,
    req: &MsgHeader,
    body: &[u8],
) -> Result<Reply> {
    if body.len() % REG_PAIR_SIZE != 0 {
        return Err(Error::InvalidPacket(format!(
            "SetConfig body of {} bytes is not a whole number of register pairs",
            body.len()
        )));
    }

    let mut all_acknowledged = true;
    for pair in body.chunks_exact(REG_PAIR_SIZE) {
        let id = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        let value = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        if hsm.apply_register(ctx, id, value) != RequestOutcome::Acknowledged {
            all_acknowledged = false;
            break;
        }
    }

    let status = if all_acknowledged {
        STATUS_REPLY_SUCCESS
    } else {
        STATUS_REPLY_FAIL
    };
    Ok(Reply {
        header: MsgHeader::reply_to(req, status, 0),
        body: Vec::new(),
    })
}

fn send_reply(ctx: &mut Context, reply: &Reply) -> Result<()> {
    ctx.comm.send(Channel::Command, &reply.header.encode())?;
    if !reply.body.is_empty() {
        ctx.comm.send(Channel::Command, &reply.body)?;
    }
    Ok(())
}
