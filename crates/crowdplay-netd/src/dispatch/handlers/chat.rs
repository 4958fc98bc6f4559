//! `chat <msg>` - emulator-scoped text chat.

use crowdplay_proto::{encode, escaped_len, is_printable_ascii};

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct ChatHandler;

impl Handler for ChatHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        let [message] = params else {
            return Err(HandlerError::Protocol("chat takes one parameter"));
        };
        let (user, username) = ctx.require_username()?;

        let emu = user.connected_emu();
        if emu.is_empty() {
            return Err(HandlerError::Protocol("chat requires a connected emulator"));
        }
        if !is_printable_ascii(message) {
            return Err(HandlerError::Protocol("chat must be printable ascii"));
        }
        if escaped_len(message) > ctx.server.config.server_config.max_message_size {
            return Err(HandlerError::Protocol("chat message too long"));
        }

        ctx.server
            .broadcast_emu(&emu, &encode(&["chat", &username, message]));
        Ok(())
    }
}
