//! `turn` - join the emulator's turn queue.

use std::sync::atomic::Ordering;

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct TurnHandler;

impl Handler for TurnHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        if !params.is_empty() {
            return Err(HandlerError::Protocol("turn takes no parameters"));
        }
        let user = ctx.require_user()?.clone();

        let emu_id = user.connected_emu();
        if emu_id.is_empty() {
            return Err(HandlerError::Protocol("turn requires a connected emulator"));
        }
        // Re-requests while queued are ignored.
        if user.requested_turn.load(Ordering::Acquire) {
            return Ok(());
        }

        let Some(emu) = ctx.server.emu(&emu_id) else {
            return Err(HandlerError::Protocol("unknown emulator"));
        };
        user.requested_turn.store(true, Ordering::Release);
        emu.add_turn_request(&user);
        Ok(())
    }
}
