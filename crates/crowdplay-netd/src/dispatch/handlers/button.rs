//! `button <id> <state>` - input from the turn holder.
//!
//! `state` is `1`/`0` for a digital press/release; any other value is taken
//! as a raw analog magnitude. Input from anyone but the current holder is
//! discarded without comment.

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct ButtonHandler;

impl Handler for ButtonHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        let [id, state] = params else {
            return Err(HandlerError::Protocol("button takes two parameters"));
        };
        let user = ctx.require_user()?;

        if !user.has_turn() {
            // Watching, not playing.
            return Ok(());
        }

        let id: u32 = id
            .parse()
            .map_err(|_| HandlerError::Protocol("bad button id"))?;
        let value: i16 = match state.as_str() {
            "1" => i16::MAX,
            "0" => 0,
            other => other
                .parse()
                .map_err(|_| HandlerError::Protocol("bad button state"))?,
        };

        let emu_id = user.connected_emu();
        let Some(emu) = ctx.server.emu(&emu_id) else {
            return Err(HandlerError::Protocol("holder without an emulator"));
        };
        emu.press(id, value);
        Ok(())
    }
}
