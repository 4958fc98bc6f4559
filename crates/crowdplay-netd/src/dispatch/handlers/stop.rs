//! `stop <id>` - pause or resume an emulator's run loop.
//!
//! The controller stays registered and its viewers stay attached; the
//! screen simply freezes until the next `stop`.

use tracing::info;

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct StopHandler;

impl Handler for StopHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        ctx.require_admin()?;
        let [id] = params else {
            return Err(HandlerError::Protocol("stop takes one parameter"));
        };
        let Some(emu) = ctx.server.emu(id) else {
            return Err(HandlerError::Protocol("unknown emulator"));
        };
        let paused = emu.toggle_pause();
        info!(emu = %id, paused, "emulator pause toggled");
        Ok(())
    }
}
