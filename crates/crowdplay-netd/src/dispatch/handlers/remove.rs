//! `remove <id>` - tear an emulator down and detach its users.

use crowdplay_proto::encode;
use tracing::info;

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct RemoveHandler;

impl Handler for RemoveHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        ctx.require_admin()?;
        let [id] = params else {
            return Err(HandlerError::Protocol("remove takes one parameter"));
        };

        let Some(emu) = ctx.server.unregister_emu(id) else {
            return Err(HandlerError::Protocol("unknown emulator"));
        };
        emu.shutdown(&ctx.server.sched);

        let frame = encode(&["emu-stopped", id]);
        for user in ctx.server.users_of_emu(id) {
            user.clear_turn_flags();
            user.set_connected_emu("");
            ctx.server.send_or_close(&user, &frame);
        }
        info!(emu = %id, "emulator removed");
        Ok(())
    }
}
