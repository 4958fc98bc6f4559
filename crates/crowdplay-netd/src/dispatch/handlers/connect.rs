//! `connect <emuID>` - attach the caller to an emulator.

use tracing::info;

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct ConnectHandler;

impl Handler for ConnectHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        let [emu_id] = params else {
            return Err(HandlerError::Protocol("connect takes one parameter"));
        };
        let (user, username) = ctx.require_username()?;
        let user = user.clone();

        let Some(emu) = ctx.server.emu(emu_id) else {
            return Err(HandlerError::Protocol("unknown emulator"));
        };

        // Switching emulators detaches from the old one first.
        let previous = user.connected_emu();
        if previous == *emu_id {
            return Ok(());
        }
        if !previous.is_empty()
            && let Some(old) = ctx.server.emu(&previous)
        {
            old.user_disconnected(&user);
        }

        user.set_connected_emu(emu_id);
        emu.user_connected(&user);
        info!(conn = user.conn, username = %username, emu = %emu_id, "user connected to emulator");
        Ok(())
    }
}
