//! `add <id> <corePath> <romPath>` - spawn a new emulator controller.

use crowdplay_proto::encode;
use tracing::{error, info};

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};
use crate::emu;

pub struct AddHandler;

impl Handler for AddHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        ctx.require_admin()?;
        let [id, core_path, rom_path] = params else {
            return Err(HandlerError::Protocol("add takes three parameters"));
        };

        if ctx.server.emu_exists(id) {
            ctx.reply(&encode(&["emu-failed", id]));
            return Err(HandlerError::Protocol("emulator id already in use"));
        }

        match emu::spawn(
            ctx.server.clone(),
            id.clone(),
            core_path.as_str().into(),
            rom_path.as_str().into(),
        ) {
            Ok(handle) => {
                ctx.server.register_emu(id.clone(), handle);
                info!(emu = %id, core = %core_path, rom = %rom_path, "emulator started");
                Ok(())
            }
            Err(err) => {
                error!(emu = %id, %err, "emulator failed to start");
                ctx.reply(&encode(&["emu-failed", id]));
                Err(HandlerError::EmulatorStart(err.to_string()))
            }
        }
    }
}
