//! `shutdown` - server-wide teardown.

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct ShutdownHandler;

impl Handler for ShutdownHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        if !params.is_empty() {
            return Err(HandlerError::Protocol("shutdown takes no parameters"));
        }
        ctx.require_admin()?;
        ctx.server.shutdown();
        Ok(())
    }
}
