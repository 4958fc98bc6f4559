//! `pong` - heartbeat reply.
//!
//! Any inbound command refreshes liveness; this verb exists so an idle
//! viewer can answer the server's `ping` without side effects.

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct PongHandler;

impl Handler for PongHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        if !params.is_empty() {
            return Err(HandlerError::Protocol("pong takes no parameters"));
        }
        ctx.require_user()?.touch_pong();
        Ok(())
    }
}
