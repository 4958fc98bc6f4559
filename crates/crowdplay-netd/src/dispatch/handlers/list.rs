//! `list` - reply with every username on the server.

use crowdplay_proto::encode;

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct ListHandler;

impl Handler for ListHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        if !params.is_empty() {
            return Err(HandlerError::Protocol("list takes no parameters"));
        }
        ctx.require_user()?;

        let mut chunks = vec!["list".to_string()];
        chunks.extend(ctx.server.usernames());
        ctx.reply(&encode(&chunks));
        Ok(())
    }
}
