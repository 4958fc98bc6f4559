//! `webp` - the client can decode WebP key frames.

use std::sync::atomic::Ordering;

use super::{Handler, HandlerContext};
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct WebpHandler;

impl Handler for WebpHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        if !params.is_empty() {
            return Err(HandlerError::Protocol("webp takes no parameters"));
        }
        ctx.require_user()?
            .supports_webp
            .store(true, Ordering::Release);
        Ok(())
    }
}
