//! Per-verb command handlers.
//!
//! Each handler is a struct implementing [`Handler`]; the registry maps
//! verbs to boxed handlers. Handlers run on the dispatch worker thread and
//! are the only code that mutates usernames and emulator membership.

use std::sync::Arc;

use crate::dispatch::error::{HandlerError, HandlerResult};
use crate::dispatch::registry::HandlerRegistry;
use crate::dispatch::Verb;
use crate::register_handlers;
use crate::server::ServerCore;
use crate::user::User;
use crate::ConnId;

mod add;
mod button;
mod chat;
mod connect;
mod list;
mod pong;
mod remove;
mod shutdown;
mod stop;
mod turn;
mod username;
mod webp;

/// Everything a handler may need.
pub struct HandlerContext<'a> {
    pub server: &'a Arc<ServerCore>,
    pub conn: ConnId,
    /// The caller's record; `None` for commands injected by the operator
    /// (startup preload) that have no connection behind them.
    pub user: Option<Arc<User>>,
}

impl HandlerContext<'_> {
    pub fn require_user(&self) -> Result<&Arc<User>, HandlerError> {
        self.user
            .as_ref()
            .ok_or(HandlerError::Protocol("no user record for connection"))
    }

    /// The caller's username, required to be non-empty.
    pub fn require_username(&self) -> Result<(&Arc<User>, String), HandlerError> {
        let user = self.require_user()?;
        let name = user.username();
        if name.is_empty() {
            return Err(HandlerError::Protocol("username not set"));
        }
        Ok((user, name))
    }

    /// Admin check. Operator-injected commands (no user) always pass;
    /// everyone else goes through the server's admin gate.
    pub fn require_admin(&self) -> Result<(), HandlerError> {
        match &self.user {
            None => Ok(()),
            Some(user) if self.server.is_admin(user) => Ok(()),
            Some(_) => Err(HandlerError::Authorization),
        }
    }

    /// Reply to the caller only.
    pub fn reply(&self, frame: &str) {
        if let Some(user) = &self.user {
            self.server.send_or_close(user, frame);
        }
    }
}

pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult;
}

/// Build the registry with every verb wired to its handler.
pub fn build_registry() -> HandlerRegistry {
    register_handlers! {
        Verb::Username => username::UsernameHandler,
        Verb::Chat => chat::ChatHandler,
        Verb::List => list::ListHandler,
        Verb::Connect => connect::ConnectHandler,
        Verb::Button => button::ButtonHandler,
        Verb::Turn => turn::TurnHandler,
        Verb::Webp => webp::WebpHandler,
        Verb::Pong => pong::PongHandler,
        Verb::Add => add::AddHandler,
        Verb::Remove => remove::RemoveHandler,
        Verb::Stop => stop::StopHandler,
        Verb::Shutdown => shutdown::ShutdownHandler,
    }
}
