//! `username <new>` - claim or change a username.

use crowdplay_proto::{encode, is_printable_ascii};
use tracing::info;

use super::{Handler, HandlerContext};
use crate::config::ServerSettings;
use crate::dispatch::error::{HandlerError, HandlerResult};

pub struct UsernameHandler;

impl Handler for UsernameHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, params: &[String]) -> HandlerResult {
        let [new_name] = params else {
            return Err(HandlerError::Protocol("username takes one parameter"));
        };
        let user = ctx.require_user()?.clone();

        if !validate_username(&ctx.server.config.server_config, new_name) {
            return Err(HandlerError::Protocol("invalid username"));
        }
        if ctx.server.username_taken(new_name, user.conn) {
            return Err(HandlerError::Protocol("username taken"));
        }

        let old_name = user.username();
        user.set_username(new_name);
        info!(conn = user.conn, old = %old_name, new = %new_name, "username set");

        if old_name.is_empty() {
            ctx.server.broadcast_all(&encode(&["join", new_name]));
        } else {
            ctx.server
                .broadcast_all(&encode(&["username", &old_name, new_name]));
        }
        Ok(())
    }
}

/// Username rule: bounded length, typeable ASCII, no leading/trailing
/// space, no run of two spaces.
pub(crate) fn validate_username(settings: &ServerSettings, name: &str) -> bool {
    name.len() >= settings.min_username_length
        && name.len() <= settings.max_username_length
        && is_printable_ascii(name)
        && !name.starts_with(' ')
        && !name.ends_with(' ')
        && !name.contains("  ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_names_within_the_rules() {
        let settings = ServerSettings::default();
        for name in ["bob", "alice", "a b c", "x_y-z.99", "fifteen chars.."] {
            assert!(validate_username(&settings, name), "rejected {name:?}");
        }
    }

    #[test]
    fn rejects_names_outside_the_rules() {
        let settings = ServerSettings::default();
        let too_long = "x".repeat(16);
        let cases = [
            "",            // empty
            "ab",          // below minimum
            &too_long,     // above maximum
            " alice",      // leading space
            "alice ",      // trailing space
            "al  ice",     // double space
            "caf\u{e9}s",  // not ASCII
            "tab\tname",   // control character
        ];
        for name in cases {
            assert!(!validate_username(&settings, name), "accepted {name:?}");
        }
    }

    #[test]
    fn boundaries_are_inclusive() {
        let settings = ServerSettings::default();
        assert!(validate_username(&settings, "abc"));
        assert!(validate_username(&settings, &"x".repeat(15)));
        assert!(!validate_username(&settings, &"x".repeat(16)));
    }
}
