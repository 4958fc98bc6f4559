//! Verb-to-handler routing.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::Verb;
use super::handlers::{Handler, HandlerContext};
use crate::dispatch::HandlerResult;

pub struct HandlerRegistry {
    handlers: HashMap<Verb, Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, verb: Verb, handler: Box<dyn Handler>) {
        self.handlers.insert(verb, handler);
    }

    /// Route one command. `None` means no handler is registered for the verb.
    pub fn dispatch(
        &self,
        verb: Verb,
        ctx: &mut HandlerContext<'_>,
        params: &[String],
    ) -> Option<HandlerResult> {
        self.handlers
            .get(&verb)
            .map(|handler| handler.handle(ctx, params))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: OnceLock<HandlerRegistry> = OnceLock::new();

pub fn get() -> &'static HandlerRegistry {
    REGISTRY.get_or_init(super::handlers::build_registry)
}

/// Register handler values for their verbs.
#[macro_export]
macro_rules! register_handlers {
    ($($verb:expr => $handler:expr),* $(,)?) => {{
        let mut registry = $crate::dispatch::registry::HandlerRegistry::new();
        $(
            registry.register($verb, Box::new($handler));
        )*
        registry
    }};
}
