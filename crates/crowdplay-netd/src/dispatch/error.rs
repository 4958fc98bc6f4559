//! Handler failure modes.
//!
//! None of these reach the client as an error payload: protocol violations
//! and unauthorized commands are dropped silently, and the worker logs the
//! rest. The variants exist so logs and tests can tell the cases apart.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed or out-of-order input from the client.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// An admin-gated verb from a non-admin.
    #[error("not authorized")]
    Authorization,

    /// A controller failed to come up; only that emulator is affected.
    #[error("emulator failed to start: {0}")]
    EmulatorStart(String),
}

pub type HandlerResult = Result<(), HandlerError>;
