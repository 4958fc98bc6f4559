//! Server library - dispatch and hosting logic extracted for testing.
//!
//! The binary in `main.rs` only wires these pieces together: the WebSocket
//! edge ([`net`]) parses and enqueues, a single worker thread ([`dispatch`])
//! owns every mutation of the user and emulator registries, and each hosted
//! emulator ([`emu`]) runs on its own thread with its own turn scheduler.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod config;
pub mod dispatch;
pub mod emu;
pub mod net;
pub mod sched;
pub mod server;
pub mod user;

/// Unique connection identifier assigned by the listener.
pub type ConnId = u64;

/// User-supplied identifier for a hosted emulator.
pub type EmuId = String;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}
