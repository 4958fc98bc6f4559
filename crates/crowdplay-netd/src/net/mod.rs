//! WebSocket edge: accept loop, per-connection read/write tasks.
//!
//! Everything here parses and enqueues; no domain state is touched on I/O
//! tasks. Commands for one connection enter the dispatch queue in arrival
//! order because each connection has exactly one read loop.

pub mod outbound;
pub mod ws;
