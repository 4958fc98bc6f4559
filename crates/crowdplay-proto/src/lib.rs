//! Wire protocol for crowdplay clients.
//!
//! A message is a flat sequence of byte chunks framed as `LEN.CHUNK,` with
//! the final separator replaced by `;`, e.g. `4.chat,5.alice,5.hello;`.
//! The first chunk is the command verb. The codec is pure and synchronous;
//! semantic validation happens in the server's dispatch layer.

pub mod codec;
pub mod limits;
pub mod text;

pub use codec::{decode, decode_bytes, encode, encode_bytes};
pub use text::{escaped_len, is_printable_ascii};
