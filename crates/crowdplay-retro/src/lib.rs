//! Frontend-side libretro plumbing.
//!
//! A libretro core is an opaque shared library speaking a fixed C ABI. This
//! crate loads one by path, resolves its symbol table, and routes its
//! callbacks (which carry no user data) through a thread-local handler so a
//! hosting thread can own all per-core state safely.
//!
//! Everything here is thread-pinned by design: a [`Core`] must be created,
//! driven and dropped on the same thread.

pub mod callbacks;
pub mod core;
pub mod environment;
pub mod error;
pub mod pad;
pub mod video;

pub use crate::callbacks::{CoreHandler, RawFrame};
pub use crate::core::{Core, SystemInfo};
pub use crate::error::{CoreLoadError, EmulatorStartError};
pub use crate::pad::RetroPad;
pub use crate::video::{FrameUpdate, Pixel, ScreenBuffer, VideoFormat};

pub use libretro_sys::PixelFormat;

/// Raw `libretro.h` constants and types, for callers that need device ids
/// and friends without taking their own `libretro-sys` dependency.
pub use libretro_sys as sys;
