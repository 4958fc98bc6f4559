//! Thread-local callback routing.
//!
//! Libretro callbacks are plain C function pointers with no user-data
//! argument, so the `extern "C"` trampolines in [`ffi`] reach their owner
//! through a thread-local slot. The hosting thread installs its handler
//! before `retro_init` and clears it after `retro_deinit`; the slot is never
//! touched from another thread.

use std::cell::RefCell;
use std::ffi::CStr;

use libretro_sys::PixelFormat;

pub mod ffi;

thread_local! {
    static HANDLER: RefCell<Option<Box<dyn CoreHandler>>> = const { RefCell::new(None) };
}

/// A raw frame as handed over by the core. `pitch` is the byte stride
/// between rows and may exceed `width * bytes_per_pixel`.
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pitch: usize,
}

/// Receiver for everything a running core calls back into the frontend.
///
/// C-string accessors hand out pointers that cross the FFI boundary; the
/// backing storage must stay alive until [`clear`] runs.
pub trait CoreHandler {
    /// A finished frame. `None` means the core duplicated the previous one.
    fn video_refresh(&mut self, frame: Option<RawFrame<'_>>);

    /// The core announces its raw pixel layout. Return `false` to refuse.
    fn set_pixel_format(&mut self, format: PixelFormat) -> bool;

    fn audio_sample(&mut self, left: i16, right: i16);

    /// Interleaved stereo samples; returns how many frames were consumed.
    fn audio_sample_batch(&mut self, samples: &[i16]) -> usize;

    fn input_poll(&mut self);

    fn input_state(&mut self, port: u32, device: u32, index: u32, id: u32) -> i16;

    fn can_dupe(&self) -> bool {
        false
    }

    fn system_directory(&self) -> Option<&CStr> {
        None
    }

    fn save_directory(&self) -> Option<&CStr> {
        None
    }

    /// Per-core setting lookup for `GET_VARIABLE`.
    fn variable(&mut self, _key: &str) -> Option<&CStr> {
        None
    }

    /// Catch-all for environment commands the frontend does not decode.
    /// Returning `false` tells the core the command is unrecognized.
    fn environment_raw(&mut self, _cmd: u32, _data: *mut std::ffi::c_void) -> bool {
        false
    }
}

/// Install the handler for the current thread.
pub fn install(handler: Box<dyn CoreHandler>) {
    HANDLER.with_borrow_mut(|slot| *slot = Some(handler));
}

/// Remove the current thread's handler, dropping it.
pub fn clear() {
    HANDLER.with_borrow_mut(|slot| *slot = None);
}

/// Run `f` against the installed handler, if any.
fn with<R>(f: impl FnOnce(&mut dyn CoreHandler) -> R) -> Option<R> {
    HANDLER.with_borrow_mut(|slot| slot.as_mut().map(|handler| f(handler.as_mut())))
}
