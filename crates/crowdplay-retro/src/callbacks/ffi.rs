//! `extern "C"` trampolines registered with the core.

use std::ffi::{CStr, c_char, c_uint, c_void};
use std::slice;

use libretro_sys::PixelFormat;
use tracing::{debug, trace};

use super::{RawFrame, with};
use crate::environment::EnvCmd;

pub unsafe extern "C" fn video_refresh(
    data: *const c_void,
    width: c_uint,
    height: c_uint,
    pitch: usize,
) {
    let frame = if data.is_null() {
        None
    } else {
        let len = (height as usize) * pitch;
        let data = unsafe { slice::from_raw_parts(data.cast::<u8>(), len) };
        Some(RawFrame {
            data,
            width,
            height,
            pitch,
        })
    };

    with(|handler| handler.video_refresh(frame));
}

pub unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    with(|handler| handler.audio_sample(left, right));
}

pub unsafe extern "C" fn audio_sample_batch(samples: *const i16, frames: usize) -> usize {
    if samples.is_null() {
        return frames;
    }
    let samples = unsafe { slice::from_raw_parts(samples, frames * 2) };
    with(|handler| handler.audio_sample_batch(samples)).unwrap_or(frames)
}

pub unsafe extern "C" fn input_poll() {
    with(|handler| handler.input_poll());
}

pub unsafe extern "C" fn input_state(
    port: c_uint,
    device: c_uint,
    index: c_uint,
    id: c_uint,
) -> i16 {
    with(|handler| handler.input_state(port, device, index, id)).unwrap_or(0)
}

pub unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    let Some(known) = EnvCmd::from_raw(cmd) else {
        trace!(cmd, "unrecognized environment command");
        return with(|handler| handler.environment_raw(cmd, data)).unwrap_or(false);
    };

    match known {
        EnvCmd::SetPixelFormat => {
            if data.is_null() {
                return false;
            }
            let raw = unsafe { *data.cast_const().cast::<c_uint>() };
            let Some(format) = PixelFormat::from_uint(raw) else {
                debug!(raw, "core requested an unknown pixel format");
                return false;
            };
            with(|handler| handler.set_pixel_format(format)).unwrap_or(false)
        }

        EnvCmd::GetCanDupe => {
            if !data.is_null() {
                let can_dupe = with(|handler| handler.can_dupe()).unwrap_or(false);
                unsafe { *data.cast::<bool>() = can_dupe };
            }
            true
        }

        EnvCmd::GetSystemDirectory => unsafe {
            write_directory(data, |handler| handler.system_directory().map(CStr::as_ptr))
        },

        EnvCmd::GetSaveDirectory => unsafe {
            write_directory(data, |handler| handler.save_directory().map(CStr::as_ptr))
        },

        EnvCmd::GetVariable => {
            if data.is_null() {
                return false;
            }
            let variable = unsafe { &mut *data.cast::<libretro_sys::Variable>() };
            if variable.key.is_null() {
                return false;
            }
            let key = unsafe { CStr::from_ptr(variable.key) }.to_string_lossy();
            let value = with(|handler| handler.variable(&key).map(CStr::as_ptr)).flatten();
            match value {
                Some(ptr) => {
                    variable.value = ptr;
                    true
                }
                None => {
                    variable.value = std::ptr::null();
                    false
                }
            }
        }

        EnvCmd::GetVariableUpdate => {
            // Variables never change after startup.
            if !data.is_null() {
                unsafe { *data.cast::<bool>() = false };
            }
            true
        }

        EnvCmd::SetVariables | EnvCmd::GetLogInterface | EnvCmd::Shutdown => {
            with(|handler| handler.environment_raw(cmd, data)).unwrap_or(false)
        }
    }
}

unsafe fn write_directory(
    data: *mut c_void,
    get: impl FnOnce(&mut dyn super::CoreHandler) -> Option<*const c_char>,
) -> bool {
    if data.is_null() {
        return false;
    }
    match with(get).flatten() {
        Some(ptr) => {
            unsafe { *data.cast::<*const c_char>() = ptr };
            true
        }
        None => false,
    }
}
