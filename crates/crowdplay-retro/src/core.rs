//! Core loading and lifecycle.
//!
//! [`CoreApi`] resolves the libretro v1 symbol table out of a shared library
//! and keeps the library handle alive for as long as any symbol may be
//! called. [`Core`] layers the lifecycle on top: callback registration,
//! `retro_init`, game loading (honoring `need_fullpath`), and the mandatory
//! teardown order `unload_game` -> `deinit` -> close handle.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_void};
use std::fs;
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::ptr;

use libloading::Library;
use libretro_sys::{CoreAPI, GameGeometry, GameInfo, SystemAvInfo, SystemTiming};
use tracing::{debug, info};

use crate::callbacks::{self, CoreHandler, ffi};
use crate::error::{CoreLoadError, EmulatorStartError};

const EXPECTED_API_VERSION: u32 = 1;

/// Resolved symbol table plus the library that owns the symbols.
///
/// Field order matters: `api` must drop before `library` unloads. The type
/// is deliberately neither `Send` nor `Sync` and cannot be cloned; callers
/// share it by reference from the owning thread.
struct CoreApi {
    api: CoreAPI,
    _library: Library,
    _thread_pinned: PhantomData<*const ()>,
}

impl CoreApi {
    fn load(path: &Path) -> Result<Self, CoreLoadError> {
        // A bare file name would let the platform loader search its own
        // paths; cores must be named by absolute or explicitly relative path.
        if !path.is_absolute() && path.components().count() < 2 {
            let has_explicit_prefix = matches!(
                path.components().next(),
                Some(Component::CurDir | Component::ParentDir)
            );
            if !has_explicit_prefix {
                return Err(CoreLoadError::BarePath {
                    path: path.to_path_buf(),
                });
            }
        }

        let library = unsafe { Library::new(path) }.map_err(|source| CoreLoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let api = CoreAPI {
            retro_set_environment: resolve(&library, path, "retro_set_environment")?,
            retro_set_video_refresh: resolve(&library, path, "retro_set_video_refresh")?,
            retro_set_audio_sample: resolve(&library, path, "retro_set_audio_sample")?,
            retro_set_audio_sample_batch: resolve(&library, path, "retro_set_audio_sample_batch")?,
            retro_set_input_poll: resolve(&library, path, "retro_set_input_poll")?,
            retro_set_input_state: resolve(&library, path, "retro_set_input_state")?,

            retro_init: resolve(&library, path, "retro_init")?,
            retro_deinit: resolve(&library, path, "retro_deinit")?,
            retro_api_version: resolve(&library, path, "retro_api_version")?,

            retro_get_system_info: resolve(&library, path, "retro_get_system_info")?,
            retro_get_system_av_info: resolve(&library, path, "retro_get_system_av_info")?,
            retro_set_controller_port_device: resolve(
                &library,
                path,
                "retro_set_controller_port_device",
            )?,

            retro_reset: resolve(&library, path, "retro_reset")?,
            retro_run: resolve(&library, path, "retro_run")?,

            retro_serialize_size: resolve(&library, path, "retro_serialize_size")?,
            retro_serialize: resolve(&library, path, "retro_serialize")?,
            retro_unserialize: resolve(&library, path, "retro_unserialize")?,

            retro_cheat_reset: resolve(&library, path, "retro_cheat_reset")?,
            retro_cheat_set: resolve(&library, path, "retro_cheat_set")?,

            retro_load_game: resolve(&library, path, "retro_load_game")?,
            retro_load_game_special: resolve(&library, path, "retro_load_game_special")?,
            retro_unload_game: resolve(&library, path, "retro_unload_game")?,

            retro_get_region: resolve(&library, path, "retro_get_region")?,
            retro_get_memory_data: resolve(&library, path, "retro_get_memory_data")?,
            retro_get_memory_size: resolve(&library, path, "retro_get_memory_size")?,
        };

        Ok(Self {
            api,
            _library: library,
            _thread_pinned: PhantomData,
        })
    }
}

fn resolve<T: Copy>(
    library: &Library,
    path: &Path,
    symbol: &'static str,
) -> Result<T, CoreLoadError> {
    let item = unsafe { library.get::<T>(symbol.as_bytes()) }.map_err(|source| {
        CoreLoadError::Symbol {
            path: path.to_path_buf(),
            symbol,
            source,
        }
    })?;
    Ok(*item)
}

/// Owned system info copied out of the core.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub library_name: String,
    pub library_version: String,
    pub valid_extensions: String,
    pub need_fullpath: bool,
    pub block_extract: bool,
}

/// Keeps the bytes (or path string) handed to `retro_load_game` alive until
/// `retro_unload_game` has run.
enum GameSource {
    Buffer(#[allow(dead_code)] Vec<u8>),
    FullPath(#[allow(dead_code)] CString),
}

/// A loaded core with its handler installed, pinned to the current thread.
pub struct Core {
    api: CoreApi,
    path: PathBuf,
    game: Option<GameSource>,
}

impl Core {
    /// Open the library, resolve symbols, install `handler` for this thread,
    /// register all six callbacks and run `retro_init`.
    pub fn load(path: &Path, handler: Box<dyn CoreHandler>) -> Result<Self, CoreLoadError> {
        let api = CoreApi::load(path)?;

        let version = unsafe { (api.api.retro_api_version)() };
        if version != EXPECTED_API_VERSION {
            return Err(CoreLoadError::ApiVersion {
                path: path.to_path_buf(),
                found: version,
            });
        }

        callbacks::install(handler);

        unsafe {
            (api.api.retro_set_environment)(ffi::environment);
            (api.api.retro_set_video_refresh)(ffi::video_refresh);
            (api.api.retro_set_audio_sample)(ffi::audio_sample);
            (api.api.retro_set_audio_sample_batch)(ffi::audio_sample_batch);
            (api.api.retro_set_input_poll)(ffi::input_poll);
            (api.api.retro_set_input_state)(ffi::input_state);
            (api.api.retro_init)();
        }

        info!(path = %path.display(), "libretro core initialized");

        Ok(Self {
            api,
            path: path.to_path_buf(),
            game: None,
        })
    }

    pub fn system_info(&self) -> SystemInfo {
        let mut raw = libretro_sys::SystemInfo {
            library_name: ptr::null(),
            library_version: ptr::null(),
            valid_extensions: ptr::null(),
            need_fullpath: false,
            block_extract: false,
        };
        unsafe { (self.api.api.retro_get_system_info)(&mut raw) };

        let text = |ptr: *const std::ffi::c_char| -> String {
            if ptr.is_null() {
                String::new()
            } else {
                unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
            }
        };

        SystemInfo {
            library_name: text(raw.library_name),
            library_version: text(raw.library_version),
            valid_extensions: text(raw.valid_extensions),
            need_fullpath: raw.need_fullpath,
            block_extract: raw.block_extract,
        }
    }

    pub fn av_info(&self) -> SystemAvInfo {
        let mut raw = SystemAvInfo {
            geometry: GameGeometry {
                base_width: 0,
                base_height: 0,
                max_width: 0,
                max_height: 0,
                aspect_ratio: f32::NAN,
            },
            timing: SystemTiming {
                fps: 0.0,
                sample_rate: 0.0,
            },
        };
        unsafe { (self.api.api.retro_get_system_av_info)(&mut raw) };
        raw
    }

    /// Load the ROM. The file's size must be determinable up front; when the
    /// core does not insist on a full path the bytes are read into memory and
    /// owned here until [`unload`](Core::unload) or drop.
    pub fn load_game(&mut self, rom: &Path) -> Result<(), EmulatorStartError> {
        let need_fullpath = self.system_info().need_fullpath;

        let metadata = fs::metadata(rom).map_err(|source| EmulatorStartError::Rom {
            path: rom.to_path_buf(),
            source,
        })?;
        let size = metadata.len() as usize;

        let (info, source) = if need_fullpath {
            let c_path = CString::new(rom.as_os_str().as_encoded_bytes()).map_err(|_| {
                EmulatorStartError::RomPath {
                    path: rom.to_path_buf(),
                }
            })?;
            let info = GameInfo {
                path: c_path.as_ptr(),
                data: ptr::null(),
                size,
                meta: ptr::null(),
            };
            (info, GameSource::FullPath(c_path))
        } else {
            let bytes = fs::read(rom).map_err(|source| EmulatorStartError::Rom {
                path: rom.to_path_buf(),
                source,
            })?;
            let info = GameInfo {
                path: ptr::null(),
                data: bytes.as_ptr().cast::<c_void>(),
                size: bytes.len(),
                meta: ptr::null(),
            };
            (info, GameSource::Buffer(bytes))
        };

        let loaded = unsafe { (self.api.api.retro_load_game)(&info) };
        if !loaded {
            return Err(EmulatorStartError::GameRejected {
                path: rom.to_path_buf(),
            });
        }

        self.game = Some(source);
        debug!(rom = %rom.display(), size, need_fullpath, "game loaded");
        Ok(())
    }

    /// One iteration of the core's main loop.
    pub fn run(&mut self) {
        unsafe { (self.api.api.retro_run)() };
    }

    pub fn reset(&mut self) {
        unsafe { (self.api.api.retro_reset)() };
    }

    pub fn set_controller_port_device(&mut self, port: u32, device: u32) {
        unsafe { (self.api.api.retro_set_controller_port_device)(port, device) };
    }

    /// Snapshot the core's state, if it supports serialization.
    pub fn serialize(&mut self) -> Option<Vec<u8>> {
        unsafe {
            let size = (self.api.api.retro_serialize_size)();
            if size == 0 {
                return None;
            }
            let mut state = vec![0u8; size];
            (self.api.api.retro_serialize)(state.as_mut_ptr().cast::<c_void>(), size);
            Some(state)
        }
    }

    pub fn unserialize(&mut self, state: &[u8]) -> bool {
        unsafe { (self.api.api.retro_unserialize)(state.as_ptr().cast::<c_void>(), state.len()) }
    }

    pub fn path(&self) -> Cow<'_, str> {
        self.path.to_string_lossy()
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        unsafe {
            if self.game.take().is_some() {
                (self.api.api.retro_unload_game)();
            }
            (self.api.api.retro_deinit)();
        }
        callbacks::clear();
        // The library handle closes when `self.api` drops, after deinit.
    }
}
