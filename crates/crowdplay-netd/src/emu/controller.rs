//! The emulator controller thread.
//!
//! One hosted emulator = one thread that owns the loaded core for its whole
//! life. Startup is a rendezvous: the thread loads the core and the ROM and
//! reports the result over a bounded channel before the handle is
//! registered, so a failed `add` never leaves a half-registered emulator.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use parking_lot::Mutex;
use tracing::{error, info};

use crowdplay_retro::{
    Core, CoreHandler, EmulatorStartError, PixelFormat, RawFrame, RetroPad, ScreenBuffer,
    VideoFormat,
};

use crate::config::expand_home;
use crate::dispatch::Command;
use crate::emu::handle::EmulatorHandle;
use crate::emu::turn::TurnScheduler;
use crate::emu::{EmuSpawnError, broadcast};
use crate::server::ServerCore;
use crate::EmuId;

pub(crate) enum ControllerMsg {
    Stop,
}

/// How long `add` waits for the controller thread's startup report.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Diff broadcast cadence.
const VIDEO_TICK: Duration = Duration::from_millis(30);

/// Chunked wait per iteration while paused or ahead of the frame deadline.
const MAX_SLEEP_CHUNK: Duration = Duration::from_millis(4);

/// Flush threshold for buffered audio, in samples (stereo pairs count as 2).
const AUDIO_FLUSH: usize = 2048;

/// Spawn a controller and wait for its startup rendezvous. On success the
/// turn scheduler and the periodic broadcast tasks are already running.
pub fn spawn(
    server: Arc<ServerCore>,
    id: EmuId,
    core_path: PathBuf,
    rom_path: PathBuf,
) -> Result<Arc<EmulatorHandle>, EmuSpawnError> {
    let pad = Arc::new(RetroPad::new());
    let screen = Arc::new(Mutex::new(ScreenBuffer::new()));
    let paused = Arc::new(AtomicBool::new(false));
    let (ctrl_tx, ctrl_rx) = unbounded::<ControllerMsg>();
    let (ready_tx, ready_rx) = bounded::<Result<(), EmulatorStartError>>(1);

    let thread = {
        let server = Arc::clone(&server);
        let id = id.clone();
        let pad = Arc::clone(&pad);
        let screen = Arc::clone(&screen);
        let paused = Arc::clone(&paused);
        thread::Builder::new()
            .name(format!("emu-{id}"))
            .spawn(move || {
                run_controller(server, id, core_path, rom_path, pad, screen, paused, ctrl_rx, ready_tx);
            })?
    };

    match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
        Ok(Ok(())) => {}
        Ok(Err(start_err)) => {
            let _ = thread.join();
            return Err(start_err.into());
        }
        Err(_) => return Err(EmuSpawnError::Timeout),
    }

    let turn = TurnScheduler::spawn(
        Arc::clone(&server),
        id.clone(),
        Arc::clone(&pad),
        server.config.server_config.turn_length,
    );

    // Periodic broadcasts hold only weak server references so a shut-down
    // server is not kept alive by its own task queue.
    let weak = Arc::downgrade(&server);
    let diff_task = {
        let weak: Weak<ServerCore> = Weak::clone(&weak);
        let screen = Arc::clone(&screen);
        let id = id.clone();
        server.sched.schedule(VIDEO_TICK, move || {
            let Some(server) = weak.upgrade() else {
                return;
            };
            let update = screen.lock().take_update();
            if let Some(update) = update {
                broadcast::broadcast_update(&server, &id, &update);
            }
        })
    };
    let sync_task = {
        let screen = Arc::clone(&screen);
        server
            .sched
            .schedule(server.config.server_config.sync_interval, move || {
                screen.lock().request_full_repaint();
            })
    };

    Ok(Arc::new(EmulatorHandle::new(
        id,
        weak,
        pad,
        screen,
        turn,
        paused,
        ctrl_tx,
        thread,
        vec![diff_task, sync_task],
    )))
}

/// Callback receiver for one core; lives on the controller thread.
struct ControllerHost {
    server: Arc<ServerCore>,
    emu_id: EmuId,
    pad: Arc<RetroPad>,
    screen: Arc<Mutex<ScreenBuffer>>,
    format: VideoFormat,
    audio: Vec<i16>,
    system_dir: CString,
    save_dir: CString,
    core_name: Arc<OnceLock<String>>,
    core_config: HashMap<String, HashMap<String, String>>,
    resolved: HashMap<String, CString>,
}

impl CoreHandler for ControllerHost {
    fn video_refresh(&mut self, frame: Option<RawFrame<'_>>) {
        let Some(frame) = frame else {
            // Frame dupe; nothing changed.
            return;
        };
        self.screen.lock().stage(
            &self.format,
            frame.data,
            frame.width,
            frame.height,
            frame.pitch,
        );
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> bool {
        self.format = VideoFormat::from_pixel_format(format);
        info!(emu = %self.emu_id, ?format, "pixel format installed");
        true
    }

    fn audio_sample(&mut self, left: i16, right: i16) {
        self.audio.push(left);
        self.audio.push(right);
        self.flush_audio_if_full();
    }

    fn audio_sample_batch(&mut self, samples: &[i16]) -> usize {
        self.audio.extend_from_slice(samples);
        self.flush_audio_if_full();
        samples.len() / 2
    }

    fn input_poll(&mut self) {
        self.pad.commit();
    }

    fn input_state(&mut self, port: u32, device: u32, index: u32, id: u32) -> i16 {
        if port != 0 {
            return 0;
        }
        match device {
            crowdplay_retro::sys::DEVICE_JOYPAD => self.pad.is_pressed(id) as i16,
            crowdplay_retro::sys::DEVICE_ANALOG => self.pad.analog(index, id),
            _ => 0,
        }
    }

    fn can_dupe(&self) -> bool {
        true
    }

    fn system_directory(&self) -> Option<&CStr> {
        Some(&self.system_dir)
    }

    fn save_directory(&self) -> Option<&CStr> {
        Some(&self.save_dir)
    }

    fn variable(&mut self, key: &str) -> Option<&CStr> {
        if !self.resolved.contains_key(key) {
            let core_name = self.core_name.get()?.clone();
            let value = self.core_config.get(&core_name)?.get(key)?;
            let value = CString::new(value.as_str()).ok()?;
            self.resolved.insert(key.to_string(), value);
        }
        self.resolved.get(key).map(CString::as_c_str)
    }
}

impl ControllerHost {
    fn flush_audio_if_full(&mut self) {
        if self.audio.len() < AUDIO_FLUSH {
            return;
        }
        let frame = broadcast::encode_audio(&self.audio);
        self.audio.clear();
        self.server.broadcast_emu_binary(&self.emu_id, frame);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_controller(
    server: Arc<ServerCore>,
    id: EmuId,
    core_path: PathBuf,
    rom_path: PathBuf,
    pad: Arc<RetroPad>,
    screen: Arc<Mutex<ScreenBuffer>>,
    paused: Arc<AtomicBool>,
    ctrl_rx: Receiver<ControllerMsg>,
    ready_tx: Sender<Result<(), EmulatorStartError>>,
) {
    let settings = &server.config.server_config;
    let system_dir = expand_home(&settings.system_directory);
    let save_dir = expand_home(&settings.save_directory);
    let _ = std::fs::create_dir_all(&system_dir);
    let _ = std::fs::create_dir_all(&save_dir);

    let core_name: Arc<OnceLock<String>> = Arc::new(OnceLock::new());
    let mut core_config = HashMap::new();
    for name in server.config.core_config.keys() {
        core_config.insert(name.clone(), server.config.core_variables(name));
    }

    let host = Box::new(ControllerHost {
        server: Arc::clone(&server),
        emu_id: id.clone(),
        pad,
        screen,
        format: VideoFormat::default(),
        audio: Vec::new(),
        system_dir: CString::new(system_dir).unwrap_or_default(),
        save_dir: CString::new(save_dir).unwrap_or_default(),
        core_name: Arc::clone(&core_name),
        core_config,
        resolved: HashMap::new(),
    });

    let mut core = match Core::load(&core_path, host) {
        Ok(core) => core,
        Err(err) => {
            let _ = ready_tx.send(Err(err.into()));
            return;
        }
    };

    let info = core.system_info();
    let _ = core_name.set(info.library_name.clone());
    info!(
        emu = %id,
        core = %info.library_name,
        version = %info.library_version,
        "core ready"
    );

    if let Err(err) = core.load_game(&rom_path) {
        let _ = ready_tx.send(Err(err));
        return;
    }
    core.set_controller_port_device(0, crowdplay_retro::sys::DEVICE_JOYPAD);

    let av = core.av_info();
    let fps = if settings.override_framerate {
        f64::from(settings.framerate)
    } else if av.timing.fps > 0.0 {
        av.timing.fps
    } else {
        f64::from(settings.framerate)
    };
    let frame_duration = Duration::from_secs_f64(1.0 / fps);
    info!(emu = %id, fps, width = av.geometry.base_width, height = av.geometry.base_height, "entering run loop");

    if ready_tx.send(Ok(())).is_err() {
        // The spawner gave up waiting; nobody owns this thread anymore.
        return;
    }

    let mut next_deadline = Instant::now();
    loop {
        while let Ok(msg) = ctrl_rx.try_recv() {
            match msg {
                ControllerMsg::Stop => return,
            }
        }

        if paused.load(Ordering::Acquire) {
            match ctrl_rx.recv_timeout(MAX_SLEEP_CHUNK) {
                Ok(ControllerMsg::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }

        if wait_for_deadline(&ctrl_rx, next_deadline) {
            return;
        }

        let step = panic::catch_unwind(AssertUnwindSafe(|| core.run()));
        if step.is_err() {
            error!(emu = %id, "core trapped during run; terminating this emulator");
            server.enqueue(Command::EmuStopped { id });
            // Do not call back into a core that just trapped; leak the
            // handle instead of running unload/deinit on broken state.
            std::mem::forget(core);
            return;
        }

        next_deadline += frame_duration;
        let now = Instant::now();
        if now > next_deadline {
            // Fell behind; skip ahead rather than bursting catch-up frames.
            next_deadline = now;
        }
    }
}

/// Chunked wait until `deadline`, staying responsive to control messages.
/// Returns true when the controller should exit.
fn wait_for_deadline(ctrl_rx: &Receiver<ControllerMsg>, deadline: Instant) -> bool {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let chunk = (deadline - now).min(MAX_SLEEP_CHUNK);
        match ctrl_rx.recv_timeout(chunk) {
            Ok(ControllerMsg::Stop) | Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}
