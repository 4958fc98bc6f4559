//! Emulator hosting: one controller thread per core, plus its turn
//! scheduler and frame/audio fan-out.

use std::io;

use thiserror::Error;

use crowdplay_retro::EmulatorStartError;

pub mod broadcast;
pub mod controller;
pub mod handle;
pub mod turn;

pub use controller::spawn;
pub use handle::EmulatorHandle;
pub use turn::TurnScheduler;

/// Why an `add` command produced no emulator.
#[derive(Debug, Error)]
pub enum EmuSpawnError {
    #[error(transparent)]
    Start(#[from] EmulatorStartError),

    #[error("failed to spawn the emulator thread")]
    Thread(#[from] io::Error),

    #[error("emulator startup timed out")]
    Timeout,
}
