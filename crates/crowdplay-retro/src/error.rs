use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to open a core library or resolve its symbol table.
#[derive(Debug, Error)]
pub enum CoreLoadError {
    #[error("core path `{path}` must be absolute or explicitly relative")]
    BarePath { path: PathBuf },

    #[error("failed to open core library `{path}`")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("core `{path}` is missing symbol `{symbol}`")]
    Symbol {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("core `{path}` reports libretro API v{found}, expected v1")]
    ApiVersion { path: PathBuf, found: u32 },
}

/// Failure to bring an emulator up. Aborts that controller only.
#[derive(Debug, Error)]
pub enum EmulatorStartError {
    #[error(transparent)]
    Core(#[from] CoreLoadError),

    #[error("failed to read rom `{path}`")]
    Rom {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rom path `{path}` is not representable as a C string")]
    RomPath { path: PathBuf },

    #[error("core rejected rom `{path}`")]
    GameRejected { path: PathBuf },
}
