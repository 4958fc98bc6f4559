//! Environment commands the frontend recognizes.
//!
//! `retro_environment_t` is an open-ended command channel; cores probe it
//! with dozens of commands. Only the commands below are decoded, everything
//! else is answered "unrecognized" (return `false`), which well-behaved
//! cores treat as a capability probe failing.

use std::ffi::c_uint;

use strum::FromRepr;

/// Experimental-command flag bit; masked off before matching.
pub const EXPERIMENTAL: c_uint = 0x10000;

#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EnvCmd {
    /// bool * -- whether the frontend supports frame duping (NULL frames).
    GetCanDupe = 3,

    /// N/A -- core asks the frontend to shut the emulator down.
    Shutdown = 7,

    /// const char ** -- directory for BIOSes and other system content.
    GetSystemDirectory = 9,

    /// const enum retro_pixel_format * -- installs the frame pixel layout.
    SetPixelFormat = 10,

    /// struct retro_variable * -- core reads one of its settings.
    GetVariable = 15,

    /// const struct retro_variable * -- core declares its settings.
    SetVariables = 16,

    /// bool * -- whether any variable changed since the last GetVariable.
    GetVariableUpdate = 17,

    /// struct retro_log_callback * -- core asks for a logging sink.
    GetLogInterface = 27,

    /// const char ** -- directory for save data.
    GetSaveDirectory = 31,
}

impl EnvCmd {
    pub fn from_raw(cmd: c_uint) -> Option<Self> {
        Self::from_repr(cmd & !EXPERIMENTAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_commands() {
        assert_eq!(EnvCmd::from_raw(10), Some(EnvCmd::SetPixelFormat));
        assert_eq!(EnvCmd::from_raw(9), Some(EnvCmd::GetSystemDirectory));
        assert_eq!(EnvCmd::from_raw(31), Some(EnvCmd::GetSaveDirectory));
    }

    #[test]
    fn masks_the_experimental_bit() {
        assert_eq!(EnvCmd::from_raw(EXPERIMENTAL | 3), Some(EnvCmd::GetCanDupe));
    }

    #[test]
    fn unknown_commands_decode_to_none() {
        assert_eq!(EnvCmd::from_raw(0), None);
        assert_eq!(EnvCmd::from_raw(9999), None);
    }
}
