//! Input pad state for one emulator.
//!
//! The pad stores the *analog* value of every digital button (a digital
//! press is just a saturated value) plus two analog sticks. Presses arrive
//! from the network side as pending intents and are committed into the live
//! state when the core polls input, so the core never observes a half
//! applied update.

use std::sync::atomic::{AtomicI16, Ordering};

use parking_lot::Mutex;

/// Number of RETRO_DEVICE_ID_JOYPAD button slots.
pub const JOYPAD_BUTTONS: usize = 16;

/// Left and right analog sticks.
pub const ANALOG_STICKS: usize = 2;

/// `RETRO_DEVICE_INDEX_ANALOG_BUTTON`; absent from `libretro-sys` v0.1.
pub const DEVICE_INDEX_ANALOG_BUTTON: u32 = 2;

/// A button counts as pressed once its magnitude clears half the positive
/// i16 range.
const PRESS_THRESHOLD: i16 = i16::MAX / 2;

#[derive(Default)]
struct AnalogStick {
    x: AtomicI16,
    y: AtomicI16,
}

pub struct RetroPad {
    buttons: [AtomicI16; JOYPAD_BUTTONS],
    sticks: [AnalogStick; ANALOG_STICKS],
    pending: Mutex<Vec<(u32, i16)>>,
}

impl Default for RetroPad {
    fn default() -> Self {
        Self::new()
    }
}

impl RetroPad {
    pub fn new() -> Self {
        Self {
            buttons: std::array::from_fn(|_| AtomicI16::new(0)),
            sticks: std::array::from_fn(|_| AnalogStick::default()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Queue a button update to be applied at the next input poll.
    pub fn queue(&self, id: u32, value: i16) {
        if (id as usize) < JOYPAD_BUTTONS {
            self.pending.lock().push((id, value));
        }
    }

    /// Apply all pending updates. Called from the core's `input_poll`.
    pub fn commit(&self) {
        let drained: Vec<(u32, i16)> = std::mem::take(&mut *self.pending.lock());
        for (id, value) in drained {
            self.buttons[id as usize].store(value, Ordering::Release);
        }
    }

    pub fn button(&self, id: u32) -> i16 {
        match self.buttons.get(id as usize) {
            Some(b) => b.load(Ordering::Acquire),
            None => 0,
        }
    }

    pub fn is_pressed(&self, id: u32) -> bool {
        self.button(id).unsigned_abs() > PRESS_THRESHOLD as u16
    }

    /// Analog read: stick axes, or button values for the analog-button index.
    pub fn analog(&self, index: u32, id: u32) -> i16 {
        if index == DEVICE_INDEX_ANALOG_BUTTON {
            return self.button(id);
        }
        let Some(stick) = self.sticks.get(index as usize) else {
            // Core is misbehaving and requesting an invalid stick.
            return 0;
        };
        if id == libretro_sys::DEVICE_ID_ANALOG_X {
            stick.x.load(Ordering::Acquire)
        } else if id == libretro_sys::DEVICE_ID_ANALOG_Y {
            stick.y.load(Ordering::Acquire)
        } else {
            0
        }
    }

    pub fn set_stick(&self, index: u32, id: u32, value: i16) {
        let Some(stick) = self.sticks.get(index as usize) else {
            return;
        };
        if id == libretro_sys::DEVICE_ID_ANALOG_X {
            stick.x.store(value, Ordering::Release);
        } else if id == libretro_sys::DEVICE_ID_ANALOG_Y {
            stick.y.store(value, Ordering::Release);
        }
    }

    /// Zero every button and stick; used when the turn holder changes.
    pub fn reset(&self) {
        self.pending.lock().clear();
        for button in &self.buttons {
            button.store(0, Ordering::Release);
        }
        for stick in &self.sticks {
            stick.x.store(0, Ordering::Release);
            stick.y.store(0, Ordering::Release);
        }
    }

    /// Bitmask of pressed digital buttons, bit N for button id N.
    pub fn pressed_mask(&self) -> u16 {
        let mut mask = 0u16;
        for id in 0..JOYPAD_BUTTONS as u32 {
            if self.is_pressed(id) {
                mask |= 1 << id;
            }
        }
        mask
    }
}
