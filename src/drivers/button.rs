//! Debounced load button.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up (GPIO0, the boot button on
//! most boards).  The pin is sampled from the main loop every
//! [`SAMPLE_MS`]; the last 32 samples are kept in a shift register.
//!
//! | History        | Meaning                                   |
//! |----------------|-------------------------------------------|
//! | all 32 down    | press, reported once ([`ButtonEvent`])    |
//! | all 32 up      | released, the next press can be reported  |
//! | anything else  | bouncing, no change                       |
//!
//! A decision therefore takes about 64 ms in either direction.

use embedded_hal::digital::InputPin;
use log::debug;

pub const SAMPLE_MS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
}

pub struct ButtonDriver<P> {
    pin: P,
    history: u32,
    pressed: bool,
    last_sample_ms: u32,
}

impl<P: InputPin> ButtonDriver<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            history: 0,
            pressed: false,
            last_sample_ms: 0,
        }
    }

    /// Whether the last debounced state is "held down".
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Call once per main-loop iteration.  Returns an event on the
    /// debounced press edge only.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        if now_ms.wrapping_sub(self.last_sample_ms) < SAMPLE_MS {
            return None;
        }
        self.last_sample_ms = now_ms;

        // A failed read counts as released.
        let down = self.pin.is_low().unwrap_or(false);
        self.history = (self.history << 1) | u32::from(down);

        match self.history {
            0 if self.pressed => {
                self.pressed = false;
                debug!("Button: released");
                None
            }
            u32::MAX if !self.pressed => {
                self.pressed = true;
                Some(ButtonEvent::Pressed)
            }
            _ => None,
        }
    }
}
