//! Load LED and load button.
//!
//! The LED mirrors the charger's load output, re-read every
//! [`CHECK_INTERVAL_MS`].  While the output state is unknown the load is
//! assumed on and the LED lit.  A button press switches the load to the
//! opposite of the last known state; the LED follows on the next check.

use embedded_hal::digital::OutputPin;
use log::{error, warn};

use super::events::AppEvent;
use super::ports::{ChargerPort, EventSink};

pub const CHECK_INTERVAL_MS: u32 = 500;

pub struct LoadPanel {
    active_high: bool,
    last_check_ms: Option<u32>,
    /// Last load state read from the charger.
    known: Option<bool>,
}

impl LoadPanel {
    pub fn new(active_high: bool) -> Self {
        Self {
            active_high,
            last_check_ms: None,
            known: None,
        }
    }

    pub fn known(&self) -> Option<bool> {
        self.known
    }

    /// Load state the button acts on; unknown counts as on.
    pub fn load_on(&self) -> bool {
        self.known.unwrap_or(true)
    }

    /// Re-read the load output once the check interval elapsed and drive
    /// the LED when the state changed.
    pub fn refresh(
        &mut self,
        now_ms: u32,
        charger: &mut impl ChargerPort,
        led: &mut impl OutputPin,
        events: &mut impl EventSink,
    ) -> bool {
        if self
            .last_check_ms
            .is_some_and(|t| now_ms.wrapping_sub(t) < CHECK_INTERVAL_MS)
        {
            return self.load_on();
        }
        self.last_check_ms = Some(now_ms);

        match charger.load() {
            Ok(on) if self.known != Some(on) => {
                self.drive(led, on);
                events.emit(&AppEvent::Notice(if on { "Load is ON" } else { "Load is OFF" }));
                self.known = Some(on);
            }
            Ok(_) => {}
            Err(e) => {
                self.drive(led, true);
                if self.known.take().is_some() {
                    error!("Charger: load state read failed: {}", e);
                    events.emit(&AppEvent::Alert("Load is UNKNOWN"));
                }
            }
        }
        self.load_on()
    }

    /// Button pressed: invert the load.
    pub fn toggle(&mut self, charger: &mut impl ChargerPort, events: &mut impl EventSink) {
        let target = !self.load_on();
        match charger.set_load(target) {
            Ok(()) => events.emit(&AppEvent::Notice(if target {
                "Load switched ON"
            } else {
                "Load switched OFF"
            })),
            Err(e) => {
                error!("Charger: load switch failed: {}", e);
                events.emit(&AppEvent::Alert("Load UNKNOWN"));
            }
        }
    }

    fn drive(&self, led: &mut impl OutputPin, lit: bool) {
        let res = if lit == self.active_high {
            led.set_high()
        } else {
            led.set_low()
        };
        if let Err(e) = res {
            warn!("Load LED: write failed: {:?}", e);
        }
    }
}
