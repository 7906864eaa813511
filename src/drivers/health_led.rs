//! Health LED driver.
//!
//! One PWM channel drives the single health LED.  While the bridge is
//! healthy it "breathes" slowly; faults or a rejecting database speed the
//! breath up.  Before a forced restart the LED blinks a fixed pattern.
//!
//! ## Dual-target design
//!
//! The driver is generic over `embedded_hal::pwm::SetDutyCycle`, so it
//! runs on an ESP-IDF `LedcDriver` on target and on a recording fake in
//! host tests.

use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::SetDutyCycle;

use crate::app::service::HealthIndicator;

/// Darkest breathing level.
const MIN_DUTY: u64 = 1;

/// Toggles of the failure blink.
pub const FAILURE_BLINKS: u32 = 20;
/// Half period of the failure blink.
pub const FAILURE_BLINK_MS: u32 = 100;

/// Breathing brightness `elapsed_ms` into a breath of `period_ms`.
///
/// Ramps from the minimum to `max_duty` and back once per period, then
/// squares the level to flatten the dim end.
pub fn breathe_duty(elapsed_ms: u32, period_ms: u32, max_duty: u16) -> u16 {
    let max = u64::from(max_duty).max(MIN_DUTY + 1);
    let period = u64::from(period_ms.max(1));
    let elapsed = u64::from(elapsed_ms).min(period);

    let mut duty = (max - MIN_DUTY) * elapsed * 2 / period + MIN_DUTY;
    if duty > max {
        duty = 2 * max - duty;
    }
    (duty * duty / max) as u16
}

pub struct HealthLed<P> {
    pwm: P,
    /// LED lights when the pin is low.
    inverted: bool,
    breath_start_ms: u32,
    prev_duty: Option<u16>,
}

impl<P: SetDutyCycle> HealthLed<P> {
    pub fn new(pwm: P, inverted: bool) -> Self {
        Self {
            pwm,
            inverted,
            breath_start_ms: 0,
            prev_duty: None,
        }
    }

    /// Fully on or off, respecting the LED polarity.
    pub fn set(&mut self, on: bool) -> Result<(), P::Error> {
        self.prev_duty = None;
        if on != self.inverted {
            self.pwm.set_duty_cycle_fully_on()
        } else {
            self.pwm.set_duty_cycle_fully_off()
        }
    }

    /// Advance the breathing animation.  Writes the PWM only when the level
    /// changed; a steady indicator leaves the LED alone.
    pub fn update(&mut self, now_ms: u32, indicator: HealthIndicator) -> Result<(), P::Error> {
        let HealthIndicator::Breathe { period_ms } = indicator else {
            return Ok(());
        };

        let mut elapsed = now_ms.wrapping_sub(self.breath_start_ms);
        if elapsed > period_ms {
            self.breath_start_ms = now_ms;
            elapsed -= period_ms;
        }

        let range = self.pwm.max_duty_cycle();
        let mut duty = breathe_duty(elapsed, period_ms, range / 2);
        if self.prev_duty == Some(duty) {
            return Ok(());
        }
        self.prev_duty = Some(duty);
        if self.inverted {
            duty = range - duty;
        }
        self.pwm.set_duty_cycle(duty)
    }

    /// Blink the failure pattern, blocking for two seconds.
    pub fn blink_failure(&mut self, delay: &mut impl DelayNs) -> Result<(), P::Error> {
        for i in 0..FAILURE_BLINKS {
            self.set(i & 1 == 1)?;
            delay.delay_ms(FAILURE_BLINK_MS);
        }
        Ok(())
    }
}
