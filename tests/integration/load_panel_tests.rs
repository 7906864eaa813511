//! Load LED mirroring and the load button.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use lifepo_island::adapters::devices::SimCharger;
use lifepo_island::app::load_panel::{CHECK_INTERVAL_MS, LoadPanel};
use lifepo_island::error::TransportError;

use crate::mock_ports::{Logged, RecordingSink};

/// Records the pin level; `high` is `None` until first written.
#[derive(Default)]
struct FakeLed {
    high: Option<bool>,
    writes: u32,
}

impl ErrorType for FakeLed {
    type Error = Infallible;
}

impl OutputPin for FakeLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = Some(false);
        self.writes += 1;
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = Some(true);
        self.writes += 1;
        Ok(())
    }
}

struct Bench {
    panel: LoadPanel,
    charger: SimCharger,
    led: FakeLed,
    log: RecordingSink,
}

impl Bench {
    /// Active-low LED, as on the ESP32 board.
    fn new() -> Self {
        Self {
            panel: LoadPanel::new(false),
            charger: SimCharger::new("SN1234"),
            led: FakeLed::default(),
            log: RecordingSink::new(),
        }
    }

    fn refresh(&mut self, now: u32) -> bool {
        self.panel.refresh(now, &mut self.charger, &mut self.led, &mut self.log)
    }

    fn toggle(&mut self) {
        self.panel.toggle(&mut self.charger, &mut self.log);
    }
}

#[test]
fn led_mirrors_load_state() {
    let mut b = Bench::new();
    b.charger.load_on = false;

    assert!(!b.refresh(0));
    assert_eq!(b.led.high, Some(true)); // active low: off
    assert_eq!(b.log.events, [Logged::Notice("Load is OFF".to_owned())]);

    b.charger.load_on = true;
    b.refresh(CHECK_INTERVAL_MS - 1);
    assert_eq!(b.panel.known(), Some(false));

    assert!(b.refresh(CHECK_INTERVAL_MS));
    assert_eq!(b.led.high, Some(false));
    assert_eq!(b.log.texts(), ["Load is OFF", "Load is ON"]);
}

#[test]
fn unchanged_state_leaves_led_alone() {
    let mut b = Bench::new();
    b.refresh(0);
    for i in 1..10 {
        b.refresh(i * CHECK_INTERVAL_MS);
    }
    assert_eq!(b.led.writes, 1);
    assert_eq!(b.log.events.len(), 1);
}

#[test]
fn read_failure_assumes_load_on() {
    let mut b = Bench::new();
    b.charger.load_on = false;
    b.refresh(0);

    b.charger.fail = Some(TransportError::Timeout);
    assert!(b.refresh(CHECK_INTERVAL_MS));
    assert_eq!(b.panel.known(), None);
    assert_eq!(b.led.high, Some(false)); // lit
    assert!(b.log.events.contains(&Logged::Alert("Load is UNKNOWN".to_owned())));

    // reported once per outage
    b.refresh(2 * CHECK_INTERVAL_MS);
    assert_eq!(b.log.texts().iter().filter(|&&t| t == "Load is UNKNOWN").count(), 1);

    b.charger.fail = None;
    assert!(!b.refresh(3 * CHECK_INTERVAL_MS));
    assert_eq!(b.led.high, Some(true));
}

#[test]
fn press_inverts_known_load() {
    let mut b = Bench::new();
    b.charger.load_on = true;
    b.refresh(0);

    b.toggle();
    assert!(!b.charger.load_on);
    assert!(b.log.texts().contains(&"Load switched OFF"));

    // LED catches up on the next check
    b.refresh(CHECK_INTERVAL_MS);
    assert_eq!(b.led.high, Some(true));
    b.toggle();
    assert!(b.charger.load_on);
    assert!(b.log.texts().contains(&"Load switched ON"));
}

#[test]
fn press_with_unknown_state_switches_off() {
    let mut b = Bench::new();
    b.charger.load_on = true;
    b.toggle();
    assert!(!b.charger.load_on);
}

#[test]
fn failed_switch_is_reported() {
    let mut b = Bench::new();
    b.refresh(0);
    b.charger.fail = Some(TransportError::Timeout);
    b.toggle();
    assert_eq!(b.log.events.last(), Some(&Logged::Alert("Load UNKNOWN".to_owned())));
}
