//! Simulated device proxies.
//!
//! The RS485 frame codecs of the eSmart3 charger and the JBD BMS live
//! outside this crate.  These proxies implement [`ChargerPort`] and
//! [`BmsPort`] over plain in-memory register blocks so the whole poll →
//! cache → publish path runs without the bus attached.
//!
//! Every field is public: tests and bench runs set register values
//! directly, and `fail` injects a transport error into every call until
//! cleared.

use log::debug;

use crate::app::ports::{BmsPort, ChargerPort, WallClock};
use crate::error::TransportError;
use crate::telemetry::records::{
    BatteryParams, BmsStatus, Calibration, Cells, ChargeStatus, EventLog, Hardware, Information,
    LoadParams, MosfetMode, ProtectionParams,
};

fn check(fail: Option<TransportError>) -> Result<(), TransportError> {
    match fail {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimCharger {
    pub information: Information,
    pub charge_status: ChargeStatus,
    pub battery_params: BatteryParams,
    pub event_log: EventLog,
    pub calibration: Calibration,
    pub load_params: LoadParams,
    pub protection_params: ProtectionParams,
    pub load_on: bool,
    /// Last clock written to the device.
    pub clock: Option<WallClock>,
    pub fail: Option<TransportError>,
    /// Number of successful reads and writes.
    pub requests: u32,
}

impl SimCharger {
    /// A charger with a serial number and a plausible 24 V idle state.
    pub fn new(serial: &str) -> Self {
        let mut information = Information::default();
        let _ = information.serial.push_str(serial);
        let _ = information.model.push_str("eSmart3-40A");
        let _ = information.firmware.push_str("1.05");
        Self {
            information,
            charge_status: ChargeStatus {
                bat_volt: 266,
                out_volt: 266,
                bat_temp: 21,
                inner_temp: 24,
                bat_cap: 80,
                ..ChargeStatus::default()
            },
            ..Self::default()
        }
    }

    fn serve<T: Clone>(
        fail: Option<TransportError>,
        requests: &mut u32,
        block: &T,
    ) -> Result<T, TransportError> {
        check(fail)?;
        *requests += 1;
        Ok(block.clone())
    }
}

impl ChargerPort for SimCharger {
    fn information(&mut self) -> Result<Information, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.information)
    }

    fn charge_status(&mut self) -> Result<ChargeStatus, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.charge_status)
    }

    fn battery_params(&mut self) -> Result<BatteryParams, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.battery_params)
    }

    fn event_log(&mut self) -> Result<EventLog, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.event_log)
    }

    fn calibration(&mut self) -> Result<Calibration, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.calibration)
    }

    fn load_params(&mut self) -> Result<LoadParams, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.load_params)
    }

    fn protection_params(&mut self) -> Result<ProtectionParams, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.protection_params)
    }

    fn load(&mut self) -> Result<bool, TransportError> {
        Self::serve(self.fail, &mut self.requests, &self.load_on)
    }

    fn set_load(&mut self, on: bool) -> Result<(), TransportError> {
        check(self.fail)?;
        self.requests += 1;
        debug!("Charger(sim): load {}", if on { "on" } else { "off" });
        self.load_on = on;
        self.load_params.load_sts = u16::from(on);
        Ok(())
    }

    fn set_time(&mut self, clock: &WallClock) -> Result<(), TransportError> {
        check(self.fail)?;
        self.requests += 1;
        self.clock = Some(*clock);
        Ok(())
    }

    fn set_battery_params(&mut self, params: &BatteryParams) -> Result<(), TransportError> {
        check(self.fail)?;
        self.requests += 1;
        self.battery_params = params.clone();
        Ok(())
    }

    fn set_protection_params(&mut self, params: &ProtectionParams) -> Result<(), TransportError> {
        check(self.fail)?;
        self.requests += 1;
        self.protection_params = params.clone();
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimBms {
    pub hardware: Hardware,
    pub status: BmsStatus,
    pub cells: Cells,
    pub fail: Option<TransportError>,
    pub requests: u32,
}

impl SimBms {
    /// A BMS with `cells` balanced cells at 3.3 V and both mosfets on.
    pub fn new(id: &str, cells: u8) -> Self {
        let mut hardware = Hardware::default();
        let _ = hardware.id.push_str(id);
        let mut voltages = heapless::Vec::new();
        for _ in 0..cells {
            let _ = voltages.push(3300);
        }
        Self {
            hardware,
            status: BmsStatus {
                voltage: (3300 * u32::from(cells) / 10) as u16,
                current_capacity: 80,
                mosfet_status: MosfetMode::Both.bits(),
                cells,
                ..BmsStatus::default()
            },
            cells: Cells { voltages },
            ..Self::default()
        }
    }
}

impl BmsPort for SimBms {
    fn hardware(&mut self) -> Result<Hardware, TransportError> {
        check(self.fail)?;
        self.requests += 1;
        Ok(self.hardware.clone())
    }

    fn status(&mut self) -> Result<BmsStatus, TransportError> {
        check(self.fail)?;
        self.requests += 1;
        Ok(self.status.clone())
    }

    fn cells(&mut self) -> Result<Cells, TransportError> {
        check(self.fail)?;
        self.requests += 1;
        Ok(self.cells.clone())
    }

    fn set_mosfets(&mut self, mode: MosfetMode) -> Result<(), TransportError> {
        check(self.fail)?;
        self.requests += 1;
        debug!("Bms(sim): mosfets {:?}", mode);
        self.status.mosfet_status = mode.bits();
        Ok(())
    }
}
