//! Typed register snapshots of the charger and the BMS.
//!
//! Each struct mirrors one register block as delivered by the device
//! proxies.  Field names follow the vendor register names; the serde
//! renames reproduce the published JSON keys.

use core::fmt::{self, Write};
use core::net::Ipv4Addr;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use super::faults;

// ───────────────────────────────────────────────────────────────
// Small value types
// ───────────────────────────────────────────────────────────────

/// Month/day pair used by the energy counters (`"m:d"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthDay {
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.month, self.day)
    }
}

impl Serialize for MonthDay {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Hour/minute pair used by the load timer (`"h:m"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hour, self.minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// BMS charge/discharge mosfet switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MosfetMode {
    None = 0b00,
    Charge = 0b01,
    Discharge = 0b10,
    Both = 0b11,
}

impl MosfetMode {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => Self::Charge,
            0b10 => Self::Discharge,
            0b11 => Self::Both,
            _ => Self::None,
        }
    }

    pub const fn from_flags(charge: bool, discharge: bool) -> Self {
        Self::from_bits((charge as u8) | ((discharge as u8) << 1))
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn charge(self) -> bool {
        self.bits() & 0b01 != 0
    }

    pub const fn discharge(self) -> bool {
        self.bits() & 0b10 != 0
    }
}

// ───────────────────────────────────────────────────────────────
// Charger (eSmart3) register blocks
// ───────────────────────────────────────────────────────────────

/// Charger identity block.  `serial` is the identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Information {
    #[serde(skip)]
    pub serial: heapless::String<8>,
    pub model: heapless::String<16>,
    pub date: heapless::String<8>,
    #[serde(rename = "FirmWare")]
    pub firmware: heapless::String<4>,
}

/// Live charge status, polled twice a second.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChargeStatus {
    pub chg_mode: u16,
    pub pv_volt: u16,
    pub bat_volt: u16,
    pub chg_curr: u16,
    pub out_volt: u16,
    pub load_volt: u16,
    pub load_curr: u16,
    pub chg_power: u16,
    pub load_power: u16,
    pub bat_temp: i16,
    pub inner_temp: i16,
    pub bat_cap: u16,
    #[serde(rename = "CO2")]
    pub co2: u32,
    #[serde(serialize_with = "faults::serialize_charger_bits")]
    pub fault: u16,
    pub system_reminder: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatteryParams {
    pub bat_type: u16,
    pub bat_sys_type: u16,
    pub bulk_volt: u16,
    pub float_volt: u16,
    pub max_chg_curr: u16,
    pub max_dis_chg_curr: u16,
    pub equalize_chg_volt: u16,
    pub equalize_chg_time: u16,
    pub load_use_sel: u8,
}

/// Event log and energy counters.  `run_time` free-runs and is not
/// part of change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventLog {
    pub run_time: u32,
    pub start_cnt: u16,
    pub last_fault_info: u16,
    pub fault_cnt: u16,
    pub today_eng: u32,
    pub today_eng_date: MonthDay,
    pub month_eng: u32,
    pub month_eng_date: MonthDay,
    pub total_eng: u32,
    pub load_today_eng: u32,
    pub load_month_eng: u32,
    pub load_total_eng: u32,
    pub backlight_time: u16,
    pub switch_enable: u8,
}

impl EventLog {
    /// Equality ignoring the run-time counter.
    pub fn same_counters(&self, other: &Self) -> bool {
        Self { run_time: 0, ..self.clone() } == Self { run_time: 0, ..other.clone() }
    }
}

/// Measurement calibration (ratio/offset per channel).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Calibration {
    pub pv_volt_ratio: u16,
    pub pv_volt_offset: u16,
    pub bat_volt_ratio: u16,
    pub bat_volt_offset: u16,
    pub chg_curr_ratio: u16,
    pub chg_curr_offset: u16,
    pub load_curr_ratio: u16,
    pub load_curr_offset: u16,
    pub load_volt_ratio: u16,
    pub load_volt_offset: u16,
    pub out_volt_ratio: u16,
    pub out_volt_offset: u16,
}

/// Load output schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadParams {
    pub load_module_select1: u16,
    pub load_module_select2: u16,
    pub load_on_pv_volt: u16,
    pub load_off_pv_volt: u16,
    pub pv_contrl_turn_on_delay: u16,
    pub pv_contrl_turn_off_delay: u16,
    pub aft_load_on_time: TimeOfDay,
    pub aft_load_off_time: TimeOfDay,
    pub mon_load_on_time: TimeOfDay,
    pub mon_load_off_time: TimeOfDay,
    pub load_sts: u16,
    pub time2_enable: u16,
}

/// Protection thresholds in deci-volts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProtectionParams {
    pub load_ovp: u16,
    pub load_uvp: u16,
    pub bat_ovp: u16,
    pub bat_ov_b: u16,
    pub bat_uvp: u16,
    pub bat_uv_b: u16,
}

// ───────────────────────────────────────────────────────────────
// BMS (JBD) register blocks
// ───────────────────────────────────────────────────────────────

/// BMS identity block.  `id` is the identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hardware {
    pub id: heapless::String<32>,
}

/// Maximum number of NTC sensors a JBD board reports.
pub const MAX_NTCS: usize = 8;

/// Maximum number of cells a JBD board reports.
pub const MAX_CELLS: usize = 32;

/// Zero Celsius in the BMS's deci-Kelvin temperature unit.
const DECI_KELVIN_ZERO_C: i32 = 2731;

/// Basic BMS status block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BmsStatus {
    /// Pack voltage in 10 mV.
    pub voltage: u16,
    /// Pack current in 10 mA, negative while discharging.
    pub current: i16,
    pub remaining_capacity: u16,
    pub nominal_capacity: u16,
    pub cycles: u16,
    /// Packed date: `(year - 2000) << 9 | month << 5 | day`.
    pub production_date: u16,
    /// Cell balancing bits, bit 0 = cell 1.
    pub balance: u32,
    pub fault: u16,
    pub version: u8,
    /// State of charge in percent.
    pub current_capacity: u8,
    pub mosfet_status: u8,
    pub cells: u8,
    pub ntcs: u8,
    /// Raw NTC readings in deci-Kelvin.
    pub temperatures: heapless::Vec<u16, MAX_NTCS>,
}

impl BmsStatus {
    pub fn production_year(&self) -> u16 {
        2000 + (self.production_date >> 9)
    }

    pub fn production_month(&self) -> u8 {
        ((self.production_date >> 5) & 0x0F) as u8
    }

    pub fn production_day(&self) -> u8 {
        (self.production_date & 0x1F) as u8
    }

    pub fn production_date_string(&self) -> heapless::String<10> {
        let mut s = heapless::String::new();
        let _ = write!(
            s,
            "{:04}-{:02}-{:02}",
            self.production_year(),
            self.production_month(),
            self.production_day()
        );
        s
    }

    /// One `0`/`1` per cell, cell 1 first.
    pub fn balance_string(&self) -> heapless::String<MAX_CELLS> {
        let mut s = heapless::String::new();
        for cell in 0..usize::from(self.cells).min(MAX_CELLS) {
            let _ = s.push(if self.balance & (1 << cell) != 0 { '1' } else { '0' });
        }
        s
    }

    pub fn mosfets(&self) -> MosfetMode {
        MosfetMode::from_bits(self.mosfet_status)
    }

    /// NTC readings converted to deci-Celsius, limited to `ntcs` entries.
    pub fn temperatures_deci_celsius(&self) -> impl Iterator<Item = i16> + '_ {
        self.temperatures
            .iter()
            .take(usize::from(self.ntcs))
            .map(|&raw| (i32::from(raw) - DECI_KELVIN_ZERO_C) as i16)
    }
}

struct DeciCelsius<'a>(&'a BmsStatus);

impl Serialize for DeciCelsius<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(self.0.temperatures_deci_celsius())
    }
}

impl Serialize for BmsStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut st = s.serialize_struct("Status", 14)?;
        st.serialize_field("voltage", &self.voltage)?;
        st.serialize_field("current", &self.current)?;
        st.serialize_field("remainingCapacity", &self.remaining_capacity)?;
        st.serialize_field("nominalCapacity", &self.nominal_capacity)?;
        st.serialize_field("cycles", &self.cycles)?;
        st.serialize_field("productionDate", self.production_date_string().as_str())?;
        st.serialize_field("balance", self.balance_string().as_str())?;
        st.serialize_field("fault", &self.fault)?;
        st.serialize_field("version", &self.version)?;
        st.serialize_field("currentCapacity", &self.current_capacity)?;
        st.serialize_field("mosfetStatus", &self.mosfet_status)?;
        st.serialize_field("cells", &self.cells)?;
        st.serialize_field("ntcs", &self.ntcs)?;
        st.serialize_field("temperatures", &DeciCelsius(self))?;
        st.end()
    }
}

/// Per-cell voltages in mV.  How many entries are meaningful is
/// decided by the cell count of the latest [`BmsStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cells {
    pub voltages: heapless::Vec<u16, MAX_CELLS>,
}

impl Cells {
    pub fn first(&self, count: usize) -> &[u16] {
        &self.voltages[..count.min(self.voltages.len())]
    }
}

// ───────────────────────────────────────────────────────────────
// Link quality snapshot
// ───────────────────────────────────────────────────────────────

/// Station link snapshot published under the `Wifi` category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub bssid: [u8; 6],
    pub rssi: i8,
    pub address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns0: Ipv4Addr,
    pub dns1: Ipv4Addr,
}

impl Default for LinkReport {
    fn default() -> Self {
        Self {
            bssid: [0; 6],
            rssi: 0,
            address: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns0: Ipv4Addr::UNSPECIFIED,
            dns1: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Lower-case colon separated MAC / BSSID text.
pub fn mac_string(mac: &[u8; 6]) -> heapless::String<17> {
    let mut s = heapless::String::new();
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            let _ = s.push(':');
        }
        let _ = write!(s, "{b:02x}");
    }
    s
}

impl Serialize for LinkReport {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut st = s.serialize_struct("Wifi", 7)?;
        st.serialize_field("BSSID", mac_string(&self.bssid).as_str())?;
        st.serialize_field("IP", &DisplayStr(self.address))?;
        st.serialize_field("Subnet", &DisplayStr(self.subnet_mask))?;
        st.serialize_field("Gateway", &DisplayStr(self.gateway))?;
        st.serialize_field("DNS0", &DisplayStr(self.dns0))?;
        st.serialize_field("DNS1", &DisplayStr(self.dns1))?;
        st.serialize_field("RSSI", &self.rssi)?;
        st.end()
    }
}

/// Serializes any `Display` value as a JSON string.
pub(crate) struct DisplayStr<T>(pub T);

impl<T: fmt::Display> Serialize for DisplayStr<T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&self.0)
    }
}
