//! System configuration parameters
//!
//! All tunable parameters for the LiFePO Island bridge.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

use crate::telemetry::records::{BatteryParams, ProtectionParams};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Network hostname; empty means "derive from the MAC address"
    pub hostname: heapless::String<32>,

    pub wifi: WifiConfig,
    pub bus: BusConfig,
    pub influx: InfluxConfig,
    pub syslog: SyslogConfig,
    pub link: LinkPolicy,
    pub battery: BatteryProfile,

    // --- Timing ---
    /// Informational telemetry is logged only during this uptime window
    pub info_log_window_ms: u32,
    /// Main loop sleep between iterations (milliseconds)
    pub loop_interval_ms: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

/// MQTT broker and topic layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    pub broker_host: heapless::String<64>,
    pub broker_port: u16,
    /// Prefix of every topic, e.g. `lifepo` → `lifepo/json/ChgSts`
    pub topic_root: heapless::String<32>,
    pub retry_interval_ms: u32,
}

/// InfluxDB v1 write endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub server: heapless::String<64>,
    pub port: u16,
    pub database: heapless::String<32>,
}

/// Remote syslog (RFC 5424 over UDP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyslogConfig {
    /// Empty disables remote logging
    pub server: heapless::String<64>,
    pub port: u16,
    pub app_name: heapless::String<16>,
}

/// Station link supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPolicy {
    /// Minimum gap between reconnect attempts
    pub retry_interval_ms: u32,
    /// Restart once more than this many consecutive attempts failed
    pub attempt_ceiling: u32,
    /// An RSSI change is reported at most once per window
    pub report_window_ms: u32,
    /// RSSI moves of at least this many dB are reported immediately
    pub report_min_delta: u8,
}

/// LiFePO pack description used to program the charger at boot.
///
/// Voltages are per cell in deci-volts, currents in deci-amps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryProfile {
    /// Cells in series: 4, 8, 12 or 16
    pub cells_series: u16,
    /// Cells in parallel: 1..=4
    pub cells_parallel: u16,
    pub cell_max_deci_volt: u16,
    pub cell_min_deci_volt: u16,
    pub capacity_ah: u16,
    /// Hardware charge current limit of the charger
    pub device_max_charge_deci_amp: u16,
    pub max_discharge_deci_amp: u16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            hostname: heapless::String::new(),
            wifi: WifiConfig::default(),
            bus: BusConfig::default(),
            influx: InfluxConfig::default(),
            syslog: SyslogConfig::default(),
            link: LinkPolicy::default(),
            battery: BatteryProfile::default(),

            // Timing
            info_log_window_ms: 600_000, // 10 min
            loop_interval_ms: 10,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broker_host: str_lit("mqtt"),
            broker_port: 1883,
            topic_root: str_lit("lifepo"),
            retry_interval_ms: 5_000,
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            server: str_lit("influx"),
            port: 8086,
            database: str_lit("lifepo"),
        }
    }
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            server: str_lit("syslog"),
            port: 514,
            app_name: str_lit("lifepo"),
        }
    }
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            retry_interval_ms: 10_000,
            attempt_ceiling: 60, // ~10 min of failed reconnects
            report_window_ms: 10_000,
            report_min_delta: 5,
        }
    }
}

impl Default for BatteryProfile {
    fn default() -> Self {
        Self {
            cells_series: 4,
            cells_parallel: 1,
            cell_max_deci_volt: 36, // ~95% capacity
            cell_min_deci_volt: 30, // ~15% capacity
            capacity_ah: 272,
            device_max_charge_deci_amp: 600,
            max_discharge_deci_amp: 300,
        }
    }
}

impl BatteryProfile {
    /// Charger battery parameters for this pack.
    pub fn battery_params(&self) -> BatteryParams {
        let s = self.cells_series;
        // 1C charge, capped by the charger
        let max_chg = u32::from(self.capacity_ah) * u32::from(self.cells_parallel) * 10;
        BatteryParams {
            bat_type: 0, // user defined
            bat_sys_type: s / 4, // 12 V multiples
            bulk_volt: self.cell_max_deci_volt * s,
            float_volt: 0,
            max_chg_curr: max_chg.min(u32::from(self.device_max_charge_deci_amp)) as u16,
            max_dis_chg_curr: self.max_discharge_deci_amp,
            equalize_chg_volt: 0,
            equalize_chg_time: 0,
            load_use_sel: 0,
        }
    }

    /// Charger protection thresholds for this pack.
    pub fn protection_params(&self) -> ProtectionParams {
        let s = self.cells_series;
        let load_uvp = self.cell_min_deci_volt * s;
        let bat_ov_b = self.cell_max_deci_volt * s + 5;
        ProtectionParams {
            load_ovp: 148,
            load_uvp,
            bat_ovp: bat_ov_b + bat_ov_b / 10,
            bat_ov_b,
            bat_uvp: load_uvp - load_uvp / 10,
            bat_uv_b: load_uvp.saturating_sub(5),
        }
    }
}

impl SystemConfig {
    /// Range checks applied before the config is persisted.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.bus.topic_root.is_empty() {
            return Err("bus.topic_root must not be empty");
        }
        if self.bus.retry_interval_ms == 0 {
            return Err("bus.retry_interval_ms must be > 0");
        }
        if !self.syslog.server.is_empty() && self.syslog.port == 0 {
            return Err("syslog.port must be > 0");
        }
        if self.link.retry_interval_ms == 0 {
            return Err("link.retry_interval_ms must be > 0");
        }
        if self.link.attempt_ceiling == 0 {
            return Err("link.attempt_ceiling must be > 0");
        }
        if self.loop_interval_ms == 0 || self.loop_interval_ms > 500 {
            return Err("loop_interval_ms must be 1..=500");
        }
        let b = &self.battery;
        if !matches!(b.cells_series, 4 | 8 | 12 | 16) {
            return Err("battery.cells_series must be 4, 8, 12 or 16");
        }
        if !(1..=4).contains(&b.cells_parallel) {
            return Err("battery.cells_parallel must be 1..=4");
        }
        if b.cell_min_deci_volt >= b.cell_max_deci_volt {
            return Err("battery.cell_min_deci_volt must be below cell_max_deci_volt");
        }
        if b.cell_max_deci_volt > 40 || b.cell_min_deci_volt < 20 {
            return Err("battery cell voltage limits out of range");
        }
        Ok(())
    }
}

fn str_lit<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    let _ = out.push_str(s);
    out
}
