//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (device proxies, sinks, link, storage) implement these
//! traits.  The [`AppService`](super::service::AppService) consumes them via
//! generics, so the domain core never touches the RS485 bus, the radio or
//! flash directly.

use core::fmt;

use crate::config::SystemConfig;
use crate::error::{LinkError, SinkError, TransportError};
use crate::netconfig::NetworkIdentity;
use crate::telemetry::DataCategory;
use crate::telemetry::records::{
    BatteryParams, BmsStatus, Calibration, Cells, ChargeStatus, EventLog, Hardware, Information,
    LoadParams, MosfetMode, ProtectionParams,
};

// ───────────────────────────────────────────────────────────────
// Device proxies (driven adapters: RS485 ↔ domain)
// ───────────────────────────────────────────────────────────────

/// eSmart3 charge controller.
///
/// Every call is one blocking request/response on the shared RS485
/// transport.  Proxies do not retry.
pub trait ChargerPort {
    fn information(&mut self) -> Result<Information, TransportError>;
    fn charge_status(&mut self) -> Result<ChargeStatus, TransportError>;
    fn battery_params(&mut self) -> Result<BatteryParams, TransportError>;
    fn event_log(&mut self) -> Result<EventLog, TransportError>;
    fn calibration(&mut self) -> Result<Calibration, TransportError>;
    fn load_params(&mut self) -> Result<LoadParams, TransportError>;
    fn protection_params(&mut self) -> Result<ProtectionParams, TransportError>;

    /// Current state of the load output.
    fn load(&mut self) -> Result<bool, TransportError>;
    fn set_load(&mut self, on: bool) -> Result<(), TransportError>;

    fn set_time(&mut self, clock: &WallClock) -> Result<(), TransportError>;
    fn set_battery_params(&mut self, params: &BatteryParams) -> Result<(), TransportError>;
    fn set_protection_params(&mut self, params: &ProtectionParams) -> Result<(), TransportError>;
}

/// JBD battery management system.
pub trait BmsPort {
    fn hardware(&mut self) -> Result<Hardware, TransportError>;
    fn status(&mut self) -> Result<BmsStatus, TransportError>;
    fn cells(&mut self) -> Result<Cells, TransportError>;
    fn set_mosfets(&mut self, mode: MosfetMode) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Sinks (driven adapters: domain → network)
// ───────────────────────────────────────────────────────────────

/// Publish/subscribe bus (MQTT).
pub trait BusPort {
    fn is_connected(&self) -> bool;

    /// Returns `true` exactly once after each (re)established session so
    /// the domain can announce itself.
    fn session_started(&mut self) -> bool;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SinkError>;
}

/// Time-series database accepting line protocol.
pub trait TimeSeriesPort {
    /// Write one line.  Returns the HTTP status of the write.
    fn write_line(&mut self, line: &str) -> Result<u16, SinkError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent<'_>);
}

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: domain ↔ wifi station)
// ───────────────────────────────────────────────────────────────

/// Wifi station interface.
pub trait LinkPort {
    fn is_connected(&self) -> bool;

    /// Signal strength of the associated AP in dBm.
    fn rssi(&self) -> i8;

    /// MAC address of the associated AP.
    fn bssid(&self) -> [u8; 6];

    /// Address configuration currently active on the interface.
    fn identity(&self) -> NetworkIdentity;

    /// Start one (re)connect attempt.  Does not wait for the result.
    fn reconnect(&mut self) -> Result<(), LinkError>;

    /// Switch the interface to a fixed address configuration.
    fn apply_static(&mut self, identity: &NetworkIdentity) -> Result<(), LinkError>;

    /// Switch the interface back to DHCP.
    fn use_dhcp(&mut self) -> Result<(), LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic uptime and (once synced) wall-clock time.
pub trait ClockPort {
    /// Milliseconds since boot, wrapping at `u32::MAX`.
    fn uptime_ms(&self) -> u32;

    /// Wall-clock time, or `None` while it is not yet synchronised.
    fn wall_clock(&self) -> Option<WallClock>;
}

/// Epochs at or below this value mean the clock has not been set
/// (2020-02-20, well before any firmware build).
pub const MIN_VALID_EPOCH: u64 = 1_582_230_020;

/// Broken-down UTC time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub epoch_secs: u64,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0 = Sunday
    pub weekday: u8,
}

impl WallClock {
    /// Breaks down a Unix epoch.  Returns `None` for epochs that cannot
    /// be a synchronised clock.
    pub fn from_epoch(epoch_secs: u64) -> Option<Self> {
        if epoch_secs <= MIN_VALID_EPOCH {
            return None;
        }
        let days = (epoch_secs / 86_400) as i64;
        let secs = epoch_secs % 86_400;

        // Civil-from-days (proleptic Gregorian).
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
        let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
        let year = (yoe + era * 400 + i64::from(month <= 2)) as u16;

        Some(Self {
            epoch_secs,
            year,
            month,
            day,
            hour: (secs / 3600) as u8,
            minute: ((secs / 60) % 60) as u8,
            second: (secs % 60) as u8,
            // 1970-01-01 was a Thursday
            weekday: ((days + 4) % 7) as u8,
        })
    }
}

/// ISO-8601 `YYYY-MM-DDTHH:MM:SS`.
impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Keys are namespaced to prevent collisions between subsystems.
/// Write operations MUST be atomic; the ESP-IDF NVS API guarantees this
/// natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from the device proxies)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the [`PollScheduler`](crate::scheduler::PollScheduler)
/// invokes for each due slot.
///
/// The scheduler only knows the timing table; what a poll means is up to
/// the delegate.
pub trait PollDelegate {
    /// Whether the category may be polled yet (its identity is known).
    fn prerequisite_met(&self, category: DataCategory) -> bool;

    /// A slot fell due.  Runs one read on the transport.
    fn on_poll_due(&mut self, category: DataCategory, now_ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored value does not fit the caller's buffer.
    TooLarge,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::TooLarge => write!(f, "value too large"),
        }
    }
}
