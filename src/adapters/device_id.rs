//! Hostname derived from the ESP32 factory MAC address.
//!
//! When the configuration leaves the hostname empty the bridge names
//! itself `lifepo-XXYYZZ` (last 3 bytes of the 6-byte MAC, lowercase).
//! The name is used for DHCP, the `Host` tag of every time-series line,
//! the bus `Hostname` status topic and the MQTT client id.

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

pub type Hostname = heapless::String<32>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: writes exactly six bytes into `mac`.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// `lifepo-xxyyzz` from the last 3 MAC bytes.
pub fn hostname(mac: &MacAddress) -> Hostname {
    let mut name = Hostname::new();
    let _ = write!(name, "lifepo-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

/// The configured hostname, or the MAC-derived one when none is set.
pub fn resolve(configured: &str, mac: &MacAddress) -> Hostname {
    if configured.is_empty() {
        return hostname(mac);
    }
    let mut name = Hostname::new();
    for ch in configured.chars() {
        if name.push(ch).is_err() {
            break;
        }
    }
    name
}
