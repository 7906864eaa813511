//! WiFi station-mode adapter.
//!
//! Implements [`LinkPort`] — the hexagonal boundary for the station
//! link.  Reconnect pacing and the restart ceiling live in the
//! connectivity manager; this adapter only performs single actions.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF WiFi driver via `esp_idf_svc::wifi`,
//!   static addressing by swapping the STA netif.
//! - **all other targets**: an in-memory simulation for host-side tests.

use core::net::Ipv4Addr;

use log::{info, warn};

use crate::app::ports::LinkPort;
use crate::error::LinkError;
use crate::netconfig::NetworkIdentity;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    ipv4,
    netif::{EspNetif, NetifConfiguration},
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), LinkError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkError::InvalidConfig);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), LinkError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(LinkError::InvalidConfig);
    }
    Ok(())
}

/// Prefix length of a contiguous subnet mask.
pub fn mask_prefix(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

/// Subnet mask of a prefix length.
pub fn prefix_mask(prefix: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::MAX.checked_shl(32 - u32::from(prefix.min(32))).unwrap_or(0))
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter (ESP-IDF)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: BlockingWifi<EspWifi<'static>>,
    hostname: heapless::String<32>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    /// Bring up the station, with the stored static identity if any, and
    /// join the configured network once.
    pub fn start(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        hostname: &str,
        ssid: &str,
        password: &str,
        stored: Option<&NetworkIdentity>,
    ) -> Result<Self, LinkError> {
        validate_ssid(ssid)?;
        validate_password(password)?;

        let esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs)).map_err(|e| {
            warn!("WiFi: driver init failed: {}", e);
            LinkError::JoinFailed
        })?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop).map_err(|_| LinkError::JoinFailed)?;

        let mut adapter = Self {
            wifi,
            hostname: heapless::String::new(),
        };
        let _ = adapter.hostname.push_str(hostname);
        adapter.swap_netif(stored)?;

        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| LinkError::InvalidConfig)?,
            password: password.try_into().map_err(|_| LinkError::InvalidConfig)?,
            auth_method,
            ..Default::default()
        });
        adapter
            .wifi
            .set_configuration(&conf)
            .map_err(|_| LinkError::ConfigRejected)?;
        adapter.wifi.start().map_err(|_| LinkError::JoinFailed)?;
        info!("WiFi: connecting to '{}'", ssid);
        adapter.join()?;
        Ok(adapter)
    }

    fn join(&mut self) -> Result<(), LinkError> {
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: join failed: {}", e);
            LinkError::JoinFailed
        })?;
        self.wifi.wait_netif_up().map_err(|_| LinkError::JoinFailed)
    }

    fn netif_conf(&self, identity: Option<&NetworkIdentity>) -> Result<NetifConfiguration, LinkError> {
        let ip_configuration = match identity {
            Some(id) => ipv4::Configuration::Client(ipv4::ClientConfiguration::Fixed(ipv4::ClientSettings {
                ip: id.address,
                subnet: ipv4::Subnet {
                    gateway: id.gateway,
                    mask: ipv4::Mask(mask_prefix(id.subnet_mask)),
                },
                dns: Some(id.dns0),
                secondary_dns: Some(id.dns1),
            })),
            None => ipv4::Configuration::Client(ipv4::ClientConfiguration::DHCP(ipv4::DHCPClientSettings {
                hostname: Some(self.hostname.as_str().try_into().map_err(|_| LinkError::InvalidConfig)?),
            })),
        };
        Ok(NetifConfiguration {
            ip_configuration: Some(ip_configuration),
            ..NetifConfiguration::wifi_default_client()
        })
    }

    fn swap_netif(&mut self, identity: Option<&NetworkIdentity>) -> Result<(), LinkError> {
        let conf = self.netif_conf(identity)?;
        let netif = EspNetif::new_with_conf(&conf).map_err(|e| {
            warn!("WiFi: netif config rejected: {}", e);
            LinkError::ConfigRejected
        })?;
        self.wifi
            .wifi_mut()
            .swap_netif_sta(netif)
            .map(|_| ())
            .map_err(|_| LinkError::ConfigRejected)
    }

    /// Swap the addressing mode and rejoin.
    fn readdress(&mut self, identity: Option<&NetworkIdentity>) -> Result<(), LinkError> {
        let _ = self.wifi.disconnect();
        self.swap_netif(identity)?;
        self.join()
    }

    fn ap_record() -> Option<esp_idf_svc::sys::wifi_ap_record_t> {
        let mut ap: esp_idf_svc::sys::wifi_ap_record_t = Default::default();
        // SAFETY: `ap` is a valid out-pointer for the duration of the call.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap) };
        (ret == esp_idf_svc::sys::ESP_OK).then_some(ap)
    }
}

#[cfg(target_os = "espidf")]
impl LinkPort for WifiAdapter {
    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.wifi().sta_netif().is_up().unwrap_or(false)
    }

    fn rssi(&self) -> i8 {
        Self::ap_record().map_or(0, |ap| ap.rssi)
    }

    fn bssid(&self) -> [u8; 6] {
        Self::ap_record().map_or([0; 6], |ap| ap.bssid)
    }

    fn identity(&self) -> NetworkIdentity {
        match self.wifi.wifi().sta_netif().get_ip_info() {
            Ok(info) => NetworkIdentity {
                address: info.ip,
                gateway: info.subnet.gateway,
                subnet_mask: prefix_mask(info.subnet.mask.0),
                dns0: info.dns.unwrap_or(Ipv4Addr::UNSPECIFIED),
                dns1: info.secondary_dns.unwrap_or(Ipv4Addr::UNSPECIFIED),
            },
            Err(_) => NetworkIdentity::default(),
        }
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        self.wifi.wifi_mut().connect().map_err(|_| LinkError::JoinFailed)
    }

    fn apply_static(&mut self, identity: &NetworkIdentity) -> Result<(), LinkError> {
        info!("WiFi: switching to static {}", identity.address);
        self.readdress(Some(identity))
    }

    fn use_dhcp(&mut self) -> Result<(), LinkError> {
        info!("WiFi: switching to DHCP");
        self.readdress(None)
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter (simulation)
// ───────────────────────────────────────────────────────────────

/// Host simulation of the station link.  Tests drive it through the
/// `simulate_*` methods.
#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    connected: bool,
    rssi: i8,
    bssid: [u8; 6],
    identity: NetworkIdentity,
    /// Address handed out while in DHCP mode.
    lease: NetworkIdentity,
    reconnect_succeeds: bool,
    reconnects: u32,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn start(ssid: &str, password: &str, stored: Option<&NetworkIdentity>) -> Result<Self, LinkError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let lease = NetworkIdentity {
            address: Ipv4Addr::new(192, 168, 1, 100),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            dns0: Ipv4Addr::new(192, 168, 1, 1),
            dns1: Ipv4Addr::UNSPECIFIED,
        };
        info!("WiFi(sim): connected to '{}'", ssid);
        Ok(Self {
            connected: true,
            rssi: -60,
            bssid: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            identity: stored.copied().unwrap_or(lease),
            lease,
            reconnect_succeeds: true,
            reconnects: 0,
        })
    }

    pub fn simulate_drop(&mut self) {
        self.connected = false;
    }

    pub fn simulate_signal(&mut self, bssid: [u8; 6], rssi: i8) {
        self.bssid = bssid;
        self.rssi = rssi;
    }

    pub fn simulate_reconnect_failures(&mut self, fail: bool) {
        self.reconnect_succeeds = !fail;
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }
}

#[cfg(not(target_os = "espidf"))]
impl LinkPort for WifiAdapter {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn rssi(&self) -> i8 {
        if self.connected { self.rssi } else { 0 }
    }

    fn bssid(&self) -> [u8; 6] {
        self.bssid
    }

    fn identity(&self) -> NetworkIdentity {
        self.identity
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        self.reconnects += 1;
        if self.reconnect_succeeds {
            self.connected = true;
            Ok(())
        } else {
            Err(LinkError::JoinFailed)
        }
    }

    fn apply_static(&mut self, identity: &NetworkIdentity) -> Result<(), LinkError> {
        if identity.address.is_unspecified() || identity.address.is_broadcast() {
            return Err(LinkError::ConfigRejected);
        }
        self.identity = *identity;
        Ok(())
    }

    fn use_dhcp(&mut self) -> Result<(), LinkError> {
        self.identity = self.lease;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
