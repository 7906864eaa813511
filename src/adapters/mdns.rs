//! mDNS advertisement of the bridge.
//!
//! Announces `<hostname>.local` and the operator web surface as
//! `_http._tcp` on port 80, with the firmware version in a TXT record.
//! Uses the `esp-idf-svc` mDNS wrapper on ESP-IDF and only logs on
//! simulation targets.
//!
//! Started once the station has an address; dropping the adapter
//! withdraws the records.

use log::info;

#[cfg(target_os = "espidf")]
use esp_idf_svc::mdns::EspMdns;

pub const SERVICE_TYPE: &str = "_http";
pub const SERVICE_PROTO: &str = "_tcp";
pub const WEB_PORT: u16 = 80;

pub struct MdnsAdapter {
    hostname: heapless::String<32>,
    #[cfg(target_os = "espidf")]
    mdns: Option<EspMdns>,
    #[cfg(not(target_os = "espidf"))]
    active: bool,
}

impl MdnsAdapter {
    pub fn new(hostname: &str) -> Self {
        let mut name = heapless::String::new();
        for ch in hostname.chars() {
            if name.push(ch).is_err() {
                break;
            }
        }
        Self {
            hostname: name,
            #[cfg(target_os = "espidf")]
            mdns: None,
            #[cfg(not(target_os = "espidf"))]
            active: false,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Start advertising.  Repeated calls are no-ops.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.is_active() {
            return Ok(());
        }
        self.platform_start()?;
        info!(
            "mDNS: advertising {}.local {}.{}:{}",
            self.hostname, SERVICE_TYPE, SERVICE_PROTO, WEB_PORT
        );
        Ok(())
    }

    /// Withdraw the records.  Repeated calls are no-ops.
    pub fn stop(&mut self) {
        if !self.is_active() {
            return;
        }
        self.platform_stop();
        info!("mDNS: stopped");
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    pub fn is_active(&self) -> bool {
        self.mdns.is_some()
    }

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> anyhow::Result<()> {
        let mut mdns = EspMdns::take()?;
        mdns.set_hostname(self.hostname.as_str())?;
        mdns.set_instance_name("LiFePO Island")?;
        mdns.add_service(
            None,
            SERVICE_TYPE,
            SERVICE_PROTO,
            WEB_PORT,
            &[("version", env!("CARGO_PKG_VERSION"))],
        )?;
        self.mdns = Some(mdns);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        self.mdns = None;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> anyhow::Result<()> {
        self.active = true;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        self.active = false;
    }
}
