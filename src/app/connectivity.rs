//! Station link supervision.
//!
//! Evaluated once per main-loop iteration.  While the link is up it
//! rate-limits link-quality reports; while it is down it paces reconnect
//! attempts and escalates to a restart once the attempt ceiling is
//! exceeded.  It also owns the pending address change staged by the
//! HTTP surface.
//!
//! ```text
//!            link up                      attempts > ceiling
//!  Disconnected ─────────▶ Connected      Disconnected ───────▶ Restarting
//!       ▲                      │
//!       └──────link lost───────┘
//! ```

use log::{debug, error, info, warn};

use crate::config::LinkPolicy;
use crate::error::LinkError;
use crate::netconfig::{self, IpChange, NetworkIdentity};
use crate::telemetry::records::LinkReport;

use super::ports::{LinkPort, StoragePort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected { attempts: u32, last_attempt_ms: u32 },
    /// Terminal: a restart has been requested.
    Restarting,
}

/// Result of one [`ConnectivityManager::evaluate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Reports to fan out, oldest first.
    pub reports: heapless::Vec<LinkReport, 2>,
    /// Set exactly once, on the transition into `Restarting`.
    pub restart: bool,
}

pub struct ConnectivityManager {
    policy: LinkPolicy,
    state: LinkState,
    ever_connected: bool,
    prev_bssid: [u8; 6],
    prev_rssi: i8,
    reported_rssi: i8,
    last_report_ms: u32,
    pending: Option<IpChange>,
}

impl ConnectivityManager {
    pub fn new(policy: LinkPolicy) -> Self {
        Self {
            policy,
            state: LinkState::Disconnected {
                attempts: 0,
                last_attempt_ms: 0,
            },
            ever_connected: false,
            prev_bssid: [0; 6],
            prev_rssi: 0,
            reported_rssi: 0,
            last_report_ms: 0,
            pending: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Last observed AP and signal strength, for the status page.
    pub fn last_seen(&self) -> ([u8; 6], i8) {
        (self.prev_bssid, self.prev_rssi)
    }

    /// Run one supervision step.
    pub fn evaluate(&mut self, now_ms: u32, link: &mut impl LinkPort) -> LinkOutcome {
        let mut out = LinkOutcome::default();
        if self.state == LinkState::Restarting {
            return out;
        }

        if link.is_connected() {
            self.on_link_up(now_ms, link, &mut out);
        } else {
            self.on_link_down(now_ms, link, &mut out);
        }
        out
    }

    fn on_link_up(&mut self, now_ms: u32, link: &impl LinkPort, out: &mut LinkOutcome) {
        let identity = link.identity();
        let bssid = link.bssid();
        let rssi = link.rssi();

        if !matches!(self.state, LinkState::Connected) {
            info!("Link: up, ip {}", identity.address);
            if self.ever_connected {
                // Mark the outage against the AP we lost.
                let _ = out.reports.push(self.report(self.prev_bssid, 0, &identity, now_ms));
            }
            self.ever_connected = true;
            self.state = LinkState::Connected;
        }

        if bssid != self.prev_bssid {
            let _ = out.reports.push(self.report(bssid, rssi, &identity, now_ms));
        } else if rssi != self.prev_rssi {
            let delta = (i16::from(rssi) - i16::from(self.reported_rssi)).unsigned_abs();
            let window_elapsed = now_ms.wrapping_sub(self.last_report_ms) > self.policy.report_window_ms;
            if delta >= u16::from(self.policy.report_min_delta) || window_elapsed {
                let _ = out.reports.push(self.report(bssid, rssi, &identity, now_ms));
            }
        }

        self.prev_bssid = bssid;
        self.prev_rssi = rssi;
    }

    fn on_link_down(&mut self, now_ms: u32, link: &mut impl LinkPort, out: &mut LinkOutcome) {
        let (attempts, last) = match self.state {
            LinkState::Connected => {
                warn!("Link: lost");
                (0, now_ms)
            }
            LinkState::Disconnected {
                attempts,
                last_attempt_ms,
            } => (attempts, last_attempt_ms),
            LinkState::Restarting => return,
        };
        self.prev_rssi = 0;

        if attempts != 0 && now_ms.wrapping_sub(last) <= self.policy.retry_interval_ms {
            self.state = LinkState::Disconnected {
                attempts,
                last_attempt_ms: last,
            };
            return;
        }

        if let Err(e) = link.reconnect() {
            debug!("Link: reconnect attempt {} failed: {}", attempts + 1, e);
        }
        let attempts = attempts + 1;
        if attempts > self.policy.attempt_ceiling {
            error!("Link: failed to reconnect after {} attempts, about to restart", attempts - 1);
            self.state = LinkState::Restarting;
            out.restart = true;
        } else {
            self.state = LinkState::Disconnected {
                attempts,
                last_attempt_ms: now_ms,
            };
        }
    }

    fn report(&mut self, bssid: [u8; 6], rssi: i8, id: &NetworkIdentity, now_ms: u32) -> LinkReport {
        self.reported_rssi = rssi;
        self.last_report_ms = now_ms;
        LinkReport {
            bssid,
            rssi,
            address: id.address,
            subnet_mask: id.subnet_mask,
            gateway: id.gateway,
            dns0: id.dns0,
            dns1: id.dns1,
        }
    }

    // ── Pending address change ────────────────────────────────

    /// Stage a change to apply after the next response flush.  A newer
    /// request replaces an older one.
    pub fn stage(&mut self, change: IpChange) {
        self.pending = Some(change);
    }

    pub fn pending(&self) -> Option<IpChange> {
        self.pending
    }

    /// Consume and apply the pending change, if any.
    ///
    /// Static addresses are persisted once the interface accepted them;
    /// a switch to DHCP clears the stored record.
    pub fn apply_pending(
        &mut self,
        link: &mut impl LinkPort,
        storage: &mut impl StoragePort,
    ) -> Option<Result<NetworkIdentity, LinkError>> {
        let change = self.pending.take()?;
        let result = match change {
            IpChange::Static(address) => {
                let target = NetworkIdentity {
                    address,
                    ..link.identity()
                };
                link.apply_static(&target).map(|()| {
                    if let Err(e) = netconfig::save(storage, &target) {
                        error!("NetId: write changed IP config failed: {}", e);
                    } else {
                        info!("NetId: wrote changed IP config");
                    }
                    target
                })
            }
            IpChange::Dynamic => link.use_dhcp().map(|()| {
                if let Err(e) = netconfig::clear(storage) {
                    error!("NetId: clearing IP config failed: {}", e);
                }
                link.identity()
            }),
        };
        match &result {
            Ok(id) => info!("NetId: new IP config {}", id),
            Err(e) => error!("NetId: {} rejected: {}", change, e),
        }
        Some(result)
    }
}
