//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the snapshot cache, the publisher, the link
//! supervisor and the operator-facing state (status message, breathing
//! flag, start time).  All I/O flows through port traits injected at
//! call sites, making the entire service testable with mock adapters.
//!
//! ```text
//!  ChargerPort ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!      BmsPort ──▶ │        AppService        │ ──▶ BusPort
//!     LinkPort ◀──▶│ Cache · Publisher · Link │ ──▶ TimeSeriesPort
//!                  └──────────────────────────┘
//! ```

use core::fmt::{self, Write};
use core::net::Ipv4Addr;

use log::{error, info, warn};

use crate::config::{BatteryProfile, BusConfig, InfluxConfig, SystemConfig};
use crate::error::{LinkError, TransportError};
use crate::netconfig::{self, NetworkIdentity};
use crate::scheduler::PollScheduler;
use crate::telemetry::faults;
use crate::telemetry::records::{mac_string, MosfetMode};
use crate::telemetry::render::{self, RenderBuf, RenderContext, Rendered};
use crate::telemetry::{DataCategory, Record};

use super::cache::{PublishDecision, SnapshotCache};
use super::commands::{AppCommand, BusCommand};
use super::connectivity::{ConnectivityManager, LinkOutcome, LinkState};
use super::events::AppEvent;
use super::ports::{
    BmsPort, BusPort, ChargerPort, EventSink, LinkPort, PollDelegate, StoragePort, TimeSeriesPort,
    WallClock,
};
use super::publisher::{Publisher, Sinks};

/// Firmware version reported on every channel.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Status message shown once on the index page.
pub const WEB_MSG_LEN: usize = 256;

/// Index page capacity.
pub const INDEX_LEN: usize = 1024;

/// Breathing period while everything is healthy.
pub const BREATHE_OK_MS: u32 = 5_000;
/// Breathing period while a fault is set or the database rejects writes.
pub const BREATHE_ERR_MS: u32 = 1_000;

/// Mutable handles to both RS485 device proxies.
pub struct Devices<'d, C, M> {
    pub charger: &'d mut C,
    pub bms: &'d mut M,
}

impl<'d, C: ChargerPort, M: BmsPort> Devices<'d, C, M> {
    pub fn new(charger: &'d mut C, bms: &'d mut M) -> Self {
        Self { charger, bms }
    }
}

/// What the health LED should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIndicator {
    /// Preconditions not met yet; the LED keeps its boot level.
    Steady,
    /// Breathe with the given period.
    Breathe { period_ms: u32 },
}

/// What the caller must do once the reply to a command is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// Apply the staged address change.
    CommitIp,
    /// Restart the device.
    Restart,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    hostname: heapless::String<32>,
    bus_config: BusConfig,
    influx_config: InfluxConfig,
    battery: BatteryProfile,

    cache: SnapshotCache,
    publisher: Publisher,
    link: ConnectivityManager,

    web_msg: heapless::String<WEB_MSG_LEN>,
    breathing: bool,
    start_time: Option<heapless::String<20>>,
    charger_clock_set: bool,
    restart: Option<&'static str>,
}

impl AppService {
    /// Construct the service from configuration.
    pub fn new(config: &SystemConfig, hostname: &str) -> Self {
        Self {
            hostname: bounded(hostname),
            bus_config: config.bus.clone(),
            influx_config: config.influx.clone(),
            battery: config.battery,
            cache: SnapshotCache::new(),
            publisher: Publisher::new(&config.bus.topic_root),
            link: ConnectivityManager::new(config.link),
            web_msg: heapless::String::new(),
            breathing: true,
            start_time: None,
            charger_clock_set: false,
            restart: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started { version: VERSION });
        info!("AppService started, hostname {}", self.hostname);
    }

    /// Program the charger for the configured battery pack.
    pub fn apply_battery_profile(&mut self, charger: &mut impl ChargerPort) -> Result<(), TransportError> {
        let bat = self.battery.battery_params();
        charger
            .set_battery_params(&bat)
            .inspect_err(|e| error!("Charger: set battery parameters failed: {}", e))?;
        info!(
            "Charger: battery parameters set, bulk {} dV, max charge {} dA",
            bat.bulk_volt, bat.max_chg_curr
        );

        let pro = self.battery.protection_params();
        charger
            .set_protection_params(&pro)
            .inspect_err(|e| error!("Charger: set protection parameters failed: {}", e))?;
        info!("Charger: protection parameters set, load uvp {} dV", pro.load_uvp);
        Ok(())
    }

    /// Reason of a requested restart, if any.
    pub fn restart_requested(&self) -> Option<&'static str> {
        self.restart
    }

    // ── Polling ───────────────────────────────────────────────

    /// Walk the poll table once with this service as the delegate.
    pub fn run_polls<C, M, L, B, T>(
        &mut self,
        scheduler: &mut PollScheduler,
        now_ms: u32,
        devices: &mut Devices<'_, C, M>,
        sinks: &mut Sinks<'_, L, B, T>,
    ) where
        C: ChargerPort,
        M: BmsPort,
        L: EventSink,
        B: BusPort,
        T: TimeSeriesPort,
    {
        let mut step = PollStep {
            service: self,
            devices,
            sinks,
        };
        scheduler.tick(now_ms, &mut step);
    }

    /// One read of `category`, then change detection and fan-out.
    /// Read failures leave the cache untouched.
    pub fn poll<C, M, L, B, T>(
        &mut self,
        category: DataCategory,
        now_ms: u32,
        devices: &mut Devices<'_, C, M>,
        sinks: &mut Sinks<'_, L, B, T>,
    ) where
        C: ChargerPort,
        M: BmsPort,
        L: EventSink,
        B: BusPort,
        T: TimeSeriesPort,
    {
        let Some(read) = read_record(category, devices) else {
            return;
        };
        match read {
            Ok(record) => self.observe(record, now_ms, sinks),
            Err(error) => sinks.log.emit(&AppEvent::ReadFailed { category, error }),
        }
    }

    /// Change detection for a fresh record; publishes it if it is new.
    pub fn observe<L: EventSink, B: BusPort, T: TimeSeriesPort>(
        &mut self,
        record: Record,
        now_ms: u32,
        sinks: &mut Sinks<'_, L, B, T>,
    ) {
        let category = record.category();
        if let PublishDecision::Publish(previous) = self.cache.observe(record) {
            self.fan_out(category, previous.as_ref(), now_ms, sinks);
        }
    }

    fn fan_out<L: EventSink, B: BusPort, T: TimeSeriesPort>(
        &mut self,
        category: DataCategory,
        previous: Option<&Record>,
        now_ms: u32,
        sinks: &mut Sinks<'_, L, B, T>,
    ) {
        let Some(record) = self.cache.get(category) else {
            return;
        };
        let ctx = render_context(&self.cache, &self.hostname);
        self.publisher.publish(record, previous, &ctx, now_ms, sinks);
    }

    /// Whether a category has been read at least once.
    pub fn known(&self, category: DataCategory) -> bool {
        self.cache.has(category)
    }

    pub fn cached(&self, category: DataCategory) -> Option<&Record> {
        self.cache.get(category)
    }

    /// JSON of the cached value, or `None` while the category was never
    /// read.
    pub fn json_for(&self, category: DataCategory) -> Option<Rendered> {
        let record = self.cache.get(category)?;
        let ctx = render_context(&self.cache, &self.hostname);
        Some(render::render_json(record, &ctx))
    }

    // ── Time ──────────────────────────────────────────────────

    /// Track wall-clock validity.  The first valid reading fixes the
    /// start time and announces it; the charger clock is set once.
    /// Returns whether time is valid.
    pub fn check_time<B: BusPort>(
        &mut self,
        clock: Option<WallClock>,
        charger: &mut impl ChargerPort,
        bus: &mut B,
    ) -> bool {
        let Some(now) = clock else {
            return false;
        };

        if self.start_time.is_none() {
            let mut stamp = heapless::String::new();
            let _ = write!(stamp, "{}", now);
            info!("Time: got valid time at {}", stamp);
            if let Err(e) = self.publisher.publish_status(bus, "StartTime", &stamp, false) {
                warn!("Time: StartTime not published: {}", e);
            }
            self.start_time = Some(stamp);
        }

        if !self.charger_clock_set && self.cache.has(DataCategory::Information) {
            match charger.set_time(&now) {
                Ok(()) => {
                    self.charger_clock_set = true;
                    info!("Charger: time set");
                }
                Err(e) => warn!("Charger: set time failed: {}", e),
            }
        }
        true
    }

    pub fn time_valid(&self) -> bool {
        self.start_time.is_some()
    }

    // ── Bus ───────────────────────────────────────────────────

    /// Announce the device on each new bus session.
    pub fn service_bus<B: BusPort>(&mut self, bus: &mut B) {
        if !bus.session_started() {
            return;
        }
        let mut port: heapless::String<6> = heapless::String::new();
        let _ = write!(port, "{}", self.influx_config.port);

        let status: [(&str, &str, bool); 6] = [
            ("LWT", "Online", true),
            ("Hostname", self.hostname.as_str(), false),
            ("DBServer", self.influx_config.server.as_str(), false),
            ("DBPort", port.as_str(), false),
            ("DBName", self.influx_config.database.as_str(), false),
            ("Version", VERSION, false),
        ];
        let mut ok = true;
        for (name, value, retain) in status {
            ok &= self.publisher.publish_status(bus, name, value, retain).is_ok();
        }
        if let Some(start) = &self.start_time {
            ok &= self.publisher.publish_status(bus, "StartTime", start, false).is_ok();
        }

        let b = &self.bus_config;
        if ok {
            info!("Bus: connected to {}:{} using topic {}", b.broker_host, b.broker_port, b.topic_root);
        } else {
            error!("Bus: announcement to {}:{} incomplete", b.broker_host, b.broker_port);
        }
    }

    /// Dispatch one message received on the command topic.
    pub fn handle_bus_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        charger: &mut impl ChargerPort,
        sink: &mut impl EventSink,
    ) {
        let expected = self.publisher.command_topic();
        let command = (topic == expected.as_str()).then(|| BusCommand::parse(payload)).flatten();
        let text = core::str::from_utf8(payload).unwrap_or("<binary>");

        let Some(command) = command else {
            let mut msg: heapless::String<WEB_MSG_LEN> = heapless::String::new();
            let _ = write!(msg, "Ignore mqtt {}: '{}'", topic, text);
            sink.emit(&AppEvent::Warning(&msg));
            return;
        };
        info!("Bus: execute mqtt command '{}'", text);
        if let AppCommand::SetLoad(on) = AppCommand::from(command) {
            let msg = switch_load(charger, on);
            sink.emit(&AppEvent::Notice(msg));
        }
    }

    // ── Commands ──────────────────────────────────────────────

    /// Process an operator command.  The outcome is left in the status
    /// message for the next index page.
    pub fn handle_command<C: ChargerPort, M: BmsPort>(
        &mut self,
        cmd: AppCommand,
        devices: &mut Devices<'_, C, M>,
        active: &NetworkIdentity,
        sink: &mut impl EventSink,
    ) -> FollowUp {
        match cmd {
            AppCommand::SetLoad(on) => {
                let msg = match devices.charger.load() {
                    Ok(state) if state == on => load_text(Some(on)),
                    _ => switch_load(devices.charger, on),
                };
                self.set_message(format_args!("{}", msg));
            }
            AppCommand::ToggleLoad => {
                let msg = match devices.charger.load() {
                    Ok(state) => switch_load(devices.charger, !state),
                    Err(_) => load_text(None),
                };
                self.set_message(format_args!("{}", msg));
            }
            AppCommand::SetMosfets(mode) => {
                let msg = self.set_mosfets(devices.bms, mode);
                sink.emit(&AppEvent::Notice(msg));
                self.set_message(format_args!("{}", msg));
            }
            AppCommand::ChangeIp(text) => match netconfig::plan_ip_change(&text, active) {
                Ok(change) => {
                    self.set_message(format_args!("{}", change));
                    sink.emit(&AppEvent::Warning(&self.web_msg));
                    self.link.stage(change);
                }
                Err(e) => {
                    self.set_message(format_args!("{}", e));
                    let event = match e {
                        netconfig::IpChangeError::Unchanged(_) => AppEvent::Warning(&self.web_msg),
                        _ => AppEvent::Alert(&self.web_msg),
                    };
                    sink.emit(&event);
                }
            },
            AppCommand::ToggleBreathe => {
                self.breathing = !self.breathing;
                self.show_breathing();
            }
            AppCommand::Reset => {
                sink.emit(&AppEvent::Notice("RESET"));
                self.restart = Some("reset requested");
                return FollowUp::Restart;
            }
        }
        FollowUp::None
    }

    /// Put the breathing state into the status message.
    pub fn show_breathing(&mut self) {
        let text = if self.breathing {
            "breathing enabled"
        } else {
            "breathing disabled"
        };
        self.set_message(format_args!("{}", text));
    }

    pub fn breathing(&self) -> bool {
        self.breathing
    }

    pub fn set_message(&mut self, args: fmt::Arguments<'_>) {
        self.web_msg.clear();
        if self.web_msg.write_fmt(args).is_err() {
            warn!("Web: status message truncated");
        }
    }

    pub fn message(&self) -> &str {
        &self.web_msg
    }

    fn set_mosfets(&mut self, bms: &mut impl BmsPort, mode: MosfetMode) -> &'static str {
        let current = match self.cache.get(DataCategory::Status) {
            Some(Record::Status(s)) => s.mosfet_status,
            _ => 0,
        };
        if mode.bits() == current {
            return "Mosfet status unchanged";
        }
        if let Err(e) = bms.set_mosfets(mode) {
            error!("Bms: set mosfets failed: {}", e);
            return "Set mosfet status failed";
        }
        if let Some(Record::Status(s)) = self.cache.get_mut(DataCategory::Status) {
            s.mosfet_status = mode.bits();
        }
        match mode {
            MosfetMode::None => "Charge and discharge OFF",
            MosfetMode::Charge => "Charge ON and discharge OFF",
            MosfetMode::Discharge => "Charge OFF and discharge ON",
            MosfetMode::Both => "Charge and discharge ON",
        }
    }

    // ── Link ──────────────────────────────────────────────────

    /// One link supervision step; link reports are cached and fanned
    /// out like any other record.
    pub fn supervise_link<K: LinkPort, L: EventSink, B: BusPort, T: TimeSeriesPort>(
        &mut self,
        now_ms: u32,
        link: &mut K,
        sinks: &mut Sinks<'_, L, B, T>,
    ) -> LinkOutcome {
        let outcome = self.link.evaluate(now_ms, link);
        for report in &outcome.reports {
            self.cache.store(Record::Wifi(report.clone()));
            self.fan_out(DataCategory::Wifi, None, now_ms, sinks);
        }
        if outcome.restart {
            self.restart = Some("link lost");
        }
        outcome
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn ip_change_pending(&self) -> bool {
        self.link.pending().is_some()
    }

    /// Apply a staged address change.  Call after the acknowledging
    /// response has been flushed.
    pub fn commit_pending_ip(
        &mut self,
        link: &mut impl LinkPort,
        storage: &mut impl StoragePort,
    ) -> Option<Result<NetworkIdentity, LinkError>> {
        self.link.apply_pending(link, storage)
    }

    // ── Health ────────────────────────────────────────────────

    /// Health indicator for the LED driver.
    pub fn health(&self) -> HealthIndicator {
        let ready = self.cache.has(DataCategory::Information)
            && self.cache.has(DataCategory::Hardware)
            && self.time_valid()
            && self.breathing;
        if !ready {
            return HealthIndicator::Steady;
        }
        let faulty = self.charger_fault() != 0 || self.bms_fault() != 0;
        let period_ms = if faulty || !self.publisher.db_healthy() {
            BREATHE_ERR_MS
        } else {
            BREATHE_OK_MS
        };
        HealthIndicator::Breathe { period_ms }
    }

    fn charger_fault(&self) -> u16 {
        self.cache.get(DataCategory::ChgSts).and_then(Record::fault_word).unwrap_or(0)
    }

    fn bms_fault(&self) -> u16 {
        self.cache.get(DataCategory::Status).and_then(Record::fault_word).unwrap_or(0)
    }

    // ── Index page ────────────────────────────────────────────

    /// Plain-text status summary.  Shows the status message (or decoded
    /// faults when there is none) once, then clears it.
    pub fn index_page(&mut self, clock: Option<WallClock>, address: Ipv4Addr, now_ms: u32) -> RenderBuf<INDEX_LEN> {
        if self.web_msg.is_empty() {
            faults::describe(self.charger_fault(), self.bms_fault(), &mut self.web_msg);
        }

        let mut page = RenderBuf::<INDEX_LEN>::new();
        let _ = writeln!(page, "LiFePO Island v{} on {}", VERSION, self.hostname);

        if let Some(Record::Information(info)) = self.cache.get(DataCategory::Information) {
            let _ = writeln!(page, "Charger {} serial {}", info.model, info.serial);
        } else {
            let _ = writeln!(page, "Charger unknown");
        }
        let mosfets = match self.cache.get(DataCategory::Status) {
            Some(Record::Status(s)) => s.mosfets(),
            _ => MosfetMode::None,
        };
        match self.cache.get(DataCategory::Hardware) {
            Some(Record::Hardware(hw)) => {
                let _ = writeln!(
                    page,
                    "BMS {} charge {} discharge {}",
                    hw.id,
                    on_off(mosfets.charge()),
                    on_off(mosfets.discharge())
                );
            }
            _ => {
                let _ = writeln!(page, "BMS unknown");
            }
        }

        if !self.web_msg.is_empty() {
            let _ = writeln!(page, "\n{}\n", self.web_msg.trim_end());
        }

        let _ = writeln!(page, "Last start time    {}", self.start_time.as_deref().unwrap_or("-"));
        match clock {
            Some(c) => {
                let _ = writeln!(page, "Last web update    {}", c);
            }
            None => {
                let _ = writeln!(page, "Last web update    -");
            }
        }
        match self.publisher.last_post_ms() {
            Some(at) => {
                let _ = writeln!(page, "Last influx update {} s ago", now_ms.wrapping_sub(at) / 1000);
            }
            None => {
                let _ = writeln!(page, "Last influx update -");
            }
        }
        let _ = writeln!(page, "Influx status      {}", self.publisher.db_status());
        let (bssid, rssi) = self.link.last_seen();
        let _ = writeln!(page, "RSSI {} {}", mac_string(&bssid), rssi);
        let _ = writeln!(page, "IP                 {}", address);

        self.web_msg.clear();
        page
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn load_text(state: Option<bool>) -> &'static str {
    match state {
        Some(true) => "Load on",
        Some(false) => "Load off",
        None => "Load unknown",
    }
}

fn switch_load(charger: &mut impl ChargerPort, on: bool) -> &'static str {
    match charger.set_load(on) {
        Ok(()) => {
            info!("Charger: load switched {}", if on { "ON" } else { "OFF" });
            load_text(Some(on))
        }
        Err(e) => {
            error!("Charger: load switch failed: {}", e);
            load_text(None)
        }
    }
}

/// Rendering context from the identities currently in the cache.
fn render_context<'a>(cache: &'a SnapshotCache, hostname: &'a str) -> RenderContext<'a> {
    let serial = match cache.get(DataCategory::Information) {
        Some(Record::Information(i)) => i.serial.as_str(),
        _ => "",
    };
    let bms_id = match cache.get(DataCategory::Hardware) {
        Some(Record::Hardware(h)) => h.id.as_str(),
        _ => "",
    };
    let cell_count = match cache.get(DataCategory::Status) {
        Some(Record::Status(s)) => usize::from(s.cells),
        _ => 0,
    };
    RenderContext {
        version: VERSION,
        hostname,
        serial,
        bms_id,
        cell_count,
    }
}

/// One device read for a category.  `None` for categories that are not
/// polled.
fn read_record<C: ChargerPort, M: BmsPort>(
    category: DataCategory,
    devices: &mut Devices<'_, C, M>,
) -> Option<Result<Record, TransportError>> {
    let c = &mut *devices.charger;
    let b = &mut *devices.bms;
    Some(match category {
        DataCategory::Information => c.information().map(Record::Information),
        DataCategory::ChgSts => c.charge_status().map(Record::ChgSts),
        DataCategory::BatParam => c.battery_params().map(Record::BatParam),
        DataCategory::Log => c.event_log().map(Record::Log),
        DataCategory::Parameters => c.calibration().map(Record::Parameters),
        DataCategory::LoadParam => c.load_params().map(Record::LoadParam),
        DataCategory::ProParam => c.protection_params().map(Record::ProParam),
        DataCategory::Hardware => b.hardware().map(Record::Hardware),
        DataCategory::Status => b.status().map(Record::Status),
        DataCategory::Cells => b.cells().map(Record::Cells),
        DataCategory::Wifi => return None,
    })
}

/// Scheduler delegate binding the service to its devices and sinks for
/// one table walk.
struct PollStep<'a, 'd, 's, C, M, L, B, T> {
    service: &'a mut AppService,
    devices: &'a mut Devices<'d, C, M>,
    sinks: &'a mut Sinks<'s, L, B, T>,
}

impl<C, M, L, B, T> PollDelegate for PollStep<'_, '_, '_, C, M, L, B, T>
where
    C: ChargerPort,
    M: BmsPort,
    L: EventSink,
    B: BusPort,
    T: TimeSeriesPort,
{
    fn prerequisite_met(&self, category: DataCategory) -> bool {
        category.prerequisite().map_or(true, |p| self.service.known(p))
    }

    fn on_poll_due(&mut self, category: DataCategory, now_ms: u32) {
        self.service.poll(category, now_ms, self.devices, self.sinks);
    }
}
