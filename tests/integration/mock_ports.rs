//! Mock sink and storage adapters for integration tests.
//!
//! Each mock records every call so tests can assert on the full fan-out
//! history without a broker, a database or flash.  The device proxies
//! come from the crate's own simulation adapters.

use core::net::Ipv4Addr;
use std::collections::HashMap;

use lifepo_island::adapters::devices::{SimBms, SimCharger};
use lifepo_island::app::commands::AppCommand;
use lifepo_island::app::connectivity::LinkOutcome;
use lifepo_island::app::events::{AppEvent, SinkKind};
use lifepo_island::app::ports::{
    BusPort, EventSink, LinkPort, StorageError, StoragePort, TimeSeriesPort, WallClock,
};
use lifepo_island::app::publisher::Sinks;
use lifepo_island::app::service::{AppService, Devices, FollowUp};
use lifepo_island::config::SystemConfig;
use lifepo_island::error::SinkError;
use lifepo_island::netconfig::NetworkIdentity;
use lifepo_island::scheduler::PollScheduler;
use lifepo_island::telemetry::DataCategory;
use lifepo_island::web::{self, HttpRequest, HttpResponse, Method, PageContext};

// ── Event record ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Logged {
    Snapshot(DataCategory),
    ReadFailed(DataCategory),
    SinkFailed(SinkKind, DataCategory),
    DbRejected(i32),
    Notice(String),
    Warning(String),
    Alert(String),
    Started,
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<Logged>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self, category: DataCategory) -> usize {
        self.events
            .iter()
            .filter(|e| **e == Logged::Snapshot(category))
            .count()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Logged::Notice(t) | Logged::Warning(t) | Logged::Alert(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent<'_>) {
        let logged = match event {
            AppEvent::Snapshot { category, .. } => Logged::Snapshot(*category),
            AppEvent::ReadFailed { category, .. } => Logged::ReadFailed(*category),
            AppEvent::SinkFailed { sink, category, .. } => Logged::SinkFailed(*sink, *category),
            AppEvent::DbRejected { status, .. } => Logged::DbRejected(*status),
            AppEvent::Notice(t) => Logged::Notice((*t).to_owned()),
            AppEvent::Warning(t) => Logged::Warning((*t).to_owned()),
            AppEvent::Alert(t) => Logged::Alert((*t).to_owned()),
            AppEvent::Started { .. } => Logged::Started,
        };
        self.events.push(logged);
    }
}

// ── MockBus ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

pub struct MockBus {
    pub connected: bool,
    pub new_session: bool,
    pub fail: Option<SinkError>,
    pub published: Vec<Published>,
}

#[allow(dead_code)]
impl MockBus {
    /// Connected, with a fresh session waiting to be announced.
    pub fn new() -> Self {
        Self {
            connected: true,
            new_session: true,
            fail: None,
            published: Vec::new(),
        }
    }

    pub fn count(&self, topic: &str) -> usize {
        self.published.iter().filter(|p| p.topic == topic).count()
    }

    pub fn last(&self, topic: &str) -> Option<&Published> {
        self.published.iter().rev().find(|p| p.topic == topic)
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPort for MockBus {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn session_started(&mut self) -> bool {
        std::mem::take(&mut self.new_session)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SinkError> {
        if let Some(e) = self.fail {
            return Err(e);
        }
        self.published.push(Published {
            topic: topic.to_owned(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            retain,
        });
        Ok(())
    }
}

// ── MockDb ────────────────────────────────────────────────────

pub struct MockDb {
    pub status: Result<u16, SinkError>,
    pub lines: Vec<String>,
}

#[allow(dead_code)]
impl MockDb {
    pub fn new() -> Self {
        Self {
            status: Ok(204),
            lines: Vec::new(),
        }
    }

    pub fn lines_for(&self, measurement: &str) -> Vec<&str> {
        let prefix = format!("{},", measurement);
        self.lines
            .iter()
            .filter(|l| l.starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }
}

impl Default for MockDb {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSeriesPort for MockDb {
    fn write_line(&mut self, line: &str) -> Result<u16, SinkError> {
        self.lines.push(line.to_owned());
        self.status
    }
}

// ── MockStorage ───────────────────────────────────────────────

#[derive(Default)]
pub struct MockStorage {
    pub data: HashMap<(String, String), Vec<u8>>,
    pub writes: u32,
}

#[allow(dead_code)]
impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.data
            .get(&(namespace.to_owned(), key.to_owned()))
            .map(Vec::as_slice)
    }
}

impl StoragePort for MockStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let value = self.raw(namespace, key).ok_or(StorageError::NotFound)?;
        if value.len() > buf.len() {
            return Err(StorageError::TooLarge);
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.writes += 1;
        self.data
            .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.data.remove(&(namespace.to_owned(), key.to_owned()));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.raw(namespace, key).is_some()
    }
}

// ── Config helpers ────────────────────────────────────────────

#[allow(dead_code)]
pub fn test_config() -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.link.attempt_ceiling = 3;
    cfg.link.retry_interval_ms = 1_000;
    cfg
}

// ── Rig: service wired to simulated devices and mock sinks ────

/// 2024-02-29T12:34:56Z
pub const SYNCED_EPOCH: u64 = 1_709_210_096;

pub struct Rig {
    pub service: AppService,
    pub scheduler: PollScheduler,
    pub charger: SimCharger,
    pub bms: SimBms,
    pub log: RecordingSink,
    pub bus: MockBus,
    pub db: MockDb,
    pub identity: NetworkIdentity,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(&test_config())
    }

    pub fn with_config(config: &SystemConfig) -> Self {
        let mut log = RecordingSink::new();
        let mut service = AppService::new(config, "island");
        service.start(&mut log);
        Self {
            service,
            scheduler: PollScheduler::new(),
            charger: SimCharger::new("SN1234"),
            bms: SimBms::new("JBD-SP04S034", 4),
            log,
            bus: MockBus::new(),
            db: MockDb::new(),
            identity: NetworkIdentity {
                address: Ipv4Addr::new(192, 168, 1, 100),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
                subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
                dns0: Ipv4Addr::new(192, 168, 1, 1),
                dns1: Ipv4Addr::UNSPECIFIED,
            },
        }
    }

    /// Tick the scheduler every 5 ms over `from..=to`.
    pub fn run(&mut self, from: u32, to: u32) {
        for now in (from..=to).step_by(5) {
            let mut devices = Devices::new(&mut self.charger, &mut self.bms);
            let mut sinks = Sinks::new(&mut self.log, &mut self.bus, &mut self.db);
            self.service.run_polls(&mut self.scheduler, now, &mut devices, &mut sinks);
        }
    }

    pub fn sync_time(&mut self) -> bool {
        let clock = WallClock::from_epoch(SYNCED_EPOCH);
        self.service.check_time(clock, &mut self.charger, &mut self.bus)
    }

    pub fn command(&mut self, cmd: AppCommand) -> FollowUp {
        let mut devices = Devices::new(&mut self.charger, &mut self.bms);
        self.service.handle_command(cmd, &mut devices, &self.identity, &mut self.log)
    }

    pub fn supervise(&mut self, now_ms: u32, link: &mut impl LinkPort) -> LinkOutcome {
        let mut sinks = Sinks::new(&mut self.log, &mut self.bus, &mut self.db);
        self.service.supervise_link(now_ms, link, &mut sinks)
    }

    pub fn request(&mut self, method: Method, path: &str, form: &str) -> (HttpResponse, FollowUp) {
        let page = PageContext {
            clock: WallClock::from_epoch(SYNCED_EPOCH),
            identity: self.identity,
            now_ms: 0,
        };
        let mut devices = Devices::new(&mut self.charger, &mut self.bms);
        web::dispatch(
            &HttpRequest::new(method, path, form),
            &mut self.service,
            &mut devices,
            &page,
            &mut self.log,
        )
    }
}
