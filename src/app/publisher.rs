//! Change-triggered fan-out of records to every sink.
//!
//! Fixed order per changed record: log, bus JSON topic, narrow status
//! topic, time-series line.  A failing sink is reported and skipped; it
//! never stops the others.

use core::fmt::Write;

use log::{debug, error};

use crate::error::SinkError;
use crate::telemetry::render::{self, RenderContext};
use crate::telemetry::{DataCategory, Record};

use super::events::{AppEvent, SinkKind};
use super::ports::{BusPort, EventSink, TimeSeriesPort};

/// Topic buffer capacity.
pub const TOPIC_LEN: usize = 64;

pub type Topic = heapless::String<TOPIC_LEN>;

/// Mutable handles to all outbound sinks for one fan-out.
pub struct Sinks<'s, L, B, T> {
    pub log: &'s mut L,
    pub bus: &'s mut B,
    pub db: &'s mut T,
}

impl<'s, L: EventSink, B: BusPort, T: TimeSeriesPort> Sinks<'s, L, B, T> {
    pub fn new(log: &'s mut L, bus: &'s mut B, db: &'s mut T) -> Self {
        Self { log, bus, db }
    }
}

/// Status of the last time-series write: an HTTP code, `-1` when the
/// server was unreachable, `0` before the first write.
pub type DbStatus = i32;

pub struct Publisher {
    topic_root: heapless::String<32>,
    db_status: DbStatus,
    /// Uptime of the last accepted time-series write.
    last_post_ms: Option<u32>,
}

impl Publisher {
    pub fn new(topic_root: &str) -> Self {
        let mut root = heapless::String::new();
        for ch in topic_root.chars() {
            if root.push(ch).is_err() {
                break;
            }
        }
        Self {
            topic_root: root,
            db_status: 0,
            last_post_ms: None,
        }
    }

    pub fn db_status(&self) -> DbStatus {
        self.db_status
    }

    /// Whether the last time-series write succeeded.
    pub fn db_healthy(&self) -> bool {
        (200..300).contains(&self.db_status)
    }

    pub fn last_post_ms(&self) -> Option<u32> {
        self.last_post_ms
    }

    /// `<root>/<kind>/<name>`
    pub fn topic(&self, kind: &str, name: &str) -> Topic {
        let mut t = Topic::new();
        if write!(t, "{}/{}/{}", self.topic_root, kind, name).is_err() {
            debug!("Publish: topic {}/{} truncated", kind, name);
        }
        t
    }

    /// Fan a changed record out to all sinks.
    ///
    /// `previous` is the value the record replaced, used for the narrow
    /// fault topics.
    pub fn publish<L: EventSink, B: BusPort, T: TimeSeriesPort>(
        &mut self,
        record: &Record,
        previous: Option<&Record>,
        ctx: &RenderContext<'_>,
        now_ms: u32,
        sinks: &mut Sinks<'_, L, B, T>,
    ) {
        let category = record.category();

        // 1. log
        let json = render::render_json(record, ctx);
        if json.truncated() {
            error!("Publish: {} json truncated", category);
        }
        sinks.log.emit(&AppEvent::Snapshot {
            category,
            json: json.as_str(),
            truncated: json.truncated(),
        });

        // 2. bus json
        let topic = self.topic("json", category.name());
        self.bus_send(sinks, category, &topic, json.as_bytes(), false);

        // 3. narrow status
        if let Some((name, payload)) = narrow_change(record, previous) {
            let topic = self.topic("status", name);
            self.bus_send(sinks, category, &topic, payload.as_bytes(), false);
        }

        // 4. time series
        let line = render::render_line(record, ctx);
        if line.truncated() {
            error!("Publish: {} line truncated", category);
        }
        self.post_line(line.as_str(), category, now_ms, sinks);
    }

    /// `<root>/cmd`, the only subscribed topic.
    pub fn command_topic(&self) -> Topic {
        let mut t = Topic::new();
        let _ = write!(t, "{}/cmd", self.topic_root);
        t
    }

    /// Publish one `<root>/status/<name>` value.
    pub fn publish_status<B: BusPort>(&self, bus: &mut B, name: &str, value: &str, retain: bool) -> Result<(), SinkError> {
        if !bus.is_connected() {
            return Err(SinkError::Offline);
        }
        bus.publish(&self.topic("status", name), value.as_bytes(), retain)
    }

    fn bus_send<L: EventSink, B: BusPort, T: TimeSeriesPort>(
        &self,
        sinks: &mut Sinks<'_, L, B, T>,
        category: DataCategory,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) {
        if !sinks.bus.is_connected() {
            debug!("Publish: bus offline, dropped {}", topic);
            return;
        }
        if let Err(error) = sinks.bus.publish(topic, payload, retain) {
            sinks.log.emit(&AppEvent::SinkFailed {
                sink: SinkKind::Bus,
                category,
                error,
            });
        }
    }

    fn post_line<L: EventSink, B: BusPort, T: TimeSeriesPort>(
        &mut self,
        line: &str,
        category: DataCategory,
        now_ms: u32,
        sinks: &mut Sinks<'_, L, B, T>,
    ) {
        let status = match sinks.db.write_line(line) {
            Ok(code) => DbStatus::from(code),
            Err(error) => {
                sinks.log.emit(&AppEvent::SinkFailed {
                    sink: SinkKind::TimeSeries,
                    category,
                    error,
                });
                -1
            }
        };

        if status != self.db_status {
            self.db_status = status;
            let mut code: heapless::String<8> = heapless::String::new();
            let _ = write!(code, "{}", status);
            let topic = self.topic("status", "DBResponse");
            self.bus_send(sinks, category, &topic, code.as_bytes(), false);
        }

        if self.db_healthy() {
            self.last_post_ms = Some(now_ms);
        } else if status > 0 {
            sinks.log.emit(&AppEvent::DbRejected { status, line });
        }
    }
}

/// Narrow status topic and payload when the record's fault word moved.
/// A category seen for the first time compares against "no fault".
fn narrow_change(record: &Record, previous: Option<&Record>) -> Option<(&'static str, heapless::String<16>)> {
    let name = match record.category() {
        DataCategory::ChgSts => "Charger",
        DataCategory::Status => "BMS",
        _ => return None,
    };
    let fault = record.fault_word()?;
    let before = previous.and_then(Record::fault_word).unwrap_or(0);
    (fault != before).then(|| (name, render::narrow_status(record.category(), fault)))
}
