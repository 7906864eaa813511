//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production) and, when one is
//! attached, to a remote [`SyslogSink`].  Changed records are logged at
//! info level only during the first minutes of uptime; after that a
//! single notice announces the switch and only notices, warnings and
//! errors continue on both outputs.

use log::{error, info, warn};

use super::syslog::{Severity, SyslogSink};
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

const QUIET_NOTICE: &str = "informational telemetry off, warnings and errors only";

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink {
    window_ms: u32,
    uptime_ms: u32,
    quiet: bool,
    remote: Option<SyslogSink>,
}

impl LogEventSink {
    pub fn new(window_ms: u32) -> Self {
        Self {
            window_ms,
            uptime_ms: 0,
            quiet: false,
            remote: None,
        }
    }

    /// Mirror everything that passes the info window to `remote`.
    pub fn with_remote(mut self, remote: SyslogSink) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn remote(&self) -> Option<&SyslogSink> {
        self.remote.as_ref()
    }

    /// Advance the sink's notion of uptime.  Called once per main-loop
    /// iteration.
    pub fn set_uptime(&mut self, now_ms: u32) {
        self.uptime_ms = now_ms;
        if !self.quiet && now_ms > self.window_ms {
            self.quiet = true;
            info!("LOG | {}", QUIET_NOTICE);
            if let Some(remote) = &mut self.remote {
                remote.send(Severity::Notice, format_args!("{}", QUIET_NOTICE));
            }
        }
    }

    /// Whether informational record lines are still logged.
    pub fn verbose(&self) -> bool {
        !self.quiet
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent<'_>) {
        if Severity::of(event) == Severity::Info && !self.verbose() {
            return;
        }
        match event {
            AppEvent::Snapshot {
                category,
                json,
                truncated,
            } => {
                if *truncated {
                    warn!("DATA | {} (truncated) {}", category, json);
                } else {
                    info!("DATA | {} {}", category, json);
                }
            }
            AppEvent::ReadFailed { category, error } => {
                warn!("READ | {} failed: {}", category, error);
            }
            AppEvent::SinkFailed {
                sink,
                category,
                error,
            } => {
                error!("SINK | {} {} failed: {}", sink, category, error);
            }
            AppEvent::DbRejected { status, line } => {
                error!("SINK | influx status {} for '{}'", status, line);
            }
            AppEvent::Notice(text) => info!("NOTE | {}", text),
            AppEvent::Warning(text) => warn!("WARN | {}", text),
            AppEvent::Alert(text) => error!("FAIL | {}", text),
            AppEvent::Started { version } => {
                info!("START | version={}", version);
            }
        }
        if let Some(remote) = &mut self.remote {
            remote.emit(event);
        }
    }
}
