//! Remote syslog sink.
//!
//! Every [`AppEvent`] leaves as one RFC 5424 datagram:
//!
//! ```text
//! <PRI>1 - HOSTNAME APP-NAME - - - MSG
//! ```
//!
//! `PRI` is facility user (1) × 8 + severity.  The timestamp is left to
//! the collector.  Delivery is best effort: a failed send is dropped.

use core::fmt::{self, Display, Write};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use log::{debug, info};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::config::SyslogConfig;
use crate::telemetry::render::Rendered;

const FACILITY_USER: u8 = 1;

/// RFC 5424 severities used by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
}

impl Severity {
    pub fn of(event: &AppEvent<'_>) -> Self {
        match event {
            AppEvent::Snapshot { truncated: true, .. } | AppEvent::Warning(_) => Self::Warning,
            AppEvent::Snapshot { .. } => Self::Info,
            AppEvent::ReadFailed { .. }
            | AppEvent::SinkFailed { .. }
            | AppEvent::DbRejected { .. }
            | AppEvent::Alert(_) => Self::Error,
            AppEvent::Notice(_) | AppEvent::Started { .. } => Self::Notice,
        }
    }
}

/// Message text of an event.
pub struct EventText<'a>(pub &'a AppEvent<'a>);

impl Display for EventText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            AppEvent::Snapshot { category, json, .. } => write!(f, "{} {}", category, json),
            AppEvent::ReadFailed { category, error } => write!(f, "{} read failed: {}", category, error),
            AppEvent::SinkFailed {
                sink,
                category,
                error,
            } => write!(f, "{} {} failed: {}", sink, category, error),
            AppEvent::DbRejected { status, line } => write!(f, "influx status {} for '{}'", status, line),
            AppEvent::Notice(text) | AppEvent::Warning(text) | AppEvent::Alert(text) => f.write_str(text),
            AppEvent::Started { version } => write!(f, "started version {}", version),
        }
    }
}

/// One datagram.  Overlong text is cut at a character boundary.
pub fn format_message(severity: Severity, hostname: &str, app_name: &str, text: fmt::Arguments<'_>) -> Rendered {
    let mut out = Rendered::new();
    let pri = FACILITY_USER * 8 + severity as u8;
    let _ = write!(out, "<{}>1 - {} {} - - - ", pri, hostname, app_name);
    let _ = out.write_fmt(text);
    out
}

pub struct SyslogSink {
    socket: UdpSocket,
    target: SocketAddr,
    hostname: heapless::String<32>,
    app_name: heapless::String<16>,
    sent: u32,
}

impl SyslogSink {
    /// Resolve the collector and open the socket.  `Ok(None)` when remote
    /// logging is disabled.
    pub fn connect(config: &SyslogConfig, hostname: &str) -> io::Result<Option<Self>> {
        if config.server.is_empty() {
            return Ok(None);
        }
        let target = (config.server.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "syslog server has no address"))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        let mut name = heapless::String::new();
        for ch in hostname.chars() {
            if name.push(ch).is_err() {
                break;
            }
        }
        info!("Syslog: sending to {} as {}", target, config.app_name);
        Ok(Some(Self {
            socket,
            target,
            hostname: name,
            app_name: config.app_name.clone(),
            sent: 0,
        }))
    }

    /// Datagrams handed to the network stack so far.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn send(&mut self, severity: Severity, text: fmt::Arguments<'_>) {
        let msg = format_message(severity, &self.hostname, &self.app_name, text);
        match self.socket.send_to(msg.as_bytes(), self.target) {
            Ok(_) => self.sent += 1,
            Err(e) => debug!("Syslog: send to {} failed: {}", self.target, e),
        }
    }
}

impl EventSink for SyslogSink {
    fn emit(&mut self, event: &AppEvent<'_>) {
        self.send(Severity::of(event), format_args!("{}", EventText(event)));
    }
}
