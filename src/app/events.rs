//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  The log sink adapter
//! decides the severity and whether informational lines are still
//! wanted.

use crate::error::{SinkError, TransportError};
use crate::telemetry::DataCategory;

/// Which downstream sink an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Bus,
    TimeSeries,
}

impl core::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => write!(f, "mqtt"),
            Self::TimeSeries => write!(f, "influx"),
        }
    }
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent<'a> {
    /// A changed record, rendered as JSON.
    Snapshot {
        category: DataCategory,
        json: &'a str,
        truncated: bool,
    },

    /// A device read failed; the cache was left untouched.
    ReadFailed {
        category: DataCategory,
        error: TransportError,
    },

    /// A sink refused a message.
    SinkFailed {
        sink: SinkKind,
        category: DataCategory,
        error: SinkError,
    },

    /// The time-series database answered with a non-2xx status.
    DbRejected { status: i32, line: &'a str },

    /// Operator-relevant state change (load switched, IP changed, ...).
    Notice(&'a str),

    /// Something was refused or ignored.
    Warning(&'a str),

    /// A failed action.
    Alert(&'a str),

    /// The application service has started.
    Started { version: &'a str },
}
