//! Unified error types for the LiFePO Island firmware.
//!
//! One `Error` enum that every subsystem converts into, keeping startup
//! and the main loop's error handling uniform.  Port-level errors are
//! `Copy` so they can be logged and compared without allocation.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An RS485 device read or write failed.
    Transport(TransportError),
    /// A telemetry sink refused or could not take a message.
    Sink(SinkError),
    /// The network link could not be (re)configured.
    Link(LinkError),
    /// Non-volatile storage failed.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral or service initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Sink(e) => write!(f, "sink: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors (device proxies)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No answer within the proxy's read timeout.
    Timeout,
    /// A frame arrived but failed its checksum.
    Checksum,
    /// The device answered with an error code.
    Rejected,
    /// The answer could not be decoded into the expected record.
    Malformed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "read timed out"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::Rejected => write!(f, "device rejected request"),
            Self::Malformed => write!(f, "malformed response"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Sink errors (bus, time-series, log)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The sink is not connected; the message was dropped.
    Offline,
    /// The sink could not be reached at all.
    Unreachable,
    /// The outgoing message was larger than the sink accepts.
    TooLarge,
    /// Generic I/O error from the underlying client.
    Io,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::TooLarge => write!(f, "message too large"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors (wifi station / netif)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The station could not join the access point.
    JoinFailed,
    /// The network interface refused the address configuration.
    ConfigRejected,
    /// The address configuration is not expressible (e.g. bad mask).
    InvalidConfig,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JoinFailed => write!(f, "join failed"),
            Self::ConfigRejected => write!(f, "netif rejected address configuration"),
            Self::InvalidConfig => write!(f, "invalid address configuration"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
