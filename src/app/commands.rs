//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (HTTP form
//! posts, MQTT command topic) that the
//! [`AppService`](super::service::AppService) interprets and acts upon.

use crate::telemetry::records::MosfetMode;

/// Longest IP text accepted from a form.
pub const IP_TEXT_LEN: usize = 32;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Switch the charger load output.
    SetLoad(bool),

    /// Read the load state and invert it.
    ToggleLoad,

    /// Set the BMS charge/discharge mosfets.
    SetMosfets(MosfetMode),

    /// Change the station address (`0.0.0.0` = DHCP).
    ChangeIp(heapless::String<IP_TEXT_LEN>),

    /// Toggle the health LED breathing animation.
    ToggleBreathe,

    /// Restart the device after the response went out.
    Reset,
}

/// Commands accepted on the bus command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCommand {
    LoadOn,
    LoadOff,
}

const BUS_COMMANDS: [(&str, BusCommand); 2] = [
    ("load on", BusCommand::LoadOn),
    ("load off", BusCommand::LoadOff),
];

impl BusCommand {
    /// Exact, case-insensitive match of the whole payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        BUS_COMMANDS
            .iter()
            .find(|(text, _)| payload.eq_ignore_ascii_case(text.as_bytes()))
            .map(|(_, cmd)| *cmd)
    }
}

impl From<BusCommand> for AppCommand {
    fn from(cmd: BusCommand) -> Self {
        match cmd {
            BusCommand::LoadOn => Self::SetLoad(true),
            BusCommand::LoadOff => Self::SetLoad(false),
        }
    }
}
