//! Telemetry data model: categories, typed records and their renderings.

pub mod faults;
pub mod records;
pub mod render;

use records::{
    BatteryParams, BmsStatus, Calibration, Cells, ChargeStatus, EventLog, Hardware, Information,
    LinkReport, LoadParams, ProtectionParams,
};

/// One class of device state with its own poll cadence and cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCategory {
    // charger
    Information,
    ChgSts,
    BatParam,
    Log,
    Parameters,
    LoadParam,
    ProParam,
    // bms
    Hardware,
    Status,
    Cells,
    // station link
    Wifi,
}

impl DataCategory {
    pub const COUNT: usize = 11;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Information,
        Self::ChgSts,
        Self::BatParam,
        Self::Log,
        Self::Parameters,
        Self::LoadParam,
        Self::ProParam,
        Self::Hardware,
        Self::Status,
        Self::Cells,
        Self::Wifi,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name used in topics, URLs and line-protocol measurements.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Information => "Information",
            Self::ChgSts => "ChgSts",
            Self::BatParam => "BatParam",
            Self::Log => "Log",
            Self::Parameters => "Parameters",
            Self::LoadParam => "LoadParam",
            Self::ProParam => "ProParam",
            Self::Hardware => "Hardware",
            Self::Status => "Status",
            Self::Cells => "Cells",
            Self::Wifi => "Wifi",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub const fn is_charger(self) -> bool {
        matches!(
            self,
            Self::Information
                | Self::ChgSts
                | Self::BatParam
                | Self::Log
                | Self::Parameters
                | Self::LoadParam
                | Self::ProParam
        )
    }

    pub const fn is_bms(self) -> bool {
        matches!(self, Self::Hardware | Self::Status | Self::Cells)
    }

    /// The identity category that must have been read before this one
    /// is polled.
    pub const fn prerequisite(self) -> Option<Self> {
        match self {
            Self::Information | Self::Hardware | Self::Wifi => None,
            Self::Status | Self::Cells => Some(Self::Hardware),
            _ => Some(Self::Information),
        }
    }
}

impl core::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A successfully read snapshot of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Information(Information),
    ChgSts(ChargeStatus),
    BatParam(BatteryParams),
    Log(EventLog),
    Parameters(Calibration),
    LoadParam(LoadParams),
    ProParam(ProtectionParams),
    Hardware(Hardware),
    Status(BmsStatus),
    Cells(Cells),
    Wifi(LinkReport),
}

impl Record {
    pub const fn category(&self) -> DataCategory {
        match self {
            Self::Information(_) => DataCategory::Information,
            Self::ChgSts(_) => DataCategory::ChgSts,
            Self::BatParam(_) => DataCategory::BatParam,
            Self::Log(_) => DataCategory::Log,
            Self::Parameters(_) => DataCategory::Parameters,
            Self::LoadParam(_) => DataCategory::LoadParam,
            Self::ProParam(_) => DataCategory::ProParam,
            Self::Hardware(_) => DataCategory::Hardware,
            Self::Status(_) => DataCategory::Status,
            Self::Cells(_) => DataCategory::Cells,
            Self::Wifi(_) => DataCategory::Wifi,
        }
    }

    /// Change rule: `true` when publishing `self` after `other` would
    /// tell subscribers nothing new.
    ///
    /// Identity records compare by their key, the event log ignores its
    /// run-time counter, everything else compares in full.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Information(a), Self::Information(b)) => a.serial == b.serial,
            (Self::Hardware(a), Self::Hardware(b)) => a.id == b.id,
            (Self::Log(a), Self::Log(b)) => a.same_counters(b),
            _ => self == other,
        }
    }

    /// Raw fault word carried by the record, if it has one.
    pub fn fault_word(&self) -> Option<u16> {
        match self {
            Self::ChgSts(s) => Some(s.fault),
            Self::Status(s) => Some(s.fault),
            _ => None,
        }
    }
}
