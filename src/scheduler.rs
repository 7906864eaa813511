//! Poll scheduler for the RS485 devices.
//!
//! A fixed table of (category, interval, phase offset) slots is walked
//! once per main-loop iteration.  The scheduler notifies a
//! [`PollDelegate`] when a slot falls due; the delegate performs the
//! actual device read, so the scheduler itself knows nothing about
//! transports, caches or sinks.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │   ms 0    25   50   100  150  200  250  300  350  400  500   │
//! │   │Info │Hw  │Chg │Bat │Log │Par │Load│Pro │Sts │Cell│Chg   │
//! │   ▼     ▼    ▼    ▼    ▼    ▼    ▼    ▼    ▼    ▼    ▼      │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                PollDelegate.on_poll_due()              │  │
//! │  │          (one read on the shared transport)            │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every interval is a multiple of 500 ms and every offset is distinct
//! modulo 500 ms, so no two slots are ever due in the same millisecond
//! and at most one read is ever in flight.

use log::debug;

use crate::app::ports::PollDelegate;
use crate::telemetry::DataCategory;

// ═══════════════════════════════════════════════════════════════
//  Poll table
// ═══════════════════════════════════════════════════════════════

/// Static description of one poll slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub category: DataCategory,
    pub interval_ms: u32,
    pub offset_ms: u32,
}

const fn spec(category: DataCategory, interval_ms: u32, offset_ms: u32) -> PollSpec {
    PollSpec {
        category,
        interval_ms,
        offset_ms,
    }
}

/// Number of polled categories (`Wifi` is fed by the link, not polled).
pub const POLL_SLOTS: usize = 10;

/// Default cadence.  Identity categories come first so their
/// dependents can be polled in the same cycle.
pub const POLL_TABLE: [PollSpec; POLL_SLOTS] = [
    spec(DataCategory::Information, 60_000, 0),
    spec(DataCategory::Hardware, 60_000, 25),
    spec(DataCategory::ChgSts, 500, 50),
    spec(DataCategory::BatParam, 10_000, 100),
    spec(DataCategory::Log, 10_000, 150),
    spec(DataCategory::Parameters, 10_000, 200),
    spec(DataCategory::LoadParam, 10_000, 250),
    spec(DataCategory::ProParam, 10_000, 300),
    spec(DataCategory::Status, 6_000, 350),
    spec(DataCategory::Cells, 6_000, 400),
];

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct PollSlot {
    spec: PollSpec,
    /// Uptime of the last due point (wrapping).
    last_ms: u32,
}

impl PollSlot {
    fn new(spec: PollSpec, start_ms: u32) -> Self {
        Self {
            spec,
            // First due exactly at the phase offset.
            last_ms: start_ms
                .wrapping_add(spec.offset_ms)
                .wrapping_sub(spec.interval_ms),
        }
    }

    fn remaining(&self, now_ms: u32) -> u32 {
        self.spec.interval_ms.saturating_sub(now_ms.wrapping_sub(self.last_ms))
    }
}

/// The poll scheduler.
pub struct PollScheduler {
    slots: heapless::Vec<PollSlot, POLL_SLOTS>,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    /// Scheduler over [`POLL_TABLE`], phases counted from uptime 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Scheduler over [`POLL_TABLE`], phases counted from `start_ms`.
    pub fn starting_at(start_ms: u32) -> Self {
        Self::with_table_at(&POLL_TABLE, start_ms)
    }

    /// Scheduler over a custom table, phases counted from uptime 0.
    pub fn with_table(table: &[PollSpec]) -> Self {
        Self::with_table_at(table, 0)
    }

    /// Scheduler over a custom table (at most [`POLL_SLOTS`] entries, the
    /// rest is ignored).  Zero intervals are treated as 1 ms.
    pub fn with_table_at(table: &[PollSpec], start_ms: u32) -> Self {
        let slots = table
            .iter()
            .take(POLL_SLOTS)
            .map(|s| {
                let spec = PollSpec {
                    interval_ms: s.interval_ms.max(1),
                    ..*s
                };
                PollSlot::new(spec, start_ms)
            })
            .collect();
        Self { slots }
    }

    /// Walk the table once.  Call once per main-loop iteration.
    ///
    /// A due slot advances its anchor by exactly one interval, never to
    /// `now_ms`, so late ticks do not drift the cadence.  After a stall
    /// the backlog drains one poll per tick.  A due slot whose
    /// prerequisite is still unknown is skipped without polling.  The
    /// anchor is never reset by a failed read.
    pub fn tick(&mut self, now_ms: u32, delegate: &mut dyn PollDelegate) {
        for slot in &mut self.slots {
            let interval = slot.spec.interval_ms;
            if now_ms.wrapping_sub(slot.last_ms) < interval {
                continue;
            }
            slot.last_ms = slot.last_ms.wrapping_add(interval);

            let category = slot.spec.category;
            if !delegate.prerequisite_met(category) {
                debug!("Poll: {} skipped, prerequisite unknown", category);
                continue;
            }
            delegate.on_poll_due(category, now_ms);
        }
    }

    /// Uptime at which the next slot falls due (`now_ms` if one is
    /// already overdue).
    pub fn next_due(&self, now_ms: u32) -> u32 {
        let wait = self.slots.iter().map(|s| s.remaining(now_ms)).min().unwrap_or(0);
        now_ms.wrapping_add(wait)
    }

    /// Milliseconds until the next slot falls due.
    pub fn time_to_next(&self, now_ms: u32) -> u32 {
        self.next_due(now_ms).wrapping_sub(now_ms)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
