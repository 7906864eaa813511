//! Last-known-value table, one slot per [`DataCategory`].

use crate::telemetry::{DataCategory, Record};

/// Outcome of [`SnapshotCache::observe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDecision {
    /// The record is new; the previous value (if any) is returned so
    /// callers can derive narrow change signals from it.
    Publish(Option<Record>),
    /// Nothing changed under the category's comparison rule.
    Suppress,
}

/// Keyed snapshot table.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    slots: [Option<Record>; DataCategory::COUNT],
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares a fresh read against the cached value and overwrites the
    /// slot when it changed.  The first value of a category always
    /// publishes.
    pub fn observe(&mut self, fresh: Record) -> PublishDecision {
        let slot = &mut self.slots[fresh.category().index()];
        if slot.as_ref().is_some_and(|cached| fresh.same_as(cached)) {
            return PublishDecision::Suppress;
        }
        PublishDecision::Publish(slot.replace(fresh))
    }

    /// Overwrites a slot without change detection.
    pub fn store(&mut self, record: Record) {
        let i = record.category().index();
        self.slots[i] = Some(record);
    }

    pub fn get(&self, category: DataCategory) -> Option<&Record> {
        self.slots[category.index()].as_ref()
    }

    pub fn get_mut(&mut self, category: DataCategory) -> Option<&mut Record> {
        self.slots[category.index()].as_mut()
    }

    /// Whether the category has ever been read.
    pub fn has(&self, category: DataCategory) -> bool {
        self.slots[category.index()].is_some()
    }
}
