//! Banner rotation within a placement slot
//!
//! Callers pass the list produced by [`crate::schedule::eligible_units`], so
//! every unit here is already active and in rotation order.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::models::AdvertisingUnit;
use crate::ticker::{spawn_repeating, TaskHandle};

/// Unit chosen for display and its position in the list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<'a> {
    pub unit: &'a AdvertisingUnit,
    pub index: usize,
}

/// Index that follows `current` in a list of `len` units. An out-of-range
/// `current` is reduced modulo `len` first.
pub fn next_index(len: usize, current: usize) -> Option<usize> {
    match len {
        0 => None,
        1 => Some(0),
        _ => Some((current % len + 1) % len),
    }
}

/// Advance the rotation by one tick. An empty list selects nothing and a
/// single unit is always returned without advancing.
pub fn select_next(units: &[AdvertisingUnit], current_index: usize) -> Option<Selection<'_>> {
    let index = next_index(units.len(), current_index)?;
    Some(Selection {
        unit: &units[index],
        index,
    })
}

/// Rotation state for one placement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rotator {
    index: usize,
    len: usize,
}

impl Rotator {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Record the current list length, clamping an index left over from a
    /// longer list.
    pub fn sync(&mut self, len: usize) {
        self.len = len;
        if len == 0 || self.index >= len {
            self.index = 0;
        }
    }

    pub fn tick(&mut self) {
        self.index = next_index(self.len, self.index).unwrap_or(0);
    }

    /// Manual selection. Shows `index` until the next tick, which continues
    /// from there. Out-of-range indexes are ignored.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.index = index;
        true
    }

    pub fn current<'a>(&self, units: &'a [AdvertisingUnit]) -> Option<Selection<'a>> {
        if units.is_empty() {
            return None;
        }
        let index = self.index % units.len();
        Some(Selection {
            unit: &units[index],
            index,
        })
    }
}

/// Rotation state for every placement served by this process
#[derive(Debug, Default)]
pub struct PlacementRotations {
    slots: DashMap<String, Rotator>,
}

impl PlacementRotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Displayed unit of `placement` given its current eligible units
    pub fn current<'a>(
        &self,
        placement: &str,
        units: &'a [AdvertisingUnit],
    ) -> Option<Selection<'a>> {
        let mut slot = self.slots.entry(placement.to_string()).or_default();
        slot.sync(units.len());
        slot.current(units)
    }

    pub fn select<'a>(
        &self,
        placement: &str,
        units: &'a [AdvertisingUnit],
        index: usize,
    ) -> Option<Selection<'a>> {
        let mut slot = self.slots.entry(placement.to_string()).or_default();
        slot.sync(units.len());
        if !slot.select(index) {
            return None;
        }
        slot.current(units)
    }

    pub fn tick_all(&self) {
        for mut slot in self.slots.iter_mut() {
            slot.value_mut().tick();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Start the fixed-interval rotation tick for all placements
    pub fn spawn_driver(self: &Arc<Self>, period: Duration) -> TaskHandle {
        let rotations = Arc::clone(self);
        debug!(period_ms = period.as_millis() as u64, "starting rotation driver");
        spawn_repeating("rotation", period, move || rotations.tick_all())
    }
}
