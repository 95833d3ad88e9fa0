use std::collections::BTreeSet;

use super::{Quark, StateSystemBuilder, StateSystemError};

/// Pool of numbered child attributes under one parent attribute
///
/// Each concurrent request under the parent gets its own slot (`"0"`, `"1"`,
/// ...). Recycled slots go back to the free list and the lowest free index is
/// handed out first, so the number of slots only grows with the peak number
/// of requests in flight at the same time.
#[derive(Debug)]
pub struct AttributePool {
    base: Quark,
    slots: Vec<Quark>,
    in_use: Vec<bool>,
    available: BTreeSet<usize>,
    acquired: u64,
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots ever created under the parent
    pub slots: usize,
    /// Slots currently free
    pub available: usize,
    /// Total acquire operations
    pub acquired: u64,
}

impl PoolStats {
    pub fn in_use(&self) -> usize {
        self.slots - self.available
    }
}

impl AttributePool {
    /// Create a pool whose slots are children of `base`
    pub fn new(base: Quark) -> Self {
        AttributePool {
            base,
            slots: Vec::new(),
            in_use: Vec::new(),
            available: BTreeSet::new(),
            acquired: 0,
        }
    }

    pub fn base(&self) -> Quark {
        self.base
    }

    /// Acquire a free slot, creating a new child attribute if none is free
    pub fn get_available(&mut self, ssb: &mut dyn StateSystemBuilder) -> Quark {
        self.acquired += 1;
        if let Some(index) = self.available.pop_first() {
            self.in_use[index] = true;
            return self.slots[index];
        }

        let index = self.slots.len();
        let quark = ssb.quark_relative_and_add(self.base, &index.to_string());
        self.slots.push(quark);
        self.in_use.push(true);
        quark
    }

    /// Clear the slot from `time` and make it available again
    pub fn recycle(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        quark: Quark,
        time: i64,
    ) -> Result<(), StateSystemError> {
        let Some(index) = self.slots.iter().position(|&slot| slot == quark) else {
            tracing::debug!("Attribute {} does not belong to pool {}", quark, self.base);
            return Ok(());
        };
        if !self.in_use[index] {
            tracing::debug!("Slot {} of pool {} recycled twice", index, self.base);
            return Ok(());
        }

        self.in_use[index] = false;
        self.available.insert(index);
        ssb.remove_attribute(time, quark)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            slots: self.slots.len(),
            available: self.available.len(),
            acquired: self.acquired,
        }
    }
}
