//! Inline caches for property access
//!
//! Each property callsite owns one [`IcSlot`] in the function's
//! [`ProfileTypeInfo`], lazily allocated the first time the method's hotness
//! counter crosses zero. A slot caches shape-to-slot mappings observed at
//! that callsite and only ever widens: uninitialized, monomorphic, bounded
//! polymorphic, megamorphic. Cache state is invisible in results; a miss
//! just falls through to the slower lookup that repopulates the slot.

use tracing::trace;

/// One cached shape-to-slot mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcEntry {
    /// Shape id of the receiver at the time of caching
    pub shape: u64,
    /// Own-property slot the lookup resolved to
    pub slot: u32,
}

/// A property callsite's cache state. Transitions strictly widen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IcSlot {
    /// Never populated
    #[default]
    Uninitialized,
    /// Exactly one shape seen
    Monomorphic(IcEntry),
    /// A bounded set of shapes seen
    Polymorphic(Vec<IcEntry>),
    /// Too many shapes; this callsite no longer caches
    Megamorphic,
}

impl IcSlot {
    /// O(1)/O(bound) lookup of the cached slot for a shape
    #[inline]
    pub fn lookup(&self, shape: u64) -> Option<u32> {
        match self {
            IcSlot::Uninitialized | IcSlot::Megamorphic => None,
            IcSlot::Monomorphic(entry) => (entry.shape == shape).then_some(entry.slot),
            IcSlot::Polymorphic(entries) => entries
                .iter()
                .find(|entry| entry.shape == shape)
                .map(|entry| entry.slot),
        }
    }

    /// Record an observed (shape, slot) pair, widening as needed.
    /// `poly_limit` bounds the polymorphic set before the slot goes
    /// megamorphic.
    pub fn update(&mut self, shape: u64, slot: u32, poly_limit: usize) {
        match self {
            IcSlot::Megamorphic => {}
            IcSlot::Uninitialized => {
                *self = IcSlot::Monomorphic(IcEntry { shape, slot });
            }
            IcSlot::Monomorphic(entry) => {
                if entry.shape == shape {
                    entry.slot = slot;
                } else {
                    let entries = vec![*entry, IcEntry { shape, slot }];
                    trace!(shape, "ic widened to polymorphic");
                    *self = IcSlot::Polymorphic(entries);
                }
            }
            IcSlot::Polymorphic(entries) => {
                if let Some(entry) = entries.iter_mut().find(|entry| entry.shape == shape) {
                    entry.slot = slot;
                    return;
                }
                if entries.len() < poly_limit {
                    entries.push(IcEntry { shape, slot });
                } else {
                    trace!(shape, "ic widened to megamorphic");
                    *self = IcSlot::Megamorphic;
                }
            }
        }
    }

    /// Whether this callsite gave up caching
    pub fn is_megamorphic(&self) -> bool {
        matches!(self, IcSlot::Megamorphic)
    }
}

/// Per-closure inline-cache vector, one slot per callsite
#[derive(Debug, Clone)]
pub struct ProfileTypeInfo {
    slots: Vec<IcSlot>,
}

impl ProfileTypeInfo {
    /// Allocate `count` uninitialized slots
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![IcSlot::Uninitialized; count],
        }
    }

    /// Cached slot for a shape at a callsite
    #[inline]
    pub fn lookup(&self, ic: u8, shape: u64) -> Option<u32> {
        self.slots.get(ic as usize)?.lookup(shape)
    }

    /// Record an observation at a callsite
    pub fn update(&mut self, ic: u8, shape: u64, slot: u32, poly_limit: usize) {
        if let Some(entry) = self.slots.get_mut(ic as usize) {
            entry.update(shape, slot, poly_limit);
        }
    }

    /// Inspect a callsite's state (diagnostics, tests)
    pub fn slot(&self, ic: u8) -> Option<&IcSlot> {
        self.slots.get(ic as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_misses() {
        let slot = IcSlot::Uninitialized;
        assert_eq!(slot.lookup(1), None);
    }

    #[test]
    fn monomorphic_hit_and_miss() {
        let mut slot = IcSlot::Uninitialized;
        slot.update(7, 2, 4);
        assert_eq!(slot.lookup(7), Some(2));
        assert_eq!(slot.lookup(8), None);
    }

    #[test]
    fn widens_to_polymorphic_on_second_shape() {
        let mut slot = IcSlot::Uninitialized;
        slot.update(1, 0, 4);
        slot.update(2, 5, 4);
        assert!(matches!(slot, IcSlot::Polymorphic(_)));
        assert_eq!(slot.lookup(1), Some(0));
        assert_eq!(slot.lookup(2), Some(5));
    }

    #[test]
    fn widens_to_megamorphic_past_the_bound() {
        let mut slot = IcSlot::Uninitialized;
        for shape in 0..6u64 {
            slot.update(shape, shape as u32, 4);
        }
        assert!(slot.is_megamorphic());
        assert_eq!(slot.lookup(0), None);
    }

    #[test]
    fn never_narrows() {
        let mut slot = IcSlot::Megamorphic;
        slot.update(1, 1, 4);
        assert!(slot.is_megamorphic());
    }
}
