//! Plain runtime objects
//!
//! [`JsObject`] is the minimal object model the interpreter core needs:
//! insertion-ordered own properties addressed by slot index, a prototype
//! link, data/accessor slot attributes, and a cached shape id consumed by
//! the inline-cache subsystem. Shape ids change whenever the property
//! layout changes, so a stale inline cache can never observe the wrong slot.

use std::cell::Cell;

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use string_interner::Symbol;

use super::value::TaggedValue;

/// Interned property / binding name
pub type Atom = string_interner::DefaultSymbol;

bitflags! {
    /// Object-level flags consulted by the store protocol
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u8 {
        /// Object is a class constructor; own-stores must not redefine it
        const CLASS_CONSTRUCTOR = 0x01;
        /// Object is a class prototype; own-stores must not redefine it
        const CLASS_PROTOTYPE = 0x02;
    }
}

/// Whether a slot holds a plain value or an accessor pair reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAttr {
    Data,
    Accessor,
}

/// An ordinary object: ordered own slots plus a prototype link
pub struct JsObject {
    flags: ObjectFlags,
    keys: Vec<Atom>,
    layout: FxHashMap<Atom, u32>,
    values: Vec<TaggedValue>,
    attrs: Vec<SlotAttr>,
    prototype: TaggedValue,
    cached_shape: Cell<Option<u64>>,
}

impl JsObject {
    /// Create an object with a null prototype
    pub fn new() -> Self {
        Self::with_prototype(TaggedValue::NULL)
    }

    /// Create an object with the given prototype (heap ref or null)
    pub fn with_prototype(prototype: TaggedValue) -> Self {
        Self {
            flags: ObjectFlags::empty(),
            keys: Vec::new(),
            layout: FxHashMap::default(),
            values: Vec::new(),
            attrs: Vec::new(),
            prototype,
            cached_shape: Cell::new(None),
        }
    }

    /// The prototype link (heap ref or null)
    pub fn prototype(&self) -> TaggedValue {
        self.prototype
    }

    pub fn set_prototype(&mut self, prototype: TaggedValue) {
        self.prototype = prototype;
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: ObjectFlags) {
        self.flags |= flags;
    }

    /// Whether own-store redefinition must be rejected on this object
    pub fn rejects_own_redefine(&self) -> bool {
        self.flags
            .intersects(ObjectFlags::CLASS_CONSTRUCTOR | ObjectFlags::CLASS_PROTOTYPE)
    }

    // ==================== Slot access ====================

    /// Find the own slot for a name
    #[inline]
    pub fn slot_of(&self, name: Atom) -> Option<u32> {
        self.layout.get(&name).copied()
    }

    /// Slot attribute; `slot` must come from [`slot_of`](Self::slot_of)
    #[inline]
    pub fn attr_at(&self, slot: u32) -> SlotAttr {
        self.attrs[slot as usize]
    }

    /// Slot value; `slot` must come from [`slot_of`](Self::slot_of)
    #[inline]
    pub fn value_at(&self, slot: u32) -> TaggedValue {
        self.values[slot as usize]
    }

    /// Overwrite an existing slot value
    #[inline]
    pub fn set_value_at(&mut self, slot: u32, value: TaggedValue) {
        self.values[slot as usize] = value;
    }

    /// Define or overwrite an own data property, returning its slot
    pub fn define_own(&mut self, name: Atom, value: TaggedValue) -> u32 {
        if let Some(slot) = self.slot_of(name) {
            self.values[slot as usize] = value;
            if self.attrs[slot as usize] != SlotAttr::Data {
                self.attrs[slot as usize] = SlotAttr::Data;
                self.cached_shape.set(None);
            }
            return slot;
        }
        let slot = self.values.len() as u32;
        self.keys.push(name);
        self.layout.insert(name, slot);
        self.values.push(value);
        self.attrs.push(SlotAttr::Data);
        self.cached_shape.set(None);
        slot
    }

    /// Define an accessor property whose slot value references an
    /// accessor pair on the heap
    pub fn define_accessor(&mut self, name: Atom, pair: TaggedValue) -> u32 {
        let slot = self.define_own(name, pair);
        self.attrs[slot as usize] = SlotAttr::Accessor;
        self.cached_shape.set(None);
        slot
    }

    /// Own keys in insertion order
    pub fn keys(&self) -> &[Atom] {
        &self.keys
    }

    /// All own slot values (for GC tracing)
    pub fn values(&self) -> &[TaggedValue] {
        &self.values
    }

    // ==================== Shape ====================

    /// The object's shape id: a hash of its property layout, cached until
    /// the layout changes. Two objects with the same keys in the same order
    /// and the same slot attributes share a shape.
    pub fn shape_id(&self) -> u64 {
        if let Some(id) = self.cached_shape.get() {
            return id;
        }
        let mut hash: u64 = self.keys.len() as u64;
        for (key, attr) in self.keys.iter().zip(&self.attrs) {
            hash = hash.wrapping_mul(31).wrapping_add(key.to_usize() as u64);
            hash = hash
                .wrapping_mul(33)
                .wrapping_add(matches!(attr, SlotAttr::Accessor) as u64);
        }
        // Reserve 0 so an uninitialized cache entry can never match
        let hash = hash | 1;
        self.cached_shape.set(Some(hash));
        hash
    }
}

impl Default for JsObject {
    fn default() -> Self {
        Self::new()
    }
}
