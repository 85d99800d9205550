//! Heap arena
//!
//! All non-word runtime values live in a single arena of [`HeapSlot`]s,
//! referenced by index from [`TaggedValue`] heap words. The arena provides
//! allocation, typed access, and a mark-sweep collection driven from the
//! interpreter's safepoints. The collector exists to make the save-
//! accumulator / save-pc protocol observable: roots are read exclusively
//! from the structures the interpreter is required to have updated before
//! any allocating call.

use num_bigint::BigInt;
use tracing::debug;

use super::environment::LexicalEnv;
use super::function::JsFunction;
use super::generator::GeneratorObject;
use super::object::JsObject;
use super::value::TaggedValue;

/// One heap cell
pub enum HeapSlot {
    Object(JsObject),
    Str(String),
    Function(JsFunction),
    Env(LexicalEnv),
    Generator(GeneratorObject),
    /// Getter/setter pair backing an accessor property slot
    Accessor {
        getter: TaggedValue,
        setter: TaggedValue,
    },
    BigInt(BigInt),
}

/// The heap arena
pub struct Heap {
    slots: Vec<Option<HeapSlot>>,
    free: Vec<usize>,
    allocs_since_gc: usize,
    gc_interval: usize,
    collections: u64,
}

impl Heap {
    /// Create a heap that requests a collection every `gc_interval` allocations
    pub fn new(gc_interval: usize) -> Self {
        Self {
            slots: Vec::with_capacity(256),
            free: Vec::new(),
            allocs_since_gc: 0,
            gc_interval,
            collections: 0,
        }
    }

    // ==================== Allocation ====================

    /// Allocate a cell and return its tagged reference
    pub fn alloc(&mut self, slot: HeapSlot) -> TaggedValue {
        self.allocs_since_gc += 1;
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        TaggedValue::heap_ref(index)
    }

    pub fn alloc_object(&mut self, obj: JsObject) -> TaggedValue {
        self.alloc(HeapSlot::Object(obj))
    }

    pub fn alloc_string(&mut self, s: impl Into<String>) -> TaggedValue {
        self.alloc(HeapSlot::Str(s.into()))
    }

    pub fn alloc_function(&mut self, f: JsFunction) -> TaggedValue {
        self.alloc(HeapSlot::Function(f))
    }

    pub fn alloc_env(&mut self, env: LexicalEnv) -> TaggedValue {
        self.alloc(HeapSlot::Env(env))
    }

    pub fn alloc_generator(&mut self, generator: GeneratorObject) -> TaggedValue {
        self.alloc(HeapSlot::Generator(generator))
    }

    pub fn alloc_bigint(&mut self, value: BigInt) -> TaggedValue {
        self.alloc(HeapSlot::BigInt(value))
    }

    // ==================== Typed access ====================

    fn slot(&self, value: TaggedValue) -> Option<&HeapSlot> {
        if !value.is_heap_ref() {
            return None;
        }
        self.slots.get(value.heap_index())?.as_ref()
    }

    fn slot_mut(&mut self, value: TaggedValue) -> Option<&mut HeapSlot> {
        if !value.is_heap_ref() {
            return None;
        }
        self.slots.get_mut(value.heap_index())?.as_mut()
    }

    pub fn object(&self, value: TaggedValue) -> Option<&JsObject> {
        match self.slot(value) {
            Some(HeapSlot::Object(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn object_mut(&mut self, value: TaggedValue) -> Option<&mut JsObject> {
        match self.slot_mut(value) {
            Some(HeapSlot::Object(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn string(&self, value: TaggedValue) -> Option<&str> {
        match self.slot(value) {
            Some(HeapSlot::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn function(&self, value: TaggedValue) -> Option<&JsFunction> {
        match self.slot(value) {
            Some(HeapSlot::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, value: TaggedValue) -> Option<&mut JsFunction> {
        match self.slot_mut(value) {
            Some(HeapSlot::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn env(&self, value: TaggedValue) -> Option<&LexicalEnv> {
        match self.slot(value) {
            Some(HeapSlot::Env(env)) => Some(env),
            _ => None,
        }
    }

    pub fn env_mut(&mut self, value: TaggedValue) -> Option<&mut LexicalEnv> {
        match self.slot_mut(value) {
            Some(HeapSlot::Env(env)) => Some(env),
            _ => None,
        }
    }

    pub fn generator(&self, value: TaggedValue) -> Option<&GeneratorObject> {
        match self.slot(value) {
            Some(HeapSlot::Generator(g)) => Some(g),
            _ => None,
        }
    }

    pub fn generator_mut(&mut self, value: TaggedValue) -> Option<&mut GeneratorObject> {
        match self.slot_mut(value) {
            Some(HeapSlot::Generator(g)) => Some(g),
            _ => None,
        }
    }

    pub fn accessor(&self, value: TaggedValue) -> Option<(TaggedValue, TaggedValue)> {
        match self.slot(value) {
            Some(HeapSlot::Accessor { getter, setter }) => Some((*getter, *setter)),
            _ => None,
        }
    }

    pub fn bigint(&self, value: TaggedValue) -> Option<&BigInt> {
        match self.slot(value) {
            Some(HeapSlot::BigInt(n)) => Some(n),
            _ => None,
        }
    }

    /// Whether the value references a live object cell (an "ECMAObject")
    pub fn is_ecma_object(&self, value: TaggedValue) -> bool {
        matches!(
            self.slot(value),
            Some(HeapSlot::Object(_)) | Some(HeapSlot::Function(_)) | Some(HeapSlot::Generator(_))
        )
    }

    /// Whether the value is callable
    pub fn is_callable(&self, value: TaggedValue) -> bool {
        matches!(self.slot(value), Some(HeapSlot::Function(_)))
    }

    // ==================== Collection ====================

    /// Whether the allocation budget since the last collection is exhausted.
    /// Checked at interpreter safepoints only.
    pub fn needs_collection(&self) -> bool {
        self.allocs_since_gc >= self.gc_interval
    }

    /// Number of completed collections
    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Number of live cells
    pub fn live_cells(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Mark-sweep collection over the given roots. Anything unreachable from
    /// `roots` is dropped, so a caller holding a live value outside the root
    /// set (an unsaved accumulator, say) loses it.
    pub fn collect(&mut self, roots: &[TaggedValue]) {
        let mut marks = vec![false; self.slots.len()];
        let mut worklist: Vec<usize> = Vec::new();

        for root in roots {
            if root.is_heap_ref() {
                let index = root.heap_index();
                if index < marks.len() && !marks[index] {
                    marks[index] = true;
                    worklist.push(index);
                }
            }
        }

        let mut push = |marks: &mut Vec<bool>, worklist: &mut Vec<usize>, v: TaggedValue| {
            if v.is_heap_ref() {
                let index = v.heap_index();
                if index < marks.len() && !marks[index] {
                    marks[index] = true;
                    worklist.push(index);
                }
            }
        };

        while let Some(index) = worklist.pop() {
            let Some(slot) = self.slots[index].as_ref() else {
                continue;
            };
            match slot {
                HeapSlot::Object(obj) => {
                    push(&mut marks, &mut worklist, obj.prototype());
                    for &value in obj.values() {
                        push(&mut marks, &mut worklist, value);
                    }
                }
                HeapSlot::Function(f) => {
                    push(&mut marks, &mut worklist, f.env);
                    push(&mut marks, &mut worklist, f.home_object);
                    push(&mut marks, &mut worklist, f.proto);
                    push(&mut marks, &mut worklist, f.parent_ctor);
                }
                HeapSlot::Env(env) => {
                    push(&mut marks, &mut worklist, env.parent());
                    for &value in env.slots() {
                        push(&mut marks, &mut worklist, value);
                    }
                }
                HeapSlot::Generator(g) => {
                    for value in g.trace() {
                        push(&mut marks, &mut worklist, value);
                    }
                }
                HeapSlot::Accessor { getter, setter } => {
                    push(&mut marks, &mut worklist, *getter);
                    push(&mut marks, &mut worklist, *setter);
                }
                HeapSlot::Str(_) | HeapSlot::BigInt(_) => {}
            }
        }

        let mut freed = 0usize;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !marks[index] {
                *slot = None;
                self.free.push(index);
                freed += 1;
            }
        }

        self.allocs_since_gc = 0;
        self.collections += 1;
        debug!(freed, live = self.live_cells(), "heap collection");
    }
}
