//! The interpreter execution context
//!
//! A [`JsThread`] owns one call stack: the downward-growing register arena,
//! the frame records linked by previous-frame indices, the pending-exception
//! store, the heap, and the atom table. One thread executes at a time; the
//! safepoint hook is the only place a collection can start, and it reads GC
//! roots exclusively from the frame records and the live stack region.

use string_interner::{DefaultBackend, StringInterner};
use tracing::debug;

use super::heap::Heap;
use super::object::{Atom, JsObject};
use super::value::TaggedValue;
use super::vm::frame::Frame;

/// Tunables for an interpreter instance.
///
/// Built in the fluent style:
///
/// ```
/// use cinnabar::InterpreterConfig;
/// let config = InterpreterConfig::new()
///     .with_stack_slots(4096)
///     .with_hotness_threshold(8);
/// ```
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Register-arena capacity in tagged words
    pub stack_slots: usize,
    /// Backedge budget before a safepoint check and IC allocation
    pub hotness_threshold: i32,
    /// Shapes tracked per IC slot before it goes megamorphic
    pub poly_cache_limit: usize,
    /// Allocations between collection requests
    pub gc_interval: usize,
}

impl InterpreterConfig {
    /// Create a config with default limits
    pub fn new() -> Self {
        Self {
            stack_slots: 16 * 1024,
            hotness_threshold: 32,
            poly_cache_limit: 4,
            gc_interval: 4096,
        }
    }

    /// Set the register-arena capacity
    pub fn with_stack_slots(mut self, slots: usize) -> Self {
        self.stack_slots = slots;
        self
    }

    /// Set the hotness budget
    pub fn with_hotness_threshold(mut self, threshold: i32) -> Self {
        self.hotness_threshold = threshold;
        self
    }

    /// Set the polymorphic cache bound
    pub fn with_poly_cache_limit(mut self, limit: usize) -> Self {
        self.poly_cache_limit = limit;
        self
    }

    /// Set the allocation budget between collections
    pub fn with_gc_interval(mut self, interval: usize) -> Self {
        self.gc_interval = interval;
        self
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One interpreter execution context
pub struct JsThread {
    /// The heap arena
    pub heap: Heap,
    /// Interned property and binding names
    pub atoms: StringInterner<DefaultBackend>,
    /// Register arena; grows downward from `stack.len()`
    pub(crate) stack: Vec<TaggedValue>,
    /// Stack pointer: index of the lowest live slot
    pub(crate) sp: usize,
    /// Frame records, innermost last
    pub(crate) frames: Vec<Frame>,
    pending_exception: Option<TaggedValue>,
    globals: TaggedValue,
    /// Temporaries a slow stub must keep alive across a re-entrant call
    pub(crate) scratch: Vec<TaggedValue>,
    config: InterpreterConfig,
    safepoints: u64,
}

impl JsThread {
    /// Create a thread with the given configuration
    pub fn new(config: InterpreterConfig) -> Self {
        let mut heap = Heap::new(config.gc_interval);
        let globals = heap.alloc_object(JsObject::new());
        let stack_slots = config.stack_slots;
        Self {
            heap,
            atoms: StringInterner::new(),
            stack: vec![TaggedValue::HOLE; stack_slots],
            sp: stack_slots,
            frames: Vec::with_capacity(64),
            pending_exception: None,
            globals,
            scratch: Vec::new(),
            config,
            safepoints: 0,
        }
    }

    /// The thread configuration
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// The global object reference
    pub fn globals(&self) -> TaggedValue {
        self.globals
    }

    /// Intern a name
    pub fn intern(&mut self, name: &str) -> Atom {
        self.atoms.get_or_intern(name)
    }

    /// Resolve an atom back to its text
    pub fn atom_str(&self, atom: Atom) -> &str {
        self.atoms.resolve(atom).unwrap_or("")
    }

    // ==================== Pending exception ====================

    /// Record a pending guest exception value
    pub fn set_exception_value(&mut self, value: TaggedValue) {
        self.pending_exception = Some(value);
    }

    /// Whether an exception is pending
    pub fn has_pending_exception(&self) -> bool {
        self.pending_exception.is_some()
    }

    /// Read the pending exception without clearing it
    pub fn pending_exception(&self) -> Option<TaggedValue> {
        self.pending_exception
    }

    /// Take and clear the pending exception
    pub fn take_exception(&mut self) -> Option<TaggedValue> {
        self.pending_exception.take()
    }

    /// Allocate a guest error object `{ name, message }`, record it as the
    /// pending exception, and return the abrupt-completion marker.
    pub fn throw_error(&mut self, name: &str, message: &str) -> TaggedValue {
        let name_atom = self.intern("name");
        let message_atom = self.intern("message");
        let name_value = self.heap.alloc_string(name);
        let message_value = self.heap.alloc_string(message);
        let mut error = JsObject::new();
        error.define_own(name_atom, name_value);
        error.define_own(message_atom, message_value);
        let error_ref = self.heap.alloc_object(error);
        self.pending_exception = Some(error_ref);
        TaggedValue::EXCEPTION
    }

    /// TypeError helper
    pub fn throw_type_error(&mut self, message: &str) -> TaggedValue {
        self.throw_error("TypeError", message)
    }

    /// ReferenceError helper
    pub fn throw_reference_error(&mut self, message: &str) -> TaggedValue {
        self.throw_error("ReferenceError", message)
    }

    /// RangeError helper
    pub fn throw_range_error(&mut self, message: &str) -> TaggedValue {
        self.throw_error("RangeError", message)
    }

    // ==================== Frames and stack ====================

    /// Current frame-stack depth
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Current stack pointer (diagnostics; lower means deeper)
    pub fn stack_pointer(&self) -> usize {
        self.sp
    }

    /// Pop the innermost frame, restoring the caller's stack pointer
    pub(crate) fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            self.sp = frame.prev_sp;
        }
    }

    /// Read a register of the innermost frame
    #[inline]
    pub(crate) fn reg(&self, base: usize, index: usize) -> TaggedValue {
        self.stack[base + index]
    }

    /// Write a register of the innermost frame
    #[inline]
    pub(crate) fn set_reg(&mut self, base: usize, index: usize, value: TaggedValue) {
        self.stack[base + index] = value;
    }

    // ==================== Safepoints ====================

    /// Number of safepoint checks performed
    pub fn safepoints(&self) -> u64 {
        self.safepoints
    }

    /// Voluntary yield point: runs a collection when the heap asks for one.
    ///
    /// Roots are the global object, the pending exception, every frame
    /// record's tagged fields, and the live stack region. The accumulator
    /// and pc of the running frame are only covered if the dispatch loop
    /// saved them first, which is exactly the protocol being enforced.
    pub fn check_safepoint(&mut self) {
        self.safepoints += 1;
        if !self.heap.needs_collection() {
            return;
        }
        let mut roots: Vec<TaggedValue> = Vec::with_capacity(self.frames.len() * 5 + 8);
        roots.push(self.globals);
        if let Some(exception) = self.pending_exception {
            roots.push(exception);
        }
        for frame in &self.frames {
            roots.push(frame.func);
            roots.push(frame.this);
            roots.push(frame.new_target);
            roots.push(frame.acc);
            roots.push(frame.env);
        }
        roots.extend_from_slice(&self.stack[self.sp..]);
        roots.extend_from_slice(&self.scratch);
        debug!(
            frames = self.frames.len(),
            live_region = self.stack.len() - self.sp,
            "safepoint collection"
        );
        self.heap.collect(&roots);
    }
}
