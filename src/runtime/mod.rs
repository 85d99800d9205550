//! Runtime: the interpreter and its supporting object model
//!
//! [`Interpreter`] is the embedding surface: load a [`Program`], register
//! native builtins, run the entry method, call guest functions, resume
//! generators. Everything below it — tagged values, the heap, frames, the
//! dispatch loop — lives in the submodules.

mod environment;
mod function;
mod generator;
mod heap;
mod object;
mod thread;
mod value;
pub(crate) mod vm;

pub use function::{JsFunction, NativeFn, RuntimeCallInfo};
pub use generator::{GeneratorState, GeneratorStep, ResumeMode};
pub use heap::{Heap, HeapSlot};
pub use object::{Atom, JsObject, ObjectFlags};
pub use thread::{InterpreterConfig, JsThread};
pub use value::TaggedValue;
pub use vm::cache::{IcEntry, IcSlot, ProfileTypeInfo};

use crate::bytecode::Program;
use crate::error::{Error, ErrorKind, Result};
use vm::{call, frame};

/// A loaded program plus the thread executing it
pub struct Interpreter {
    program: Program,
    thread: JsThread,
}

impl Interpreter {
    /// Create an interpreter with default configuration
    pub fn new(program: Program) -> Result<Self> {
        Self::with_config(program, InterpreterConfig::new())
    }

    /// Create an interpreter with explicit configuration
    pub fn with_config(program: Program, config: InterpreterConfig) -> Result<Self> {
        program.validate()?;
        Ok(Self {
            program,
            thread: JsThread::new(config),
        })
    }

    /// The loaded program
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The executing thread (heap, atoms, diagnostics)
    pub fn thread(&self) -> &JsThread {
        &self.thread
    }

    /// Mutable thread access (test setup, embedding)
    pub fn thread_mut(&mut self) -> &mut JsThread {
        &mut self.thread
    }

    /// Register a native builtin under a global name
    pub fn register_native(&mut self, name: &str, f: NativeFn) {
        let func = self.thread.heap.alloc_function(JsFunction::native(f));
        self.set_global(name, func);
    }

    /// Define (or overwrite) a global binding
    pub fn set_global(&mut self, name: &str, value: TaggedValue) {
        let atom = self.thread.intern(name);
        let globals = self.thread.globals();
        if let Some(obj) = self.thread.heap.object_mut(globals) {
            obj.define_own(atom, value);
        }
    }

    /// Read a global binding
    pub fn get_global(&mut self, name: &str) -> TaggedValue {
        let atom = self.thread.intern(name);
        let globals = self.thread.globals();
        self.thread
            .heap
            .object(globals)
            .and_then(|obj| obj.slot_of(atom).map(|slot| obj.value_at(slot)))
            .unwrap_or(TaggedValue::UNDEFINED)
    }

    /// Allocate a guest string
    pub fn alloc_string(&mut self, text: &str) -> TaggedValue {
        self.thread.heap.alloc_string(text)
    }

    /// Run the program's entry method to completion
    pub fn run(&mut self) -> Result<TaggedValue> {
        let entry = self.program.entry;
        self.run_method(entry, &[])
    }

    /// Run an arbitrary method as a fresh activation
    pub fn run_method(&mut self, method: u32, args: &[TaggedValue]) -> Result<TaggedValue> {
        let func = self.make_function(method)?;
        self.call(func, TaggedValue::UNDEFINED, args)
    }

    /// Create a closure over a method with no captured environment.
    ///
    /// The closure owns its hotness counter and inline caches, so reusing
    /// one function value across calls is what lets the caches warm up.
    pub fn make_function(&mut self, method: u32) -> Result<TaggedValue> {
        if self.program.method(method).is_none() {
            return Err(Error::InvalidProgram(format!(
                "method {} out of range",
                method
            )));
        }
        let kind = self.program.methods[method as usize].kind;
        let hotness = self.thread.config().hotness_threshold;
        Ok(self.thread.heap.alloc_function(JsFunction::interpreted(
            method,
            kind,
            TaggedValue::UNDEFINED,
            hotness,
        )))
    }

    /// Call a guest function value
    pub fn call(
        &mut self,
        func: TaggedValue,
        this: TaggedValue,
        args: &[TaggedValue],
    ) -> Result<TaggedValue> {
        let program = &self.program;
        let thread = &mut self.thread;
        if !frame::push_break_frame(thread) {
            return Self::pending_to_error(thread);
        }
        let result = call::execute_call(thread, program, func, this, args);
        thread.pop_frame();
        if result.is_exception() {
            return Self::pending_to_error(thread);
        }
        Ok(result)
    }

    /// Construct a guest value: `new ctor(...args)`
    pub fn construct(&mut self, ctor: TaggedValue, args: &[TaggedValue]) -> Result<TaggedValue> {
        let program = &self.program;
        let thread = &mut self.thread;
        if !frame::push_break_frame(thread) {
            return Self::pending_to_error(thread);
        }
        let result = call::construct(thread, program, ctor, ctor, args);
        thread.pop_frame();
        if result.is_exception() {
            return Self::pending_to_error(thread);
        }
        Ok(result)
    }

    /// Resume a generator with a value and mode
    pub fn resume_generator(
        &mut self,
        generator: TaggedValue,
        value: TaggedValue,
        mode: ResumeMode,
    ) -> Result<GeneratorStep> {
        let program = &self.program;
        let thread = &mut self.thread;
        let result = generator::resume(thread, program, generator, value, mode);
        if result.is_exception() {
            return Self::pending_to_error(thread);
        }
        let done = thread
            .heap
            .generator(generator)
            .map(|g| g.state == GeneratorState::Completed)
            .unwrap_or(true);
        Ok(GeneratorStep { value: result, done })
    }

    /// Current lifecycle state of a generator object
    pub fn generator_state(&self, generator: TaggedValue) -> Option<GeneratorState> {
        self.thread.heap.generator(generator).map(|g| g.state)
    }

    /// Inspect a closure's inline-cache slot (diagnostics, tests)
    pub fn ic_state(&self, func: TaggedValue, ic: u8) -> Option<IcSlot> {
        self.thread
            .heap
            .function(func)?
            .profile
            .as_ref()?
            .slot(ic)
            .cloned()
    }

    /// Human-readable rendering of a value (diagnostics)
    pub fn describe(&self, value: TaggedValue) -> String {
        if value.is_int() {
            return value.as_int().to_string();
        }
        if value.is_double() {
            return vm::stubs::slow::number_to_string(value.as_double());
        }
        if value.is_undefined() {
            return "undefined".to_string();
        }
        if value.is_null() {
            return "null".to_string();
        }
        if value.is_boolean() {
            return value.as_boolean().to_string();
        }
        if let Some(s) = self.thread.heap.string(value) {
            return s.to_string();
        }
        if let Some(n) = self.thread.heap.bigint(value) {
            return format!("{}n", n);
        }
        if self.thread.heap.function(value).is_some() {
            return "[function]".to_string();
        }
        if self.thread.heap.generator(value).is_some() {
            return "[generator]".to_string();
        }
        if self.thread.heap.object(value).is_some() {
            return "[object]".to_string();
        }
        format!("{:?}", value)
    }

    /// Convert the thread's pending exception into a crate error
    fn pending_to_error<T>(thread: &mut JsThread) -> Result<T> {
        let Some(exception) = thread.take_exception() else {
            return Err(Error::internal("abrupt completion with nothing pending"));
        };
        if let Some(text) = thread.heap.string(exception) {
            return Err(Error::uncaught(ErrorKind::GenericError, text.to_string()));
        }
        let read = |thread: &JsThread, obj: TaggedValue, key: Atom| {
            thread
                .heap
                .object(obj)
                .and_then(|o| o.slot_of(key).map(|slot| o.value_at(slot)))
                .unwrap_or(TaggedValue::UNDEFINED)
        };
        let name_atom = thread.intern("name");
        let message_atom = thread.intern("message");
        let name_value = read(thread, exception, name_atom);
        let message_value = read(thread, exception, message_atom);
        let kind = thread
            .heap
            .string(name_value)
            .map(ErrorKind::from_name)
            .unwrap_or(ErrorKind::GenericError);
        let message = thread
            .heap
            .string(message_value)
            .map(str::to_string)
            .unwrap_or_else(|| "uncaught guest exception".to_string());
        Err(Error::uncaught(kind, message))
    }
}

/// Convenience: run a program's entry method with default configuration
pub fn run_program(program: Program) -> Result<TaggedValue> {
    Interpreter::new(program)?.run()
}

/// Build a guest error-shaped value: an object with `name` and `message`
/// own properties (embedding/test helper).
pub fn make_error_value(thread: &mut JsThread, name: &str, message: &str) -> TaggedValue {
    let name_atom = thread.intern("name");
    let message_atom = thread.intern("message");
    let name_value = thread.heap.alloc_string(name);
    let message_value = thread.heap.alloc_string(message);
    let mut obj = JsObject::new();
    obj.define_own(name_atom, name_value);
    obj.define_own(message_atom, message_value);
    thread.heap.alloc_object(obj)
}
