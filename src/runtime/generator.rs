//! Generator suspension and re-entry
//!
//! A generator object owns everything needed to continue a suspended
//! activation: a copy of the register window, the bytecode offset to resume
//! at, the environment, `this`, and the accumulator to hand back. Suspension
//! copies the live window off the interpreter stack (the stack region is
//! reused as soon as the suspending call returns); resumption materializes a
//! fresh frame from the saved context above a linkage-only break frame so an
//! ordinary `return` pops cleanly back to the resume call.

use tracing::trace;

use crate::bytecode::Program;

use super::thread::JsThread;
use super::value::TaggedValue;
use super::vm;

/// Generator lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created, body not yet entered
    SuspendedStart,
    /// Parked at a `suspendgenerator`
    SuspendedYield,
    /// Currently running; re-entry is a TypeError
    Executing,
    /// Ran to completion or threw
    Completed,
}

/// How a resumed generator interprets the handed-back value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Value becomes the result of the suspended `yield`
    Next = 0,
    /// Value is re-thrown at the suspension point
    Throw = 1,
    /// Value forces a return from the suspension point
    Return = 2,
}

/// The saved activation of a suspended generator
pub struct GeneratorContext {
    /// Method id of the generator body
    pub method: u32,
    /// The generator closure
    pub func: TaggedValue,
    /// Captured `this`
    pub this: TaggedValue,
    /// Lexical environment at suspension
    pub env: TaggedValue,
    /// Accumulator at suspension
    pub acc: TaggedValue,
    /// Bytecode offset to resume at
    pub resume_offset: u32,
    /// Virtual register count of the saved window
    pub nregs: u16,
    /// Argument window size of the saved window
    pub argc: u16,
    /// The saved register window (vregs then args)
    pub regs: Box<[TaggedValue]>,
}

/// A generator object on the heap
pub struct GeneratorObject {
    pub context: GeneratorContext,
    pub state: GeneratorState,
    pub resume_mode: ResumeMode,
    pub resume_value: TaggedValue,
}

impl GeneratorObject {
    /// Create a generator parked before its first instruction
    pub fn new(context: GeneratorContext) -> Self {
        Self {
            context,
            state: GeneratorState::SuspendedStart,
            resume_mode: ResumeMode::Next,
            resume_value: TaggedValue::UNDEFINED,
        }
    }

    /// Every tagged value the collector must treat as reachable
    pub fn trace(&self) -> Vec<TaggedValue> {
        let mut values = vec![
            self.context.func,
            self.context.this,
            self.context.env,
            self.context.acc,
            self.resume_value,
        ];
        values.extend_from_slice(&self.context.regs);
        values
    }
}

/// Outcome of one resume cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorStep {
    /// The yielded or returned value
    pub value: TaggedValue,
    /// Whether the generator completed
    pub done: bool,
}

/// Resume a suspended generator.
///
/// Returns the yielded/returned value, or [`TaggedValue::EXCEPTION`] with a
/// pending exception on the thread. Completion is visible through the
/// generator's state afterwards.
pub(crate) fn resume(
    thread: &mut JsThread,
    program: &Program,
    gen_ref: TaggedValue,
    value: TaggedValue,
    mode: ResumeMode,
) -> TaggedValue {
    let Some(generator) = thread.heap.generator_mut(gen_ref) else {
        return thread.throw_type_error("value is not a generator object");
    };

    match generator.state {
        GeneratorState::Executing => {
            return thread.throw_type_error("generator is already running");
        }
        GeneratorState::Completed => {
            // Completed generators answer without re-entering the body
            return match mode {
                ResumeMode::Next => TaggedValue::UNDEFINED,
                ResumeMode::Return => value,
                ResumeMode::Throw => {
                    thread.set_exception_value(value);
                    TaggedValue::EXCEPTION
                }
            };
        }
        GeneratorState::SuspendedStart | GeneratorState::SuspendedYield => {}
    }

    generator.state = GeneratorState::Executing;
    generator.resume_mode = mode;
    generator.resume_value = value;
    trace!(?mode, "generator resume");

    // Break frame: linkage only, so the resumed body's `return` stops here
    if !vm::frame::push_break_frame(thread) {
        return TaggedValue::EXCEPTION;
    }
    if !vm::frame::push_generator_frame(thread, program, gen_ref) {
        thread.pop_frame();
        return TaggedValue::EXCEPTION;
    }

    // Stop as soon as the generator frame itself pops
    let stop_depth = thread.frame_depth();
    let result = vm::execute_frames(thread, program, stop_depth);

    // Pop the break frame
    thread.pop_frame();

    // If the body did not park itself again, it finished (or threw)
    if let Some(generator) = thread.heap.generator_mut(gen_ref) {
        if generator.state == GeneratorState::Executing {
            generator.state = GeneratorState::Completed;
        }
    }

    result
}
