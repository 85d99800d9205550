//! Call and construct protocol
//!
//! Given a callee that may be anything, assemble the right frame and
//! transfer control. Three strategies exist:
//!
//! - **native builtin**: a minimal argument-window frame, then a direct
//!   call through the native function pointer;
//! - **ordinary interpreted**: a full frame with declared-vs-actual
//!   argument resolution;
//! - **fast-new construct**: a constructor body frame whose eventual return
//!   value goes through construct-result inspection (an object result wins;
//!   base constructors fall back to the allocated `this`; derived
//!   constructors forward the raw result; anything else is a TypeError).
//!
//! The dispatch loop pushes call frames inline and keeps looping; the
//! helpers here that *run* code (`execute_call`, `construct`) exist for
//! re-entrant callers: slow stubs invoking getters/valueOf, native builtins
//! calling back in, and the embedding API.

use super::frame::{self, FrameKind};
use super::execute_frames;
use crate::bytecode::Program;
use crate::runtime::function::RuntimeCallInfo;
use crate::runtime::object::JsObject;
use crate::runtime::thread::JsThread;
use crate::runtime::value::TaggedValue;

/// Invoke a native builtin. The arguments are parked in a builtin frame for
/// the duration of the call so a collection started by re-entered bytecode
/// still sees them.
pub(crate) fn call_native(
    thread: &mut JsThread,
    func: TaggedValue,
    this: TaggedValue,
    new_target: TaggedValue,
    args: &[TaggedValue],
) -> TaggedValue {
    let Some(function) = thread.heap.function(func) else {
        return thread.throw_type_error("callee is not a function");
    };
    let Some(native) = function.native else {
        return thread.throw_type_error("callee is not a native function");
    };

    if !frame::push_builtin_frame(thread, func, this, new_target, args) {
        return TaggedValue::EXCEPTION;
    }
    let info = RuntimeCallInfo {
        func,
        new_target,
        this,
        args: args.to_vec(),
    };
    let result = native(thread, &info);
    thread.pop_frame();

    if thread.has_pending_exception() {
        return TaggedValue::EXCEPTION;
    }
    result
}

/// Re-entrant ordinary call: run `func(this, args)` to completion and hand
/// back its result (or the abrupt-completion marker).
pub(crate) fn execute_call(
    thread: &mut JsThread,
    program: &Program,
    func: TaggedValue,
    this: TaggedValue,
    args: &[TaggedValue],
) -> TaggedValue {
    let Some(function) = thread.heap.function(func) else {
        return thread.throw_type_error("value is not a function");
    };
    if function.is_native() {
        return call_native(thread, func, this, TaggedValue::UNDEFINED, args);
    }
    let method_id = function.method.unwrap_or(frame::NO_METHOD);
    let env = function.env;

    if !frame::push_interpreted_frame(
        thread,
        program,
        method_id,
        FrameKind::Interpreted,
        func,
        this,
        TaggedValue::UNDEFINED,
        env,
        args,
    ) {
        return TaggedValue::EXCEPTION;
    }
    let stop_depth = thread.frame_depth();
    execute_frames(thread, program, stop_depth)
}

/// Allocate the `this` object for a base constructor: an empty object whose
/// prototype is the constructor's `.prototype`.
pub(crate) fn new_this_object(thread: &mut JsThread, ctor: TaggedValue) -> TaggedValue {
    let proto = thread
        .heap
        .function(ctor)
        .map(|f| f.proto)
        .unwrap_or(TaggedValue::UNDEFINED);
    let proto = if proto.is_heap_ref() { proto } else { TaggedValue::NULL };
    thread.heap.alloc_object(JsObject::with_prototype(proto))
}

/// Re-entrant construct: `new ctor(...args)` with an explicit `new.target`.
///
/// Native constructors build their own `this` from an undefined binding.
/// Interpreted constructors run on the fast-new path; the construct-result
/// inspection happens where their frame pops.
pub(crate) fn construct(
    thread: &mut JsThread,
    program: &Program,
    ctor: TaggedValue,
    new_target: TaggedValue,
    args: &[TaggedValue],
) -> TaggedValue {
    let Some(function) = thread.heap.function(ctor) else {
        return thread.throw_type_error("value is not a constructor");
    };
    if !function.kind.is_constructor() {
        return thread.throw_type_error("callee is not a constructor");
    }
    if function.is_native() {
        // Native constructors receive no vregs and an undefined this
        return call_native(thread, ctor, TaggedValue::UNDEFINED, new_target, args);
    }
    let method_id = function.method.unwrap_or(frame::NO_METHOD);
    let env = function.env;
    let is_base = function.is_base();

    let this = if is_base {
        new_this_object(thread, ctor)
    } else {
        TaggedValue::UNDEFINED
    };

    if !frame::push_interpreted_frame(
        thread,
        program,
        method_id,
        FrameKind::FastNew,
        ctor,
        this,
        new_target,
        env,
        args,
    ) {
        return TaggedValue::EXCEPTION;
    }
    let stop_depth = thread.frame_depth();
    execute_frames(thread, program, stop_depth)
}

/// Construct-result inspection for a popped fast-new frame.
///
/// `raw` is what the constructor body returned, `this` the binding its frame
/// carried. ECMA-262: an object result replaces `this`; a base constructor
/// otherwise answers its allocated `this`; a derived constructor forwards
/// the raw result for the next constructor in the chain to judge; any other
/// combination is a TypeError.
pub(crate) fn inspect_construct_result(
    thread: &mut JsThread,
    ctor: TaggedValue,
    this: TaggedValue,
    raw: TaggedValue,
) -> TaggedValue {
    if raw.is_exception() {
        return raw;
    }
    if thread.heap.is_ecma_object(raw) {
        return raw;
    }
    let Some(function) = thread.heap.function(ctor) else {
        return thread.throw_type_error("constructor vanished during construction");
    };
    if function.is_base() {
        return this;
    }
    if function.is_derived() {
        // Forwarded unmodified; the next constructor down judges it
        return raw;
    }
    thread.throw_type_error("Constructor returned a non-object value")
}
