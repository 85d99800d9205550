//! The dispatch loop
//!
//! [`execute_frames`] is the threaded-code interpreter: fetch one opcode
//! byte, jump to its handler through the match (compiled to a jump table),
//! execute, advance. Two prefix bytes reroute dispatch through the secondary
//! throw/wide tables. The loop keeps its working `pc` and accumulator in
//! locals; the frame record's copies are the GC-visible ones, so every
//! handler saves them before any call that can allocate or re-enter guest
//! code, and the only voluntary yield points are the hotness-driven
//! safepoint checks on backedges and returns.
//!
//! Control leaves a handler exactly two ways: `DISPATCH` (advance pc,
//! continue) or the synthetic exception path, which searches try-block
//! ranges outward across the frame chain and either resumes at a catch
//! handler or unwinds out of this activation with the exception pending.

pub(crate) mod cache;
pub(crate) mod call;
pub(crate) mod frame;
pub(crate) mod stubs;

use tracing::trace;

use crate::bytecode::{Opcode, Program, ThrowOp, WideOp};

use self::cache::ProfileTypeInfo;
use self::frame::{FrameKind, NO_METHOD};
use self::stubs::{fast, slow, BitwiseOp, CompareOp, NumericOp};
use super::generator::GeneratorState;
use super::object::{Atom, SlotAttr};
use super::thread::JsThread;
use super::value::TaggedValue;

/// Decoded size of the instruction at `pc`, prefix families included
fn instruction_size_at(code: &[u8], pc: usize) -> usize {
    match code.get(pc).copied().and_then(Opcode::from_u8) {
        Some(Opcode::ThrowPrefix) => code
            .get(pc + 1)
            .copied()
            .and_then(ThrowOp::from_u8)
            .map(|op| op.instruction_size())
            .unwrap_or(2),
        Some(Opcode::WidePrefix) => code
            .get(pc + 1)
            .copied()
            .and_then(WideOp::from_u8)
            .map(|op| op.instruction_size())
            .unwrap_or(2),
        Some(op) => op.instruction_size(),
        None => 1,
    }
}

/// Adjust a closure's hotness counter by `delta` (negative on backedges and
/// returns). A zero-crossing resets the counter, allocates the inline-cache
/// vector on the first crossing, and runs the safepoint check. The caller
/// must have saved pc and acc: this is the one voluntary yield point inside
/// a tight loop.
fn update_hotness(thread: &mut JsThread, func: TaggedValue, delta: i32, ic_slots: u16) {
    let threshold = thread.config().hotness_threshold.max(1);
    let Some(function) = thread.heap.function_mut(func) else {
        return;
    };
    function.hotness = function.hotness.saturating_add(delta.min(-1));
    if function.hotness > 0 {
        return;
    }
    function.hotness = threshold;
    if function.profile.is_none() {
        trace!(ic_slots, "method promoted, allocating profile");
        function.profile = Some(ProfileTypeInfo::new(ic_slots as usize));
    }
    thread.check_safepoint();
}

/// Walk `level` parent links, then read `slot`
fn ld_lex_var(thread: &mut JsThread, level: usize, slot: usize) -> TaggedValue {
    let mut env = thread.frames.last().map(|f| f.env).unwrap_or(TaggedValue::UNDEFINED);
    for _ in 0..level {
        let Some(record) = thread.heap.env(env) else {
            debug_assert!(false, "lexical level walked past the chain head");
            return thread.throw_error("InternalError", "broken environment chain");
        };
        env = record.parent();
    }
    match thread.heap.env(env) {
        Some(record) if slot < record.len() => record.get(slot),
        _ => {
            debug_assert!(false, "lexical slot out of range");
            thread.throw_error("InternalError", "broken environment chain")
        }
    }
}

/// Walk `level` parent links, then write `slot`
fn st_lex_var(thread: &mut JsThread, level: usize, slot: usize, value: TaggedValue) -> TaggedValue {
    let mut env = thread.frames.last().map(|f| f.env).unwrap_or(TaggedValue::UNDEFINED);
    for _ in 0..level {
        let Some(record) = thread.heap.env(env) else {
            debug_assert!(false, "lexical level walked past the chain head");
            return thread.throw_error("InternalError", "broken environment chain");
        };
        env = record.parent();
    }
    match thread.heap.env_mut(env) {
        Some(record) if slot < record.len() => {
            record.set(slot, value);
            TaggedValue::UNDEFINED
        }
        _ => {
            debug_assert!(false, "lexical slot out of range");
            thread.throw_error("InternalError", "broken environment chain")
        }
    }
}

/// Resolve a by-value key to a property atom; strings and ints are cheap,
/// anything else coerces through ToString (which can throw)
fn to_property_key(
    thread: &mut JsThread,
    program: &Program,
    key: TaggedValue,
) -> Result<Atom, TaggedValue> {
    if key.is_int() {
        let text = key.as_int().to_string();
        return Ok(thread.atoms.get_or_intern(text));
    }
    if let Some(s) = thread.heap.string(key) {
        let text = s.to_string();
        return Ok(thread.atoms.get_or_intern(text));
    }
    let converted = slow::to_string_value(thread, program, key);
    if converted.is_exception() {
        return Err(converted);
    }
    let text = thread
        .heap
        .string(converted)
        .unwrap_or_default()
        .to_string();
    Ok(thread.atoms.get_or_intern(text))
}

/// IC-accelerated property load. Expects pc/acc already saved.
fn load_property_with_ic(
    thread: &mut JsThread,
    program: &Program,
    func: TaggedValue,
    ic: u8,
    receiver: TaggedValue,
    name: Atom,
) -> TaggedValue {
    // 1. Cache probe: O(1) shape check against this callsite's slot
    let mut has_profile = false;
    if let Some(obj) = thread.heap.object(receiver) {
        let shape = obj.shape_id();
        if let Some(function) = thread.heap.function(func) {
            if let Some(profile) = &function.profile {
                has_profile = true;
                if let Some(slot) = profile.lookup(ic, shape) {
                    return obj.value_at(slot);
                }
            }
        }
    } else if let Some(function) = thread.heap.function(func) {
        has_profile = function.profile.is_some();
    }

    // 2. No caches yet: allocation-free lookup first
    if !has_profile {
        if let Some(value) = fast::get_property(&thread.heap, receiver, name) {
            return value;
        }
    }

    // 3. Full lookup; may invoke getters and throw
    let result = slow::get_property(thread, program, receiver, name);
    if result.is_exception() {
        return result;
    }

    // 4. Populate/widen the cache for own data hits
    if has_profile {
        let observed = thread.heap.object(receiver).and_then(|obj| {
            obj.slot_of(name).and_then(|slot| {
                (obj.attr_at(slot) == SlotAttr::Data).then(|| (obj.shape_id(), slot))
            })
        });
        if let Some((shape, slot)) = observed {
            let poly_limit = thread.config().poly_cache_limit;
            if let Some(function) = thread.heap.function_mut(func) {
                if let Some(profile) = &mut function.profile {
                    profile.update(ic, shape, slot, poly_limit);
                }
            }
        }
    }
    result
}

/// IC-accelerated property store. Expects pc/acc already saved.
fn store_property_with_ic(
    thread: &mut JsThread,
    program: &Program,
    func: TaggedValue,
    ic: u8,
    receiver: TaggedValue,
    name: Atom,
    value: TaggedValue,
) -> TaggedValue {
    // 1. Cache probe: a shape hit proves the slot is an own data property
    let mut has_profile = false;
    let mut cached_slot = None;
    if let Some(obj) = thread.heap.object(receiver) {
        let shape = obj.shape_id();
        if let Some(function) = thread.heap.function(func) {
            if let Some(profile) = &function.profile {
                has_profile = true;
                cached_slot = profile.lookup(ic, shape);
            }
        }
    } else if let Some(function) = thread.heap.function(func) {
        has_profile = function.profile.is_some();
    }
    if let Some(slot) = cached_slot {
        if let Some(obj) = thread.heap.object_mut(receiver) {
            obj.set_value_at(slot, value);
            return TaggedValue::UNDEFINED;
        }
    }

    if !has_profile && fast::set_property(&mut thread.heap, receiver, name, value).is_some() {
        return TaggedValue::UNDEFINED;
    }

    // 2. Remember whether this was a plain overwrite; only those cache well
    let existing = thread.heap.object(receiver).and_then(|obj| {
        obj.slot_of(name).and_then(|slot| {
            (obj.attr_at(slot) == SlotAttr::Data).then(|| (obj.shape_id(), slot))
        })
    });

    let result = slow::set_property(thread, program, receiver, name, value);
    if result.is_exception() {
        return result;
    }

    if has_profile {
        if let Some((shape, slot)) = existing {
            let poly_limit = thread.config().poly_cache_limit;
            if let Some(function) = thread.heap.function_mut(func) {
                if let Some(profile) = &mut function.profile {
                    profile.update(ic, shape, slot, poly_limit);
                }
            }
        }
    }
    result
}

/// Search the frame chain from the innermost frame down to this activation's
/// boundary for a try block covering each frame's saved pc. On a match, pop
/// the frames above it, clear the pending exception into the handler frame's
/// accumulator, and answer the handler pc. `None` means uncaught here: every
/// frame of this activation is popped and the exception stays pending.
fn exception_search(thread: &mut JsThread, program: &Program, stop_depth: usize) -> Option<usize> {
    let Some(exception) = thread.pending_exception() else {
        debug_assert!(false, "exception search with nothing pending");
        return None;
    };
    let lowest = stop_depth.saturating_sub(1);
    let mut index = thread.frames.len();
    while index > lowest {
        index -= 1;
        let record = &thread.frames[index];
        if !matches!(record.kind, FrameKind::Interpreted | FrameKind::FastNew)
            || record.method == NO_METHOD
        {
            continue;
        }
        let method = &program.methods[record.method as usize];
        if let Some(block) = method.find_catch(record.pc) {
            let handler = block.handler;
            while thread.frames.len() > index + 1 {
                thread.pop_frame();
            }
            thread.take_exception();
            let record = thread.frames.last_mut()?;
            record.pc = handler;
            record.acc = exception;
            trace!(handler, "exception caught");
            return Some(handler as usize);
        }
    }
    while thread.frames.len() >= stop_depth {
        thread.pop_frame();
    }
    trace!("exception uncaught in this activation");
    None
}

/// Run bytecode until the frame stack drops below `stop_depth`.
///
/// The frame at `stop_depth - 1` (and everything it pushes) executes here;
/// its final result is the return value, or [`TaggedValue::EXCEPTION`] with
/// the exception left pending when nothing in this activation caught it.
pub(crate) fn execute_frames(
    thread: &mut JsThread,
    program: &Program,
    stop_depth: usize,
) -> TaggedValue {
    debug_assert!(thread.frames.len() >= stop_depth && stop_depth > 0);

    let mut pc: usize;
    let mut acc: TaggedValue;
    let mut method_id: u32;
    let mut base: usize;
    {
        let record = thread.frames.last().unwrap();
        pc = record.pc as usize;
        acc = record.acc;
        method_id = record.method;
        base = record.base;
    }

    macro_rules! frame_mut {
        () => {
            thread.frames.last_mut().unwrap()
        };
    }
    macro_rules! frame_ref {
        () => {
            thread.frames.last().unwrap()
        };
    }
    macro_rules! save_pc {
        () => {
            frame_mut!().pc = pc as u32;
        };
    }
    macro_rules! save_acc {
        () => {
            frame_mut!().acc = acc;
        };
    }
    macro_rules! restore_acc {
        () => {
            acc = frame_ref!().acc;
        };
    }
    macro_rules! reload_frame {
        () => {{
            let record = frame_ref!();
            pc = record.pc as usize;
            acc = record.acc;
            method_id = record.method;
            base = record.base;
        }};
    }

    'dispatch: loop {
        let method = &program.methods[method_id as usize];
        let code = &method.code;

        macro_rules! on_exception {
            () => {{
                match exception_search(thread, program, stop_depth) {
                    Some(handler) => {
                        let record = frame_ref!();
                        method_id = record.method;
                        base = record.base;
                        acc = record.acc;
                        pc = handler;
                        continue 'dispatch;
                    }
                    None => return TaggedValue::EXCEPTION,
                }
            }};
        }
        macro_rules! check {
            ($result:expr) => {{
                let result = $result;
                if result.is_exception() {
                    on_exception!();
                }
                result
            }};
        }
        macro_rules! do_return {
            ($value:expr) => {{
                {
                    let record = frame_mut!();
                    record.acc = $value;
                    record.pc = pc as u32;
                }
                let func = frame_ref!().func;
                update_hotness(thread, func, -(pc as i32), method.ic_slots);
                let value = frame_ref!().acc;
                let kind = frame_ref!().kind;
                let this = frame_ref!().this;
                thread.pop_frame();
                let mut result = value;
                if matches!(kind, FrameKind::FastNew) {
                    result = call::inspect_construct_result(thread, func, this, result);
                    if result.is_exception() {
                        on_exception!();
                    }
                }
                if thread.frames.len() < stop_depth {
                    return result;
                }
                frame_mut!().acc = result;
                reload_frame!();
                pc += instruction_size_at(&program.methods[method_id as usize].code, pc);
                acc = result;
                continue 'dispatch;
            }};
        }
        macro_rules! do_call {
            ($callee:expr, $this:expr, $args:expr, $size:expr) => {{
                let callee = $callee;
                let this = $this;
                let args: Vec<TaggedValue> = $args;
                save_pc!();
                save_acc!();
                let parts = thread
                    .heap
                    .function(callee)
                    .map(|f| (f.is_native(), f.method, f.env));
                match parts {
                    None => {
                        thread.throw_type_error("callee is not a function");
                        on_exception!();
                    }
                    Some((true, _, _)) => {
                        let result = call::call_native(
                            thread,
                            callee,
                            this,
                            TaggedValue::UNDEFINED,
                            &args,
                        );
                        if result.is_exception() {
                            on_exception!();
                        }
                        acc = result;
                        pc += $size;
                    }
                    Some((false, mid, env)) => {
                        let mid = mid.unwrap_or(NO_METHOD);
                        if !frame::push_interpreted_frame(
                            thread,
                            program,
                            mid,
                            FrameKind::Interpreted,
                            callee,
                            this,
                            TaggedValue::UNDEFINED,
                            env,
                            &args,
                        ) {
                            on_exception!();
                        }
                        reload_frame!();
                        continue 'dispatch;
                    }
                }
            }};
        }
        macro_rules! do_new {
            ($ctor:expr, $args:expr, $size:expr) => {{
                let ctor = $ctor;
                let args: Vec<TaggedValue> = $args;
                save_pc!();
                save_acc!();
                let parts = thread
                    .heap
                    .function(ctor)
                    .map(|f| (f.is_native(), f.kind.is_constructor(), f.method, f.env, f.is_base()));
                match parts {
                    None => {
                        thread.throw_type_error("value is not a constructor");
                        on_exception!();
                    }
                    Some((_, false, _, _, _)) => {
                        thread.throw_type_error("callee is not a constructor");
                        on_exception!();
                    }
                    Some((true, true, _, _, _)) => {
                        // Native constructors build their own this
                        let result =
                            call::call_native(thread, ctor, TaggedValue::UNDEFINED, ctor, &args);
                        if result.is_exception() {
                            on_exception!();
                        }
                        acc = result;
                        pc += $size;
                    }
                    Some((false, true, mid, env, is_base)) => {
                        let mid = mid.unwrap_or(NO_METHOD);
                        let this = if is_base {
                            call::new_this_object(thread, ctor)
                        } else {
                            TaggedValue::UNDEFINED
                        };
                        if !frame::push_interpreted_frame(
                            thread,
                            program,
                            mid,
                            FrameKind::FastNew,
                            ctor,
                            this,
                            ctor,
                            env,
                            &args,
                        ) {
                            on_exception!();
                        }
                        reload_frame!();
                        continue 'dispatch;
                    }
                }
            }};
        }

        // Implicit completion: fall off the end of the bytecode
        if pc >= code.len() {
            do_return!(TaggedValue::UNDEFINED);
        }

        let rd_u8 = |offset: usize| code.get(pc + offset).copied().unwrap_or(0);
        let rd_i8 = |offset: usize| rd_u8(offset) as i8;
        let rd_u16 =
            |offset: usize| u16::from_le_bytes([rd_u8(offset), rd_u8(offset + 1)]);
        let rd_i16 = |offset: usize| rd_u16(offset) as i16;
        let rd_u32 = |offset: usize| {
            u32::from_le_bytes([
                rd_u8(offset),
                rd_u8(offset + 1),
                rd_u8(offset + 2),
                rd_u8(offset + 3),
            ])
        };

        macro_rules! reg {
            ($v:expr) => {
                thread.stack[base + $v as usize]
            };
        }
        macro_rules! numeric_op {
            ($op:expr) => {{
                let lhs = reg!(rd_u8(1));
                match fast::number_binary($op, lhs, acc) {
                    Some(result) => acc = result,
                    None => {
                        save_pc!();
                        save_acc!();
                        acc = check!(slow::number_binary($op, thread, program, lhs, acc));
                    }
                }
                pc += 2;
            }};
        }
        macro_rules! compare_op {
            ($op:expr) => {{
                let lhs = reg!(rd_u8(1));
                match fast::number_compare($op, lhs, acc) {
                    Some(result) => acc = result,
                    None => {
                        save_pc!();
                        save_acc!();
                        acc = check!(slow::number_compare($op, thread, program, lhs, acc));
                    }
                }
                pc += 2;
            }};
        }
        macro_rules! bitwise_op {
            ($op:expr) => {{
                let lhs = reg!(rd_u8(1));
                match fast::bitwise($op, lhs, acc) {
                    Some(result) => acc = result,
                    None => {
                        save_pc!();
                        save_acc!();
                        acc = check!(slow::bitwise($op, thread, program, lhs, acc));
                    }
                }
                pc += 2;
            }};
        }
        macro_rules! jump_to {
            ($offset:expr) => {{
                let offset = $offset as isize;
                if offset <= 0 {
                    // Backedge: the only voluntary yield in a tight loop
                    save_pc!();
                    save_acc!();
                    let func = frame_ref!().func;
                    update_hotness(thread, func, offset as i32, method.ic_slots);
                }
                pc = (pc as isize + offset) as usize;
            }};
        }
        macro_rules! intern_str16 {
            ($offset:expr) => {{
                let name = method.string_at(rd_u16($offset)).unwrap_or("");
                thread.atoms.get_or_intern(name)
            }};
        }

        let op_byte = code[pc];
        let Some(op) = Opcode::from_u8(op_byte) else {
            save_pc!();
            save_acc!();
            debug_assert!(false, "undecodable opcode byte {:#04x}", op_byte);
            thread.throw_error("InternalError", "undecodable opcode");
            on_exception!()
        };

        match op {
            Opcode::Nop => pc += 1,

            // ==================== Accumulator constants ====================
            Opcode::LdUndefined => {
                acc = TaggedValue::UNDEFINED;
                pc += 1;
            }
            Opcode::LdNull => {
                acc = TaggedValue::NULL;
                pc += 1;
            }
            Opcode::LdTrue => {
                acc = TaggedValue::TRUE;
                pc += 1;
            }
            Opcode::LdFalse => {
                acc = TaggedValue::FALSE;
                pc += 1;
            }
            Opcode::LdHole => {
                acc = TaggedValue::HOLE;
                pc += 1;
            }
            Opcode::Ldai => {
                acc = TaggedValue::int(rd_u32(1) as i32);
                pc += 5;
            }
            Opcode::Fldai => {
                let bits = u64::from(rd_u32(1)) | (u64::from(rd_u32(5)) << 32);
                acc = TaggedValue::double(f64::from_bits(bits));
                pc += 9;
            }
            Opcode::LdaStr => {
                save_pc!();
                let text = method.string_at(rd_u16(1)).unwrap_or("").to_string();
                acc = thread.heap.alloc_string(text);
                pc += 3;
            }

            // ==================== Register moves ====================
            Opcode::Lda => {
                acc = reg!(rd_u8(1));
                pc += 2;
            }
            Opcode::Sta => {
                let v = rd_u8(1);
                thread.stack[base + v as usize] = acc;
                pc += 2;
            }
            Opcode::Mov => {
                let dst = rd_u8(1);
                let src = rd_u8(2);
                thread.stack[base + dst as usize] = thread.stack[base + src as usize];
                pc += 3;
            }

            // ==================== Arithmetic ====================
            Opcode::Add2 => numeric_op!(NumericOp::Add),
            Opcode::Sub2 => numeric_op!(NumericOp::Sub),
            Opcode::Mul2 => numeric_op!(NumericOp::Mul),
            Opcode::Div2 => numeric_op!(NumericOp::Div),
            Opcode::Mod2 => numeric_op!(NumericOp::Mod),
            Opcode::Exp => numeric_op!(NumericOp::Exp),
            Opcode::Shl2 => bitwise_op!(BitwiseOp::Shl),
            Opcode::Shr2 => bitwise_op!(BitwiseOp::Shr),
            Opcode::Ashr2 => bitwise_op!(BitwiseOp::Ashr),
            Opcode::And2 => bitwise_op!(BitwiseOp::And),
            Opcode::Or2 => bitwise_op!(BitwiseOp::Or),
            Opcode::Xor2 => bitwise_op!(BitwiseOp::Xor),

            // ==================== Comparison ====================
            Opcode::Eq => {
                let lhs = reg!(rd_u8(1));
                match fast::loose_equal(lhs, acc) {
                    Some(answer) => acc = TaggedValue::boolean(answer),
                    None => {
                        save_pc!();
                        save_acc!();
                        acc = check!(slow::loose_equal(thread, program, lhs, acc));
                    }
                }
                pc += 2;
            }
            Opcode::NotEq => {
                let lhs = reg!(rd_u8(1));
                match fast::loose_equal(lhs, acc) {
                    Some(answer) => acc = TaggedValue::boolean(!answer),
                    None => {
                        save_pc!();
                        save_acc!();
                        let result = check!(slow::loose_equal(thread, program, lhs, acc));
                        acc = TaggedValue::boolean(!result.as_boolean());
                    }
                }
                pc += 2;
            }
            Opcode::Less => compare_op!(CompareOp::Less),
            Opcode::LessEq => compare_op!(CompareOp::LessEq),
            Opcode::Greater => compare_op!(CompareOp::Greater),
            Opcode::GreaterEq => compare_op!(CompareOp::GreaterEq),
            Opcode::StrictEq => {
                let lhs = reg!(rd_u8(1));
                let answer = match fast::strict_equal(lhs, acc) {
                    Some(answer) => answer,
                    None => slow::strict_equal(&thread.heap, lhs, acc),
                };
                acc = TaggedValue::boolean(answer);
                pc += 2;
            }
            Opcode::StrictNotEq => {
                let lhs = reg!(rd_u8(1));
                let answer = match fast::strict_equal(lhs, acc) {
                    Some(answer) => answer,
                    None => slow::strict_equal(&thread.heap, lhs, acc),
                };
                acc = TaggedValue::boolean(!answer);
                pc += 2;
            }

            // ==================== Unary ====================
            Opcode::Neg => {
                if acc.is_int() {
                    let value = acc.as_int();
                    acc = if value != 0 && value != i32::MIN {
                        TaggedValue::int(-value)
                    } else {
                        TaggedValue::double(-(value as f64))
                    };
                } else if acc.is_double() {
                    acc = TaggedValue::double(-acc.as_double());
                } else {
                    save_pc!();
                    save_acc!();
                    let numeric = check!(slow::to_numeric(thread, program, acc));
                    if let Some(n) = thread.heap.bigint(numeric).cloned() {
                        acc = thread.heap.alloc_bigint(-n);
                    } else if numeric.is_int() {
                        let value = numeric.as_int();
                        acc = if value != 0 && value != i32::MIN {
                            TaggedValue::int(-value)
                        } else {
                            TaggedValue::double(-(value as f64))
                        };
                    } else {
                        acc = TaggedValue::double(-numeric.as_number());
                    }
                }
                pc += 1;
            }
            Opcode::Not => {
                if acc.is_number() {
                    let value = if acc.is_int() {
                        acc.as_int()
                    } else {
                        fast::to_int32(acc.as_double())
                    };
                    acc = TaggedValue::int(!value);
                } else {
                    save_pc!();
                    save_acc!();
                    let numeric = check!(slow::to_number(thread, program, acc));
                    let value = if numeric.is_int() {
                        numeric.as_int()
                    } else {
                        fast::to_int32(numeric.as_number())
                    };
                    acc = TaggedValue::int(!value);
                }
                pc += 1;
            }
            Opcode::Inc => {
                match fast::number_binary(NumericOp::Add, acc, TaggedValue::int(1)) {
                    Some(result) => acc = result,
                    None => {
                        save_pc!();
                        save_acc!();
                        let numeric = check!(slow::to_numeric(thread, program, acc));
                        if let Some(n) = thread.heap.bigint(numeric).cloned() {
                            acc = thread.heap.alloc_bigint(n + 1);
                        } else {
                            acc = fast::number_binary(NumericOp::Add, numeric, TaggedValue::int(1))
                                .unwrap_or(TaggedValue::double(f64::NAN));
                        }
                    }
                }
                pc += 1;
            }
            Opcode::Dec => {
                match fast::number_binary(NumericOp::Sub, acc, TaggedValue::int(1)) {
                    Some(result) => acc = result,
                    None => {
                        save_pc!();
                        save_acc!();
                        let numeric = check!(slow::to_numeric(thread, program, acc));
                        if let Some(n) = thread.heap.bigint(numeric).cloned() {
                            acc = thread.heap.alloc_bigint(n - 1);
                        } else {
                            acc = fast::number_binary(NumericOp::Sub, numeric, TaggedValue::int(1))
                                .unwrap_or(TaggedValue::double(f64::NAN));
                        }
                    }
                }
                pc += 1;
            }
            Opcode::Typeof => {
                save_pc!();
                save_acc!();
                acc = slow::type_of(thread, acc);
                pc += 1;
            }
            Opcode::IsTrue => {
                acc = TaggedValue::boolean(fast::to_boolean(&thread.heap, acc));
                pc += 1;
            }
            Opcode::IsFalse => {
                acc = TaggedValue::boolean(!fast::to_boolean(&thread.heap, acc));
                pc += 1;
            }
            Opcode::ToNumeric => {
                if !acc.is_number() && thread.heap.bigint(acc).is_none() {
                    save_pc!();
                    save_acc!();
                    acc = check!(slow::to_numeric(thread, program, acc));
                }
                pc += 1;
            }

            // ==================== Jumps ====================
            Opcode::Jmp8 => jump_to!(rd_i8(1)),
            Opcode::Jmp16 => jump_to!(rd_i16(1)),
            Opcode::Jeqz8 => {
                if is_zero_or_false(acc) {
                    jump_to!(rd_i8(1));
                } else {
                    pc += 2;
                }
            }
            Opcode::Jeqz16 => {
                if is_zero_or_false(acc) {
                    jump_to!(rd_i16(1));
                } else {
                    pc += 3;
                }
            }
            Opcode::Jnez8 => {
                if !is_zero_or_false(acc) {
                    jump_to!(rd_i8(1));
                } else {
                    pc += 2;
                }
            }

            // ==================== Lexical environment ====================
            Opcode::NewLexEnv => {
                save_pc!();
                save_acc!();
                let slots = rd_u8(1) as usize;
                let parent = frame_ref!().env;
                let env = thread
                    .heap
                    .alloc_env(super::environment::LexicalEnv::new(parent, slots));
                frame_mut!().env = env;
                acc = env;
                pc += 2;
            }
            Opcode::PopLexEnv => {
                let env = frame_ref!().env;
                let parent = thread
                    .heap
                    .env(env)
                    .map(|record| record.parent())
                    .unwrap_or(TaggedValue::UNDEFINED);
                frame_mut!().env = parent;
                pc += 1;
            }
            Opcode::LdLexVar => {
                save_pc!();
                acc = check!(ld_lex_var(thread, rd_u8(1) as usize, rd_u8(2) as usize));
                pc += 3;
            }
            Opcode::StLexVar => {
                save_pc!();
                save_acc!();
                let _ = check!(st_lex_var(
                    thread,
                    rd_u8(1) as usize,
                    rd_u8(2) as usize,
                    acc
                ));
                pc += 3;
            }

            // ==================== Globals ====================
            Opcode::TryLdGlobalByName => {
                save_pc!();
                save_acc!();
                let name = intern_str16!(1);
                acc = check!(slow::try_load_global(thread, name));
                pc += 3;
            }
            Opcode::TryStGlobalByName => {
                save_pc!();
                save_acc!();
                let name = intern_str16!(1);
                let _ = check!(slow::try_store_global(thread, name, acc));
                restore_acc!();
                pc += 3;
            }
            Opcode::LdGlobalVar => {
                let name = intern_str16!(1);
                acc = slow::load_global(thread, name);
                pc += 3;
            }
            Opcode::StGlobalVar => {
                save_pc!();
                save_acc!();
                let name = intern_str16!(1);
                slow::store_global(thread, name, acc);
                restore_acc!();
                pc += 3;
            }

            // ==================== Property access ====================
            Opcode::LdObjByName => {
                save_pc!();
                save_acc!();
                let ic = rd_u8(1);
                let name = intern_str16!(2);
                let func = frame_ref!().func;
                acc = check!(load_property_with_ic(thread, program, func, ic, acc, name));
                pc += 4;
            }
            Opcode::StObjByName => {
                save_pc!();
                save_acc!();
                let ic = rd_u8(1);
                let name = intern_str16!(2);
                let receiver = reg!(rd_u8(4));
                let func = frame_ref!().func;
                let _ = check!(store_property_with_ic(
                    thread, program, func, ic, receiver, name, acc
                ));
                restore_acc!();
                pc += 5;
            }
            Opcode::LdObjByValue => {
                save_pc!();
                save_acc!();
                let ic = rd_u8(1);
                let receiver = reg!(rd_u8(2));
                let name = match to_property_key(thread, program, acc) {
                    Ok(name) => name,
                    Err(exception) => {
                        let _ = check!(exception);
                        unreachable!()
                    }
                };
                let func = frame_ref!().func;
                acc = check!(load_property_with_ic(
                    thread, program, func, ic, receiver, name
                ));
                pc += 3;
            }
            Opcode::StObjByValue => {
                save_pc!();
                save_acc!();
                let ic = rd_u8(1);
                let receiver = reg!(rd_u8(2));
                let key = reg!(rd_u8(3));
                let name = match to_property_key(thread, program, key) {
                    Ok(name) => name,
                    Err(exception) => {
                        let _ = check!(exception);
                        unreachable!()
                    }
                };
                let func = frame_ref!().func;
                let _ = check!(store_property_with_ic(
                    thread, program, func, ic, receiver, name, acc
                ));
                restore_acc!();
                pc += 4;
            }
            Opcode::LdObjByIndex => {
                save_pc!();
                save_acc!();
                let name = {
                    let text = rd_u16(1).to_string();
                    thread.atoms.get_or_intern(text)
                };
                acc = check!(slow::get_property(thread, program, acc, name));
                pc += 3;
            }
            Opcode::StObjByIndex => {
                save_pc!();
                save_acc!();
                let receiver = reg!(rd_u8(1));
                let name = {
                    let text = rd_u16(2).to_string();
                    thread.atoms.get_or_intern(text)
                };
                let _ = check!(slow::set_property(thread, program, receiver, name, acc));
                restore_acc!();
                pc += 4;
            }
            Opcode::StOwnByName => {
                save_pc!();
                save_acc!();
                let name = intern_str16!(1);
                let receiver = reg!(rd_u8(3));
                let _ = check!(slow::set_own_property(thread, receiver, name, acc));
                restore_acc!();
                pc += 4;
            }
            Opcode::StOwnByValue => {
                save_pc!();
                save_acc!();
                let receiver = reg!(rd_u8(1));
                let key = reg!(rd_u8(2));
                let name = match to_property_key(thread, program, key) {
                    Ok(name) => name,
                    Err(exception) => {
                        let _ = check!(exception);
                        unreachable!()
                    }
                };
                let _ = check!(slow::set_own_property(thread, receiver, name, acc));
                restore_acc!();
                pc += 3;
            }
            Opcode::LdThisByName => {
                save_pc!();
                save_acc!();
                let ic = rd_u8(1);
                let name = intern_str16!(2);
                let this = frame_ref!().this;
                let func = frame_ref!().func;
                acc = check!(load_property_with_ic(thread, program, func, ic, this, name));
                pc += 4;
            }
            Opcode::StThisByName => {
                save_pc!();
                save_acc!();
                let ic = rd_u8(1);
                let name = intern_str16!(2);
                let this = frame_ref!().this;
                let func = frame_ref!().func;
                let _ = check!(store_property_with_ic(
                    thread, program, func, ic, this, name, acc
                ));
                restore_acc!();
                pc += 4;
            }

            // ==================== Object / function construction ====================
            Opcode::CreateEmptyObject => {
                save_pc!();
                save_acc!();
                acc = thread.heap.alloc_object(super::object::JsObject::new());
                pc += 1;
            }
            Opcode::DefineFunc => {
                save_pc!();
                save_acc!();
                let Some(mid) = method.method_at(rd_u16(1)) else {
                    thread.throw_error("InternalError", "bad method handle");
                    on_exception!()
                };
                let kind = program.methods[mid as usize].kind;
                let env = frame_ref!().env;
                let hotness = thread.config().hotness_threshold;
                let proto = thread.heap.alloc_object(super::object::JsObject::new());
                let mut function = super::function::JsFunction::interpreted(mid, kind, env, hotness);
                function.proto = proto;
                acc = thread.heap.alloc_function(function);
                pc += 3;
            }
            Opcode::DefineMethod => {
                save_pc!();
                save_acc!();
                let Some(mid) = method.method_at(rd_u16(1)) else {
                    thread.throw_error("InternalError", "bad method handle");
                    on_exception!()
                };
                let kind = program.methods[mid as usize].kind;
                let home = reg!(rd_u8(3));
                let env = frame_ref!().env;
                let hotness = thread.config().hotness_threshold;
                let mut function = super::function::JsFunction::interpreted(mid, kind, env, hotness);
                function.home_object = home;
                acc = thread.heap.alloc_function(function);
                pc += 4;
            }
            Opcode::DefineClass => {
                save_pc!();
                save_acc!();
                let Some(mid) = method.method_at(rd_u16(1)) else {
                    thread.throw_error("InternalError", "bad method handle");
                    on_exception!()
                };
                let parent = reg!(rd_u8(3));
                if !parent.is_undefined() && thread.heap.function(parent).is_none() {
                    thread.throw_type_error("Class extends value is not a constructor");
                    on_exception!();
                }
                let kind = program.methods[mid as usize].kind;
                let env = frame_ref!().env;
                let hotness = thread.config().hotness_threshold;

                let parent_proto = thread
                    .heap
                    .function(parent)
                    .map(|f| f.proto)
                    .unwrap_or(TaggedValue::NULL);
                let mut proto_obj = super::object::JsObject::with_prototype(
                    if parent_proto.is_heap_ref() { parent_proto } else { TaggedValue::NULL },
                );
                proto_obj.set_flags(super::object::ObjectFlags::CLASS_PROTOTYPE);
                let proto = thread.heap.alloc_object(proto_obj);

                let mut ctor = super::function::JsFunction::interpreted(mid, kind, env, hotness);
                ctor.proto = proto;
                ctor.parent_ctor = parent;
                acc = thread.heap.alloc_function(ctor);
                pc += 4;
            }
            Opcode::GetUnmappedArgs => {
                save_pc!();
                save_acc!();
                let record = frame_ref!();
                let count = record.actual_argc.min(record.argc) as usize;
                let start = record.arg_index(0);
                let values: Vec<TaggedValue> = thread.stack[start..start + count].to_vec();
                acc = slow::create_array_like(thread, &values);
                pc += 1;
            }
            Opcode::CopyRestArgs => {
                save_pc!();
                save_acc!();
                let from = rd_u8(1) as usize;
                let record = frame_ref!();
                let count = record.actual_argc.min(record.argc) as usize;
                let start = record.arg_index(0);
                let values: Vec<TaggedValue> = if from < count {
                    thread.stack[start + from..start + count].to_vec()
                } else {
                    Vec::new()
                };
                acc = slow::create_array_like(thread, &values);
                pc += 2;
            }

            // ==================== Calls ====================
            Opcode::CallArg0 => do_call!(acc, TaggedValue::UNDEFINED, Vec::new(), 1),
            Opcode::CallArg1 => {
                do_call!(acc, TaggedValue::UNDEFINED, vec![reg!(rd_u8(1))], 2)
            }
            Opcode::CallArgs2 => do_call!(
                acc,
                TaggedValue::UNDEFINED,
                vec![reg!(rd_u8(1)), reg!(rd_u8(2))],
                3
            ),
            Opcode::CallArgs3 => do_call!(
                acc,
                TaggedValue::UNDEFINED,
                vec![reg!(rd_u8(1)), reg!(rd_u8(2)), reg!(rd_u8(3))],
                4
            ),
            Opcode::CallRange => {
                let argc = rd_u8(1) as usize;
                let start = rd_u8(2) as usize;
                let args: Vec<TaggedValue> =
                    (0..argc).map(|i| reg!((start + i) as u8)).collect();
                do_call!(acc, TaggedValue::UNDEFINED, args, 3)
            }
            Opcode::CallThis0 => do_call!(acc, reg!(rd_u8(1)), Vec::new(), 2),
            Opcode::CallThis1 => do_call!(acc, reg!(rd_u8(1)), vec![reg!(rd_u8(2))], 3),
            Opcode::CallThis2 => do_call!(
                acc,
                reg!(rd_u8(1)),
                vec![reg!(rd_u8(2)), reg!(rd_u8(3))],
                4
            ),
            Opcode::CallThis3 => do_call!(
                acc,
                reg!(rd_u8(1)),
                vec![reg!(rd_u8(2)), reg!(rd_u8(3)), reg!(rd_u8(4))],
                5
            ),
            Opcode::CallThisRange => {
                let argc = rd_u8(1) as usize;
                let start = rd_u8(2) as usize;
                let this = reg!(start as u8);
                let args: Vec<TaggedValue> =
                    (0..argc).map(|i| reg!((start + 1 + i) as u8)).collect();
                do_call!(acc, this, args, 3)
            }
            Opcode::NewObjRange => {
                let count = rd_u8(1) as usize;
                let start = rd_u8(2) as usize;
                let ctor = reg!(start as u8);
                let args: Vec<TaggedValue> =
                    (1..count).map(|i| reg!((start + i) as u8)).collect();
                do_new!(ctor, args, 3)
            }
            Opcode::SuperCallThisRange => {
                let argc = rd_u8(1) as usize;
                let start = rd_u8(2) as usize;
                let args: Vec<TaggedValue> =
                    (0..argc).map(|i| reg!((start + i) as u8)).collect();
                save_pc!();
                save_acc!();
                let this = frame_ref!().this;
                if !this.is_undefined() && !this.is_hole() {
                    thread.throw_reference_error("super() has already been called");
                    on_exception!();
                }
                let func = frame_ref!().func;
                let new_target = frame_ref!().new_target;
                let super_ctor = thread
                    .heap
                    .function(func)
                    .map(|f| f.parent_ctor)
                    .unwrap_or(TaggedValue::UNDEFINED);
                if thread.heap.function(super_ctor).is_none() {
                    thread.throw_type_error("Super constructor is not a constructor");
                    on_exception!();
                }
                let result = check!(call::construct(thread, program, super_ctor, new_target, &args));
                frame_mut!().this = result;
                acc = result;
                pc += 3;
            }

            // ==================== Frame introspection ====================
            Opcode::LdThis => {
                acc = frame_ref!().this;
                pc += 1;
            }
            Opcode::LdNewTarget => {
                acc = frame_ref!().new_target;
                pc += 1;
            }
            Opcode::LdFunction => {
                acc = frame_ref!().func;
                pc += 1;
            }

            // ==================== Generators ====================
            Opcode::CreateGeneratorObj => {
                save_pc!();
                save_acc!();
                let func_value = reg!(rd_u8(1));
                let parts = thread.heap.function(func_value).and_then(|f| f.method);
                let Some(mid) = parts else {
                    thread.throw_type_error("value is not a generator function");
                    on_exception!()
                };
                let record = frame_ref!();
                let context = super::generator::GeneratorContext {
                    method: mid,
                    func: func_value,
                    this: record.this,
                    env: record.env,
                    acc: TaggedValue::UNDEFINED,
                    resume_offset: 0,
                    nregs: record.nregs,
                    argc: record.argc,
                    regs: Box::new([]),
                };
                acc = thread
                    .heap
                    .alloc_generator(super::generator::GeneratorObject::new(context));
                pc += 2;
            }
            Opcode::SuspendGenerator => {
                let gen_ref = reg!(rd_u8(1));
                let record = frame_ref!();
                let window_len = record.nregs as usize + record.argc as usize;
                let window: Vec<TaggedValue> =
                    thread.stack[record.base..record.base + window_len].to_vec();
                let (nregs, argc) = (record.nregs, record.argc);
                let (this, env) = (record.this, record.env);
                let resume_offset = (pc + 2) as u32;
                let Some(generator) = thread.heap.generator_mut(gen_ref) else {
                    save_pc!();
                    save_acc!();
                    thread.throw_type_error("value is not a generator object");
                    on_exception!()
                };
                generator.context.regs = window.into_boxed_slice();
                generator.context.resume_offset = resume_offset;
                generator.context.this = this;
                generator.context.env = env;
                generator.context.acc = acc;
                generator.context.nregs = nregs;
                generator.context.argc = argc;
                generator.state = GeneratorState::SuspendedYield;
                trace!(resume_offset, "generator suspended");
                do_return!(acc);
            }
            Opcode::ResumeGenerator => {
                let gen_ref = reg!(rd_u8(1));
                acc = thread
                    .heap
                    .generator(gen_ref)
                    .map(|g| g.resume_value)
                    .unwrap_or(TaggedValue::UNDEFINED);
                pc += 2;
            }
            Opcode::GetResumeMode => {
                let gen_ref = reg!(rd_u8(1));
                acc = thread
                    .heap
                    .generator(gen_ref)
                    .map(|g| TaggedValue::int(g.resume_mode as i32))
                    .unwrap_or(TaggedValue::UNDEFINED);
                pc += 2;
            }

            // ==================== Returns ====================
            Opcode::Return => do_return!(acc),
            Opcode::ReturnUndefined => do_return!(TaggedValue::UNDEFINED),

            // ==================== Throw family ====================
            Opcode::ThrowPrefix => {
                let Some(throw_op) = ThrowOp::from_u8(rd_u8(1)) else {
                    save_pc!();
                    save_acc!();
                    debug_assert!(false, "undecodable throw opcode");
                    thread.throw_error("InternalError", "undecodable throw opcode");
                    on_exception!()
                };
                match throw_op {
                    ThrowOp::Throw => {
                        save_pc!();
                        thread.set_exception_value(acc);
                        on_exception!();
                    }
                    ThrowOp::NotExists => {
                        save_pc!();
                        thread.throw_reference_error("throw target is not defined");
                        on_exception!();
                    }
                    ThrowOp::PatternNonCoercible => {
                        save_pc!();
                        thread.throw_type_error("Cannot destructure a value that is not an object");
                        on_exception!();
                    }
                    ThrowOp::DeleteSuperProperty => {
                        save_pc!();
                        thread.throw_reference_error("Cannot delete a property of super");
                        on_exception!();
                    }
                    ThrowOp::ConstAssignment => {
                        save_pc!();
                        let name = thread
                            .heap
                            .string(reg!(rd_u8(2)))
                            .unwrap_or("")
                            .to_string();
                        let text = format!("Assignment to constant variable '{}'", name);
                        thread.throw_type_error(&text);
                        on_exception!();
                    }
                    ThrowOp::IfNotObject => {
                        if thread.heap.is_ecma_object(reg!(rd_u8(2))) {
                            pc += 3;
                        } else {
                            save_pc!();
                            thread.throw_type_error("value is not an object");
                            on_exception!();
                        }
                    }
                    ThrowOp::UndefinedIfHole => {
                        if acc.is_hole() {
                            save_pc!();
                            let name = thread
                                .heap
                                .string(reg!(rd_u8(2)))
                                .unwrap_or("")
                                .to_string();
                            let text =
                                format!("Cannot access '{}' before initialization", name);
                            thread.throw_reference_error(&text);
                            on_exception!();
                        }
                        pc += 3;
                    }
                    ThrowOp::IfSuperNotCorrectCall => {
                        let this = frame_ref!().this;
                        if this.is_undefined() || this.is_hole() {
                            save_pc!();
                            let message = if rd_u16(2) == 0 {
                                "'this' is not initialized, call super() first"
                            } else {
                                "super() must be called before returning from a derived constructor"
                            };
                            thread.throw_reference_error(message);
                            on_exception!();
                        }
                        pc += 4;
                    }
                }
            }

            // ==================== Wide family ====================
            Opcode::WidePrefix => {
                let Some(wide_op) = WideOp::from_u8(rd_u8(1)) else {
                    save_pc!();
                    save_acc!();
                    debug_assert!(false, "undecodable wide opcode");
                    thread.throw_error("InternalError", "undecodable wide opcode");
                    on_exception!()
                };
                match wide_op {
                    WideOp::CallRange => {
                        let argc = rd_u16(2) as usize;
                        let start = rd_u8(4) as usize;
                        let args: Vec<TaggedValue> =
                            (0..argc).map(|i| thread.stack[base + start + i]).collect();
                        do_call!(acc, TaggedValue::UNDEFINED, args, 5)
                    }
                    WideOp::CallThisRange => {
                        let argc = rd_u16(2) as usize;
                        let start = rd_u8(4) as usize;
                        let this = thread.stack[base + start];
                        let args: Vec<TaggedValue> = (0..argc)
                            .map(|i| thread.stack[base + start + 1 + i])
                            .collect();
                        do_call!(acc, this, args, 5)
                    }
                    WideOp::NewObjRange => {
                        let count = rd_u16(2) as usize;
                        let start = rd_u8(4) as usize;
                        let ctor = thread.stack[base + start];
                        let args: Vec<TaggedValue> =
                            (1..count).map(|i| thread.stack[base + start + i]).collect();
                        do_new!(ctor, args, 5)
                    }
                    WideOp::LdLexVar => {
                        save_pc!();
                        acc = check!(ld_lex_var(
                            thread,
                            rd_u16(2) as usize,
                            rd_u16(4) as usize
                        ));
                        pc += 6;
                    }
                    WideOp::StLexVar => {
                        save_pc!();
                        save_acc!();
                        let _ = check!(st_lex_var(
                            thread,
                            rd_u16(2) as usize,
                            rd_u16(4) as usize,
                            acc
                        ));
                        pc += 6;
                    }
                    WideOp::LdObjByIndex => {
                        save_pc!();
                        save_acc!();
                        let name = {
                            let text = rd_u32(2).to_string();
                            thread.atoms.get_or_intern(text)
                        };
                        acc = check!(slow::get_property(thread, program, acc, name));
                        pc += 6;
                    }
                    WideOp::StObjByIndex => {
                        save_pc!();
                        save_acc!();
                        let receiver = reg!(rd_u8(2));
                        let name = {
                            let text = rd_u32(3).to_string();
                            thread.atoms.get_or_intern(text)
                        };
                        let _ = check!(slow::set_property(thread, program, receiver, name, acc));
                        restore_acc!();
                        pc += 7;
                    }
                    WideOp::CopyRestArgs => {
                        save_pc!();
                        save_acc!();
                        let from = rd_u16(2) as usize;
                        let record = frame_ref!();
                        let count = record.actual_argc.min(record.argc) as usize;
                        let start = record.arg_index(0);
                        let values: Vec<TaggedValue> = if from < count {
                            thread.stack[start + from..start + count].to_vec()
                        } else {
                            Vec::new()
                        };
                        acc = slow::create_array_like(thread, &values);
                        pc += 4;
                    }
                }
            }
        }
    }
}

/// The branch-on-falsy test used by `jeqz`/`jnez`: false or numeric zero.
/// General truthiness goes through `istrue`/`isfalse` first.
#[inline]
fn is_zero_or_false(value: TaggedValue) -> bool {
    if value.is_false() {
        return true;
    }
    if value.is_int() {
        return value.as_int() == 0;
    }
    if value.is_double() {
        return value.as_double() == 0.0;
    }
    false
}
