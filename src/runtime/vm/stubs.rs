//! Fast and slow runtime stubs
//!
//! The dispatch loop's handlers try the [`fast`] tier first: allocation-free,
//! never-throwing helpers that answer `None` whenever the operands fall
//! outside the cheap cases. The [`slow`] tier implements the full ECMA-262
//! coercion semantics; it may allocate, re-enter the interpreter (valueOf /
//! toString / accessors) and throw, signalled by returning
//! [`TaggedValue::EXCEPTION`] with a pending exception on the thread.
//! Handlers must save pc (and acc, when live) before any slow call.

use crate::bytecode::Program;
use crate::runtime::heap::Heap;
use crate::runtime::object::{Atom, JsObject, SlotAttr};
use crate::runtime::thread::JsThread;
use crate::runtime::value::TaggedValue;

/// Binary numeric operator selector shared by every arithmetic opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
}

/// Relational operator selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

/// Bitwise operator selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
    Shl,
    /// Logical (zero-fill) right shift
    Shr,
    /// Arithmetic right shift
    Ashr,
}

pub mod fast {
    //! Allocation-free fast paths. `None` means "take the slow stub".

    use super::*;

    /// ECMA-262 ToInt32 on an already-numeric value
    pub fn to_int32(value: f64) -> i32 {
        if !value.is_finite() || value == 0.0 {
            return 0;
        }
        let modulo = value.trunc().rem_euclid(4294967296.0);
        if modulo >= 2147483648.0 {
            (modulo - 4294967296.0) as i32
        } else {
            modulo as i32
        }
    }

    /// ECMA-262 ToUint32 on an already-numeric value
    pub fn to_uint32(value: f64) -> u32 {
        to_int32(value) as u32
    }

    /// Shared numeric core for the arithmetic opcode family.
    ///
    /// Exact small-int results stay ints; a result that escapes the int32
    /// range (or is fractional, or needs a signed zero) promotes to double,
    /// never wraps. Non-number operands answer `None`.
    pub fn number_binary(op: NumericOp, lhs: TaggedValue, rhs: TaggedValue) -> Option<TaggedValue> {
        if !lhs.is_number() || !rhs.is_number() {
            return None;
        }
        if lhs.is_int() && rhs.is_int() {
            let a = lhs.as_int();
            let b = rhs.as_int();
            match op {
                NumericOp::Add => {
                    return Some(match a.checked_add(b) {
                        Some(sum) => TaggedValue::int(sum),
                        None => TaggedValue::double(a as f64 + b as f64),
                    });
                }
                NumericOp::Sub => {
                    return Some(match a.checked_sub(b) {
                        Some(diff) => TaggedValue::int(diff),
                        None => TaggedValue::double(a as f64 - b as f64),
                    });
                }
                NumericOp::Mul => {
                    // An int zero result may need a negative sign; use doubles
                    if a == 0 || b == 0 {
                        return Some(number_result(a as f64 * b as f64));
                    }
                    return Some(match a.checked_mul(b) {
                        Some(product) => TaggedValue::int(product),
                        None => TaggedValue::double(a as f64 * b as f64),
                    });
                }
                NumericOp::Div => {
                    if b != 0 && !(a == 0 && b < 0) {
                        if let (Some(0), Some(quotient)) = (a.checked_rem(b), a.checked_div(b)) {
                            return Some(TaggedValue::int(quotient));
                        }
                    }
                    return Some(TaggedValue::double(a as f64 / b as f64));
                }
                NumericOp::Mod => {
                    // Sign of the result follows the dividend; an exact zero
                    // from a negative dividend is -0
                    if b != 0 && !(a == i32::MIN && b == -1) {
                        let rem = a % b;
                        if rem != 0 || a >= 0 {
                            return Some(TaggedValue::int(rem));
                        }
                    }
                    return Some(TaggedValue::double((a as f64) % (b as f64)));
                }
                NumericOp::Exp => {
                    return Some(number_result((a as f64).powf(b as f64)));
                }
            }
        }
        let a = lhs.as_number();
        let b = rhs.as_number();
        let result = match op {
            NumericOp::Add => a + b,
            NumericOp::Sub => a - b,
            NumericOp::Mul => a * b,
            NumericOp::Div => a / b,
            NumericOp::Mod => {
                // IEEE remainder per ECMA: result sign follows the dividend
                if b == 0.0 || a.is_infinite() || a.is_nan() || b.is_nan() {
                    f64::NAN
                } else if b.is_infinite() {
                    a
                } else {
                    a % b
                }
            }
            NumericOp::Exp => a.powf(b),
        };
        Some(TaggedValue::double(result))
    }

    /// Tag a numeric result, preferring the int encoding when exact
    pub fn number_result(value: f64) -> TaggedValue {
        if value.fract() == 0.0
            && value >= i32::MIN as f64
            && value <= i32::MAX as f64
            && !(value == 0.0 && value.is_sign_negative())
        {
            TaggedValue::int(value as i32)
        } else {
            TaggedValue::double(value)
        }
    }

    /// Relational comparison on two numbers; NaN compares false
    pub fn number_compare(op: CompareOp, lhs: TaggedValue, rhs: TaggedValue) -> Option<TaggedValue> {
        if !lhs.is_number() || !rhs.is_number() {
            return None;
        }
        let a = lhs.as_number();
        let b = rhs.as_number();
        let result = match op {
            CompareOp::Less => a < b,
            CompareOp::LessEq => a <= b,
            CompareOp::Greater => a > b,
            CompareOp::GreaterEq => a >= b,
        };
        Some(TaggedValue::boolean(result))
    }

    /// Loose equality for the cases needing no coercion or heap access
    pub fn loose_equal(lhs: TaggedValue, rhs: TaggedValue) -> Option<bool> {
        if lhs.is_number() && rhs.is_number() {
            return Some(lhs.as_number() == rhs.as_number());
        }
        if lhs.is_boolean() && rhs.is_boolean() {
            return Some(lhs == rhs);
        }
        if lhs.is_undefined_or_null() && rhs.is_undefined_or_null() {
            return Some(true);
        }
        if lhs.is_undefined_or_null() != rhs.is_undefined_or_null() {
            // null/undefined is loosely equal only to null/undefined;
            // a heap operand could still be coerced, so only bail there
            if !lhs.is_heap_ref() && !rhs.is_heap_ref() {
                return Some(false);
            }
        }
        if lhs.is_heap_ref() && rhs.is_heap_ref() && lhs == rhs {
            return Some(true);
        }
        None
    }

    /// Strict equality without string-content comparison
    pub fn strict_equal(lhs: TaggedValue, rhs: TaggedValue) -> Option<bool> {
        if lhs.is_number() || rhs.is_number() {
            if lhs.is_number() && rhs.is_number() {
                return Some(lhs.as_number() == rhs.as_number());
            }
            return Some(false);
        }
        if lhs.is_heap_ref() && rhs.is_heap_ref() {
            if lhs == rhs {
                return Some(true);
            }
            // Distinct refs may still be equal strings
            return None;
        }
        Some(lhs == rhs)
    }

    /// Bitwise core; any two numbers are cheap, everything else coerces
    pub fn bitwise(op: BitwiseOp, lhs: TaggedValue, rhs: TaggedValue) -> Option<TaggedValue> {
        if !lhs.is_number() || !rhs.is_number() {
            return None;
        }
        let a = if lhs.is_int() { lhs.as_int() } else { to_int32(lhs.as_double()) };
        let b = if rhs.is_int() { rhs.as_int() } else { to_int32(rhs.as_double()) };
        let result = match op {
            BitwiseOp::And => a & b,
            BitwiseOp::Or => a | b,
            BitwiseOp::Xor => a ^ b,
            // Shift counts are masked to five bits
            BitwiseOp::Shl => a.wrapping_shl((b & 0x1f) as u32),
            BitwiseOp::Ashr => a.wrapping_shr((b & 0x1f) as u32),
            BitwiseOp::Shr => {
                let unsigned = (a as u32).wrapping_shr((b & 0x1f) as u32);
                if unsigned > i32::MAX as u32 {
                    return Some(TaggedValue::double(unsigned as f64));
                }
                unsigned as i32
            }
        };
        Some(TaggedValue::int(result))
    }

    /// Truthiness; pure but needs the heap for strings and bigints
    pub fn to_boolean(heap: &Heap, value: TaggedValue) -> bool {
        use num_traits::Zero;
        if value.is_int() {
            return value.as_int() != 0;
        }
        if value.is_double() {
            let d = value.as_double();
            return d != 0.0 && !d.is_nan();
        }
        if value.is_boolean() {
            return value.as_boolean();
        }
        if value.is_undefined_or_null() || value.is_hole() {
            return false;
        }
        if let Some(s) = heap.string(value) {
            return !s.is_empty();
        }
        if let Some(n) = heap.bigint(value) {
            return !n.is_zero();
        }
        // Objects, functions, generators
        true
    }

    /// Own-chain data-property lookup. `None` means the receiver is not a
    /// plain object path (accessor hit, missing heap object) and the slow
    /// stub must decide.
    pub fn get_property(heap: &Heap, receiver: TaggedValue, name: Atom) -> Option<TaggedValue> {
        let mut current = receiver;
        loop {
            let obj = heap.object(current)?;
            if let Some(slot) = obj.slot_of(name) {
                if obj.attr_at(slot) != SlotAttr::Data {
                    return None;
                }
                return Some(obj.value_at(slot));
            }
            let proto = obj.prototype();
            if proto.is_null() || proto.is_undefined() {
                return Some(TaggedValue::UNDEFINED);
            }
            current = proto;
        }
    }

    /// Store to an existing own data slot; anything else is the slow stub's
    /// business (defines, setters, rejections).
    pub fn set_property(
        heap: &mut Heap,
        receiver: TaggedValue,
        name: Atom,
        value: TaggedValue,
    ) -> Option<()> {
        let obj = heap.object_mut(receiver)?;
        let slot = obj.slot_of(name)?;
        if obj.attr_at(slot) != SlotAttr::Data {
            return None;
        }
        obj.set_value_at(slot, value);
        Some(())
    }
}

pub mod slow {
    //! Full ECMA-262 semantics; may allocate, re-enter, and throw.

    use num_bigint::BigInt;
    use num_traits::ToPrimitive;

    use super::super::call;
    use super::*;

    /// Format a number the way the guest sees it
    pub fn number_to_string(value: f64) -> String {
        if value.is_nan() {
            return "NaN".to_string();
        }
        if value.is_infinite() {
            return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }
        if value == 0.0 {
            return "0".to_string();
        }
        if value.fract() == 0.0 && value.abs() < 1e21 {
            return format!("{}", value as i64);
        }
        format!("{}", value)
    }

    /// Parse a string literal as a number (ToNumber on strings)
    pub fn string_to_number(text: &str) -> f64 {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return 0.0;
        }
        match trimmed {
            "Infinity" | "+Infinity" => return f64::INFINITY,
            "-Infinity" => return f64::NEG_INFINITY,
            _ => {}
        }
        if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            return match i64::from_str_radix(hex, 16) {
                Ok(v) => v as f64,
                Err(_) => f64::NAN,
            };
        }
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    }

    /// OrdinaryToPrimitive with number hint: valueOf, then toString.
    /// May re-enter the interpreter and may throw.
    pub fn to_primitive(
        thread: &mut JsThread,
        program: &Program,
        value: TaggedValue,
    ) -> TaggedValue {
        if !thread.heap.is_ecma_object(value) {
            return value;
        }
        for method_name in ["valueOf", "toString"] {
            let atom = thread.intern(method_name);
            let method = fast::get_property(&thread.heap, value, atom)
                .unwrap_or(TaggedValue::UNDEFINED);
            if thread.heap.is_callable(method) {
                let result = call::execute_call(thread, program, method, value, &[]);
                if result.is_exception() {
                    return result;
                }
                if !thread.heap.is_ecma_object(result) {
                    return result;
                }
            }
        }
        thread.throw_type_error("Cannot convert object to primitive value")
    }

    /// ToNumber. BigInt operands throw; use [`to_numeric`] where BigInts
    /// are allowed through.
    pub fn to_number(thread: &mut JsThread, program: &Program, value: TaggedValue) -> TaggedValue {
        if value.is_number() {
            return value;
        }
        if value.is_boolean() {
            return TaggedValue::int(value.as_boolean() as i32);
        }
        if value.is_undefined() {
            return TaggedValue::double(f64::NAN);
        }
        if value.is_null() {
            return TaggedValue::int(0);
        }
        if thread.heap.bigint(value).is_some() {
            return thread.throw_type_error("Cannot convert a BigInt value to a number");
        }
        if let Some(s) = thread.heap.string(value) {
            return fast::number_result(string_to_number(s));
        }
        if thread.heap.is_ecma_object(value) {
            let prim = to_primitive(thread, program, value);
            if prim.is_exception() {
                return prim;
            }
            return to_number(thread, program, prim);
        }
        TaggedValue::double(f64::NAN)
    }

    /// ToNumeric: like ToNumber but lets BigInts through unchanged
    pub fn to_numeric(thread: &mut JsThread, program: &Program, value: TaggedValue) -> TaggedValue {
        if thread.heap.bigint(value).is_some() {
            return value;
        }
        if thread.heap.is_ecma_object(value) {
            let prim = to_primitive(thread, program, value);
            if prim.is_exception() {
                return prim;
            }
            return to_numeric(thread, program, prim);
        }
        to_number(thread, program, value)
    }

    /// ToString; may re-enter for objects
    pub fn to_string_value(
        thread: &mut JsThread,
        program: &Program,
        value: TaggedValue,
    ) -> TaggedValue {
        if thread.heap.string(value).is_some() {
            return value;
        }
        if value.is_int() {
            let text = value.as_int().to_string();
            return thread.heap.alloc_string(text);
        }
        if value.is_double() {
            let text = number_to_string(value.as_double());
            return thread.heap.alloc_string(text);
        }
        if value.is_undefined() {
            return thread.heap.alloc_string("undefined");
        }
        if value.is_null() {
            return thread.heap.alloc_string("null");
        }
        if value.is_boolean() {
            return thread
                .heap
                .alloc_string(if value.as_boolean() { "true" } else { "false" });
        }
        if let Some(n) = thread.heap.bigint(value) {
            let text = n.to_string();
            return thread.heap.alloc_string(text);
        }
        if thread.heap.is_ecma_object(value) {
            let prim = to_primitive(thread, program, value);
            if prim.is_exception() {
                return prim;
            }
            if thread.heap.is_ecma_object(prim) {
                return thread.throw_type_error("Cannot convert object to string");
            }
            return to_string_value(thread, program, prim);
        }
        thread.heap.alloc_string("[object Unknown]")
    }

    /// Generic binary arithmetic: ToPrimitive, string concatenation for
    /// `+`, BigInt arithmetic, numeric fallback. The numeric fallback goes
    /// through the same shared core as the fast path, so both tiers agree
    /// on every input.
    pub fn number_binary(
        op: NumericOp,
        thread: &mut JsThread,
        program: &Program,
        lhs: TaggedValue,
        rhs: TaggedValue,
    ) -> TaggedValue {
        let (lhs, rhs) = if op == NumericOp::Add {
            let lp = to_primitive(thread, program, lhs);
            if lp.is_exception() {
                return lp;
            }
            let rp = to_primitive(thread, program, rhs);
            if rp.is_exception() {
                return rp;
            }
            (lp, rp)
        } else {
            (lhs, rhs)
        };

        if op == NumericOp::Add
            && (thread.heap.string(lhs).is_some() || thread.heap.string(rhs).is_some())
        {
            // The left string must survive a collection triggered by the
            // right operand's conversion re-entering guest code
            let mark = thread.scratch.len();
            let left = to_string_value(thread, program, lhs);
            if left.is_exception() {
                return left;
            }
            thread.scratch.push(left);
            let right = to_string_value(thread, program, rhs);
            if right.is_exception() {
                thread.scratch.truncate(mark);
                return right;
            }
            let mut text = thread.heap.string(left).unwrap_or("").to_string();
            text.push_str(thread.heap.string(right).unwrap_or(""));
            thread.scratch.truncate(mark);
            return thread.heap.alloc_string(text);
        }

        let ln = to_numeric(thread, program, lhs);
        if ln.is_exception() {
            return ln;
        }
        let rn = to_numeric(thread, program, rhs);
        if rn.is_exception() {
            return rn;
        }

        let lb = thread.heap.bigint(ln).cloned();
        let rb = thread.heap.bigint(rn).cloned();
        match (lb, rb) {
            (Some(a), Some(b)) => {
                let result: BigInt = match op {
                    NumericOp::Add => a + b,
                    NumericOp::Sub => a - b,
                    NumericOp::Mul => a * b,
                    NumericOp::Div => {
                        use num_traits::Zero;
                        if b.is_zero() {
                            return thread.throw_range_error("Division by zero");
                        }
                        a / b
                    }
                    NumericOp::Mod => {
                        use num_traits::Zero;
                        if b.is_zero() {
                            return thread.throw_range_error("Division by zero");
                        }
                        a % b
                    }
                    NumericOp::Exp => match b.to_u32() {
                        Some(exp) => a.pow(exp),
                        None => {
                            return thread.throw_range_error("Exponent must be non-negative");
                        }
                    },
                };
                thread.heap.alloc_bigint(result)
            }
            (None, None) => fast::number_binary(op, ln, rn)
                .unwrap_or_else(|| TaggedValue::double(f64::NAN)),
            _ => thread.throw_type_error("Cannot mix BigInt and other types, use explicit conversions"),
        }
    }

    /// Generic relational comparison: strings compare lexicographically,
    /// everything else numerically after coercion
    pub fn number_compare(
        op: CompareOp,
        thread: &mut JsThread,
        program: &Program,
        lhs: TaggedValue,
        rhs: TaggedValue,
    ) -> TaggedValue {
        let lp = to_primitive(thread, program, lhs);
        if lp.is_exception() {
            return lp;
        }
        let rp = to_primitive(thread, program, rhs);
        if rp.is_exception() {
            return rp;
        }
        if let (Some(a), Some(b)) = (thread.heap.string(lp), thread.heap.string(rp)) {
            let result = match op {
                CompareOp::Less => a < b,
                CompareOp::LessEq => a <= b,
                CompareOp::Greater => a > b,
                CompareOp::GreaterEq => a >= b,
            };
            return TaggedValue::boolean(result);
        }
        let ln = to_number(thread, program, lp);
        if ln.is_exception() {
            return ln;
        }
        let rn = to_number(thread, program, rp);
        if rn.is_exception() {
            return rn;
        }
        fast::number_compare(op, ln, rn).unwrap_or(TaggedValue::FALSE)
    }

    /// Full loose equality
    pub fn loose_equal(
        thread: &mut JsThread,
        program: &Program,
        lhs: TaggedValue,
        rhs: TaggedValue,
    ) -> TaggedValue {
        if let Some(answer) = fast::loose_equal(lhs, rhs) {
            return TaggedValue::boolean(answer);
        }
        // Strings: content comparison or numeric coercion
        let ls = thread.heap.string(lhs).map(|s| s.to_string());
        let rs = thread.heap.string(rhs).map(|s| s.to_string());
        match (&ls, &rs) {
            (Some(a), Some(b)) => return TaggedValue::boolean(a == b),
            _ => {}
        }
        let l_is_obj = thread.heap.is_ecma_object(lhs);
        let r_is_obj = thread.heap.is_ecma_object(rhs);
        if l_is_obj && r_is_obj {
            return TaggedValue::boolean(lhs == rhs);
        }
        if lhs.is_undefined_or_null() || rhs.is_undefined_or_null() {
            return TaggedValue::FALSE;
        }
        if l_is_obj || r_is_obj {
            let (obj, other) = if l_is_obj { (lhs, rhs) } else { (rhs, lhs) };
            let prim = to_primitive(thread, program, obj);
            if prim.is_exception() {
                return prim;
            }
            return loose_equal(thread, program, prim, other);
        }
        // Mixed primitive types: compare numerically
        let ln = to_number(thread, program, lhs);
        if ln.is_exception() {
            return ln;
        }
        let rn = to_number(thread, program, rhs);
        if rn.is_exception() {
            return rn;
        }
        TaggedValue::boolean(ln.as_number() == rn.as_number())
    }

    /// Full strict equality (string contents, BigInt values)
    pub fn strict_equal(heap: &Heap, lhs: TaggedValue, rhs: TaggedValue) -> bool {
        if let Some(answer) = fast::strict_equal(lhs, rhs) {
            return answer;
        }
        if let (Some(a), Some(b)) = (heap.string(lhs), heap.string(rhs)) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (heap.bigint(lhs), heap.bigint(rhs)) {
            return a == b;
        }
        false
    }

    /// Bitwise with coercion through ToNumber
    pub fn bitwise(
        op: BitwiseOp,
        thread: &mut JsThread,
        program: &Program,
        lhs: TaggedValue,
        rhs: TaggedValue,
    ) -> TaggedValue {
        let ln = to_number(thread, program, lhs);
        if ln.is_exception() {
            return ln;
        }
        let rn = to_number(thread, program, rhs);
        if rn.is_exception() {
            return rn;
        }
        fast::bitwise(op, ln, rn).unwrap_or(TaggedValue::int(0))
    }

    /// `typeof`
    pub fn type_of(thread: &mut JsThread, value: TaggedValue) -> TaggedValue {
        let name = if value.is_number() {
            "number"
        } else if value.is_boolean() {
            "boolean"
        } else if value.is_undefined() {
            "undefined"
        } else if value.is_null() {
            "object"
        } else if thread.heap.is_callable(value) {
            "function"
        } else if thread.heap.string(value).is_some() {
            "string"
        } else if thread.heap.bigint(value).is_some() {
            "bigint"
        } else {
            "object"
        };
        thread.heap.alloc_string(name)
    }

    /// Full property load: prototype walk with accessor support.
    /// Getters re-enter the interpreter.
    pub fn get_property(
        thread: &mut JsThread,
        program: &Program,
        receiver: TaggedValue,
        name: Atom,
    ) -> TaggedValue {
        if receiver.is_undefined_or_null() {
            let text = format!(
                "Cannot read properties of {} (reading '{}')",
                if receiver.is_null() { "null" } else { "undefined" },
                thread.atom_str(name)
            );
            return thread.throw_type_error(&text);
        }
        // Strings expose length
        if let Some(s) = thread.heap.string(receiver) {
            if thread.atom_str(name) == "length" {
                return TaggedValue::int(s.chars().count() as i32);
            }
            return TaggedValue::UNDEFINED;
        }
        let mut current = receiver;
        loop {
            let Some(obj) = thread.heap.object(current) else {
                // Functions expose their own slots through the object table;
                // other primitives have no properties here
                return TaggedValue::UNDEFINED;
            };
            if let Some(slot) = obj.slot_of(name) {
                let attr = obj.attr_at(slot);
                let value = obj.value_at(slot);
                if attr == SlotAttr::Data {
                    return value;
                }
                let Some((getter, _setter)) = thread.heap.accessor(value) else {
                    return TaggedValue::UNDEFINED;
                };
                if getter.is_undefined() {
                    return TaggedValue::UNDEFINED;
                }
                return call::execute_call(thread, program, getter, receiver, &[]);
            }
            let proto = obj.prototype();
            if !proto.is_heap_ref() {
                return TaggedValue::UNDEFINED;
            }
            current = proto;
        }
    }

    /// Full property store: own data write, setter invocation (walking the
    /// prototype chain), or own define on the receiver.
    pub fn set_property(
        thread: &mut JsThread,
        program: &Program,
        receiver: TaggedValue,
        name: Atom,
        value: TaggedValue,
    ) -> TaggedValue {
        if receiver.is_undefined_or_null() {
            let text = format!(
                "Cannot set properties of {} (setting '{}')",
                if receiver.is_null() { "null" } else { "undefined" },
                thread.atom_str(name)
            );
            return thread.throw_type_error(&text);
        }
        if thread.heap.object(receiver).is_none() {
            // Property stores on primitives are silently dropped
            return TaggedValue::UNDEFINED;
        }

        // Search receiver and prototypes for an existing slot
        let mut current = receiver;
        loop {
            let Some(obj) = thread.heap.object(current) else { break };
            if let Some(slot) = obj.slot_of(name) {
                let attr = obj.attr_at(slot);
                let slot_value = obj.value_at(slot);
                if attr == SlotAttr::Accessor {
                    let Some((_getter, setter)) = thread.heap.accessor(slot_value) else {
                        return TaggedValue::UNDEFINED;
                    };
                    if setter.is_undefined() {
                        return TaggedValue::UNDEFINED;
                    }
                    return call::execute_call(thread, program, setter, receiver, &[value]);
                }
                if current == receiver {
                    let Some(obj) = thread.heap.object_mut(receiver) else {
                        break;
                    };
                    obj.set_value_at(slot, value);
                    return TaggedValue::UNDEFINED;
                }
                // Shadow the prototype's data property
                break;
            }
            let proto = obj.prototype();
            if !proto.is_heap_ref() {
                break;
            }
            current = proto;
        }

        let Some(obj) = thread.heap.object_mut(receiver) else {
            return TaggedValue::UNDEFINED;
        };
        obj.define_own(name, value);
        TaggedValue::UNDEFINED
    }

    /// Own-property define used by object/class literal initialization.
    /// Bypasses prototypes and setters; rejects redefinition on class
    /// constructors and class prototypes.
    pub fn set_own_property(
        thread: &mut JsThread,
        receiver: TaggedValue,
        name: Atom,
        value: TaggedValue,
    ) -> TaggedValue {
        if let Some(function) = thread.heap.function(receiver) {
            if function.is_class_constructor() {
                let text = format!(
                    "Cannot define property '{}' on a class constructor",
                    thread.atom_str(name)
                );
                return thread.throw_type_error(&text);
            }
        }
        let Some(obj) = thread.heap.object_mut(receiver) else {
            return thread.throw_type_error("Cannot define property on a non-object");
        };
        if obj.rejects_own_redefine() {
            let text = format!(
                "Cannot define property '{}' on a class constructor or prototype",
                thread.atom_str(name)
            );
            return thread.throw_type_error(&text);
        }
        obj.define_own(name, value);
        TaggedValue::UNDEFINED
    }

    /// `tryldglobalbyname`: ReferenceError when the binding is missing
    pub fn try_load_global(thread: &mut JsThread, name: Atom) -> TaggedValue {
        let globals = thread.globals();
        if let Some(obj) = thread.heap.object(globals) {
            if let Some(slot) = obj.slot_of(name) {
                return obj.value_at(slot);
            }
        }
        let text = format!("{} is not defined", thread.atom_str(name));
        thread.throw_reference_error(&text)
    }

    /// `trystglobalbyname`: ReferenceError when the binding is missing
    pub fn try_store_global(thread: &mut JsThread, name: Atom, value: TaggedValue) -> TaggedValue {
        let globals = thread.globals();
        let slot = thread.heap.object(globals).and_then(|obj| obj.slot_of(name));
        match slot {
            Some(slot) => {
                if let Some(obj) = thread.heap.object_mut(globals) {
                    obj.set_value_at(slot, value);
                }
                TaggedValue::UNDEFINED
            }
            None => {
                let text = format!("{} is not defined", thread.atom_str(name));
                thread.throw_reference_error(&text)
            }
        }
    }

    /// `ldglobalvar`: undefined when missing
    pub fn load_global(thread: &mut JsThread, name: Atom) -> TaggedValue {
        let globals = thread.globals();
        thread
            .heap
            .object(globals)
            .and_then(|obj| obj.slot_of(name).map(|slot| obj.value_at(slot)))
            .unwrap_or(TaggedValue::UNDEFINED)
    }

    /// `stglobalvar`: defines when missing
    pub fn store_global(thread: &mut JsThread, name: Atom, value: TaggedValue) -> TaggedValue {
        let globals = thread.globals();
        if let Some(obj) = thread.heap.object_mut(globals) {
            obj.define_own(name, value);
        }
        TaggedValue::UNDEFINED
    }

    /// Materialize an array-like `{0: .., 1: .., length}` from values
    pub fn create_array_like(thread: &mut JsThread, values: &[TaggedValue]) -> TaggedValue {
        let mut obj = JsObject::new();
        for (i, &value) in values.iter().enumerate() {
            let key = thread.atoms.get_or_intern(i.to_string());
            obj.define_own(key, value);
        }
        let length = thread.intern("length");
        obj.define_own(length, TaggedValue::int(values.len() as i32));
        thread.heap.alloc_object(obj)
    }
}
