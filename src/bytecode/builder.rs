//! Bytecode assembler
//!
//! [`MethodBuilder`] is the supported way to produce [`Method`] bodies:
//! a small assembler with forward labels, jump patching, constant-pool
//! deduplication and automatic inline-cache slot allocation. Jump offsets
//! are encoded relative to the start of the jump instruction.

use super::method::{CallField, Constant, FunctionKind, Method, TryBlock};
use super::opcode::{Opcode, ThrowOp, WideOp};
use crate::error::{Error, Result};

/// A forward-referencable bytecode position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
struct JumpPatch {
    /// Offset of the operand bytes
    operand: usize,
    /// Offset of the jump instruction itself (offsets are relative to this)
    instr: usize,
    label: Label,
    wide: bool,
}

/// Builder for a single method's bytecode and metadata
pub struct MethodBuilder {
    name: String,
    code: Vec<u8>,
    constants: Vec<Constant>,
    call_field: CallField,
    kind: FunctionKind,
    num_vregs: u16,
    num_args: u16,
    next_ic_slot: u16,
    labels: Vec<Option<usize>>,
    patches: Vec<JumpPatch>,
    try_spans: Vec<(Label, Label, Label)>,
}

impl MethodBuilder {
    /// Create a builder for a method with the given register count
    pub fn new(name: impl Into<String>, num_vregs: u16) -> Self {
        Self {
            name: name.into(),
            code: Vec::new(),
            constants: Vec::new(),
            call_field: CallField::default(),
            kind: FunctionKind::Normal,
            num_vregs,
            num_args: 0,
            next_ic_slot: 0,
            labels: Vec::new(),
            patches: Vec::new(),
            try_spans: Vec::new(),
        }
    }

    /// Set the declared argument count
    pub fn args(mut self, count: u16) -> Self {
        self.num_args = count;
        self
    }

    /// Set the function kind (constructor / generator)
    pub fn kind(mut self, kind: FunctionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Record the actual argument count at call time (rest / `arguments`)
    pub fn have_extra(mut self) -> Self {
        self.call_field |= CallField::HAVE_EXTRA;
        self
    }

    /// Current bytecode offset
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    // ==================== Raw emission ====================

    /// Emit a primary opcode byte
    pub fn emit_op(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    /// Emit a raw byte
    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Emit a little-endian u16
    pub fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a little-endian u32
    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit IEEE double bits
    pub fn emit_f64(&mut self, value: f64) {
        self.code.extend_from_slice(&value.to_bits().to_le_bytes());
    }

    // ==================== Constant pool ====================

    /// Add a string constant, deduplicating
    pub fn add_string(&mut self, s: &str) -> u16 {
        for (i, existing) in self.constants.iter().enumerate() {
            if let Constant::Str(v) = existing {
                if v == s {
                    return i as u16;
                }
            }
        }
        self.constants.push(Constant::Str(s.to_string()));
        (self.constants.len() - 1) as u16
    }

    /// Add a method-handle constant
    pub fn add_method(&mut self, id: u32) -> u16 {
        for (i, existing) in self.constants.iter().enumerate() {
            if let Constant::Method(v) = existing {
                if *v == id {
                    return i as u16;
                }
            }
        }
        self.constants.push(Constant::Method(id));
        (self.constants.len() - 1) as u16
    }

    /// Allocate a fresh inline-cache slot
    pub fn new_ic_slot(&mut self) -> u8 {
        let slot = self.next_ic_slot;
        self.next_ic_slot += 1;
        slot as u8
    }

    // ==================== Labels and jumps ====================

    /// Create an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current offset
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
    }

    fn emit_jump(&mut self, op: Opcode, label: Label) {
        let instr = self.code.len();
        self.emit_op(op);
        let operand = self.code.len();
        self.emit_u16(0);
        self.patches.push(JumpPatch {
            operand,
            instr,
            label,
            wide: true,
        });
    }

    /// Unconditional jump (16-bit offset)
    pub fn jmp(&mut self, label: Label) {
        self.emit_jump(Opcode::Jmp16, label);
    }

    /// Jump if acc is false / zero (16-bit offset)
    pub fn jeqz(&mut self, label: Label) {
        self.emit_jump(Opcode::Jeqz16, label);
    }

    /// Jump if acc is true / nonzero (8-bit offset; near targets only)
    pub fn jnez(&mut self, label: Label) {
        let instr = self.code.len();
        self.emit_op(Opcode::Jnez8);
        let operand = self.code.len();
        self.emit_u8(0);
        self.patches.push(JumpPatch {
            operand,
            instr,
            label,
            wide: false,
        });
    }

    /// Unconditional jump with an 8-bit offset
    pub fn jmp8(&mut self, label: Label) {
        let instr = self.code.len();
        self.emit_op(Opcode::Jmp8);
        let operand = self.code.len();
        self.emit_u8(0);
        self.patches.push(JumpPatch {
            operand,
            instr,
            label,
            wide: false,
        });
    }

    /// Register a try block: [start, end) protected, handler is the catch entry
    pub fn protect(&mut self, start: Label, end: Label, handler: Label) {
        self.try_spans.push((start, end, handler));
    }

    // ==================== Convenience emitters ====================

    /// acc = int32 immediate
    pub fn ldai(&mut self, value: i32) {
        self.emit_op(Opcode::Ldai);
        self.emit_u32(value as u32);
    }

    /// acc = double immediate
    pub fn fldai(&mut self, value: f64) {
        self.emit_op(Opcode::Fldai);
        self.emit_f64(value);
    }

    /// acc = string constant
    pub fn lda_str(&mut self, s: &str) {
        let index = self.add_string(s);
        self.emit_op(Opcode::LdaStr);
        self.emit_u16(index);
    }

    /// acc = v
    pub fn lda(&mut self, v: u8) {
        self.emit_op(Opcode::Lda);
        self.emit_u8(v);
    }

    /// v = acc
    pub fn sta(&mut self, v: u8) {
        self.emit_op(Opcode::Sta);
        self.emit_u8(v);
    }

    /// vdst = vsrc
    pub fn mov(&mut self, dst: u8, src: u8) {
        self.emit_op(Opcode::Mov);
        self.emit_u8(dst);
        self.emit_u8(src);
    }

    /// Emit a binary op taking one register operand (arithmetic / comparison)
    pub fn binary(&mut self, op: Opcode, v: u8) {
        self.emit_op(op);
        self.emit_u8(v);
    }

    /// Emit a register-free opcode
    pub fn simple(&mut self, op: Opcode) {
        self.emit_op(op);
    }

    /// acc = acc[name]; allocates an IC slot
    pub fn ld_obj_by_name(&mut self, name: &str) {
        let ic = self.new_ic_slot();
        let index = self.add_string(name);
        self.emit_op(Opcode::LdObjByName);
        self.emit_u8(ic);
        self.emit_u16(index);
    }

    /// v[name] = acc; allocates an IC slot
    pub fn st_obj_by_name(&mut self, name: &str, v: u8) {
        let ic = self.new_ic_slot();
        let index = self.add_string(name);
        self.emit_op(Opcode::StObjByName);
        self.emit_u8(ic);
        self.emit_u16(index);
        self.emit_u8(v);
    }

    /// acc = v[acc]; allocates an IC slot
    pub fn ld_obj_by_value(&mut self, v: u8) {
        let ic = self.new_ic_slot();
        self.emit_op(Opcode::LdObjByValue);
        self.emit_u8(ic);
        self.emit_u8(v);
    }

    /// v1[v2] = acc; allocates an IC slot
    pub fn st_obj_by_value(&mut self, obj: u8, key: u8) {
        let ic = self.new_ic_slot();
        self.emit_op(Opcode::StObjByValue);
        self.emit_u8(ic);
        self.emit_u8(obj);
        self.emit_u8(key);
    }

    /// acc = acc[index]
    pub fn ld_obj_by_index(&mut self, index: u16) {
        self.emit_op(Opcode::LdObjByIndex);
        self.emit_u16(index);
    }

    /// v[index] = acc
    pub fn st_obj_by_index(&mut self, v: u8, index: u16) {
        self.emit_op(Opcode::StObjByIndex);
        self.emit_u8(v);
        self.emit_u16(index);
    }

    /// Define own property v[name] = acc
    pub fn st_own_by_name(&mut self, name: &str, v: u8) {
        let index = self.add_string(name);
        self.emit_op(Opcode::StOwnByName);
        self.emit_u16(index);
        self.emit_u8(v);
    }

    /// acc = this[name]; allocates an IC slot
    pub fn ld_this_by_name(&mut self, name: &str) {
        let ic = self.new_ic_slot();
        let index = self.add_string(name);
        self.emit_op(Opcode::LdThisByName);
        self.emit_u8(ic);
        self.emit_u16(index);
    }

    /// this[name] = acc; allocates an IC slot
    pub fn st_this_by_name(&mut self, name: &str) {
        let ic = self.new_ic_slot();
        let index = self.add_string(name);
        self.emit_op(Opcode::StThisByName);
        self.emit_u8(ic);
        self.emit_u16(index);
    }

    /// Emit an opcode taking a single string-constant operand (globals)
    pub fn global_op(&mut self, op: Opcode, name: &str) {
        let index = self.add_string(name);
        self.emit_op(op);
        self.emit_u16(index);
    }

    /// acc = closure of the given method
    pub fn define_func(&mut self, method_id: u32) {
        let index = self.add_method(method_id);
        self.emit_op(Opcode::DefineFunc);
        self.emit_u16(index);
    }

    /// acc = method closure with home object in v
    pub fn define_method(&mut self, method_id: u32, home: u8) {
        let index = self.add_method(method_id);
        self.emit_op(Opcode::DefineMethod);
        self.emit_u16(index);
        self.emit_u8(home);
    }

    /// acc = class constructor; parent constructor (or undefined) in v
    pub fn define_class(&mut self, method_id: u32, parent: u8) {
        let index = self.add_method(method_id);
        self.emit_op(Opcode::DefineClass);
        self.emit_u16(index);
        self.emit_u8(parent);
    }

    /// Emit a call with explicit register operands
    pub fn call(&mut self, op: Opcode, regs: &[u8]) {
        self.emit_op(op);
        for &r in regs {
            self.emit_u8(r);
        }
    }

    /// callrange/callthisrange/newobjrange/supercallthisrange
    pub fn call_range(&mut self, op: Opcode, argc: u8, start: u8) {
        self.emit_op(op);
        self.emit_u8(argc);
        self.emit_u8(start);
    }

    /// Emit a wide-table instruction; operands must follow via emit_*
    pub fn wide(&mut self, op: WideOp) {
        self.emit_op(Opcode::WidePrefix);
        self.emit_u8(op as u8);
    }

    /// Emit a throw-table instruction with no operand
    pub fn throw_op(&mut self, op: ThrowOp) {
        self.emit_op(Opcode::ThrowPrefix);
        self.emit_u8(op as u8);
    }

    /// Emit a throw-table instruction with a register operand
    pub fn throw_reg(&mut self, op: ThrowOp, v: u8) {
        self.emit_op(Opcode::ThrowPrefix);
        self.emit_u8(op as u8);
        self.emit_u8(v);
    }

    // ==================== Finalization ====================

    /// Resolve labels and produce the immutable method
    pub fn finish(mut self) -> Result<Method> {
        for patch in &self.patches {
            let target = self.labels[patch.label.0].ok_or_else(|| {
                Error::internal(format!("unbound label in method '{}'", self.name))
            })?;
            let rel = target as i64 - patch.instr as i64;
            if patch.wide {
                let rel = i16::try_from(rel).map_err(|_| {
                    Error::internal(format!("jump offset out of range in '{}'", self.name))
                })?;
                self.code[patch.operand..patch.operand + 2]
                    .copy_from_slice(&rel.to_le_bytes());
            } else {
                let rel = i8::try_from(rel).map_err(|_| {
                    Error::internal(format!("jump offset out of range in '{}'", self.name))
                })?;
                self.code[patch.operand] = rel as u8;
            }
        }

        let mut try_blocks = Vec::with_capacity(self.try_spans.len());
        for (start, end, handler) in &self.try_spans {
            let resolve = |label: &Label| {
                self.labels[label.0]
                    .ok_or_else(|| Error::internal("unbound try-block label".to_string()))
            };
            try_blocks.push(TryBlock {
                start: resolve(start)? as u32,
                end: resolve(end)? as u32,
                handler: resolve(handler)? as u32,
            });
        }

        Ok(Method {
            name: self.name,
            code: self.code,
            constants: self.constants,
            call_field: self.call_field,
            num_vregs: self.num_vregs,
            num_args: self.num_args,
            ic_slots: self.next_ic_slot,
            try_blocks,
            kind: self.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_is_patched_relative_to_instruction() {
        let mut b = MethodBuilder::new("f", 0);
        let done = b.new_label();
        b.ldai(1); // 5 bytes
        b.jmp(done); // 3 bytes at offset 5
        b.ldai(2); // skipped
        b.bind(done);
        b.simple(Opcode::Return);
        let m = b.finish().unwrap();
        // operand at 6..8, target 13, instr at 5 -> offset +8
        assert_eq!(i16::from_le_bytes([m.code[6], m.code[7]]), 8);
    }

    #[test]
    fn backward_jump_offset_is_negative() {
        let mut b = MethodBuilder::new("loop", 0);
        let top = b.new_label();
        b.bind(top);
        b.ldai(0); // 5 bytes
        b.jmp(top); // instr at 5, target 0 -> -5
        let m = b.finish().unwrap();
        assert_eq!(i16::from_le_bytes([m.code[6], m.code[7]]), -5);
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut b = MethodBuilder::new("f", 0);
        let nowhere = b.new_label();
        b.jmp(nowhere);
        assert!(b.finish().is_err());
    }

    #[test]
    fn string_constants_are_deduplicated() {
        let mut b = MethodBuilder::new("f", 0);
        let a = b.add_string("x");
        let c = b.add_string("y");
        let d = b.add_string("x");
        assert_eq!(a, d);
        assert_ne!(a, c);
    }

    #[test]
    fn ic_slots_count_into_metadata() {
        let mut b = MethodBuilder::new("f", 1);
        b.ld_obj_by_name("a");
        b.ld_obj_by_name("b");
        b.st_obj_by_name("c", 0);
        let m = b.finish().unwrap();
        assert_eq!(m.ic_slots, 3);
    }
}
