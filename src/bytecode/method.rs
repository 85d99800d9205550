//! Per-method immutable metadata
//!
//! A [`Method`] is the unit the dispatch loop executes: a bytecode array plus
//! its constant pool, register/argument counts, call-field flags and the
//! try-block table used by exception unwinding. Methods are immutable after
//! construction and shared read-only by every frame executing them.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Flags describing a method's calling convention.
    ///
    /// The call/construct protocol consults these when laying out a new
    /// frame: whether the callee is native, which implicit values it needs
    /// materialized, and whether the actual argument count must be recorded
    /// for `arguments`/rest-parameter support.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CallField: u32 {
        /// Method body is a native function, no bytecode
        const NATIVE = 0x01;
        /// Frame materializes a `this` binding
        const HAVE_THIS = 0x02;
        /// Frame materializes `new.target`
        const HAVE_NEWTARGET = 0x04;
        /// Frame materializes the executing closure for `LDFUNCTION`
        const HAVE_FUNC = 0x08;
        /// Actual argument count is recorded; extra arguments are kept
        const HAVE_EXTRA = 0x10;
    }
}

impl Default for CallField {
    fn default() -> Self {
        CallField::HAVE_THIS | CallField::HAVE_NEWTARGET | CallField::HAVE_FUNC
    }
}

/// Program images carry the call field as its raw bit pattern
mod call_field_serde {
    use super::CallField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(flags: &CallField, serializer: S) -> Result<S::Ok, S::Error> {
        flags.bits().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CallField, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(CallField::from_bits_truncate(bits))
    }
}

/// The kind of closure a method produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Plain function or method
    Normal,
    /// Class constructor with no superclass
    BaseConstructor,
    /// Class constructor with a superclass; `this` stays uninitialized
    /// until `super()` runs
    DerivedConstructor,
    /// Generator function
    Generator,
}

impl FunctionKind {
    /// Whether closures of this kind can be `new`-constructed
    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            FunctionKind::Normal | FunctionKind::BaseConstructor | FunctionKind::DerivedConstructor
        )
    }
}

/// A constant pool entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constant {
    /// String literal / property name / global name
    Str(String),
    /// Double literal (reserved for literal arrays; `FLDAI` carries its own bits)
    F64(f64),
    /// Method handle: index into the program's method table
    Method(u32),
}

/// One entry of a method's try-block table.
///
/// `start`/`end` delimit the protected bytecode range (half-open, in byte
/// offsets); `handler` is the catch entry point. The table is ordered
/// innermost-first so the exception search takes the first containing range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryBlock {
    /// First protected byte offset
    pub start: u32,
    /// One past the last protected byte offset
    pub end: u32,
    /// Catch handler entry offset
    pub handler: u32,
}

impl TryBlock {
    /// Whether the protected range contains the given bytecode offset
    pub fn contains(&self, pc: u32) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// Immutable per-function metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    /// Method name, for diagnostics and disassembly
    pub name: String,
    /// Bytecode array
    pub code: Vec<u8>,
    /// Constant pool
    pub constants: Vec<Constant>,
    /// Calling-convention flags
    #[serde(with = "call_field_serde")]
    pub call_field: CallField,
    /// Number of virtual registers (excluding the argument window)
    pub num_vregs: u16,
    /// Declared argument count
    pub num_args: u16,
    /// Number of inline-cache slots referenced by the bytecode
    pub ic_slots: u16,
    /// Try-block table, innermost ranges first
    pub try_blocks: Vec<TryBlock>,
    /// What kind of closure this method produces
    pub kind: FunctionKind,
}

impl Method {
    /// Look up a string constant
    pub fn string_at(&self, index: u16) -> Option<&str> {
        match self.constants.get(index as usize) {
            Some(Constant::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Look up a method-handle constant
    pub fn method_at(&self, index: u16) -> Option<u32> {
        match self.constants.get(index as usize) {
            Some(Constant::Method(id)) => Some(*id),
            _ => None,
        }
    }

    /// Find the innermost try block covering `pc`
    pub fn find_catch(&self, pc: u32) -> Option<&TryBlock> {
        self.try_blocks.iter().find(|block| block.contains(pc))
    }

    /// Total register-window slots a frame for this method needs:
    /// vregs plus the declared argument window.
    pub fn frame_slots(&self) -> usize {
        self.num_vregs as usize + self.num_args as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_block_containment_is_half_open() {
        let block = TryBlock {
            start: 4,
            end: 10,
            handler: 12,
        };
        assert!(!block.contains(3));
        assert!(block.contains(4));
        assert!(block.contains(9));
        assert!(!block.contains(10));
    }

    #[test]
    fn innermost_try_block_wins() {
        let method = Method {
            name: "f".to_string(),
            code: Vec::new(),
            constants: Vec::new(),
            call_field: CallField::default(),
            num_vregs: 0,
            num_args: 0,
            ic_slots: 0,
            try_blocks: vec![
                TryBlock { start: 6, end: 8, handler: 20 },
                TryBlock { start: 0, end: 16, handler: 30 },
            ],
            kind: FunctionKind::Normal,
        };
        assert_eq!(method.find_catch(7).map(|b| b.handler), Some(20));
        assert_eq!(method.find_catch(12).map(|b| b.handler), Some(30));
        assert_eq!(method.find_catch(16), None);
    }
}
