//! Bytecode opcodes for the Cinnabar VM
//!
//! This module defines the accumulator-based instruction set executed by the
//! interpreter. Most opcodes read and write the implicit accumulator register;
//! explicit operands name virtual registers (`v8`), immediates (`imm8`/
//! `imm16`/`imm32`, little-endian), IEEE doubles (`f64`, 8 bytes), constant
//! pool indices (`str16`, `method16`) and inline-cache slots (`ic8`).
//!
//! Two prefix bytes open secondary opcode tables: [`Opcode::ThrowPrefix`] for
//! the throw family and [`Opcode::WidePrefix`] for wide-operand variants.

/// Primary bytecode opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// No operation
    Nop = 0x00,

    // ========== Accumulator Constants ==========
    /// acc = undefined
    LdUndefined = 0x01,
    /// acc = null
    LdNull = 0x02,
    /// acc = true
    LdTrue = 0x03,
    /// acc = false
    LdFalse = 0x04,
    /// acc = hole (uninitialized marker, never guest-visible)
    LdHole = 0x05,
    /// acc = int32 immediate
    /// Operands: imm32
    Ldai = 0x06,
    /// acc = double immediate
    /// Operands: f64
    Fldai = 0x07,
    /// acc = string from constant pool
    /// Operands: str16
    LdaStr = 0x08,

    // ========== Register Moves ==========
    /// acc = v
    /// Operands: v8
    Lda = 0x10,
    /// v = acc
    /// Operands: v8
    Sta = 0x11,
    /// vdst = vsrc
    /// Operands: v8 (dst), v8 (src)
    Mov = 0x12,

    // ========== Binary Arithmetic (acc = v OP acc) ==========
    /// Operands: v8
    Add2 = 0x20,
    /// Operands: v8
    Sub2 = 0x21,
    /// Operands: v8
    Mul2 = 0x22,
    /// Operands: v8
    Div2 = 0x23,
    /// Operands: v8
    Mod2 = 0x24,
    /// Exponentiation
    /// Operands: v8
    Exp = 0x25,
    /// Left shift, shift count masked to 5 bits
    /// Operands: v8
    Shl2 = 0x26,
    /// Logical (zero-fill) right shift
    /// Operands: v8
    Shr2 = 0x27,
    /// Arithmetic (sign-propagating) right shift
    /// Operands: v8
    Ashr2 = 0x28,
    /// Operands: v8
    And2 = 0x29,
    /// Operands: v8
    Or2 = 0x2A,
    /// Operands: v8
    Xor2 = 0x2B,

    // ========== Comparison (acc = v OP acc) ==========
    /// Loose equality (==)
    /// Operands: v8
    Eq = 0x30,
    /// Loose inequality (!=)
    /// Operands: v8
    NotEq = 0x31,
    /// Operands: v8
    Less = 0x32,
    /// Operands: v8
    LessEq = 0x33,
    /// Operands: v8
    Greater = 0x34,
    /// Operands: v8
    GreaterEq = 0x35,
    /// Strict equality (===)
    /// Operands: v8
    StrictEq = 0x36,
    /// Strict inequality (!==)
    /// Operands: v8
    StrictNotEq = 0x37,

    // ========== Unary (acc = OP acc) ==========
    /// Numeric negation
    Neg = 0x38,
    /// Bitwise NOT
    Not = 0x39,
    /// Increment by one
    Inc = 0x3A,
    /// Decrement by one
    Dec = 0x3B,
    /// acc = typeof acc (string)
    Typeof = 0x3C,
    /// acc = ToBoolean(acc)
    IsTrue = 0x3D,
    /// acc = !ToBoolean(acc)
    IsFalse = 0x3E,
    /// acc = ToNumeric(acc), may call back into guest code
    ToNumeric = 0x3F,

    // ========== Jumps (offset relative to instruction start) ==========
    /// Operands: imm8 (signed)
    Jmp8 = 0x40,
    /// Operands: imm16 (signed)
    Jmp16 = 0x41,
    /// Jump if acc is false / +-0
    /// Operands: imm8 (signed)
    Jeqz8 = 0x42,
    /// Operands: imm16 (signed)
    Jeqz16 = 0x43,
    /// Jump if acc is true / nonzero int
    /// Operands: imm8 (signed)
    Jnez8 = 0x44,

    // ========== Lexical Environment ==========
    /// Push a new environment with N slots; acc = env
    /// Operands: imm8 (slot count)
    NewLexEnv = 0x48,
    /// Pop the current environment
    PopLexEnv = 0x49,
    /// acc = env[level][slot]
    /// Operands: imm8 (level), imm8 (slot)
    LdLexVar = 0x4A,
    /// env[level][slot] = acc
    /// Operands: imm8 (level), imm8 (slot)
    StLexVar = 0x4B,

    // ========== Globals ==========
    /// acc = global[name], ReferenceError if missing
    /// Operands: str16
    TryLdGlobalByName = 0x50,
    /// global[name] = acc, ReferenceError if missing
    /// Operands: str16
    TryStGlobalByName = 0x51,
    /// acc = global[name], undefined if missing
    /// Operands: str16
    LdGlobalVar = 0x52,
    /// global[name] = acc, defining if missing
    /// Operands: str16
    StGlobalVar = 0x53,

    // ========== Property Access ==========
    /// acc = acc[name]
    /// Operands: ic8, str16
    LdObjByName = 0x58,
    /// v[name] = acc
    /// Operands: ic8, str16, v8
    StObjByName = 0x59,
    /// acc = v[acc]
    /// Operands: ic8, v8
    LdObjByValue = 0x5A,
    /// v1[v2] = acc
    /// Operands: ic8, v8, v8
    StObjByValue = 0x5B,
    /// acc = acc[index]
    /// Operands: imm16
    LdObjByIndex = 0x5C,
    /// v[index] = acc
    /// Operands: v8, imm16
    StObjByIndex = 0x5D,
    /// Define own property v[name] = acc, bypassing prototypes and setters
    /// Operands: str16, v8
    StOwnByName = 0x5E,
    /// Define own property v1[v2] = acc
    /// Operands: v8, v8
    StOwnByValue = 0x5F,
    /// acc = this[name]
    /// Operands: ic8, str16
    LdThisByName = 0x60,
    /// this[name] = acc
    /// Operands: ic8, str16
    StThisByName = 0x61,

    // ========== Object / Function Construction ==========
    /// acc = {}
    CreateEmptyObject = 0x68,
    /// acc = closure of method over the current environment
    /// Operands: method16
    DefineFunc = 0x69,
    /// acc = method closure with home object v
    /// Operands: method16, v8
    DefineMethod = 0x6A,
    /// acc = class constructor; v = parent constructor or undefined
    /// Operands: method16, v8
    DefineClass = 0x6B,
    /// acc = array-like over the actual arguments
    GetUnmappedArgs = 0x6C,
    /// acc = array of arguments from formal index N onward
    /// Operands: imm8
    CopyRestArgs = 0x6D,

    // ========== Calls (callee in acc) ==========
    CallArg0 = 0x70,
    /// Operands: v8 (arg)
    CallArg1 = 0x71,
    /// Operands: v8, v8
    CallArgs2 = 0x72,
    /// Operands: v8, v8, v8
    CallArgs3 = 0x73,
    /// Operands: imm8 (argc), v8 (first arg register)
    CallRange = 0x74,
    /// Operands: v8 (this)
    CallThis0 = 0x75,
    /// Operands: v8 (this), v8
    CallThis1 = 0x76,
    /// Operands: v8 (this), v8, v8
    CallThis2 = 0x77,
    /// Operands: v8 (this), v8, v8, v8
    CallThis3 = 0x78,
    /// Operands: imm8 (argc), v8 (this; args follow)
    CallThisRange = 0x79,
    /// Construct: v = constructor, args follow
    /// Operands: imm8 (argc incl. constructor), v8
    NewObjRange = 0x7A,
    /// Construct the superclass with the current new.target
    /// Operands: imm8 (argc), v8 (first arg register)
    SuperCallThisRange = 0x7B,

    // ========== Frame Introspection ==========
    /// acc = this
    LdThis = 0x80,
    /// acc = new.target
    LdNewTarget = 0x81,
    /// acc = the executing closure
    LdFunction = 0x82,

    // ========== Generators ==========
    /// acc = generator object for closure in v
    /// Operands: v8
    CreateGeneratorObj = 0x88,
    /// Suspend the generator in v, yielding acc to the resumer
    /// Operands: v8
    SuspendGenerator = 0x89,
    /// acc = the value handed back to the generator in v by the resume call
    /// Operands: v8
    ResumeGenerator = 0x8A,
    /// acc = resume mode of the generator in v (0 next, 1 throw, 2 return)
    /// Operands: v8
    GetResumeMode = 0x8B,

    // ========== Returns ==========
    /// Return acc to the caller
    Return = 0x90,
    /// Return undefined to the caller
    ReturnUndefined = 0x91,

    // ========== Prefix Bytes ==========
    /// Next byte indexes the wide-operand table ([`WideOp`])
    WidePrefix = 0xFD,
    /// Next byte indexes the throw table ([`ThrowOp`])
    ThrowPrefix = 0xFE,
}

/// Secondary opcodes behind [`Opcode::ThrowPrefix`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThrowOp {
    /// Throw acc
    Throw = 0x00,
    /// ReferenceError: throw target does not exist
    NotExists = 0x01,
    /// TypeError: destructuring target is not coercible
    PatternNonCoercible = 0x02,
    /// ReferenceError: cannot delete a super property
    DeleteSuperProperty = 0x03,
    /// TypeError: assignment to constant, name in v
    /// Operands: v8
    ConstAssignment = 0x04,
    /// TypeError if v is not an object
    /// Operands: v8
    IfNotObject = 0x05,
    /// ReferenceError naming the binding in v if acc is hole (TDZ check)
    /// Operands: v8
    UndefinedIfHole = 0x06,
    /// ReferenceError if this is still uninitialized (super() not yet run)
    /// Operands: imm16 (error selector)
    IfSuperNotCorrectCall = 0x07,
}

/// Secondary opcodes behind [`Opcode::WidePrefix`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WideOp {
    /// Operands: imm16 (argc), v8
    CallRange = 0x00,
    /// Operands: imm16 (argc), v8
    CallThisRange = 0x01,
    /// Operands: imm16 (argc incl. constructor), v8
    NewObjRange = 0x02,
    /// Operands: imm16 (level), imm16 (slot)
    LdLexVar = 0x03,
    /// Operands: imm16 (level), imm16 (slot)
    StLexVar = 0x04,
    /// Operands: imm32 (index)
    LdObjByIndex = 0x05,
    /// Operands: v8, imm32 (index)
    StObjByIndex = 0x06,
    /// Operands: imm16
    CopyRestArgs = 0x07,
}

impl Opcode {
    /// Convert a byte to a primary opcode
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        match byte {
            0x00 => Some(Opcode::Nop),
            0x01 => Some(Opcode::LdUndefined),
            0x02 => Some(Opcode::LdNull),
            0x03 => Some(Opcode::LdTrue),
            0x04 => Some(Opcode::LdFalse),
            0x05 => Some(Opcode::LdHole),
            0x06 => Some(Opcode::Ldai),
            0x07 => Some(Opcode::Fldai),
            0x08 => Some(Opcode::LdaStr),

            0x10 => Some(Opcode::Lda),
            0x11 => Some(Opcode::Sta),
            0x12 => Some(Opcode::Mov),

            0x20 => Some(Opcode::Add2),
            0x21 => Some(Opcode::Sub2),
            0x22 => Some(Opcode::Mul2),
            0x23 => Some(Opcode::Div2),
            0x24 => Some(Opcode::Mod2),
            0x25 => Some(Opcode::Exp),
            0x26 => Some(Opcode::Shl2),
            0x27 => Some(Opcode::Shr2),
            0x28 => Some(Opcode::Ashr2),
            0x29 => Some(Opcode::And2),
            0x2A => Some(Opcode::Or2),
            0x2B => Some(Opcode::Xor2),

            0x30 => Some(Opcode::Eq),
            0x31 => Some(Opcode::NotEq),
            0x32 => Some(Opcode::Less),
            0x33 => Some(Opcode::LessEq),
            0x34 => Some(Opcode::Greater),
            0x35 => Some(Opcode::GreaterEq),
            0x36 => Some(Opcode::StrictEq),
            0x37 => Some(Opcode::StrictNotEq),

            0x38 => Some(Opcode::Neg),
            0x39 => Some(Opcode::Not),
            0x3A => Some(Opcode::Inc),
            0x3B => Some(Opcode::Dec),
            0x3C => Some(Opcode::Typeof),
            0x3D => Some(Opcode::IsTrue),
            0x3E => Some(Opcode::IsFalse),
            0x3F => Some(Opcode::ToNumeric),

            0x40 => Some(Opcode::Jmp8),
            0x41 => Some(Opcode::Jmp16),
            0x42 => Some(Opcode::Jeqz8),
            0x43 => Some(Opcode::Jeqz16),
            0x44 => Some(Opcode::Jnez8),

            0x48 => Some(Opcode::NewLexEnv),
            0x49 => Some(Opcode::PopLexEnv),
            0x4A => Some(Opcode::LdLexVar),
            0x4B => Some(Opcode::StLexVar),

            0x50 => Some(Opcode::TryLdGlobalByName),
            0x51 => Some(Opcode::TryStGlobalByName),
            0x52 => Some(Opcode::LdGlobalVar),
            0x53 => Some(Opcode::StGlobalVar),

            0x58 => Some(Opcode::LdObjByName),
            0x59 => Some(Opcode::StObjByName),
            0x5A => Some(Opcode::LdObjByValue),
            0x5B => Some(Opcode::StObjByValue),
            0x5C => Some(Opcode::LdObjByIndex),
            0x5D => Some(Opcode::StObjByIndex),
            0x5E => Some(Opcode::StOwnByName),
            0x5F => Some(Opcode::StOwnByValue),
            0x60 => Some(Opcode::LdThisByName),
            0x61 => Some(Opcode::StThisByName),

            0x68 => Some(Opcode::CreateEmptyObject),
            0x69 => Some(Opcode::DefineFunc),
            0x6A => Some(Opcode::DefineMethod),
            0x6B => Some(Opcode::DefineClass),
            0x6C => Some(Opcode::GetUnmappedArgs),
            0x6D => Some(Opcode::CopyRestArgs),

            0x70 => Some(Opcode::CallArg0),
            0x71 => Some(Opcode::CallArg1),
            0x72 => Some(Opcode::CallArgs2),
            0x73 => Some(Opcode::CallArgs3),
            0x74 => Some(Opcode::CallRange),
            0x75 => Some(Opcode::CallThis0),
            0x76 => Some(Opcode::CallThis1),
            0x77 => Some(Opcode::CallThis2),
            0x78 => Some(Opcode::CallThis3),
            0x79 => Some(Opcode::CallThisRange),
            0x7A => Some(Opcode::NewObjRange),
            0x7B => Some(Opcode::SuperCallThisRange),

            0x80 => Some(Opcode::LdThis),
            0x81 => Some(Opcode::LdNewTarget),
            0x82 => Some(Opcode::LdFunction),

            0x88 => Some(Opcode::CreateGeneratorObj),
            0x89 => Some(Opcode::SuspendGenerator),
            0x8A => Some(Opcode::ResumeGenerator),
            0x8B => Some(Opcode::GetResumeMode),

            0x90 => Some(Opcode::Return),
            0x91 => Some(Opcode::ReturnUndefined),

            0xFD => Some(Opcode::WidePrefix),
            0xFE => Some(Opcode::ThrowPrefix),

            _ => None,
        }
    }

    /// Get the encoded size of the instruction including the opcode byte.
    ///
    /// Prefixed opcodes report 1 here; their full size comes from the
    /// secondary table ([`ThrowOp::instruction_size`] /
    /// [`WideOp::instruction_size`]).
    pub fn instruction_size(&self) -> usize {
        match self {
            // No operands
            Opcode::Nop
            | Opcode::LdUndefined
            | Opcode::LdNull
            | Opcode::LdTrue
            | Opcode::LdFalse
            | Opcode::LdHole
            | Opcode::Neg
            | Opcode::Not
            | Opcode::Inc
            | Opcode::Dec
            | Opcode::Typeof
            | Opcode::IsTrue
            | Opcode::IsFalse
            | Opcode::ToNumeric
            | Opcode::PopLexEnv
            | Opcode::CreateEmptyObject
            | Opcode::GetUnmappedArgs
            | Opcode::CallArg0
            | Opcode::LdThis
            | Opcode::LdNewTarget
            | Opcode::LdFunction
            | Opcode::Return
            | Opcode::ReturnUndefined => 1,

            // One byte operand
            Opcode::Lda
            | Opcode::Sta
            | Opcode::Add2
            | Opcode::Sub2
            | Opcode::Mul2
            | Opcode::Div2
            | Opcode::Mod2
            | Opcode::Exp
            | Opcode::Shl2
            | Opcode::Shr2
            | Opcode::Ashr2
            | Opcode::And2
            | Opcode::Or2
            | Opcode::Xor2
            | Opcode::Eq
            | Opcode::NotEq
            | Opcode::Less
            | Opcode::LessEq
            | Opcode::Greater
            | Opcode::GreaterEq
            | Opcode::StrictEq
            | Opcode::StrictNotEq
            | Opcode::Jmp8
            | Opcode::Jeqz8
            | Opcode::Jnez8
            | Opcode::NewLexEnv
            | Opcode::CopyRestArgs
            | Opcode::CallArg1
            | Opcode::CallThis0
            | Opcode::CreateGeneratorObj
            | Opcode::SuspendGenerator
            | Opcode::ResumeGenerator
            | Opcode::GetResumeMode => 2,

            // Two byte operands
            Opcode::LdaStr
            | Opcode::Mov
            | Opcode::Jmp16
            | Opcode::Jeqz16
            | Opcode::LdLexVar
            | Opcode::StLexVar
            | Opcode::TryLdGlobalByName
            | Opcode::TryStGlobalByName
            | Opcode::LdGlobalVar
            | Opcode::StGlobalVar
            | Opcode::LdObjByValue
            | Opcode::LdObjByIndex
            | Opcode::DefineFunc
            | Opcode::CallArgs2
            | Opcode::CallRange
            | Opcode::CallThis1
            | Opcode::CallThisRange
            | Opcode::NewObjRange
            | Opcode::SuperCallThisRange => 3,

            // Three byte operands
            Opcode::LdObjByName
            | Opcode::StObjByValue
            | Opcode::StObjByIndex
            | Opcode::StOwnByName
            | Opcode::LdThisByName
            | Opcode::StThisByName
            | Opcode::DefineMethod
            | Opcode::DefineClass
            | Opcode::CallArgs3
            | Opcode::CallThis2 => 4,

            Opcode::StOwnByValue => 3,

            // Four byte operands
            Opcode::StObjByName | Opcode::CallThis3 => 5,

            // imm32 / f64
            Opcode::Ldai => 5,
            Opcode::Fldai => 9,

            // Prefixes: size determined by the secondary table
            Opcode::WidePrefix | Opcode::ThrowPrefix => 1,
        }
    }
}

impl ThrowOp {
    /// Convert a byte to a throw-family opcode
    pub fn from_u8(byte: u8) -> Option<ThrowOp> {
        match byte {
            0x00 => Some(ThrowOp::Throw),
            0x01 => Some(ThrowOp::NotExists),
            0x02 => Some(ThrowOp::PatternNonCoercible),
            0x03 => Some(ThrowOp::DeleteSuperProperty),
            0x04 => Some(ThrowOp::ConstAssignment),
            0x05 => Some(ThrowOp::IfNotObject),
            0x06 => Some(ThrowOp::UndefinedIfHole),
            0x07 => Some(ThrowOp::IfSuperNotCorrectCall),
            _ => None,
        }
    }

    /// Encoded size including the prefix byte and the secondary opcode byte
    pub fn instruction_size(&self) -> usize {
        match self {
            ThrowOp::Throw
            | ThrowOp::NotExists
            | ThrowOp::PatternNonCoercible
            | ThrowOp::DeleteSuperProperty => 2,
            ThrowOp::ConstAssignment | ThrowOp::IfNotObject | ThrowOp::UndefinedIfHole => 3,
            ThrowOp::IfSuperNotCorrectCall => 4,
        }
    }
}

impl WideOp {
    /// Convert a byte to a wide-family opcode
    pub fn from_u8(byte: u8) -> Option<WideOp> {
        match byte {
            0x00 => Some(WideOp::CallRange),
            0x01 => Some(WideOp::CallThisRange),
            0x02 => Some(WideOp::NewObjRange),
            0x03 => Some(WideOp::LdLexVar),
            0x04 => Some(WideOp::StLexVar),
            0x05 => Some(WideOp::LdObjByIndex),
            0x06 => Some(WideOp::StObjByIndex),
            0x07 => Some(WideOp::CopyRestArgs),
            _ => None,
        }
    }

    /// Encoded size including the prefix byte and the secondary opcode byte
    pub fn instruction_size(&self) -> usize {
        match self {
            WideOp::CopyRestArgs => 4,
            WideOp::CallRange | WideOp::CallThisRange | WideOp::NewObjRange => 5,
            WideOp::LdLexVar | WideOp::StLexVar => 6,
            WideOp::LdObjByIndex => 6,
            WideOp::StObjByIndex => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_roundtrip() {
        for byte in 0..=0xFFu8 {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op as u8, byte);
                assert!(op.instruction_size() >= 1);
            }
        }
    }

    #[test]
    fn prefixed_roundtrip() {
        for byte in 0..=0x0Fu8 {
            if let Some(op) = ThrowOp::from_u8(byte) {
                assert_eq!(op as u8, byte);
                assert!(op.instruction_size() >= 2);
            }
            if let Some(op) = WideOp::from_u8(byte) {
                assert_eq!(op as u8, byte);
                assert!(op.instruction_size() >= 2);
            }
        }
    }

    #[test]
    fn wide_variants_are_larger() {
        assert!(WideOp::CallRange.instruction_size() > Opcode::CallRange.instruction_size());
        assert!(WideOp::LdLexVar.instruction_size() > Opcode::LdLexVar.instruction_size());
        assert!(WideOp::NewObjRange.instruction_size() > Opcode::NewObjRange.instruction_size());
    }
}
