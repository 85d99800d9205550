//! Bytecode representation and instruction set
//!
//! This module defines the bytecode format executed by the Cinnabar VM: an
//! accumulator-based register instruction set ([`Opcode`]), per-method
//! metadata ([`Method`]), and the [`Program`] container that bundles methods
//! into a runnable image. Programs are produced with [`MethodBuilder`] and can
//! be serialized with serde (bincode on disk, JSON for inspection).

mod builder;
mod method;
mod opcode;

pub use builder::{Label, MethodBuilder};
pub use method::{CallField, Constant, FunctionKind, Method, TryBlock};
pub use opcode::{Opcode, ThrowOp, WideOp};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A complete, immutable program image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// All methods; referenced by index from `Constant::Method` entries
    pub methods: Vec<Method>,
    /// Index of the entry method
    pub entry: u32,
}

impl Program {
    /// Create a program from a single entry method
    pub fn with_entry(method: Method) -> Self {
        Self {
            methods: vec![method],
            entry: 0,
        }
    }

    /// Get a method by id
    pub fn method(&self, id: u32) -> Option<&Method> {
        self.methods.get(id as usize)
    }

    /// Serialize to the binary on-disk image
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::InvalidProgram(e.to_string()))
    }

    /// Deserialize from the binary on-disk image
    pub fn from_bytes(bytes: &[u8]) -> Result<Program> {
        let program: Program =
            bincode::deserialize(bytes).map_err(|e| Error::InvalidProgram(e.to_string()))?;
        program.validate()?;
        Ok(program)
    }

    /// Basic structural validation: entry exists, method handles resolve
    pub fn validate(&self) -> Result<()> {
        if self.method(self.entry).is_none() {
            return Err(Error::InvalidProgram(format!(
                "entry method {} out of range",
                self.entry
            )));
        }
        for method in &self.methods {
            for constant in &method.constants {
                if let Constant::Method(id) = constant {
                    if self.method(*id).is_none() {
                        return Err(Error::InvalidProgram(format!(
                            "method '{}' references missing method {}",
                            method.name, id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Disassemble every method for debugging
    pub fn disassemble(&self) -> String {
        let mut output = String::new();
        for (id, method) in self.methods.iter().enumerate() {
            let marker = if id as u32 == self.entry { " (entry)" } else { "" };
            let _ = writeln!(
                output,
                "== #{} {}{} [vregs={} args={} ic={}] ==",
                id, method.name, marker, method.num_vregs, method.num_args, method.ic_slots
            );
            output.push_str(&disassemble_method(method));
            if !method.try_blocks.is_empty() {
                for block in &method.try_blocks {
                    let _ = writeln!(
                        output,
                        "  try [{:04}..{:04}) -> {:04}",
                        block.start, block.end, block.handler
                    );
                }
            }
        }
        output
    }
}

/// Disassemble a single method's bytecode
pub fn disassemble_method(method: &Method) -> String {
    let mut output = String::new();
    let mut offset = 0;
    while offset < method.code.len() {
        let (text, next) = disassemble_instruction(method, offset);
        let _ = writeln!(output, "{:04}  {}", offset, text);
        if next <= offset {
            break;
        }
        offset = next;
    }
    output
}

/// Disassemble one instruction, returning its text and the next offset
pub fn disassemble_instruction(method: &Method, offset: usize) -> (String, usize) {
    let code = &method.code;
    let byte = code[offset];
    let Some(op) = Opcode::from_u8(byte) else {
        return (format!(".byte {:#04x}", byte), offset + 1);
    };

    let u8_at = |at: usize| code.get(at).copied().unwrap_or(0);
    let i8_at = |at: usize| u8_at(at) as i8;
    let u16_at = |at: usize| u16::from_le_bytes([u8_at(at), u8_at(at + 1)]);
    let i16_at = |at: usize| u16_at(at) as i16;
    let u32_at =
        |at: usize| u32::from_le_bytes([u8_at(at), u8_at(at + 1), u8_at(at + 2), u8_at(at + 3)]);
    let str_at = |index: u16| {
        method
            .string_at(index)
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|| format!("str#{}", index))
    };

    let text = match op {
        Opcode::ThrowPrefix => {
            let Some(throw) = ThrowOp::from_u8(u8_at(offset + 1)) else {
                return (format!("throw.<bad {:#04x}>", u8_at(offset + 1)), offset + 2);
            };
            let text = match throw {
                ThrowOp::Throw => "throw".to_string(),
                ThrowOp::NotExists => "throw.notexists".to_string(),
                ThrowOp::PatternNonCoercible => "throw.patternnoncoercible".to_string(),
                ThrowOp::DeleteSuperProperty => "throw.deletesuperproperty".to_string(),
                ThrowOp::ConstAssignment => {
                    format!("throw.constassignment v{}", u8_at(offset + 2))
                }
                ThrowOp::IfNotObject => format!("throw.ifnotobject v{}", u8_at(offset + 2)),
                ThrowOp::UndefinedIfHole => {
                    format!("throw.undefinedifhole v{}", u8_at(offset + 2))
                }
                ThrowOp::IfSuperNotCorrectCall => {
                    format!("throw.ifsupernotcorrectcall {}", u16_at(offset + 2))
                }
            };
            return (text, offset + throw.instruction_size());
        }
        Opcode::WidePrefix => {
            let Some(wide) = WideOp::from_u8(u8_at(offset + 1)) else {
                return (format!("wide.<bad {:#04x}>", u8_at(offset + 1)), offset + 2);
            };
            let text = match wide {
                WideOp::CallRange => {
                    format!("wide.callrange {}, v{}", u16_at(offset + 2), u8_at(offset + 4))
                }
                WideOp::CallThisRange => format!(
                    "wide.callthisrange {}, v{}",
                    u16_at(offset + 2),
                    u8_at(offset + 4)
                ),
                WideOp::NewObjRange => format!(
                    "wide.newobjrange {}, v{}",
                    u16_at(offset + 2),
                    u8_at(offset + 4)
                ),
                WideOp::LdLexVar => {
                    format!("wide.ldlexvar {}, {}", u16_at(offset + 2), u16_at(offset + 4))
                }
                WideOp::StLexVar => {
                    format!("wide.stlexvar {}, {}", u16_at(offset + 2), u16_at(offset + 4))
                }
                WideOp::LdObjByIndex => format!("wide.ldobjbyindex {}", u32_at(offset + 2)),
                WideOp::StObjByIndex => {
                    format!("wide.stobjbyindex v{}, {}", u8_at(offset + 2), u32_at(offset + 3))
                }
                WideOp::CopyRestArgs => format!("wide.copyrestargs {}", u16_at(offset + 2)),
            };
            return (text, offset + wide.instruction_size());
        }

        Opcode::Nop => "nop".to_string(),
        Opcode::LdUndefined => "ldundefined".to_string(),
        Opcode::LdNull => "ldnull".to_string(),
        Opcode::LdTrue => "ldtrue".to_string(),
        Opcode::LdFalse => "ldfalse".to_string(),
        Opcode::LdHole => "ldhole".to_string(),
        Opcode::Ldai => format!("ldai {}", u32_at(offset + 1) as i32),
        Opcode::Fldai => {
            let bits = u64::from(u32_at(offset + 1)) | (u64::from(u32_at(offset + 5)) << 32);
            format!("fldai {}", f64::from_bits(bits))
        }
        Opcode::LdaStr => format!("lda.str {}", str_at(u16_at(offset + 1))),
        Opcode::Lda => format!("lda v{}", u8_at(offset + 1)),
        Opcode::Sta => format!("sta v{}", u8_at(offset + 1)),
        Opcode::Mov => format!("mov v{}, v{}", u8_at(offset + 1), u8_at(offset + 2)),
        Opcode::Add2 => format!("add2 v{}", u8_at(offset + 1)),
        Opcode::Sub2 => format!("sub2 v{}", u8_at(offset + 1)),
        Opcode::Mul2 => format!("mul2 v{}", u8_at(offset + 1)),
        Opcode::Div2 => format!("div2 v{}", u8_at(offset + 1)),
        Opcode::Mod2 => format!("mod2 v{}", u8_at(offset + 1)),
        Opcode::Exp => format!("exp v{}", u8_at(offset + 1)),
        Opcode::Shl2 => format!("shl2 v{}", u8_at(offset + 1)),
        Opcode::Shr2 => format!("shr2 v{}", u8_at(offset + 1)),
        Opcode::Ashr2 => format!("ashr2 v{}", u8_at(offset + 1)),
        Opcode::And2 => format!("and2 v{}", u8_at(offset + 1)),
        Opcode::Or2 => format!("or2 v{}", u8_at(offset + 1)),
        Opcode::Xor2 => format!("xor2 v{}", u8_at(offset + 1)),
        Opcode::Eq => format!("eq v{}", u8_at(offset + 1)),
        Opcode::NotEq => format!("noteq v{}", u8_at(offset + 1)),
        Opcode::Less => format!("less v{}", u8_at(offset + 1)),
        Opcode::LessEq => format!("lesseq v{}", u8_at(offset + 1)),
        Opcode::Greater => format!("greater v{}", u8_at(offset + 1)),
        Opcode::GreaterEq => format!("greatereq v{}", u8_at(offset + 1)),
        Opcode::StrictEq => format!("stricteq v{}", u8_at(offset + 1)),
        Opcode::StrictNotEq => format!("strictnoteq v{}", u8_at(offset + 1)),
        Opcode::Neg => "neg".to_string(),
        Opcode::Not => "not".to_string(),
        Opcode::Inc => "inc".to_string(),
        Opcode::Dec => "dec".to_string(),
        Opcode::Typeof => "typeof".to_string(),
        Opcode::IsTrue => "istrue".to_string(),
        Opcode::IsFalse => "isfalse".to_string(),
        Opcode::ToNumeric => "tonumeric".to_string(),
        Opcode::Jmp8 => format!("jmp {:+}", i8_at(offset + 1)),
        Opcode::Jmp16 => format!("jmp {:+}", i16_at(offset + 1)),
        Opcode::Jeqz8 => format!("jeqz {:+}", i8_at(offset + 1)),
        Opcode::Jeqz16 => format!("jeqz {:+}", i16_at(offset + 1)),
        Opcode::Jnez8 => format!("jnez {:+}", i8_at(offset + 1)),
        Opcode::NewLexEnv => format!("newlexenv {}", u8_at(offset + 1)),
        Opcode::PopLexEnv => "poplexenv".to_string(),
        Opcode::LdLexVar => format!("ldlexvar {}, {}", u8_at(offset + 1), u8_at(offset + 2)),
        Opcode::StLexVar => format!("stlexvar {}, {}", u8_at(offset + 1), u8_at(offset + 2)),
        Opcode::TryLdGlobalByName => {
            format!("tryldglobalbyname {}", str_at(u16_at(offset + 1)))
        }
        Opcode::TryStGlobalByName => {
            format!("trystglobalbyname {}", str_at(u16_at(offset + 1)))
        }
        Opcode::LdGlobalVar => format!("ldglobalvar {}", str_at(u16_at(offset + 1))),
        Opcode::StGlobalVar => format!("stglobalvar {}", str_at(u16_at(offset + 1))),
        Opcode::LdObjByName => format!(
            "ldobjbyname [{}] {}",
            u8_at(offset + 1),
            str_at(u16_at(offset + 2))
        ),
        Opcode::StObjByName => format!(
            "stobjbyname [{}] {}, v{}",
            u8_at(offset + 1),
            str_at(u16_at(offset + 2)),
            u8_at(offset + 4)
        ),
        Opcode::LdObjByValue => {
            format!("ldobjbyvalue [{}] v{}", u8_at(offset + 1), u8_at(offset + 2))
        }
        Opcode::StObjByValue => format!(
            "stobjbyvalue [{}] v{}, v{}",
            u8_at(offset + 1),
            u8_at(offset + 2),
            u8_at(offset + 3)
        ),
        Opcode::LdObjByIndex => format!("ldobjbyindex {}", u16_at(offset + 1)),
        Opcode::StObjByIndex => {
            format!("stobjbyindex v{}, {}", u8_at(offset + 1), u16_at(offset + 2))
        }
        Opcode::StOwnByName => format!(
            "stownbyname {}, v{}",
            str_at(u16_at(offset + 1)),
            u8_at(offset + 3)
        ),
        Opcode::StOwnByValue => {
            format!("stownbyvalue v{}, v{}", u8_at(offset + 1), u8_at(offset + 2))
        }
        Opcode::LdThisByName => format!(
            "ldthisbyname [{}] {}",
            u8_at(offset + 1),
            str_at(u16_at(offset + 2))
        ),
        Opcode::StThisByName => format!(
            "stthisbyname [{}] {}",
            u8_at(offset + 1),
            str_at(u16_at(offset + 2))
        ),
        Opcode::CreateEmptyObject => "createemptyobject".to_string(),
        Opcode::DefineFunc => format!("definefunc method#{}", u16_at(offset + 1)),
        Opcode::DefineMethod => format!(
            "definemethod method#{}, v{}",
            u16_at(offset + 1),
            u8_at(offset + 3)
        ),
        Opcode::DefineClass => format!(
            "defineclass method#{}, v{}",
            u16_at(offset + 1),
            u8_at(offset + 3)
        ),
        Opcode::GetUnmappedArgs => "getunmappedargs".to_string(),
        Opcode::CopyRestArgs => format!("copyrestargs {}", u8_at(offset + 1)),
        Opcode::CallArg0 => "callarg0".to_string(),
        Opcode::CallArg1 => format!("callarg1 v{}", u8_at(offset + 1)),
        Opcode::CallArgs2 => {
            format!("callargs2 v{}, v{}", u8_at(offset + 1), u8_at(offset + 2))
        }
        Opcode::CallArgs3 => format!(
            "callargs3 v{}, v{}, v{}",
            u8_at(offset + 1),
            u8_at(offset + 2),
            u8_at(offset + 3)
        ),
        Opcode::CallRange => {
            format!("callrange {}, v{}", u8_at(offset + 1), u8_at(offset + 2))
        }
        Opcode::CallThis0 => format!("callthis0 v{}", u8_at(offset + 1)),
        Opcode::CallThis1 => {
            format!("callthis1 v{}, v{}", u8_at(offset + 1), u8_at(offset + 2))
        }
        Opcode::CallThis2 => format!(
            "callthis2 v{}, v{}, v{}",
            u8_at(offset + 1),
            u8_at(offset + 2),
            u8_at(offset + 3)
        ),
        Opcode::CallThis3 => format!(
            "callthis3 v{}, v{}, v{}, v{}",
            u8_at(offset + 1),
            u8_at(offset + 2),
            u8_at(offset + 3),
            u8_at(offset + 4)
        ),
        Opcode::CallThisRange => {
            format!("callthisrange {}, v{}", u8_at(offset + 1), u8_at(offset + 2))
        }
        Opcode::NewObjRange => {
            format!("newobjrange {}, v{}", u8_at(offset + 1), u8_at(offset + 2))
        }
        Opcode::SuperCallThisRange => format!(
            "supercallthisrange {}, v{}",
            u8_at(offset + 1),
            u8_at(offset + 2)
        ),
        Opcode::LdThis => "ldthis".to_string(),
        Opcode::LdNewTarget => "ldnewtarget".to_string(),
        Opcode::LdFunction => "ldfunction".to_string(),
        Opcode::CreateGeneratorObj => format!("creategeneratorobj v{}", u8_at(offset + 1)),
        Opcode::SuspendGenerator => format!("suspendgenerator v{}", u8_at(offset + 1)),
        Opcode::ResumeGenerator => format!("resumegenerator v{}", u8_at(offset + 1)),
        Opcode::GetResumeMode => format!("getresumemode v{}", u8_at(offset + 1)),
        Opcode::Return => "return".to_string(),
        Opcode::ReturnUndefined => "return.undefined".to_string(),
    };

    (text, offset + op.instruction_size())
}
