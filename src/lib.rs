//! Cinnabar: a memory-safe register-based JavaScript bytecode interpreter
//!
//! Cinnabar is the execution core of a JavaScript engine: a tagged-value,
//! accumulator-style register machine with inline-cache-accelerated property
//! access, explicit interpreter stack frames, generator re-entry and a
//! precise GC-safepoint protocol. It deliberately has no parser or compiler;
//! bytecode is produced with the [`bytecode::MethodBuilder`] assembler (or
//! loaded from a serialized [`bytecode::Program`] image) and executed by the
//! [`runtime::Interpreter`].
//!
//! # Quick Start
//!
//! ```
//! use cinnabar::{Interpreter, MethodBuilder, Opcode, Program, TaggedValue};
//!
//! fn main() -> cinnabar::Result<()> {
//!     let mut main = MethodBuilder::new("main", 1);
//!     main.ldai(2);
//!     main.sta(0);
//!     main.ldai(40);
//!     main.binary(Opcode::Add2, 0);
//!     main.simple(Opcode::Return);
//!
//!     let program = Program::with_entry(main.finish()?);
//!     let result = Interpreter::new(program)?.run()?;
//!     assert_eq!(result, TaggedValue::int(42));
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Bytecode** | [`bytecode`] (opcodes, methods, builder, program images) |
//! | **Execution** | [`runtime`] (interpreter, values, heap, frames, generators) |
//! | **Errors** | [`Error`], [`ErrorKind`], [`Result`] |

// Clippy configuration for the Cinnabar interpreter.
//
// - collapsible_if/match: kept for readability in multi-step VM dispatch
// - too_many_arguments: frame-construction helpers pass full call context
// - new_without_default: builders have required initialization parameters
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_match)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]

pub mod bytecode;
mod error;
pub mod runtime;

pub use bytecode::{
    CallField, Constant, FunctionKind, Label, Method, MethodBuilder, Opcode, Program, ThrowOp,
    TryBlock, WideOp,
};
pub use error::{Error, ErrorKind, Result};
pub use runtime::{
    GeneratorState, GeneratorStep, Interpreter, InterpreterConfig, JsThread, NativeFn, ResumeMode,
    RuntimeCallInfo, TaggedValue,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
