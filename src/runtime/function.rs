//! Function objects and the native calling convention

use crate::bytecode::FunctionKind;

use super::thread::JsThread;
use super::value::TaggedValue;
use super::vm::cache::ProfileTypeInfo;

/// The ABI between the interpreter and native-implemented builtins: a flat
/// argument array plus the explicit function / new.target / this values.
/// A native returns a [`TaggedValue`], or [`TaggedValue::EXCEPTION`] after
/// recording a pending exception on the thread.
pub struct RuntimeCallInfo {
    /// The callee closure
    pub func: TaggedValue,
    /// `new.target` (undefined for ordinary calls)
    pub new_target: TaggedValue,
    /// The `this` binding (undefined for native constructors)
    pub this: TaggedValue,
    /// Actual arguments
    pub args: Vec<TaggedValue>,
}

impl RuntimeCallInfo {
    /// Argument by index, `undefined` past the end
    pub fn arg(&self, index: usize) -> TaggedValue {
        self.args.get(index).copied().unwrap_or(TaggedValue::UNDEFINED)
    }

    /// Actual argument count
    pub fn argc(&self) -> usize {
        self.args.len()
    }
}

/// A native builtin implementation
pub type NativeFn = fn(&mut JsThread, &RuntimeCallInfo) -> TaggedValue;

/// A closure: a method (or native) plus captured state.
///
/// The hotness counter and the lazily-allocated inline-cache vector live
/// here rather than on the shared [`Method`](crate::bytecode::Method): method
/// metadata is immutable and shared, while profiling state belongs to the
/// single thread executing this closure.
pub struct JsFunction {
    /// Method id within the program; `None` for natives
    pub method: Option<u32>,
    /// Native entry point, if this is a builtin
    pub native: Option<NativeFn>,
    /// What kind of closure this is
    pub kind: FunctionKind,
    /// Captured lexical environment
    pub env: TaggedValue,
    /// Home object for methods defined on literals/classes
    pub home_object: TaggedValue,
    /// The `.prototype` object wired onto constructors
    pub proto: TaggedValue,
    /// Superclass constructor, for `super()` resolution
    pub parent_ctor: TaggedValue,
    /// Per-closure inline caches; allocated on first hotness zero-crossing
    pub profile: Option<ProfileTypeInfo>,
    /// Hotness counter; backedges and returns drive it toward zero
    pub hotness: i32,
}

impl JsFunction {
    /// An interpreted closure over the given environment
    pub fn interpreted(method: u32, kind: FunctionKind, env: TaggedValue, hotness: i32) -> Self {
        Self {
            method: Some(method),
            native: None,
            kind,
            env,
            home_object: TaggedValue::UNDEFINED,
            proto: TaggedValue::UNDEFINED,
            parent_ctor: TaggedValue::UNDEFINED,
            profile: None,
            hotness,
        }
    }

    /// A native builtin closure
    pub fn native(f: NativeFn) -> Self {
        Self {
            method: None,
            native: Some(f),
            kind: FunctionKind::Normal,
            env: TaggedValue::UNDEFINED,
            home_object: TaggedValue::UNDEFINED,
            proto: TaggedValue::UNDEFINED,
            parent_ctor: TaggedValue::UNDEFINED,
            profile: None,
            hotness: 0,
        }
    }

    /// Whether the call protocol must take the builtin path
    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    /// Base-class constructor (allocates its own `this`)
    pub fn is_base(&self) -> bool {
        matches!(self.kind, FunctionKind::BaseConstructor | FunctionKind::Normal)
    }

    /// Derived constructor (`this` deferred until `super()`)
    pub fn is_derived(&self) -> bool {
        matches!(self.kind, FunctionKind::DerivedConstructor)
    }

    /// Class constructor of either kind
    pub fn is_class_constructor(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::BaseConstructor | FunctionKind::DerivedConstructor
        )
    }
}
