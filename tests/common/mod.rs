//! Shared test helpers: builder-based program construction and run wrappers
#![allow(dead_code)]

use cinnabar::runtime::JsObject;
use cinnabar::{Interpreter, InterpreterConfig, MethodBuilder, Program, TaggedValue};

/// Build a one-method program from a builder closure
pub fn build_main(nregs: u16, build: impl FnOnce(&mut MethodBuilder)) -> Program {
    let mut main = MethodBuilder::new("main", nregs);
    build(&mut main);
    Program::with_entry(main.finish().expect("main method should assemble"))
}

/// Run a one-method program and return its result
pub fn run_main(
    nregs: u16,
    build: impl FnOnce(&mut MethodBuilder),
) -> cinnabar::Result<TaggedValue> {
    Interpreter::new(build_main(nregs, build))?.run()
}

/// Run a one-method program, returning the interpreter for heap inspection
#[allow(dead_code)]
pub fn run_main_keep(
    nregs: u16,
    build: impl FnOnce(&mut MethodBuilder),
) -> (Interpreter, TaggedValue) {
    let mut interp = Interpreter::new(build_main(nregs, build)).expect("program should load");
    let result = interp.run().expect("program should run");
    (interp, result)
}

/// Run with an explicit configuration
#[allow(dead_code)]
pub fn run_main_with_config(
    nregs: u16,
    config: InterpreterConfig,
    build: impl FnOnce(&mut MethodBuilder),
) -> (Interpreter, TaggedValue) {
    let mut interp =
        Interpreter::with_config(build_main(nregs, build), config).expect("program should load");
    let result = interp.run().expect("program should run");
    (interp, result)
}

/// Assert a result is the given guest string
#[allow(dead_code)]
pub fn expect_string(interp: &Interpreter, value: TaggedValue, expected: &str) {
    let actual = interp
        .thread()
        .heap
        .string(value)
        .unwrap_or_else(|| panic!("expected string {:?}, got {:?}", expected, value));
    assert_eq!(actual, expected);
}

/// Allocate a plain object with the given data properties
#[allow(dead_code)]
pub fn make_object(interp: &mut Interpreter, props: &[(&str, TaggedValue)]) -> TaggedValue {
    let thread = interp.thread_mut();
    let atoms: Vec<_> = props.iter().map(|(name, _)| thread.intern(name)).collect();
    let mut obj = JsObject::new();
    for (atom, (_, value)) in atoms.into_iter().zip(props) {
        obj.define_own(atom, *value);
    }
    thread.heap.alloc_object(obj)
}

/// Read an own data property off an object (test inspection)
#[allow(dead_code)]
pub fn get_own(interp: &mut Interpreter, obj: TaggedValue, name: &str) -> TaggedValue {
    let atom = interp.thread_mut().intern(name);
    interp
        .thread()
        .heap
        .object(obj)
        .and_then(|o| o.slot_of(atom).map(|slot| o.value_at(slot)))
        .unwrap_or(TaggedValue::UNDEFINED)
}
