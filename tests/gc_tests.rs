//! Safepoint and collection behavior: values reachable only through frame
//! records and register windows must survive collections triggered on loop
//! backedges

mod common;
use common::{build_main, expect_string};

use cinnabar::{Interpreter, InterpreterConfig, Opcode};

/// A loop that concatenates `n` copies of "x" into v1, forcing heap
/// allocations every iteration while backedges run safepoint checks
fn concat_loop(n: i32) -> cinnabar::Program {
    build_main(2, |b| {
        b.ldai(n);
        b.sta(0);
        b.lda_str("");
        b.sta(1);
        let top = b.new_label();
        let done = b.new_label();
        b.bind(top);
        b.lda(0);
        b.jeqz(done);
        b.lda_str("x");
        b.binary(Opcode::Add2, 1);
        b.sta(1);
        b.lda(0);
        b.simple(Opcode::Dec);
        b.sta(0);
        b.jmp(top);
        b.bind(done);
        b.lda(1);
        b.simple(Opcode::Return);
    })
}

#[test]
fn values_survive_collections_during_hot_loops() {
    // Aggressive settings: safepoint on every backedge, collect every few
    // allocations
    let config = InterpreterConfig::new()
        .with_hotness_threshold(1)
        .with_gc_interval(4);
    let mut interp = Interpreter::with_config(concat_loop(50), config).unwrap();
    let result = interp.run().unwrap();

    assert!(interp.thread().heap.collections() > 0, "no collection ran");
    assert!(interp.thread().safepoints() > 0, "no safepoint was taken");
    expect_string(&interp, result, &"x".repeat(50));
}

#[test]
fn collections_reclaim_unreachable_intermediates() {
    let config = InterpreterConfig::new()
        .with_hotness_threshold(1)
        .with_gc_interval(4);
    let mut interp = Interpreter::with_config(concat_loop(100), config).unwrap();
    interp.run().unwrap();

    // The loop made hundreds of intermediate strings; after the run only a
    // bounded residue may remain live
    let live = interp.thread().heap.live_cells();
    assert!(live < 50, "heap retained {live} cells");
}

#[test]
fn default_configuration_stays_quiet_on_small_programs() {
    let mut interp = Interpreter::new(concat_loop(3)).unwrap();
    let result = interp.run().unwrap();
    expect_string(&interp, result, "xxx");
    assert_eq!(interp.thread().heap.collections(), 0);
}

#[test]
fn globals_survive_collections() {
    let config = InterpreterConfig::new()
        .with_hotness_threshold(1)
        .with_gc_interval(2);
    let mut interp = Interpreter::with_config(concat_loop(20), config).unwrap();
    let marker = interp.alloc_string("keep me");
    interp.set_global("marker", marker);
    interp.run().unwrap();
    let kept = interp.get_global("marker");
    assert_eq!(interp.thread().heap.string(kept), Some("keep me"));
}
