//! Performance benchmarks for the Cinnabar interpreter
//!
//! Run with: cargo bench
//!
//! Measured surfaces:
//! - dispatch-loop throughput on a tight arithmetic loop
//! - call/return overhead through recursion
//! - property access with warm inline caches

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cinnabar::{
    FunctionKind, Interpreter, InterpreterConfig, MethodBuilder, Opcode, Program, TaggedValue,
};

/// countdown(n): while (n) n-- ; return n
fn countdown_program() -> Program {
    let mut main = MethodBuilder::new("main", 1);
    main.ldai(10_000);
    main.sta(0);
    let top = main.new_label();
    let done = main.new_label();
    main.bind(top);
    main.lda(0);
    main.jeqz(done);
    main.lda(0);
    main.simple(Opcode::Dec);
    main.sta(0);
    main.jmp(top);
    main.bind(done);
    main.lda(0);
    main.simple(Opcode::Return);
    Program::with_entry(main.finish().expect("countdown assembles"))
}

/// fib(n) via naive recursion through a global binding
fn fib_program(n: i32) -> Program {
    let mut fib = MethodBuilder::new("fib", 3).args(1);
    let recurse = fib.new_label();
    fib.ldai(2);
    fib.binary(Opcode::Less, 3); // n < 2
    fib.jeqz(recurse);
    fib.lda(3);
    fib.simple(Opcode::Return);
    fib.bind(recurse);
    fib.lda(3);
    fib.simple(Opcode::Dec);
    fib.sta(0);
    fib.global_op(Opcode::TryLdGlobalByName, "fib");
    fib.call(Opcode::CallArg1, &[0]);
    fib.sta(1);
    fib.lda(3);
    fib.simple(Opcode::Dec);
    fib.simple(Opcode::Dec);
    fib.sta(0);
    fib.global_op(Opcode::TryLdGlobalByName, "fib");
    fib.call(Opcode::CallArg1, &[0]);
    fib.binary(Opcode::Add2, 1);
    fib.simple(Opcode::Return);

    let mut main = MethodBuilder::new("main", 1);
    main.define_func(1);
    main.global_op(Opcode::StGlobalVar, "fib");
    main.ldai(n);
    main.sta(0);
    main.global_op(Opcode::TryLdGlobalByName, "fib");
    main.call(Opcode::CallArg1, &[0]);
    main.simple(Opcode::Return);

    Program {
        methods: vec![
            main.finish().expect("main assembles"),
            fib.finish().expect("fib assembles"),
        ],
        entry: 0,
    }
}

/// Repeated `o.x` loads against a stable shape (warm monomorphic cache)
fn property_program() -> Program {
    let mut main = MethodBuilder::new("main", 3);
    main.simple(Opcode::CreateEmptyObject);
    main.sta(1);
    main.ldai(7);
    main.st_own_by_name("x", 1);
    main.ldai(5_000);
    main.sta(0);
    let top = main.new_label();
    let done = main.new_label();
    main.bind(top);
    main.lda(0);
    main.jeqz(done);
    main.lda(1);
    main.ld_obj_by_name("x");
    main.sta(2);
    main.lda(0);
    main.simple(Opcode::Dec);
    main.sta(0);
    main.jmp(top);
    main.bind(done);
    main.lda(2);
    main.simple(Opcode::Return);
    Program::with_entry(main.finish().expect("property loop assembles"))
}

fn bench_dispatch_loop(c: &mut Criterion) {
    c.bench_function("dispatch/countdown_10k", |b| {
        let program = countdown_program();
        b.iter(|| {
            let mut interp = Interpreter::new(black_box(program.clone())).unwrap();
            interp.run().unwrap()
        })
    });
}

fn bench_calls(c: &mut Criterion) {
    c.bench_function("calls/fib_15", |b| {
        let program = fib_program(15);
        b.iter(|| {
            let mut interp = Interpreter::new(black_box(program.clone())).unwrap();
            interp.run().unwrap()
        })
    });
}

fn bench_property_ic(c: &mut Criterion) {
    let mut group = c.benchmark_group("property");
    group.bench_function("cold_caches", |b| {
        let program = property_program();
        // Hotness never crosses: every load takes the uncached path
        let config = InterpreterConfig::new().with_hotness_threshold(i32::MAX);
        b.iter(|| {
            let mut interp =
                Interpreter::with_config(black_box(program.clone()), config.clone()).unwrap();
            interp.run().unwrap()
        })
    });
    group.bench_function("warm_caches", |b| {
        let program = property_program();
        let config = InterpreterConfig::new().with_hotness_threshold(1);
        b.iter(|| {
            let mut interp =
                Interpreter::with_config(black_box(program.clone()), config.clone()).unwrap();
            interp.run().unwrap()
        })
    });
    group.finish();
}

fn bench_generator_cycle(c: &mut Criterion) {
    use cinnabar::ResumeMode;
    c.bench_function("generator/resume_cycle", |b| {
        // yield loop: park, hand a value back, repeat
        let mut main = MethodBuilder::new("main", 0);
        main.define_func(1);
        main.call(Opcode::CallArg0, &[]);
        main.simple(Opcode::Return);
        let mut body = MethodBuilder::new("gen", 4).kind(FunctionKind::Generator);
        body.simple(Opcode::LdFunction);
        body.sta(2);
        body.call(Opcode::CreateGeneratorObj, &[2]);
        body.sta(3);
        body.call(Opcode::SuspendGenerator, &[3]);
        let top = body.new_label();
        body.bind(top);
        body.call(Opcode::ResumeGenerator, &[3]);
        body.call(Opcode::SuspendGenerator, &[3]);
        body.jmp(top);
        let program = Program {
            methods: vec![
                main.finish().expect("main assembles"),
                body.finish().expect("gen assembles"),
            ],
            entry: 0,
        };
        b.iter(|| {
            let mut interp = Interpreter::new(program.clone()).unwrap();
            let generator = interp.run().unwrap();
            for i in 0..100 {
                interp
                    .resume_generator(generator, TaggedValue::int(i), ResumeMode::Next)
                    .unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_dispatch_loop,
    bench_calls,
    bench_property_ic,
    bench_generator_cycle
);
criterion_main!(benches);
