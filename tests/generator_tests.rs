//! Generator suspend/resume: state round-trips, resume modes, completion

use cinnabar::{
    Error, ErrorKind, FunctionKind, GeneratorState, Interpreter, MethodBuilder, Opcode, Program,
    ResumeMode, TaggedValue, ThrowOp,
};

/// Emit the canonical resume-mode dispatch: `dst` = sent value, `v1` = mode,
/// `v2` scratch. Throw mode re-raises the sent value, return mode returns it.
fn emit_resume_dispatch(b: &mut MethodBuilder, gen_reg: u8, dst: u8) {
    b.call(Opcode::ResumeGenerator, &[gen_reg]);
    b.sta(dst);
    b.call(Opcode::GetResumeMode, &[gen_reg]);
    b.sta(1);

    let not_throw = b.new_label();
    b.ldai(ResumeMode::Throw as i32);
    b.sta(2);
    b.lda(1);
    b.binary(Opcode::StrictEq, 2);
    b.jeqz(not_throw);
    b.lda(dst);
    b.throw_op(ThrowOp::Throw);
    b.bind(not_throw);

    let not_return = b.new_label();
    b.ldai(ResumeMode::Return as i32);
    b.sta(2);
    b.lda(1);
    b.binary(Opcode::StrictEq, 2);
    b.jeqz(not_return);
    b.lda(dst);
    b.simple(Opcode::Return);
    b.bind(not_return);
}

/// Generator body:
///   yield 10; yield <first sent value>; return 99
/// with full resume-mode dispatch after every suspension.
fn counting_generator(protected: bool) -> Program {
    let mut main = MethodBuilder::new("main", 0);
    main.define_func(1);
    main.call(Opcode::CallArg0, &[]);
    main.simple(Opcode::Return);

    let mut body = MethodBuilder::new("gen", 8).kind(FunctionKind::Generator);
    let start = body.new_label();
    let end = body.new_label();
    let handler = body.new_label();
    body.bind(start);
    // Prologue: materialize the generator object and park
    body.simple(Opcode::LdFunction);
    body.sta(6);
    body.call(Opcode::CreateGeneratorObj, &[6]);
    body.sta(7);
    body.call(Opcode::SuspendGenerator, &[7]);

    emit_resume_dispatch(&mut body, 7, 0);
    body.ldai(10);
    body.call(Opcode::SuspendGenerator, &[7]);

    emit_resume_dispatch(&mut body, 7, 3);
    // Yield the value sent at the first resume: proves the register
    // window survived the suspend/resume round-trip
    body.lda(0);
    body.call(Opcode::SuspendGenerator, &[7]);

    emit_resume_dispatch(&mut body, 7, 4);
    body.ldai(99);
    body.bind(end);
    body.simple(Opcode::Return);
    body.bind(handler);
    body.ldai(-5);
    body.simple(Opcode::Return);
    if protected {
        body.protect(start, end, handler);
    }

    Program {
        methods: vec![main.finish().unwrap(), body.finish().unwrap()],
        entry: 0,
    }
}

fn fresh_generator(protected: bool) -> (Interpreter, TaggedValue) {
    let mut interp = Interpreter::new(counting_generator(protected)).unwrap();
    let generator = interp.run().unwrap();
    assert!(interp.thread().heap.generator(generator).is_some());
    (interp, generator)
}

mod round_trip {
    use super::*;

    #[test]
    fn calling_a_generator_function_returns_a_parked_generator() {
        let (interp, generator) = fresh_generator(false);
        assert_eq!(
            interp.generator_state(generator),
            Some(GeneratorState::SuspendedYield)
        );
    }

    #[test]
    fn yields_arrive_in_order_and_vregs_survive() {
        let (mut interp, generator) = fresh_generator(false);

        let first = interp
            .resume_generator(generator, TaggedValue::int(5), ResumeMode::Next)
            .unwrap();
        assert_eq!(first.value, TaggedValue::int(10));
        assert!(!first.done);

        // The second yield hands back the value sent at the first resume
        let second = interp
            .resume_generator(generator, TaggedValue::int(77), ResumeMode::Next)
            .unwrap();
        assert_eq!(second.value, TaggedValue::int(5));
        assert!(!second.done);

        let third = interp
            .resume_generator(generator, TaggedValue::UNDEFINED, ResumeMode::Next)
            .unwrap();
        assert_eq!(third.value, TaggedValue::int(99));
        assert!(third.done);
        assert_eq!(
            interp.generator_state(generator),
            Some(GeneratorState::Completed)
        );
    }

    #[test]
    fn stack_pointer_balances_across_resume_cycles() {
        let (mut interp, generator) = fresh_generator(false);
        let before = interp.thread().stack_pointer();
        interp
            .resume_generator(generator, TaggedValue::UNDEFINED, ResumeMode::Next)
            .unwrap();
        assert_eq!(interp.thread().stack_pointer(), before);
    }

    #[test]
    fn completed_generator_answers_done_undefined() {
        let (mut interp, generator) = fresh_generator(false);
        for _ in 0..3 {
            interp
                .resume_generator(generator, TaggedValue::UNDEFINED, ResumeMode::Next)
                .unwrap();
        }
        let after = interp
            .resume_generator(generator, TaggedValue::int(1), ResumeMode::Next)
            .unwrap();
        assert_eq!(after.value, TaggedValue::UNDEFINED);
        assert!(after.done);
    }
}

mod resume_modes {
    use super::*;

    #[test]
    fn return_mode_forces_completion_with_the_sent_value() {
        let (mut interp, generator) = fresh_generator(false);
        let step = interp
            .resume_generator(generator, TaggedValue::int(42), ResumeMode::Return)
            .unwrap();
        assert_eq!(step.value, TaggedValue::int(42));
        assert!(step.done);
        assert_eq!(
            interp.generator_state(generator),
            Some(GeneratorState::Completed)
        );
    }

    #[test]
    fn throw_mode_raises_inside_the_body() {
        let (mut interp, generator) = fresh_generator(false);
        let payload = interp.alloc_string("kaboom");
        let err = interp
            .resume_generator(generator, payload, ResumeMode::Throw)
            .unwrap_err();
        match err {
            Error::UncaughtException { kind, message } => {
                assert_eq!(kind, ErrorKind::GenericError);
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(
            interp.generator_state(generator),
            Some(GeneratorState::Completed)
        );
    }

    #[test]
    fn throw_mode_is_catchable_by_a_try_inside_the_body() {
        let (mut interp, generator) = fresh_generator(true);
        let payload = interp.alloc_string("contained");
        let step = interp
            .resume_generator(generator, payload, ResumeMode::Throw)
            .unwrap();
        assert_eq!(step.value, TaggedValue::int(-5));
        assert!(step.done);
    }

    #[test]
    fn throw_into_completed_generator_rethrows() {
        let (mut interp, generator) = fresh_generator(false);
        interp
            .resume_generator(generator, TaggedValue::int(0), ResumeMode::Return)
            .unwrap();
        let payload = interp.alloc_string("late throw");
        let err = interp
            .resume_generator(generator, payload, ResumeMode::Throw)
            .unwrap_err();
        assert!(matches!(err, Error::UncaughtException { .. }));
    }

    #[test]
    fn return_into_completed_generator_echoes_the_value() {
        let (mut interp, generator) = fresh_generator(false);
        interp
            .resume_generator(generator, TaggedValue::int(0), ResumeMode::Return)
            .unwrap();
        let step = interp
            .resume_generator(generator, TaggedValue::int(8), ResumeMode::Return)
            .unwrap();
        assert_eq!(step.value, TaggedValue::int(8));
        assert!(step.done);
    }
}

mod independence {
    use super::*;

    #[test]
    fn two_generators_from_one_function_do_not_share_state() {
        let mut interp = Interpreter::new(counting_generator(false)).unwrap();
        let func = interp.make_function(1).unwrap();
        let g1 = interp.call(func, TaggedValue::UNDEFINED, &[]).unwrap();
        let g2 = interp.call(func, TaggedValue::UNDEFINED, &[]).unwrap();

        let a = interp
            .resume_generator(g1, TaggedValue::int(100), ResumeMode::Next)
            .unwrap();
        let b = interp
            .resume_generator(g2, TaggedValue::int(200), ResumeMode::Next)
            .unwrap();
        assert_eq!(a.value, TaggedValue::int(10));
        assert_eq!(b.value, TaggedValue::int(10));

        // Each generator remembered its own first sent value
        let a2 = interp
            .resume_generator(g1, TaggedValue::UNDEFINED, ResumeMode::Next)
            .unwrap();
        let b2 = interp
            .resume_generator(g2, TaggedValue::UNDEFINED, ResumeMode::Next)
            .unwrap();
        assert_eq!(a2.value, TaggedValue::int(100));
        assert_eq!(b2.value, TaggedValue::int(200));
    }

    #[test]
    fn resuming_a_non_generator_is_a_type_error() {
        let mut interp = Interpreter::new(counting_generator(false)).unwrap();
        let err = interp
            .resume_generator(TaggedValue::int(3), TaggedValue::UNDEFINED, ResumeMode::Next)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UncaughtException { kind: ErrorKind::TypeError, .. }
        ));
    }
}
