//! Numeric opcode semantics: fast/slow path agreement, overflow promotion,
//! shift masking, coercions

mod common;
use common::{expect_string, run_main, run_main_keep};

use cinnabar::{Opcode, TaggedValue};

mod int_fast_path {
    use super::*;

    #[test]
    fn add_stays_int_when_exact() {
        // 0x3FFFFFFF + 0x40000000 = 0x7FFFFFFF fits int32 exactly
        let result = run_main(1, |b| {
            b.ldai(0x3FFF_FFFF);
            b.sta(0);
            b.ldai(0x4000_0000);
            b.binary(Opcode::Add2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(2147483647));
    }

    #[test]
    fn add_overflow_promotes_to_double() {
        let result = run_main(1, |b| {
            b.ldai(i32::MAX);
            b.sta(0);
            b.ldai(1);
            b.binary(Opcode::Add2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(2147483648.0));
    }

    #[test]
    fn sub_underflow_promotes_to_double() {
        let result = run_main(1, |b| {
            b.ldai(i32::MIN);
            b.sta(0);
            b.ldai(1);
            b.binary(Opcode::Sub2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(i32::MIN as f64 - 1.0));
    }

    #[test]
    fn mul_exact_and_overflowing() {
        let exact = run_main(1, |b| {
            b.ldai(1000);
            b.sta(0);
            b.ldai(1000);
            b.binary(Opcode::Mul2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(exact, TaggedValue::int(1_000_000));

        let promoted = run_main(1, |b| {
            b.ldai(100_000);
            b.sta(0);
            b.ldai(100_000);
            b.binary(Opcode::Mul2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(promoted, TaggedValue::double(1.0e10));
    }

    #[test]
    fn exact_int_division_stays_int() {
        let result = run_main(1, |b| {
            b.ldai(6);
            b.sta(0);
            b.ldai(2);
            b.binary(Opcode::Div2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(3));
    }

    #[test]
    fn inexact_division_is_double() {
        let result = run_main(1, |b| {
            b.ldai(7);
            b.sta(0);
            b.ldai(2);
            b.binary(Opcode::Div2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(3.5));
    }

    #[test]
    fn division_by_zero_is_infinity() {
        let result = run_main(1, |b| {
            b.ldai(1);
            b.sta(0);
            b.ldai(0);
            b.binary(Opcode::Div2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(f64::INFINITY));
    }

    #[test]
    fn negative_exact_zero_quotient_is_negative_zero() {
        let result = run_main(1, |b| {
            b.ldai(0);
            b.sta(0);
            b.ldai(-1);
            b.binary(Opcode::Div2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert!(result.is_double());
        assert_eq!(result.as_double(), 0.0);
        assert!(result.as_double().is_sign_negative());
    }

    #[test]
    fn modulo_sign_follows_dividend() {
        let positive = run_main(1, |b| {
            b.ldai(5);
            b.sta(0);
            b.ldai(3);
            b.binary(Opcode::Mod2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(positive, TaggedValue::int(2));

        // -4 % 2 is -0, only representable as a double
        let negative_zero = run_main(1, |b| {
            b.ldai(-4);
            b.sta(0);
            b.ldai(2);
            b.binary(Opcode::Mod2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert!(negative_zero.is_double());
        assert!(negative_zero.as_double().is_sign_negative());
        assert_eq!(negative_zero.as_double(), 0.0);
    }

    #[test]
    fn modulo_by_zero_is_nan() {
        let result = run_main(1, |b| {
            b.ldai(5);
            b.sta(0);
            b.ldai(0);
            b.binary(Opcode::Mod2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert!(result.is_double());
        assert!(result.as_double().is_nan());
    }
}

mod double_paths {
    use super::*;

    #[test]
    fn mixed_int_double_add() {
        let result = run_main(1, |b| {
            b.fldai(0.5);
            b.sta(0);
            b.ldai(2);
            b.binary(Opcode::Add2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(2.5));
    }

    #[test]
    fn fast_and_slow_add_agree_on_overflow() {
        // Same operands, once through the int fast path, once forced
        // through the generic path by a double operand
        let via_int = run_main(1, |b| {
            b.ldai(i32::MAX);
            b.sta(0);
            b.ldai(1);
            b.binary(Opcode::Add2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        let via_double = run_main(1, |b| {
            b.ldai(i32::MAX);
            b.sta(0);
            b.fldai(1.0);
            b.binary(Opcode::Add2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(via_int.as_number(), via_double.as_number());
        assert_eq!(via_int.as_number(), 2147483648.0);
    }

    #[test]
    fn exp_of_ints_goes_through_double_math() {
        let result = run_main(1, |b| {
            b.ldai(2);
            b.sta(0);
            b.ldai(10);
            b.binary(Opcode::Exp, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result.as_number(), 1024.0);
    }
}

mod bitwise {
    use super::*;

    #[test]
    fn shift_count_is_masked_to_five_bits() {
        // 1 << 33 behaves as 1 << 1
        let result = run_main(1, |b| {
            b.ldai(1);
            b.sta(0);
            b.ldai(33);
            b.binary(Opcode::Shl2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(2));
    }

    #[test]
    fn logical_shift_of_negative_is_unsigned() {
        // -1 >>> 0 = 4294967295, past int32 so the result is a double
        let result = run_main(1, |b| {
            b.ldai(-1);
            b.sta(0);
            b.ldai(0);
            b.binary(Opcode::Shr2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(4294967295.0));
    }

    #[test]
    fn arithmetic_shift_keeps_sign() {
        let result = run_main(1, |b| {
            b.ldai(-8);
            b.sta(0);
            b.ldai(1);
            b.binary(Opcode::Ashr2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(-4));
    }

    #[test]
    fn doubles_coerce_through_to_int32() {
        // 3.7 & 6 = 3 & 6 = 2
        let result = run_main(1, |b| {
            b.fldai(3.7);
            b.sta(0);
            b.ldai(6);
            b.binary(Opcode::And2, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(2));
    }

    #[test]
    fn bitwise_not_is_int32() {
        let result = run_main(0, |b| {
            b.ldai(0);
            b.simple(Opcode::Not);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(-1));
    }
}

mod comparison {
    use super::*;

    #[test]
    fn mixed_numeric_comparison() {
        let result = run_main(1, |b| {
            b.ldai(2);
            b.sta(0);
            b.fldai(2.5);
            b.binary(Opcode::Less, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::TRUE);
    }

    #[test]
    fn nan_compares_false_both_ways() {
        for op in [Opcode::Less, Opcode::Greater, Opcode::LessEq, Opcode::GreaterEq] {
            let result = run_main(1, |b| {
                b.fldai(f64::NAN);
                b.sta(0);
                b.ldai(1);
                b.binary(op, 0);
                b.simple(Opcode::Return);
            })
            .unwrap();
            assert_eq!(result, TaggedValue::FALSE, "{:?}", op);
        }
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        let result = run_main(1, |b| {
            b.lda_str("apple");
            b.sta(0);
            b.lda_str("banana");
            b.binary(Opcode::Less, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::TRUE);
    }

    #[test]
    fn strict_equality_ignores_encoding() {
        // int 7 === double 7.0
        let result = run_main(1, |b| {
            b.ldai(7);
            b.sta(0);
            b.fldai(7.0);
            b.binary(Opcode::StrictEq, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::TRUE);
    }

    #[test]
    fn strict_equality_compares_string_contents() {
        let result = run_main(1, |b| {
            b.lda_str("abc");
            b.sta(0);
            b.lda_str("abc");
            b.binary(Opcode::StrictEq, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::TRUE);
    }

    #[test]
    fn loose_equality_coerces_strings() {
        // "42" == 42
        let result = run_main(1, |b| {
            b.lda_str("42");
            b.sta(0);
            b.ldai(42);
            b.binary(Opcode::Eq, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::TRUE);
    }

    #[test]
    fn null_and_undefined_are_loosely_equal() {
        let result = run_main(1, |b| {
            b.simple(Opcode::LdNull);
            b.sta(0);
            b.simple(Opcode::LdUndefined);
            b.binary(Opcode::Eq, 0);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::TRUE);
    }
}

mod strings_and_unary {
    use super::*;

    #[test]
    fn add_concatenates_strings() {
        let (interp, result) = run_main_keep(1, |b| {
            b.lda_str("foo");
            b.sta(0);
            b.lda_str("bar");
            b.binary(Opcode::Add2, 0);
            b.simple(Opcode::Return);
        });
        expect_string(&interp, result, "foobar");
    }

    #[test]
    fn add_concatenates_string_and_number() {
        let (interp, result) = run_main_keep(1, |b| {
            b.lda_str("n=");
            b.sta(0);
            b.ldai(5);
            b.binary(Opcode::Add2, 0);
            b.simple(Opcode::Return);
        });
        expect_string(&interp, result, "n=5");
    }

    #[test]
    fn neg_of_zero_is_negative_zero() {
        let result = run_main(0, |b| {
            b.ldai(0);
            b.simple(Opcode::Neg);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert!(result.is_double());
        assert!(result.as_double().is_sign_negative());
    }

    #[test]
    fn inc_overflow_promotes() {
        let result = run_main(0, |b| {
            b.ldai(i32::MAX);
            b.simple(Opcode::Inc);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(2147483648.0));
    }

    #[test]
    fn dec_below_min_promotes() {
        let result = run_main(0, |b| {
            b.ldai(i32::MIN);
            b.simple(Opcode::Dec);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(i32::MIN as f64 - 1.0));
    }

    #[test]
    fn tonumeric_parses_strings() {
        let result = run_main(0, |b| {
            b.lda_str("  12.5 ");
            b.simple(Opcode::ToNumeric);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::double(12.5));
    }

    #[test]
    fn tonumeric_of_boolean() {
        let result = run_main(0, |b| {
            b.simple(Opcode::LdTrue);
            b.simple(Opcode::ToNumeric);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(1));
    }

    #[test]
    fn typeof_of_number() {
        let (interp, result) = run_main_keep(0, |b| {
            b.ldai(3);
            b.simple(Opcode::Typeof);
            b.simple(Opcode::Return);
        });
        expect_string(&interp, result, "number");
    }

    #[test]
    fn istrue_on_strings() {
        let truthy = run_main(0, |b| {
            b.lda_str("x");
            b.simple(Opcode::IsTrue);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(truthy, TaggedValue::TRUE);

        let falsy = run_main(0, |b| {
            b.lda_str("");
            b.simple(Opcode::IsTrue);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(falsy, TaggedValue::FALSE);
    }
}

mod control_flow {
    use super::*;

    #[test]
    fn countdown_loop_sums() {
        // sum = 0; n = 10; while (n) { sum += n; n-- } return sum
        let result = run_main(2, |b| {
            b.ldai(10);
            b.sta(0);
            b.ldai(0);
            b.sta(1);
            let top = b.new_label();
            let done = b.new_label();
            b.bind(top);
            b.lda(0);
            b.jeqz(done);
            b.lda(0);
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
        .unwrap();
        assert_eq!(result, TaggedValue::int(55));
    }

    #[test]
    fn short_jump_encoding_works() {
        let result = run_main(0, |b| {
            let done = b.new_label();
            b.ldai(1);
            b.jmp8(done);
            b.ldai(2);
            b.bind(done);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(1));
    }

    #[test]
    fn jnez_takes_branch_on_true() {
        let result = run_main(0, |b| {
            let yes = b.new_label();
            b.simple(Opcode::LdTrue);
            b.jnez(yes);
            b.ldai(0);
            b.simple(Opcode::Return);
            b.bind(yes);
            b.ldai(1);
            b.simple(Opcode::Return);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::int(1));
    }

    #[test]
    fn falling_off_the_end_returns_undefined() {
        let result = run_main(0, |b| {
            b.ldai(9);
        })
        .unwrap();
        assert_eq!(result, TaggedValue::UNDEFINED);
    }
}
