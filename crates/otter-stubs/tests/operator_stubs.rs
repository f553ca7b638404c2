//! Unary, binary, coercion and type-check stubs

mod common;

use common::Env;
use otter_stub_cfg::{DeoptReason, FatalReason, Gap, Trap};
use otter_stub_heap::Value;
use otter_stub_heap::value::{SMI_MAX, SMI_MIN};
use otter_stubs::{BinaryOp, StubError};

fn smi(n: i64) -> Value {
    Value::try_smi(n).unwrap()
}

fn deopt(reason: DeoptReason) -> StubError {
    StubError::Trap(Trap::Unimplemented(Gap::Deoptimize(reason)))
}

#[test]
fn test_arithmetic_fast_path() {
    let mut env = Env::new();
    assert_eq!(env.call("binary/+", &[smi(40), smi(2)]).unwrap(), smi(42));
    assert_eq!(env.call("binary/-", &[smi(2), smi(5)]).unwrap(), smi(-3));
    assert_eq!(env.call("binary/*", &[smi(6), smi(7)]).unwrap(), smi(42));
    assert_eq!(env.call("binary/*", &[smi(-4), smi(3)]).unwrap(), smi(-12));
}

#[test]
fn test_arithmetic_overflow_traps() {
    let mut env = Env::new();
    assert_eq!(
        env.call("binary/+", &[smi(SMI_MAX), smi(1)]).unwrap_err(),
        deopt(DeoptReason::Overflow)
    );
    assert_eq!(
        env.call("binary/-", &[smi(SMI_MIN), smi(1)]).unwrap_err(),
        deopt(DeoptReason::Overflow)
    );
    assert_eq!(
        env.call("binary/*", &[smi(SMI_MAX), smi(2)]).unwrap_err(),
        deopt(DeoptReason::Overflow)
    );
    // Largest sum that still fits
    assert_eq!(
        env.call("binary/+", &[smi(SMI_MAX - 1), smi(1)]).unwrap(),
        smi(SMI_MAX)
    );
}

#[test]
fn test_heap_operand_traps() {
    let mut env = Env::new();
    let obj = env.object();
    assert_eq!(
        env.call("binary/+", &[obj, smi(1)]).unwrap_err(),
        deopt(DeoptReason::NonSmiOperand)
    );
    assert_eq!(
        env.call("binary/<", &[smi(1), obj]).unwrap_err(),
        deopt(DeoptReason::NonSmiOperand)
    );
}

#[test]
fn test_comparisons() {
    let mut env = Env::new();
    let t = env.boolean(true);
    let f = env.boolean(false);
    let cases = [
        (BinaryOp::Lt, 1, 2, t),
        (BinaryOp::Lt, 2, 2, f),
        (BinaryOp::Le, 2, 2, t),
        (BinaryOp::Le, 3, 2, f),
        (BinaryOp::Gt, 3, 2, t),
        (BinaryOp::Gt, 2, 3, f),
        (BinaryOp::Ge, 2, 2, t),
        (BinaryOp::Ge, 1, 2, f),
        (BinaryOp::Eq, 5, 5, t),
        (BinaryOp::Eq, 5, 6, f),
        (BinaryOp::Ne, 5, 6, t),
        (BinaryOp::Ne, -5, -5, f),
    ];
    for (op, l, r, expected) in cases {
        let got = env.call(&op.stub_name(), &[smi(l), smi(r)]).unwrap();
        assert_eq!(got, expected, "{} {} {}", l, op.symbol(), r);
    }
}

#[test]
fn test_greater_is_swapped_less() {
    let mut env = Env::new();
    let values = [-3, 0, 1, 7, SMI_MAX];
    for a in values {
        for b in values {
            let gt = env.call("binary/>", &[smi(a), smi(b)]).unwrap();
            let lt = env.call("binary/<", &[smi(b), smi(a)]).unwrap();
            assert_eq!(gt, lt);
            let ge = env.call("binary/>=", &[smi(a), smi(b)]).unwrap();
            let le = env.call("binary/<=", &[smi(b), smi(a)]).unwrap();
            assert_eq!(ge, le);
        }
    }
}

#[test]
fn test_unary_negation() {
    let mut env = Env::new();
    assert_eq!(env.call("unary/-", &[smi(5)]).unwrap(), smi(-5));
    assert_eq!(env.call("unary/-", &[smi(SMI_MAX)]).unwrap(), smi(-SMI_MAX));
    assert_eq!(
        env.call("unary/-", &[smi(SMI_MIN)]).unwrap_err(),
        deopt(DeoptReason::Overflow)
    );
    let undefined = env.undefined();
    assert_eq!(
        env.call("unary/-", &[undefined]).unwrap_err(),
        deopt(DeoptReason::NonSmiOperand)
    );
}

#[test]
fn test_coerce_boolean() {
    let mut env = Env::new();
    let t = env.boolean(true);
    let f = env.boolean(false);
    let undefined = env.undefined();
    let empty = env.atom("");
    let name = env.atom("name");
    let obj = env.object();

    assert_eq!(env.call("coerce/boolean", &[smi(0)]).unwrap(), f);
    assert_eq!(env.call("coerce/boolean", &[smi(-3)]).unwrap(), t);
    assert_eq!(env.call("coerce/boolean", &[t]).unwrap(), t);
    assert_eq!(env.call("coerce/boolean", &[f]).unwrap(), f);
    assert_eq!(env.call("coerce/boolean", &[undefined]).unwrap(), f);
    assert_eq!(env.call("coerce/boolean", &[empty]).unwrap(), f);
    assert_eq!(env.call("coerce/boolean", &[name]).unwrap(), t);
    assert_eq!(env.call("coerce/boolean", &[obj]).unwrap(), t);
}

#[test]
fn test_booleans_skip_the_runtime() {
    let mut env = Env::new();
    let t = env.boolean(true);
    env.call("coerce/boolean", &[t]).unwrap();
    env.call("coerce/boolean", &[smi(1)]).unwrap();
    assert_eq!(env.rt.calls(), 0);

    let undefined = env.undefined();
    env.call("coerce/boolean", &[undefined]).unwrap();
    assert_eq!(env.rt.calls(), 1);
}

#[test]
fn test_check_function_rejects_non_functions() {
    let mut env = Env::new();
    let not_a_function = StubError::Trap(Trap::Fatal(FatalReason::NotAFunction));
    let obj = env.object();
    assert_eq!(env.call("checkFunction", &[smi(1)]).unwrap_err(), not_a_function);
    assert_eq!(env.call("checkFunction", &[obj]).unwrap_err(), not_a_function);
}

#[test]
fn test_missing_operand_is_fatal() {
    let mut env = Env::new();
    assert_eq!(
        env.call("binary/+", &[smi(1)]).unwrap_err(),
        StubError::Trap(Trap::Fatal(FatalReason::MissingArgument(1)))
    );
}
