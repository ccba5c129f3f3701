use generative_artifact::{CallContext, Origin, Value};
use generative_sandbox::{
    CapabilityPolicy, CompileErrorKind, FaultKind, Interpreter, Sandbox, ValidationVerdict,
    Validator,
};
use proptest::prelude::*;

fn load(source: &str) -> (Interpreter, generative_sandbox::LoadedUnit) {
    let artifact = Validator::default()
        .validate(source, Origin::Supplied)
        .into_result()
        .unwrap();
    let sandbox = Interpreter::default();
    let unit = sandbox
        .compile(artifact.source(), artifact.entry_point(), &[])
        .unwrap();
    (sandbox, unit)
}

#[test]
fn test_validated_oracle_output_runs() {
    let raw = "Certainly!\n```python\n### BEGIN FUNCTION ###\ndef func(a, b):\n    return a + b\n### END FUNCTION ###\n```\nLet me know.";
    let (sandbox, unit) = load(raw);
    let value = sandbox.run(&unit, &CallContext::positional([3, 4])).unwrap();
    assert_eq!(value, Value::Int(7));
}

#[test]
fn test_materialized_attribute_runs_without_arguments() {
    let raw = "def save_custom_mode():\n    modes = {'eco': 3, 'turbo': 9}\n    return sorted(modes.keys())\n";
    let (sandbox, unit) = load(raw);
    let value = sandbox.run(&unit, &CallContext::new()).unwrap();
    assert_eq!(value, Value::from(vec!["eco", "turbo"]));
}

#[test]
fn test_algorithmic_unit() {
    let raw = "def primes(limit):\n    sieve = [True] * (limit + 1)\n    sieve[0] = False\n    sieve[1] = False\n    i = 2\n    while i * i <= limit:\n        if sieve[i]:\n            for j in range(i * i, limit + 1, i):\n                sieve[j] = False\n        i += 1\n    return [n for n, is_prime in enumerate(sieve) if is_prime]\n";
    let (sandbox, unit) = load(raw);
    let value = sandbox.run(&unit, &CallContext::positional([20])).unwrap();
    assert_eq!(value, Value::from(vec![2, 3, 5, 7, 11, 13, 17, 19]));
}

#[test]
fn test_word_frequency_unit() {
    let raw = "def freq(text):\n    counts = {}\n    for word in text.lower().split():\n        counts[word] = counts.get(word, 0) + 1\n    return max(counts.items(), key=lambda kv: kv[1])[0]\n";
    let (sandbox, unit) = load(raw);
    let value = sandbox
        .run(&unit, &CallContext::positional(["a b A c b a"]))
        .unwrap();
    assert_eq!(value, Value::from("a"));
}

#[test]
fn test_runtime_faults_carry_class_and_line() {
    let (sandbox, unit) = load("def div(a, b):\n    q = a // b\n    return q\n");
    let err = sandbox.run(&unit, &CallContext::positional([1, 0])).unwrap_err();
    assert_eq!(err.kind, FaultKind::Raised("ZeroDivisionError".into()));
    assert_eq!(err.line, Some(2));
}

#[test]
fn test_disallowed_builtin_fails_to_compile() {
    let sandbox = Interpreter::new(CapabilityPolicy::default().deny_builtin("sorted"));
    let err = sandbox
        .compile("def f(xs):\n    return sorted(xs)\n", "f", &[])
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Forbidden);
}

#[test]
fn test_dunder_access_fails_to_compile() {
    let sandbox = Interpreter::default();
    let err = sandbox
        .compile("def f(x):\n    return x.__class__\n", "f", &[])
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Forbidden);
}

#[test]
fn test_size_limit_stops_runaway_growth() {
    let sandbox = Interpreter::new(CapabilityPolicy::default().with_max_sequence_len(1_000));
    let unit = sandbox
        .compile("def grow():\n    xs = [0]\n    while True:\n        xs = xs + xs\n", "grow", &[])
        .unwrap();
    let err = sandbox.run(&unit, &CallContext::new()).unwrap_err();
    assert_eq!(err.kind, FaultKind::SizeLimit);
}

#[test]
fn test_placeholder_is_incomplete_with_or_without_markers() {
    let bare = "def f(a):\n    pass\n";
    let wrapped = format!("### BEGIN FUNCTION ###\n{bare}### END FUNCTION ###");
    for raw in [bare.to_string(), wrapped] {
        assert!(matches!(
            Validator::default().validate(&raw, Origin::Oracle),
            ValidationVerdict::Incomplete(_)
        ));
    }
}

proptest! {
    #[test]
    fn prop_synthesized_add_matches_native(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let (sandbox, unit) = load("def add(a, b):\n    return sum([a, b])\n");
        let value = sandbox.run(&unit, &CallContext::positional([a, b])).unwrap();
        prop_assert_eq!(value, Value::Int(a + b));
    }

    #[test]
    fn prop_floor_division_matches_euclid_adjusted(a in -10_000i64..10_000, b in 1i64..100) {
        let (sandbox, unit) = load("def qr(a, b):\n    return a // b, a % b\n");
        let value = sandbox.run(&unit, &CallContext::positional([a, b])).unwrap();
        prop_assert_eq!(
            value,
            Value::Tuple(vec![Value::Int(a.div_euclid(b)), Value::Int(a.rem_euclid(b))])
        );
    }
}
