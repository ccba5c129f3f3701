use generative_artifact::{CallContext, Value};
use generative_core::{explain_all, Adapted, Engine, Explaining, OracleCritic, Route, Stage};
use generative_test_utils::{add_unit, broken_unit, multiply_unit, ScriptedOracle};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_oracle_critic_gates_execution() {
    let generator = Arc::new(ScriptedOracle::always("def add(a, b):\n    return sum([a, b])\n"));
    let judge = Arc::new(
        ScriptedOracle::new()
            .then("After careful review: True.")
            .then("false, the candidate ignores b"),
    );
    let engine = Arc::new(
        Engine::default()
            .with_oracle(generator)
            .with_critic(Arc::new(OracleCritic::new(judge.clone()))),
    );
    let adapted = Adapted::new(add_unit(), engine);

    let approved = adapted.call(CallContext::positional([3, 4])).await.unwrap();
    assert_eq!(approved.route, Route::Synthesized);
    assert_eq!(
        approved.path,
        vec![
            Stage::Start,
            Stage::Synthesize,
            Stage::Validate,
            Stage::Critique,
            Stage::Execute,
            Stage::Done
        ]
    );

    let rejected = adapted.call(CallContext::positional([3, 4])).await.unwrap();
    assert_eq!(rejected.route, Route::Original);
    assert_eq!(rejected.value, Value::Int(7));
    assert!(judge
        .last_prompt()
        .unwrap()
        .ends_with("is_semantically_correct(code, input, context) ="));
}

#[tokio::test]
async fn test_call_all_keeps_order() {
    let oracle = Arc::new(ScriptedOracle::always("def add(a, b):\n    return sum([a, b])\n"));
    let engine = Arc::new(Engine::default().with_oracle(oracle).with_memory_cache());
    let results = Adapted::new(add_unit(), engine)
        .call_all((0..4).map(|i| CallContext::positional([i, i])))
        .await;
    let values: Vec<Value> = results.into_iter().map(|r| r.unwrap().value).collect();
    assert_eq!(values, vec![Value::Int(0), Value::Int(2), Value::Int(4), Value::Int(6)]);
}

#[tokio::test]
async fn test_explained_error_keeps_original() {
    let oracle = Arc::new(ScriptedOracle::always("  The divisor is hard-coded to zero.\n"));
    let engine = Arc::new(Engine::default().with_oracle(oracle.clone()));
    let explaining = Explaining::new(broken_unit(), engine);

    let err = explaining.call(CallContext::positional([1, 2])).await.unwrap_err();
    assert_eq!(err.original().kind, "ZeroDivisionError");
    assert_eq!(err.summary(), Some("The divisor is hard-coded to zero."));
    assert!(oracle.last_prompt().unwrap().contains("Traceback (most recent call last):"));
}

#[tokio::test]
async fn test_explain_all_leaves_successes_alone() {
    let oracle = Arc::new(ScriptedOracle::failing());
    let engine = Arc::new(Engine::default().with_oracle(oracle.clone()));
    let units = explain_all([multiply_unit(), broken_unit()], &engine);
    assert_eq!(units.keys().cloned().collect::<Vec<_>>(), vec!["divide", "multiply"]);

    let product = units["multiply"].call(CallContext::positional([3, 4])).await.unwrap();
    assert_eq!(product, Value::Int(12));
    assert_eq!(oracle.calls(), 0);

    let err = units["divide"].call(CallContext::positional([3, 4])).await.unwrap_err();
    assert_eq!(err.summary(), None);
    assert_eq!(oracle.calls(), 1);
}
