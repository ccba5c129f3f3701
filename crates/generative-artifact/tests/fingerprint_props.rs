use generative_artifact::{CallContext, Fingerprint, UnitId, Value};
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-z]{0,8}".prop_map(Value::Str),
    ]
}

proptest! {
    #[test]
    fn prop_equal_calls_share_fingerprint(
        name in "[a-z_]{1,12}",
        args in prop::collection::vec(scalar(), 0..5),
        kwargs in prop::collection::btree_map("[a-z]{1,6}", scalar(), 0..4),
    ) {
        let unit = UnitId::new(name);
        let mut a = CallContext::positional(args.clone());
        let mut b = CallContext::positional(args);
        for (k, v) in &kwargs {
            a = a.kwarg(k.clone(), v.clone());
        }
        for (k, v) in kwargs.iter().rev() {
            b = b.kwarg(k.clone(), v.clone());
        }

        prop_assert_eq!(
            Fingerprint::compute(&unit, &a).unwrap(),
            Fingerprint::compute(&unit, &b).unwrap()
        );
    }

    #[test]
    fn prop_distinct_units_never_collide(
        left in "[a-z]{1,10}",
        right in "[a-z]{1,10}",
        args in prop::collection::vec(scalar(), 0..4),
    ) {
        prop_assume!(left != right);
        let call = CallContext::positional(args);
        let l = Fingerprint::compute(&UnitId::new(left), &call).unwrap();
        let r = Fingerprint::compute(&UnitId::new(right), &call).unwrap();
        prop_assert_ne!(l, r);
    }
}
