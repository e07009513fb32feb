use proptest::prelude::*;
use serde_json::{json, Value};
use tether_core::{FailureClassifier, Signature};
use tether_explore::CheckFailure;
use tether_ir::OperationId;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

proptest! {
    #[test]
    fn prop_classify_is_idempotent_on_signature(
        check in "[a-z_]{1,12}",
        title in "[A-Za-z ]{1,20}",
        status in 500u16..600,
        id in any::<u64>(),
    ) {
        let failure = CheckFailure::new(&check, &title, "message")
            .with_context(json!({"status_code": status, "body": {"id": id}}));
        let operation = OperationId::new("getUser");
        let mut classifier = FailureClassifier::new();

        let first = classifier.classify(&failure, &operation, || true);
        let second = classifier.classify(&failure, &operation, || true);
        prop_assert_eq!(&first.signature, &second.signature);
        prop_assert!(first.is_new);
        prop_assert!(!second.is_new);
        prop_assert_eq!(first.signature.clone(), Signature::compute(&failure, &operation));
    }

    #[test]
    fn prop_nested_scalars_do_not_change_signature(a in scalar(), b in scalar(), n in 0usize..5) {
        let same_shape = |v: &Value| match v {
            Value::Number(_) => 0,
            Value::Bool(_) => 1,
            Value::String(_) => 2,
            _ => 3,
        };
        prop_assume!(same_shape(&a) == same_shape(&b));

        let operation = OperationId::new("createUser");
        let left = CheckFailure::new("check", "Title", "m")
            .with_context(json!({"body": {"field": a.clone(), "list": vec![a; n + 1]}}));
        let right = CheckFailure::new("check", "Title", "m")
            .with_context(json!({"body": {"field": b.clone(), "list": vec![b; 1]}}));
        prop_assert_eq!(
            Signature::compute(&left, &operation),
            Signature::compute(&right, &operation)
        );
    }
}
