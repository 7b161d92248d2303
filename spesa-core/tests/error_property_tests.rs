use proptest::prelude::*;
use serde_json::{json, Value};
use spesa_core::{ApiFailure, ItemId, FIELD_MESSAGE_SEPARATOR};

fn arb_message() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z ]{0,30}[A-Za-z]"
}

fn arb_status() -> impl Strategy<Value = u16> {
    400u16..600
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_field_errors_fold_into_one_message(
        status in 400u16..500,
        messages in prop::collection::vec(arb_message(), 1..6),
    ) {
        let errors: Vec<Value> = messages.iter().map(|m| json!({ "msg": m })).collect();
        let failure = ApiFailure::from_json(status, &json!({ "errors": errors }));
        prop_assert_eq!(&failure.field_messages, &messages);
        prop_assert_eq!(&failure.message, &messages.join(FIELD_MESSAGE_SEPARATOR));
        prop_assert!(failure.is_validation());
    }

    #[test]
    fn prop_single_message_keys_are_equivalent(
        status in arb_status(),
        message in arb_message(),
        key in prop::sample::select(vec!["message", "msg", "error"]),
    ) {
        let failure = ApiFailure::from_json(status, &json!({ key: message.clone() }));
        prop_assert_eq!(&failure.message, &message);
        prop_assert!(failure.field_messages.is_empty());
        prop_assert!(!failure.is_validation());
    }

    #[test]
    fn prop_plain_text_bodies_are_kept(
        status in arb_status(),
        text in arb_message().prop_filter("not json", |t| serde_json::from_str::<Value>(t).is_err()),
    ) {
        let failure = ApiFailure::from_body(status, &format!("  {}\n", text));
        prop_assert_eq!(failure.message, text);
        prop_assert_eq!(failure.status, status);
    }

    #[test]
    fn prop_empty_bodies_never_yield_an_empty_message(status in arb_status(), padding in " {0,4}") {
        let failure = ApiFailure::from_body(status, &padding);
        prop_assert!(!failure.message.is_empty());
        prop_assert!(failure.message.contains(&status.to_string()));
    }

    #[test]
    fn prop_temporary_ids_never_collide(count in 2usize..64) {
        let ids: std::collections::HashSet<ItemId> = (0..count).map(|_| ItemId::temporary()).collect();
        prop_assert_eq!(ids.len(), count);
        prop_assert!(ids.iter().all(ItemId::is_temporary));
    }
}
