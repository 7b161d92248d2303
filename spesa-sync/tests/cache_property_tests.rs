//! Property-Based Tests for the Cache Store
//!
//! Key canonicalization, rollback exactness, notification accounting and
//! composition of overlapping optimistic patches.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use serde_json::{json, Value};
use spesa_core::{AddItemRequest, ShoppingListItem, ID_FIELD};
use spesa_sync::{list, CacheStore, Method, Request, ResourceKey, SyncError, Updater};
use spesa_test_utils::generators::{arb_args_object, arb_shopping_list, reversed};
use spesa_test_utils::{sync_client, MockTransport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn list_key() -> ResourceKey {
    ResourceKey::unit("shoppingList")
}

fn push(entry: Value) -> Updater {
    Arc::new(move |value: &mut Value| list::push(value, &entry))
}

fn to_json(items: &[ShoppingListItem]) -> Result<Value, TestCaseError> {
    serde_json::to_value(items).map_err(|e| TestCaseError::fail(e.to_string()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Argument objects that differ only in field order map to the same key.
    #[test]
    fn prop_key_ignores_field_order(fields in arb_args_object()) {
        let forward = ResourceKey::from_value("offersByBrand", &Value::Object(fields.clone()));
        let backward = ResourceKey::from_value("offersByBrand", &Value::Object(reversed(&fields)));
        prop_assert_eq!(&forward, &backward);
        prop_assert_ne!(forward, ResourceKey::from_value("offersByAisle", &Value::Object(fields)));
    }

    /// Rolling back one patch restores the exact prior value.
    #[test]
    fn prop_rollback_restores_prior_value(items in arb_shopping_list(), name in "[A-Za-z]{1,12}") {
        let store = CacheStore::default();
        let original = to_json(&items)?;
        store.set(&list_key(), original.clone());

        let patch = store
            .patch(&list_key(), push(json!({"_id": "temp-x", "productName": name})))
            .ok_or_else(|| TestCaseError::fail("patch skipped"))?;
        prop_assert_eq!(&patch.prior_value, &original);
        store.rollback(&patch).map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(store.value(&list_key()), Some(original));
    }

    /// A failed mutation leaves the cached list exactly as it was.
    #[test]
    fn prop_failed_mutation_leaves_cache_untouched(items in arb_shopping_list()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))?;
        rt.block_on(async {
            let mock = MockTransport::new();
            mock.fail(Method::Post, "/users/shopping-list", 500, json!({"message": "down"}));
            let (client, _) = sync_client(&mock);
            let original = to_json(&items)?;
            client.store().set(&list_key(), original.clone());

            let add = client
                .mutation::<AddItemRequest, Value>("addItem", |args| {
                    let body = serde_json::to_value(args).map_err(|e| SyncError::encode("addItem", e))?;
                    Ok(Request::post("/users/shopping-list").with_body(body))
                })
                .optimistic(|args, patch| {
                    let entry = json!({"_id": "temp-1", "productName": args.product_name});
                    patch.update(&list_key(), move |value| list::push(value, &entry));
                });
            let args = AddItemRequest { product_name: "Pane".into(), notes: None };
            prop_assert!(add.mutate(&args).await.is_err());
            prop_assert_eq!(client.store().value(&list_key()), Some(original));
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Every unbatched write notifies once; a batch notifies once per key.
    #[test]
    fn prop_one_notification_per_write(writes in 1usize..20) {
        let store = CacheStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = store.subscribe(&list_key(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for n in 0..writes {
            store.set(&list_key(), json!([n]));
        }
        prop_assert_eq!(calls.load(Ordering::SeqCst), writes);

        store.batch(|store| {
            for n in 0..writes {
                store.set(&list_key(), json!([n]));
            }
        });
        prop_assert_eq!(calls.load(Ordering::SeqCst), writes + 1);

        subscription.unsubscribe();
        store.set(&list_key(), json!([]));
        prop_assert_eq!(calls.load(Ordering::SeqCst), writes + 1);
    }

    /// Rolling back any subset of overlapping patches leaves exactly the
    /// effects of the others, in application order.
    #[test]
    fn prop_rollback_keeps_other_patches(
        labels in prop::collection::vec("[a-z]{1,6}", 1..8),
        undo in prop::collection::vec(any::<bool>(), 8),
    ) {
        let store = CacheStore::default();
        store.set(&list_key(), json!([]));
        let patches: Vec<_> = labels
            .iter()
            .map(|label| store.patch(&list_key(), push(json!(label))))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| TestCaseError::fail("patch skipped"))?;

        let mut expected = Vec::new();
        for (index, patch) in patches.iter().enumerate() {
            if undo[index] {
                store.rollback(patch).map_err(|e| TestCaseError::fail(e.to_string()))?;
            } else {
                expected.push(json!(labels[index]));
            }
        }
        prop_assert_eq!(store.value(&list_key()), Some(Value::Array(expected)));
    }

    /// Removing an item by id and rolling the removal back restores it.
    #[test]
    fn prop_remove_then_rollback(items in arb_shopping_list().prop_filter("non-empty", |i| !i.is_empty())) {
        let store = CacheStore::default();
        let original = to_json(&items)?;
        store.set(&list_key(), original.clone());
        let target = items[0].id.to_string();

        let patch = store
            .patch(&list_key(), Arc::new(move |value: &mut Value| list::remove_by_id(value, ID_FIELD, &target)))
            .ok_or_else(|| TestCaseError::fail("patch skipped"))?;
        let remaining = patch.applied.as_array().map(Vec::len).unwrap_or_default();
        prop_assert!(remaining < items.len());

        store.rollback(&patch).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(store.value(&list_key()), Some(original));
    }
}

#[test]
fn unit_and_empty_arguments_share_a_key() {
    let from_unit = ResourceKey::new("shoppingList", &()).unwrap();
    let from_empty = ResourceKey::new("shoppingList", &json!({})).unwrap();
    assert_eq!(from_unit, from_empty);
    assert_eq!(from_unit, list_key());
}
