//! Spesa Test Utilities
//!
//! Shared test infrastructure for the Spesa workspace:
//! - A scripted [`MockTransport`] with call recording and gated responses
//! - Fixtures for users, shopping lists and offers
//! - Proptest generators for domain records and argument objects

pub use spesa_core::{
    AuthResponse, ItemId, Offer, OfferId, OffersPage, ShoppingListItem, Timestamp, User, UserId,
};
pub use spesa_sync::{
    CacheConfig, CacheStore, InMemoryCredentials, Method, Request, Response, ResponseBody,
    SyncClient, Transport, TransportError,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Holds a scripted response until [`Gate::open`] is called.
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Let every request waiting on this gate complete.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Clone)]
struct Scripted {
    status: u16,
    outcome: Result<Value, TransportError>,
    gate: Option<watch::Receiver<bool>>,
}

#[derive(Default)]
struct Route {
    queue: VecDeque<Scripted>,
    last: Option<Scripted>,
}

impl Route {
    fn next(&mut self) -> Option<Scripted> {
        if let Some(scripted) = self.queue.pop_front() {
            self.last = Some(scripted);
        }
        self.last.clone()
    }
}

#[derive(Default)]
struct MockState {
    routes: HashMap<(Method, String), Route>,
    calls: Vec<Request>,
}

/// In-memory [`Transport`] answering from scripted responses.
///
/// Responses are keyed by method and target (path plus query string).
/// Each scripted response is served once, in order; once the queue is empty
/// the last one served repeats. Requests to unscripted routes fail with a 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script(&self, method: Method, target: &str, scripted: Scripted) {
        self.state()
            .routes
            .entry((method, target.to_string()))
            .or_default()
            .queue
            .push_back(scripted);
    }

    /// Answer with a 200 and `body`.
    pub fn ok(&self, method: Method, target: &str, body: Value) -> &Self {
        self.script(
            method,
            target,
            Scripted {
                status: 200,
                outcome: Ok(body),
                gate: None,
            },
        );
        self
    }

    /// Answer with a non-2xx status and a JSON body.
    pub fn fail(&self, method: Method, target: &str, status: u16, body: Value) -> &Self {
        self.script(
            method,
            target,
            Scripted {
                status,
                outcome: Err(TransportError::Api {
                    status,
                    body: ResponseBody::Json(body),
                }),
                gate: None,
            },
        );
        self
    }

    /// Fail without any response, as if offline.
    pub fn network_failure(&self, method: Method, target: &str, reason: &str) -> &Self {
        self.script(
            method,
            target,
            Scripted {
                status: 0,
                outcome: Err(TransportError::Network(reason.to_string())),
                gate: None,
            },
        );
        self
    }

    /// Like [`MockTransport::ok`], but the response waits for the returned gate.
    pub fn ok_gated(&self, method: Method, target: &str, body: Value) -> Gate {
        let (gate, rx) = Gate::new();
        self.script(
            method,
            target,
            Scripted {
                status: 200,
                outcome: Ok(body),
                gate: Some(rx),
            },
        );
        gate
    }

    /// Like [`MockTransport::fail`], but the response waits for the returned gate.
    pub fn fail_gated(&self, method: Method, target: &str, status: u16, body: Value) -> Gate {
        let (gate, rx) = Gate::new();
        self.script(
            method,
            target,
            Scripted {
                status,
                outcome: Err(TransportError::Api {
                    status,
                    body: ResponseBody::Json(body),
                }),
                gate: Some(rx),
            },
        );
        gate
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.state().calls.clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.state().calls.last().cloned()
    }

    /// Number of requests received for one route.
    pub fn calls_to(&self, method: Method, target: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|r| r.method == method && r.target() == target)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let scripted = {
            let mut state = self.state();
            state.calls.push(request.clone());
            state
                .routes
                .get_mut(&(request.method, request.target()))
                .and_then(Route::next)
        };
        let Some(scripted) = scripted else {
            return Err(TransportError::Api {
                status: 404,
                body: ResponseBody::Json(json!({
                    "message": format!("no mock response for {} {}", request.method, request.target())
                })),
            });
        };
        if let Some(mut gate) = scripted.gate {
            let _ = gate.wait_for(|open| *open).await;
        }
        scripted
            .outcome
            .map(|body| Response {
                status: scripted.status,
                body,
            })
    }
}

/// A sync client over `transport` with an in-memory token holder.
pub fn sync_client(transport: &MockTransport) -> (SyncClient, Arc<InMemoryCredentials>) {
    sync_client_with(transport, CacheConfig::default())
}

pub fn sync_client_with(
    transport: &MockTransport,
    config: CacheConfig,
) -> (SyncClient, Arc<InMemoryCredentials>) {
    let credentials = Arc::new(InMemoryCredentials::default());
    let client = SyncClient::new(
        CacheStore::new(config),
        Arc::new(transport.clone()),
        credentials.clone(),
    );
    (client, credentials)
}

/// Let spawned background fetches make progress.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Yield until `condition` holds, giving up after a bounded number of turns.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1_000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records in the backend's JSON shape.

    use super::*;
    use chrono::Utc;

    pub fn item(id: &str, product_name: &str) -> ShoppingListItem {
        ShoppingListItem {
            id: ItemId::new(id),
            product_name: product_name.to_string(),
            notes: None,
            product_pins: Vec::new(),
            created_at: None,
            updated_at: None,
            optimistic: false,
        }
    }

    pub fn item_json(id: &str, product_name: &str) -> Value {
        json!({ "_id": id, "productName": product_name, "productPins": [] })
    }

    /// The list `[{_id: "1", productName: "Latte"}]` used across scenarios.
    pub fn single_item_list() -> Value {
        json!([item_json("1", "Latte")])
    }

    pub fn user(name: &str) -> User {
        User {
            id: UserId::new("u1"),
            name: name.to_string(),
            phone_number: "+390000000000".to_string(),
            frequented_supermarkets: vec!["Esselunga".to_string()],
            shopping_list: Vec::new(),
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    pub fn user_json(name: &str) -> Value {
        json!({
            "_id": "u1",
            "name": name,
            "phoneNumber": "+390000000000",
            "frequentedSupermarkets": ["Esselunga"],
            "shoppingList": []
        })
    }

    pub fn offer(id: &str, product_name: &str, chain_name: &str) -> Offer {
        Offer {
            id: OfferId::new(id),
            product_name: product_name.to_string(),
            product_quantity: None,
            offer_price: 1.99,
            previous_price: Some(2.49),
            discount_percentage: Some(20.0),
            price_per_kg: None,
            price_per_liter: None,
            offer_start_date: None,
            offer_end_date: None,
            brand: None,
            supermarket_aisle: vec!["Frutta e verdura".to_string()],
            chain_name: chain_name.to_string(),
        }
    }

    /// Wrap offers in the paginated envelope the backend returns.
    pub fn offers_page(offers: &[Offer]) -> Value {
        json!({ "offers": offers, "totalPages": 1, "currentPage": 1 })
    }

    pub fn auth_response_json(token: &str) -> Value {
        json!({
            "token": token,
            "user": {
                "_id": "u1",
                "name": "Giulia",
                "phoneNumber": "+390000000000",
                "frequentedSupermarkets": []
            }
        })
    }

    /// Field-level validation failure as the backend reports it.
    pub fn validation_errors(messages: &[&str]) -> Value {
        json!({ "errors": messages.iter().map(|m| json!({ "msg": m })).collect::<Vec<_>>() })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Spesa records.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Map;

    pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
        "[a-f0-9]{24}".prop_map(ItemId::new)
    }

    pub fn arb_offer_id() -> impl Strategy<Value = OfferId> {
        "[a-f0-9]{24}".prop_map(OfferId::new)
    }

    pub fn arb_product_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{0,20}"
    }

    pub fn arb_shopping_list_item() -> impl Strategy<Value = ShoppingListItem> {
        (
            arb_item_id(),
            arb_product_name(),
            prop::option::of("[a-z ]{0,30}"),
            prop::collection::vec(arb_offer_id(), 0..3),
        )
            .prop_map(|(id, product_name, notes, product_pins)| ShoppingListItem {
                id,
                product_name,
                notes,
                product_pins,
                created_at: None,
                updated_at: None,
                optimistic: false,
            })
    }

    pub fn arb_shopping_list() -> impl Strategy<Value = Vec<ShoppingListItem>> {
        prop::collection::vec(arb_shopping_list_item(), 0..8)
    }

    /// A flat JSON object of scalar fields.
    pub fn arb_args_object() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map(
            "[a-zA-Z]{1,8}",
            prop_oneof![
                any::<i32>().prop_map(Value::from),
                "[a-z0-9 ]{0,10}".prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
            ],
            0..6,
        )
        .prop_map(|fields| fields.into_iter().collect())
    }

    /// The same object with its fields inserted in reverse order.
    pub fn reversed(fields: &Map<String, Value>) -> Map<String, Value> {
        let mut entries: Vec<_> = fields.iter().collect();
        entries.reverse();
        entries
            .into_iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}
