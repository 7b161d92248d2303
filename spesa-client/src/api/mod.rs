//! The endpoints of every Spesa resource kind, defined once.
//!
//! Screens take the endpoints from here instead of building requests
//! themselves, so paths, tags and optimistic patches live in one place.

mod auth;
mod offers;
mod users;

pub use auth::AuthApi;
pub use offers::OffersApi;
pub use users::UsersApi;

use spesa_sync::{ResourceKey, SyncClient, SyncError, SyncResult};

// ============================================================================
// TAGS
// ============================================================================

/// Tag kind for the signed-in user's profile.
pub const PROFILE: &str = "Profile";
/// Tag kind for shopping-list items; ids are item ids or `LIST`.
pub const SHOPPING_LIST: &str = "ShoppingList";
/// Tag kind for offers; ids are offer ids or one of the listing ids below.
pub const OFFER: &str = "Offer";
pub const AISLE: &str = "Aisle";
pub const BRAND: &str = "Brand";
pub const AUTH: &str = "Auth";

/// Offer tag id of the offers matched against the shopping list.
pub const SHOPPING_LIST_OFFERS: &str = "SHOPPING-LIST";
/// Offer tag id of the best-offers listing.
pub const BEST_OFFERS: &str = "BEST";

// ============================================================================
// RESOURCE KINDS
// ============================================================================

pub const PROFILE_KIND: &str = "profile";
pub const SHOPPING_LIST_KIND: &str = "shoppingList";
pub const ALL_OFFERS_KIND: &str = "allOffers";
pub const SUPERMARKET_OFFERS_KIND: &str = "offersBySupermarket";
pub const SEARCH_OFFERS_KIND: &str = "searchOffers";
pub const SHOPPING_LIST_OFFERS_KIND: &str = "offersForShoppingList";
pub const BEST_OFFERS_KIND: &str = "bestOffers";
pub const AISLE_OFFERS_KIND: &str = "offersByAisle";
pub const BRAND_OFFERS_KIND: &str = "offersByBrand";
pub const AISLES_KIND: &str = "aisles";
pub const BRANDS_KIND: &str = "brands";

/// Page requested when a listing does not name one.
pub const DEFAULT_PAGE: u32 = 1;
/// Page size requested when a listing does not name one.
pub const DEFAULT_LIMIT: u32 = 20;

/// Cache key of the signed-in user's profile.
pub fn profile_key() -> ResourceKey {
    ResourceKey::unit(PROFILE_KIND)
}

/// Cache key of the signed-in user's shopping list.
pub fn shopping_list_key() -> ResourceKey {
    ResourceKey::unit(SHOPPING_LIST_KIND)
}

/// Cache key of the offers matched against the shopping list.
pub fn shopping_list_offers_key() -> ResourceKey {
    ResourceKey::unit(SHOPPING_LIST_OFFERS_KIND)
}

fn json_body<T: serde::Serialize>(kind: &str, body: &T) -> SyncResult<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| SyncError::encode(kind, e))
}

/// Every endpoint the client talks to, bound to one [`SyncClient`].
#[derive(Clone)]
pub struct Api {
    pub users: UsersApi,
    pub offers: OffersApi,
    pub auth: AuthApi,
}

impl Api {
    pub fn new(client: &SyncClient) -> Self {
        Self {
            users: UsersApi::new(client),
            offers: OffersApi::new(client),
            auth: AuthApi::new(client),
        }
    }
}
