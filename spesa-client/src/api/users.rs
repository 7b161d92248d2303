//! Profile and shopping-list endpoints (`/users`).

use serde_json::Value;
use spesa_core::{
    AddItemRequest, ItemId, MessageResponse, PinOfferArgs, ShoppingListItem, UpdateItemArgs,
    UpdateProfileRequest, UpdateProfileResponse, UpdateSupermarketsRequest,
    UpdateSupermarketsResponse, User, ID_FIELD, PINS_FIELD,
};
use spesa_sync::{
    list, list_tags, path_segment, MutationEndpoint, QueryEndpoint, Request, SyncClient, Tag,
};
use tracing::warn;

use super::{
    json_body, shopping_list_key, OFFER, PROFILE, PROFILE_KIND, SHOPPING_LIST,
    SHOPPING_LIST_KIND, SHOPPING_LIST_OFFERS,
};

fn item_path(id: &ItemId) -> String {
    format!("/users/shopping-list/{}", path_segment(id.as_str()))
}

fn pin_path(args: &PinOfferArgs, verb: &str) -> String {
    format!(
        "{}/{}/{}",
        item_path(&args.item_id),
        verb,
        path_segment(args.offer_id.as_str())
    )
}

fn item_tags(id: &ItemId) -> Vec<Tag> {
    vec![Tag::id(SHOPPING_LIST, id.as_str()), Tag::list(SHOPPING_LIST)]
}

fn shopping_list_offers() -> Tag {
    Tag::id(OFFER, SHOPPING_LIST_OFFERS)
}

#[derive(Clone)]
pub struct UsersApi {
    pub profile: QueryEndpoint<(), User>,
    pub update_profile: MutationEndpoint<UpdateProfileRequest, UpdateProfileResponse>,
    pub update_supermarkets: MutationEndpoint<UpdateSupermarketsRequest, UpdateSupermarketsResponse>,
    pub delete_account: MutationEndpoint<(), MessageResponse>,
    pub shopping_list: QueryEndpoint<(), Vec<ShoppingListItem>>,
    pub add_item: MutationEndpoint<AddItemRequest, ShoppingListItem>,
    pub update_item: MutationEndpoint<UpdateItemArgs, ShoppingListItem>,
    pub remove_item: MutationEndpoint<ItemId, MessageResponse>,
    pub clear_list: MutationEndpoint<(), MessageResponse>,
    pub pin_offer: MutationEndpoint<PinOfferArgs, ShoppingListItem>,
    pub unpin_offer: MutationEndpoint<PinOfferArgs, ShoppingListItem>,
}

impl UsersApi {
    pub fn new(client: &SyncClient) -> Self {
        // ====================================================================
        // PROFILE
        // ====================================================================

        let profile = client
            .query::<(), User>(PROFILE_KIND, |_| Request::get("/users/profile"))
            .provides_tags(vec![Tag::kind(PROFILE)]);

        let update_profile = client
            .mutation::<UpdateProfileRequest, UpdateProfileResponse>("updateProfile", |args| {
                Ok(Request::put("/users/profile").with_body(json_body("updateProfile", args)?))
            })
            .invalidates_tags(vec![Tag::kind(PROFILE)]);

        let update_supermarkets = client
            .mutation::<UpdateSupermarketsRequest, UpdateSupermarketsResponse>(
                "updateSupermarkets",
                |args| {
                    Ok(Request::put("/users/supermarkets")
                        .with_body(json_body("updateSupermarkets", args)?))
                },
            )
            .invalidates_tags(vec![Tag::kind(PROFILE), shopping_list_offers()]);

        let delete_account = client
            .mutation::<(), MessageResponse>("deleteAccount", |_| {
                Ok(Request::delete("/users/account"))
            })
            .invalidates_tags(vec![Tag::kind(PROFILE), Tag::list(SHOPPING_LIST)]);

        // ====================================================================
        // SHOPPING LIST
        // ====================================================================

        let shopping_list = client
            .query::<(), Vec<ShoppingListItem>>(SHOPPING_LIST_KIND, |_| {
                Request::get("/users/shopping-list")
            })
            .provides(|_, value| list_tags(SHOPPING_LIST, value, ID_FIELD));

        let add_item = client
            .mutation::<AddItemRequest, ShoppingListItem>("addItem", |args| {
                Ok(Request::post("/users/shopping-list").with_body(json_body("addItem", args)?))
            })
            .optimistic(|args, patch| {
                let placeholder =
                    ShoppingListItem::placeholder(args.product_name.as_str(), args.notes.clone());
                match serde_json::to_value(&placeholder) {
                    Ok(entry) => {
                        patch.update(&shopping_list_key(), move |value| list::push(value, &entry))
                    }
                    Err(err) => warn!(error = %err, "could not encode placeholder item"),
                }
            })
            .invalidates_tags(vec![Tag::list(SHOPPING_LIST), shopping_list_offers()]);

        let update_item = client
            .mutation::<UpdateItemArgs, ShoppingListItem>("updateItem", |args| {
                Ok(Request::put(item_path(&args.item_id))
                    .with_body(json_body("updateItem", &args.changes)?))
            })
            .optimistic(|args, patch| {
                let Ok(fields) = serde_json::to_value(&args.changes) else {
                    return;
                };
                let id = args.item_id.to_string();
                patch.update(&shopping_list_key(), move |value| {
                    list::update_by_id(value, ID_FIELD, &id, |item| {
                        list::merge_fields(item, &fields)
                    })
                });
            })
            .invalidates(|args, _| item_tags(&args.item_id));

        let remove_item = client
            .mutation::<ItemId, MessageResponse>("removeItem", |id| {
                Ok(Request::delete(item_path(id)))
            })
            .optimistic(|id, patch| {
                let id = id.to_string();
                patch.update(&shopping_list_key(), move |value| {
                    list::remove_by_id(value, ID_FIELD, &id)
                });
            })
            .invalidates(|id, _| {
                let mut tags = item_tags(id);
                tags.push(shopping_list_offers());
                tags
            });

        let clear_list = client
            .mutation::<(), MessageResponse>("clearList", |_| {
                Ok(Request::delete("/users/shopping-list/clear"))
            })
            .optimistic(|_, patch| {
                patch.update(&shopping_list_key(), |value| {
                    *value = Value::Array(Vec::new())
                });
            })
            .invalidates_tags(vec![Tag::list(SHOPPING_LIST), shopping_list_offers()]);

        let pin_offer = client
            .mutation::<PinOfferArgs, ShoppingListItem>("pinOffer", |args| {
                Ok(Request::put(pin_path(args, "pin")))
            })
            .optimistic(|args, patch| {
                let id = args.item_id.to_string();
                let offer = args.offer_id.to_string();
                patch.update(&shopping_list_key(), move |value| {
                    list::update_by_id(value, ID_FIELD, &id, |item| {
                        list::insert_into_set(item, PINS_FIELD, &offer)
                    })
                });
            })
            .invalidates(|args, _| item_tags(&args.item_id));

        let unpin_offer = client
            .mutation::<PinOfferArgs, ShoppingListItem>("unpinOffer", |args| {
                Ok(Request::delete(pin_path(args, "unpin")))
            })
            .optimistic(|args, patch| {
                let id = args.item_id.to_string();
                let offer = args.offer_id.to_string();
                patch.update(&shopping_list_key(), move |value| {
                    list::update_by_id(value, ID_FIELD, &id, |item| {
                        list::remove_from_set(item, PINS_FIELD, &offer)
                    })
                });
            })
            .invalidates(|args, _| item_tags(&args.item_id));

        Self {
            profile,
            update_profile,
            update_supermarkets,
            delete_account,
            shopping_list,
            add_item,
            update_item,
            remove_item,
            clear_list,
            pin_offer,
            unpin_offer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spesa_core::OfferId;

    #[test]
    fn item_paths_encode_ids() {
        assert_eq!(item_path(&ItemId::new("a/b")), "/users/shopping-list/a%2Fb");
        let args = PinOfferArgs {
            item_id: ItemId::new("5"),
            offer_id: OfferId::new("O1"),
        };
        assert_eq!(pin_path(&args, "pin"), "/users/shopping-list/5/pin/O1");
        assert_eq!(pin_path(&args, "unpin"), "/users/shopping-list/5/unpin/O1");
    }
}
