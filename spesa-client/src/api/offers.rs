//! Offer listings (`/offers`).
//!
//! Paginated listings come back wrapped in `{offers, totalPages,
//! currentPage}`; only the offers are cached. The shopping-list and best
//! offers endpoints return bare arrays.

use serde_json::Value;
use spesa_core::{
    AisleOffersArgs, BrandOffersArgs, GetOffersParams, Offer, ProductOffers, SearchOffersArgs,
    SupermarketOffersArgs, ID_FIELD,
};
use spesa_sync::{list_tags, path_segment, QueryEndpoint, Request, SyncClient, Tag};

use super::{
    AISLE, AISLES_KIND, AISLE_OFFERS_KIND, ALL_OFFERS_KIND, BEST_OFFERS, BEST_OFFERS_KIND, BRAND,
    BRANDS_KIND, BRAND_OFFERS_KIND, DEFAULT_LIMIT, DEFAULT_PAGE, OFFER, SEARCH_OFFERS_KIND,
    SHOPPING_LIST_OFFERS, SHOPPING_LIST_OFFERS_KIND, SUPERMARKET_OFFERS_KIND,
};

/// Field of the paginated envelope holding the offers.
const ENVELOPE_FIELD: &str = "offers";

/// One tag per offer in `value`, plus the listing's own tag.
fn listing_tags(listing: String, value: Option<&Value>) -> Vec<Tag> {
    let mut tags: Vec<Tag> = list_tags(OFFER, value, ID_FIELD)
        .into_iter()
        .filter(|tag| tag != &Tag::list(OFFER))
        .collect();
    tags.push(Tag::id(OFFER, listing));
    tags
}

fn paged(request: Request, page: Option<u32>, limit: Option<u32>) -> Request {
    request
        .with_query("page", page.unwrap_or(DEFAULT_PAGE))
        .with_query("limit", limit.unwrap_or(DEFAULT_LIMIT))
}

fn all_offers_request(params: &GetOffersParams) -> Request {
    Request::get("/offers/")
        .with_optional_query("page", params.page)
        .with_optional_query("limit", params.limit)
        .with_optional_query("chainName", params.chain_name.as_deref())
        .with_optional_query("supermarketAisle", params.supermarket_aisle.as_deref())
        .with_optional_query("brand", params.brand.as_deref())
        .with_optional_query("sort", params.sort.map(|sort| sort.as_str()))
}

#[derive(Clone)]
pub struct OffersApi {
    pub all_offers: QueryEndpoint<GetOffersParams, Vec<Offer>>,
    pub offers_by_supermarket: QueryEndpoint<SupermarketOffersArgs, Vec<Offer>>,
    pub search_offers: QueryEndpoint<SearchOffersArgs, Vec<Offer>>,
    pub offers_for_shopping_list: QueryEndpoint<(), Vec<ProductOffers>>,
    /// Keyed by the number of offers requested.
    pub best_offers: QueryEndpoint<u32, Vec<Offer>>,
    pub offers_by_aisle: QueryEndpoint<AisleOffersArgs, Vec<Offer>>,
    pub offers_by_brand: QueryEndpoint<BrandOffersArgs, Vec<Offer>>,
    pub aisles: QueryEndpoint<(), Vec<String>>,
    pub brands: QueryEndpoint<(), Vec<String>>,
}

impl OffersApi {
    pub fn new(client: &SyncClient) -> Self {
        let all_offers = client
            .query::<GetOffersParams, Vec<Offer>>(ALL_OFFERS_KIND, all_offers_request)
            .unwrap_envelope(ENVELOPE_FIELD)
            .provides(|_, value| list_tags(OFFER, value, ID_FIELD));

        let offers_by_supermarket = client
            .query::<SupermarketOffersArgs, Vec<Offer>>(SUPERMARKET_OFFERS_KIND, |args| {
                let request = Request::get(format!(
                    "/offers/supermarket/{}",
                    path_segment(&args.chain_name)
                ));
                paged(request, args.page, args.limit)
                    .with_optional_query("sort", args.sort.map(|sort| sort.as_str()))
            })
            .unwrap_envelope(ENVELOPE_FIELD)
            .provides(|args, value| listing_tags(format!("SUPERMARKET-{}", args.chain_name), value));

        let search_offers = client
            .query::<SearchOffersArgs, Vec<Offer>>(SEARCH_OFFERS_KIND, |args| {
                let request = Request::get(format!("/offers/search/{}", path_segment(&args.query)));
                paged(request, args.page, args.limit)
            })
            .unwrap_envelope(ENVELOPE_FIELD)
            .provides(|args, value| listing_tags(format!("SEARCH-{}", args.query), value));

        let offers_for_shopping_list = client
            .query::<(), Vec<ProductOffers>>(SHOPPING_LIST_OFFERS_KIND, |_| {
                Request::get("/offers/shopping-list")
            })
            .provides_tags(vec![Tag::id(OFFER, SHOPPING_LIST_OFFERS)]);

        let best_offers = client
            .query::<u32, Vec<Offer>>(BEST_OFFERS_KIND, |limit| {
                Request::get("/offers/best").with_query("limit", limit)
            })
            .provides_tags(vec![Tag::id(OFFER, BEST_OFFERS)]);

        let offers_by_aisle = client
            .query::<AisleOffersArgs, Vec<Offer>>(AISLE_OFFERS_KIND, |args| {
                let request = Request::get(format!("/offers/aisle/{}", path_segment(&args.aisle)));
                paged(request, args.page, args.limit)
                    .with_optional_query("chainName", args.chain_name.as_deref())
            })
            .unwrap_envelope(ENVELOPE_FIELD)
            .provides(|args, value| listing_tags(format!("AISLE-{}", args.aisle), value));

        let offers_by_brand = client
            .query::<BrandOffersArgs, Vec<Offer>>(BRAND_OFFERS_KIND, |args| {
                let request = Request::get(format!("/offers/brand/{}", path_segment(&args.brand)));
                paged(request, args.page, args.limit)
            })
            .unwrap_envelope(ENVELOPE_FIELD)
            .provides(|args, value| listing_tags(format!("BRAND-{}", args.brand), value));

        let aisles = client
            .query::<(), Vec<String>>(AISLES_KIND, |_| Request::get("/offers/aisles"))
            .provides_tags(vec![Tag::list(AISLE)]);

        let brands = client
            .query::<(), Vec<String>>(BRANDS_KIND, |_| Request::get("/offers/brands"))
            .provides_tags(vec![Tag::list(BRAND)]);

        Self {
            all_offers,
            offers_by_supermarket,
            search_offers,
            offers_for_shopping_list,
            best_offers,
            offers_by_aisle,
            offers_by_brand,
            aisles,
            brands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spesa_core::OfferSort;

    #[test]
    fn all_offers_skips_unset_and_empty_params() {
        let params = GetOffersParams {
            page: Some(2),
            chain_name: Some(String::new()),
            brand: Some("Barilla".into()),
            sort: Some(OfferSort::EndDate),
            ..Default::default()
        };
        assert_eq!(
            all_offers_request(&params).target(),
            "/offers/?page=2&brand=Barilla&sort=endDate"
        );
        assert_eq!(all_offers_request(&GetOffersParams::default()).target(), "/offers/");
    }

    #[test]
    fn paged_requests_default_page_and_limit() {
        let request = paged(Request::get("/offers/brand/Barilla"), None, Some(5));
        assert_eq!(request.target(), "/offers/brand/Barilla?page=1&limit=5");
    }

    #[test]
    fn listing_tags_name_each_offer_and_the_listing() {
        let value = json!([{"_id": "O1"}, {"_id": "O2"}]);
        let tags = listing_tags("AISLE-Frutta".into(), Some(&value));
        assert_eq!(
            tags,
            vec![
                Tag::id(OFFER, "O1"),
                Tag::id(OFFER, "O2"),
                Tag::id(OFFER, "AISLE-Frutta"),
            ]
        );
        assert_eq!(listing_tags("BEST".into(), None), vec![Tag::id(OFFER, "BEST")]);
    }
}
