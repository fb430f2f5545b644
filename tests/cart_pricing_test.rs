mod common;

use axum::http::{Method, StatusCode};
use common::{dec_field, read_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::Set;
use storefront_api::entities::discount_rule::DiscountType;

#[tokio::test]
async fn cart_is_created_lazily_and_starts_empty() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cart = read_json(response).await;

    assert!(cart["id"].is_string());
    assert!(cart["items"].as_array().unwrap().is_empty());
    assert_eq!(dec_field(&cart["subTotal"]), Decimal::ZERO);
    assert_eq!(dec_field(&cart["totalAmount"]), Decimal::ZERO);
}

#[tokio::test]
async fn adding_the_same_product_merges_quantities() {
    let app = TestApp::new().await;
    let pen = app.seed_product("Pen", dec!(2), Some(50), None).await;

    app.add_to_cart(app.token(), pen.id, 2).await;
    let cart = read_json(app.add_to_cart(app.token(), pen.id, 3).await).await;

    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(items[0]["name"], "Pen");
    assert_eq!(dec_field(&cart["subTotal"]), dec!(10));
}

#[tokio::test]
async fn add_rejects_bad_quantity_and_unknown_product() {
    let app = TestApp::new().await;
    let pen = app.seed_product("Pen", dec!(2), None, None).await;

    let zero = app.add_to_cart(app.token(), pen.id, 0).await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .add_to_cart(app.token(), uuid::Uuid::new_v4(), 1)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zero_quantity_update_removes_the_line_and_reprices() {
    let app = TestApp::new().await;
    let book = app.seed_product("Book", dec!(15), None, None).await;
    let bag = app.seed_product("Bag", dec!(40), None, None).await;

    app.add_to_cart(app.token(), book.id, 2).await;
    let cart = read_json(app.add_to_cart(app.token(), bag.id, 1).await).await;
    assert_eq!(dec_field(&cart["totalAmount"]), dec!(70));

    let bag_line = cart["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["name"] == "Bag")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", bag_line),
            Some(serde_json::json!({ "quantity": 0 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cart = read_json(response).await;

    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Book");
    assert_eq!(dec_field(&cart["totalAmount"]), dec!(30));
}

#[tokio::test]
async fn update_and_delete_change_the_cart() {
    let app = TestApp::new().await;
    let cup = app.seed_product("Cup", dec!(6), None, None).await;
    let cart = read_json(app.add_to_cart(app.token(), cup.id, 1).await).await;
    let line = cart["items"][0]["id"].as_str().unwrap().to_string();

    let updated = read_json(
        app.request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", line),
            Some(serde_json::json!({ "quantity": 4 })),
        )
        .await,
    )
    .await;
    assert_eq!(dec_field(&updated["subTotal"]), dec!(24));

    let negative = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", line),
            Some(serde_json::json!({ "quantity": -1 })),
        )
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let removed = app
        .request_authenticated(Method::DELETE, &format!("/api/v1/cart/items/{}", line), None)
        .await;
    assert_eq!(removed.status(), StatusCode::OK);
    let cart = read_json(removed).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn another_users_line_reads_as_missing() {
    let app = TestApp::new().await;
    let cup = app.seed_product("Cup", dec!(6), None, None).await;
    let cart = read_json(app.add_to_cart(app.token(), cup.id, 1).await).await;
    let line = cart["items"][0]["id"].as_str().unwrap().to_string();

    let (_, intruder) = app.register_user("intruder@example.com").await;
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", line),
            None,
            Some(&intruder),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mine = read_json(
        app.request_authenticated(Method::GET, "/api/v1/cart", None)
            .await,
    )
    .await;
    assert_eq!(mine["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cart_level_discount_applies_above_threshold_only() {
    let app = TestApp::new().await;
    let desk = app.seed_product("Desk", dec!(250), None, None).await;
    app.seed_rule(DiscountType::Fixed, dec!(50), |rule| {
        rule.minimum_order_amount = Set(Some(dec!(400)));
    })
    .await;

    let one = read_json(app.add_to_cart(app.token(), desk.id, 1).await).await;
    assert_eq!(dec_field(&one["discountApplied"]), Decimal::ZERO);
    assert_eq!(dec_field(&one["totalAmount"]), dec!(250));

    let two = read_json(app.add_to_cart(app.token(), desk.id, 1).await).await;
    assert_eq!(dec_field(&two["subTotal"]), dec!(500));
    assert_eq!(dec_field(&two["discountApplied"]), dec!(50));
    assert_eq!(dec_field(&two["totalAmount"]), dec!(450));
}

#[tokio::test]
async fn tier_and_quantity_scoped_rules_follow_the_caller() {
    let app = TestApp::new().await;
    let gold = app.seed_tier("gold").await;
    let shirt = app.seed_product("Shirt", dec!(20), None, None).await;

    app.seed_rule(DiscountType::Percentage, dec!(0.5), |rule| {
        rule.applicable_to_pricing_tier_id = Set(Some(gold.id));
    })
    .await;
    app.seed_rule(DiscountType::Fixed, dec!(4), |rule| {
        rule.minimum_quantity = Set(Some(3));
    })
    .await;

    // no tier: the bulk rule kicks in at three units
    let (_, plain) = app.register_user("plain@example.com").await;
    let cart = read_json(app.add_to_cart(&plain, shirt.id, 3).await).await;
    assert_eq!(dec_field(&cart["items"][0]["discountedUnitPrice"]), dec!(16));

    // gold tier: the larger tier discount wins, never both
    app.assign_tier(app.user_id, gold.id).await;
    let cart = read_json(app.add_to_cart(app.token(), shirt.id, 3).await).await;
    assert_eq!(dec_field(&cart["items"][0]["discountedUnitPrice"]), dec!(10));
    assert_eq!(dec_field(&cart["totalAmount"]), dec!(30));
}

#[tokio::test]
async fn catalog_prices_are_personalised_for_signed_in_viewers() {
    let app = TestApp::new().await;
    let gold = app.seed_tier("gold").await;
    let hat = app.seed_product("Hat", dec!(40), Some(3), Some("apparel")).await;
    app.seed_rule(DiscountType::Percentage, dec!(0.25), |rule| {
        rule.applicable_to_pricing_tier_id = Set(Some(gold.id));
    })
    .await;
    app.assign_tier(app.user_id, gold.id).await;

    let uri = format!("/api/v1/products/{}", hat.id);
    let anonymous = read_json(app.request(Method::GET, &uri, None, None).await).await;
    assert_eq!(dec_field(&anonymous["basePrice"]), dec!(40));
    assert_eq!(dec_field(&anonymous["price"]), dec!(40));

    let signed_in = read_json(app.request_authenticated(Method::GET, &uri, None).await).await;
    assert_eq!(dec_field(&signed_in["price"]), dec!(30));
}

#[tokio::test]
async fn catalog_filters_and_paginates_by_name() {
    let app = TestApp::new().await;
    app.seed_product("Blue Mug", dec!(8), None, Some("kitchen")).await;
    app.seed_product("Red Mug", dec!(12), None, Some("kitchen")).await;
    app.seed_product("Green Mug", dec!(30), None, Some("kitchen")).await;
    app.seed_product("Desk", dec!(200), None, Some("office")).await;

    let page = read_json(
        app.request(
            Method::GET,
            "/api/v1/products?category=kitchen&limit=2&page=1",
            None,
            None,
        )
        .await,
    )
    .await;
    let names: Vec<&str> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Blue Mug", "Green Mug"]);
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["pagination"]["totalPages"], 2);

    let priced = read_json(
        app.request(
            Method::GET,
            "/api/v1/products?minPrice=10&maxPrice=30&search=MUG",
            None,
            None,
        )
        .await,
    )
    .await;
    let names: Vec<&str> = priced["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Green Mug", "Red Mug"]);

    let missing = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn merging_past_the_quantity_limit_is_rejected() {
    let app = TestApp::new().await;
    let pin = app.seed_product("Pin", dec!(0.01), None, None).await;

    let first = app.add_to_cart(app.token(), pin.id, i32::MAX).await;
    assert_eq!(first.status(), StatusCode::OK);

    let response = app.add_to_cart(app.token(), pin.id, 2).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["message"], "Quantity is too large");

    let cart = read_json(
        app.request_authenticated(Method::GET, "/api/v1/cart", None)
            .await,
    )
    .await;
    assert_eq!(cart["items"][0]["quantity"], i32::MAX);
}

#[tokio::test]
async fn page_beyond_addressable_range_is_a_bad_request() {
    let app = TestApp::new().await;
    app.seed_product("Mug", dec!(8), None, None).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products?page={}", u64::MAX),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["message"], "Page is out of range");

    let far = app
        .request(Method::GET, "/api/v1/products?page=1000", None, None)
        .await;
    assert_eq!(far.status(), StatusCode::OK);
    assert!(read_json(far).await["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_treats_wildcards_literally() {
    let app = TestApp::new().await;
    app.seed_product("50% Off Mug", dec!(8), None, None).await;
    app.seed_product("500 Piece Puzzle", dec!(20), None, None).await;
    app.seed_product("Tea_Cup", dec!(5), None, None).await;
    app.seed_product("Teapot", dec!(25), None, None).await;

    let names = |body: serde_json::Value| -> Vec<String> {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect()
    };

    let percent = read_json(
        app.request(Method::GET, "/api/v1/products?search=50%25", None, None)
            .await,
    )
    .await;
    assert_eq!(names(percent), vec!["50% Off Mug"]);

    let underscore = read_json(
        app.request(Method::GET, "/api/v1/products?search=tea_", None, None)
            .await,
    )
    .await;
    assert_eq!(names(underscore), vec!["Tea_Cup"]);
}
