#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use storefront_api::{
    app_router,
    auth::AuthService,
    config::AppConfig,
    db,
    entities::{
        discount_rule::{self, DiscountType},
        pricing_tier, product, user,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::payments::{PaymentError, PaymentHandle, PaymentProvider},
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_PASSWORD: &str = "s3cret-Passw0rd";

/// A payment request the fake provider received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCall {
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
}

/// Scripted in-process payment provider.
#[derive(Default)]
pub struct FakePaymentProvider {
    calls: Mutex<Vec<PaymentCall>>,
    failing: AtomicBool,
    counter: AtomicUsize,
}

impl FakePaymentProvider {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PaymentCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn create_payment_request(
        &self,
        amount_minor: i64,
        currency: &str,
        reference: &str,
    ) -> Result<PaymentHandle, PaymentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Transport("scripted outage".to_string()));
        }

        self.calls.lock().unwrap().push(PaymentCall {
            amount_minor,
            currency: currency.to_string(),
            reference: reference.to_string(),
        });
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(PaymentHandle {
            provider_reference: format!("pay_test_{}", n),
            client_secret: Some(format!("pay_test_{}_secret", n)),
            key_id: Some("key_test".to_string()),
        })
    }
}

/// Application wired against a throwaway SQLite file and the fake provider.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub payments: Arc<FakePaymentProvider>,
    pub user_id: Uuid,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "a9f3Kq0Lx7Vb2Nc8Mz4Hd6Tr1Ys5Wp3E".to_string(),
            "test".to_string(),
        );
        // one connection serialises transactions, as row locks would elsewhere
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new((&cfg).into()));
        let payments = Arc::new(FakePaymentProvider::default());
        let config = Arc::new(cfg);

        let services = AppServices::new(
            db_arc.clone(),
            config.clone(),
            event_sender.clone(),
            auth_service.clone(),
            payments.clone(),
        );

        let state = Arc::new(AppState {
            db: db_arc,
            config,
            event_sender,
            services,
        });
        let router = app_router(state.clone(), auth_service);

        let mut app = Self {
            router,
            state,
            payments,
            user_id: Uuid::nil(),
            token: String::new(),
            _event_task: event_task,
            _dir: dir,
        };

        let (user_id, token) = app.register_user("shopper@example.com").await;
        app.user_id = user_id;
        app.token = token;
        app
    }

    /// Bearer token for the default user.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Signs up and logs in through the HTTP surface.
    pub async fn register_user(&self, email: &str) -> (Uuid, String) {
        let signup = self
            .request(
                Method::POST,
                "/api/v1/auth/signup",
                Some(serde_json::json!({ "email": email, "password": TEST_PASSWORD })),
                None,
            )
            .await;
        assert_eq!(signup.status(), 201, "signup should succeed");
        let body = read_json(signup).await;
        let user_id = Uuid::parse_str(body["userId"].as_str().unwrap()).unwrap();

        let login = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                Some(serde_json::json!({ "email": email, "password": TEST_PASSWORD })),
                None,
            )
            .await;
        assert_eq!(login.status(), 200, "login should succeed");
        let token = read_json(login).await["token"].as_str().unwrap().to_string();

        (user_id, token)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    /// Convenience helper for JSON requests as the default user.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(
        &self,
        name: &str,
        base_price: Decimal,
        inventory: Option<i32>,
        category: Option<&str>,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            category: Set(category.map(str::to_string)),
            base_price: Set(base_price),
            inventory: Set(inventory),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_tier(&self, name: &str) -> pricing_tier::Model {
        pricing_tier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed pricing tier")
    }

    pub async fn assign_tier(&self, user_id: Uuid, tier_id: Uuid) {
        let existing = user::Entity::find_by_id(user_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("user exists");
        let mut active: user::ActiveModel = existing.into();
        active.pricing_tier_id = Set(Some(tier_id));
        active.update(&*self.state.db).await.expect("assign tier");
    }

    /// Inserts an active rule; `customize` narrows its scope.
    pub async fn seed_rule(
        &self,
        rule_type: DiscountType,
        value: Decimal,
        customize: impl FnOnce(&mut discount_rule::ActiveModel),
    ) -> discount_rule::Model {
        let mut rule = discount_rule::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("test rule".to_string()),
            rule_type: Set(rule_type),
            value: Set(value),
            is_active: Set(true),
            applicable_to_product_id: Set(None),
            applicable_to_pricing_tier_id: Set(None),
            minimum_quantity: Set(None),
            minimum_order_amount: Set(None),
            created_at: Set(Utc::now()),
        };
        customize(&mut rule);
        rule.insert(&*self.state.db).await.expect("seed discount rule")
    }

    pub async fn inventory_of(&self, product_id: Uuid) -> Option<i32> {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("product exists")
            .inventory
    }

    pub async fn add_to_cart(&self, token: &str, product_id: Uuid, quantity: i32) -> Response {
        self.request(
            Method::POST,
            "/api/v1/cart/items",
            Some(serde_json::json!({ "productId": product_id, "quantity": quantity })),
            Some(token),
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Decimals travel as JSON strings.
pub fn dec_field(value: &Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {}", value))
        .parse()
        .expect("parse decimal")
}
