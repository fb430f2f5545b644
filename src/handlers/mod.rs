pub mod auth;
pub mod cart;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod products;
pub mod profile;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        accounts::AccountService, cart::CartService, catalog::CatalogService,
        orders::OrderService, payments::PaymentProvider,
    },
    webhooks::PaymentReconciler,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub accounts: Arc<AccountService>,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub reconciler: Arc<PaymentReconciler>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(
                db_pool.clone(),
                auth_service,
                event_sender.clone(),
            )),
            catalog: Arc::new(CatalogService::new(db_pool.clone(), config.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                payments,
                event_sender.clone(),
                config.default_currency.clone(),
            )),
            reconciler: Arc::new(PaymentReconciler::new(db_pool, event_sender)),
        }
    }
}
