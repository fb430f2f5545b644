//! Storefront API library
//!
//! Catalog, cart, checkout and payment reconciliation for a single-currency
//! storefront. `app_router` assembles the HTTP surface; the binary in
//! `main.rs` wires it to configuration and a database.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::{AuthRouterExt, AuthService};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

/// Every route under `/api/v1`, with auth applied per group.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/profile", handlers::profile::profile_routes().with_auth())
        .nest(
            "/products",
            handlers::products::products_routes().with_optional_auth(),
        )
        .nest("/cart", handlers::cart::cart_routes().with_auth())
        .nest("/orders", handlers::orders::orders_routes().with_auth())
        .nest(
            "/webhooks",
            handlers::payment_webhooks::payment_webhook_routes(),
        )
}

/// Builds CORS from the configured origin list; permissive when none are set.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// Inject AuthService into request extensions for the auth middleware
async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}

/// The full application router with all cross-cutting layers.
pub fn app_router(state: Arc<AppState>, auth_service: Arc<AuthService>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .layer(middleware::from_fn_with_state(
            auth_service,
            inject_auth_service,
        ))
        // Ensure every request carries a request id for traceability
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
