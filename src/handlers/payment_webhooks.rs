use crate::{
    errors::ServiceError,
    webhooks::{verify_signature, ProviderEvent},
    AppState,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

pub fn payment_webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/payments", post(payment_webhook))
}

// POST /api/v1/webhooks/payments
//
// Only a failed signature check answers non-2xx. Anything after that is
// logged and acknowledged, otherwise the provider would redeliver forever.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let config = &state.config;
    if let Err(err) = verify_signature(
        &headers,
        &body,
        config.payment_webhook_secret.as_deref(),
        config.payment_webhook_tolerance_secs,
        chrono::Utc::now().timestamp(),
    ) {
        counter!("storefront.webhooks.rejected", 1);
        warn!("Payment webhook signature verification failed");
        return Err(err);
    }

    match serde_json::from_slice::<ProviderEvent>(&body) {
        Ok(event) => {
            if let Err(e) = state.services.reconciler.reconcile(&event).await {
                error!(event_id = ?event.id, kind = %event.kind, "payment reconciliation failed: {}", e);
            }
        }
        Err(e) => error!("Unparsable payment webhook body: {}", e),
    }

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}
