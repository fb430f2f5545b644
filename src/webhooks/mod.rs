//! Payment provider callbacks.
//!
//! Deliveries are authenticated with an HMAC-SHA256 over `"{timestamp}.{raw body}"`
//! and then reconciled against the order carrying the matching payment
//! reference. Reconciliation is a single conditional update, so redelivered or
//! concurrent events can move an order out of `PendingPayment` at most once.

use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use metrics::counter;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Timestamp plus candidate signatures pulled from the request headers.
struct SignedHeaders<'a> {
    timestamp: &'a str,
    signatures: Vec<&'a str>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_headers(headers: &HeaderMap) -> Option<SignedHeaders<'_>> {
    if let Some(stripe) = header_str(headers, STRIPE_SIGNATURE_HEADER) {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in stripe.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        return timestamp
            .filter(|_| !signatures.is_empty())
            .map(|timestamp| SignedHeaders {
                timestamp,
                signatures,
            });
    }

    let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
    let signature = header_str(headers, SIGNATURE_HEADER)?;
    Some(SignedHeaders {
        timestamp,
        signatures: vec![signature],
    })
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, ServiceError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ServiceError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Hex HMAC for a delivery; what a provider would send.
pub fn sign_payload(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, ServiceError> {
    Ok(hex::encode(
        mac_for(secret, timestamp, body)?.finalize().into_bytes(),
    ))
}

/// Authenticates a raw webhook body.
///
/// `now` is unix seconds. Any missing piece, a stale timestamp or a mismatch
/// is `InvalidSignature`. Comparison is constant time.
pub fn verify_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: Option<&str>,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), ServiceError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(ServiceError::InvalidSignature)?;
    let signed = parse_headers(headers).ok_or(ServiceError::InvalidSignature)?;

    let timestamp: i64 = signed
        .timestamp
        .parse()
        .map_err(|_| ServiceError::InvalidSignature)?;
    if now.abs_diff(timestamp) > tolerance_secs {
        debug!(timestamp, now, "webhook timestamp outside tolerance");
        return Err(ServiceError::InvalidSignature);
    }

    let mac = mac_for(secret, signed.timestamp, body)?;
    let matched = signed.signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(ServiceError::InvalidSignature)
    }
}

/// Provider event envelope. Only the fields reconciliation needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: EventObject,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventObject {
    #[serde(default)]
    pub id: Option<String>,
}

impl ProviderEvent {
    pub fn reference(&self) -> Option<&str> {
        self.data.object.id.as_deref().filter(|r| !r.is_empty())
    }

    /// Status this event settles an order into, if it is one we act on.
    pub fn target_status(&self) -> Option<OrderStatus> {
        match self.kind.as_str() {
            "payment_intent.succeeded" | "payment.captured" | "order.paid" => {
                Some(OrderStatus::Processing)
            }
            "payment_intent.payment_failed" | "payment.failed" => Some(OrderStatus::PaymentFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Transitioned {
        order_id: uuid::Uuid,
        status: OrderStatus,
    },
    /// The order had already left `PendingPayment`.
    Duplicate,
    /// No order carries the reference.
    Orphaned,
    /// Event kind we do not act on.
    Ignored,
}

/// Applies verified provider events to orders.
#[derive(Clone)]
pub struct PaymentReconciler {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentReconciler {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, event), fields(event_id = ?event.id, kind = %event.kind))]
    pub async fn reconcile(&self, event: &ProviderEvent) -> Result<ReconcileOutcome, ServiceError> {
        let Some(target) = event.target_status() else {
            info!("ignoring unhandled payment event");
            self.event_sender.send_or_log(Event::PaymentEventIgnored {
                event_type: event.kind.clone(),
                reference: event.reference().map(str::to_string),
            });
            return Ok(ReconcileOutcome::Ignored);
        };

        let Some(reference) = event.reference() else {
            warn!("payment event carries no reference");
            return Ok(ReconcileOutcome::Orphaned);
        };

        let Some(from) = OrderStatus::settles_from(target) else {
            return Err(ServiceError::InternalError(format!(
                "no order status can move to {}",
                target
            )));
        };

        let db = &*self.db;
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(target))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::PaymentReference.eq(reference))
            .filter(order::Column::Status.eq(from))
            .exec(db)
            .await?;

        let current = order::Entity::find()
            .filter(order::Column::PaymentReference.eq(reference))
            .one(db)
            .await?;

        match (result.rows_affected, current) {
            (0, None) => {
                warn!(%reference, "payment event for unknown order");
                Ok(ReconcileOutcome::Orphaned)
            }
            (0, Some(order)) => {
                info!(order_id = %order.id, status = %order.status, "payment event already applied");
                Ok(ReconcileOutcome::Duplicate)
            }
            (_, Some(order)) => {
                counter!("storefront.webhooks.reconciled", 1);
                info!(order_id = %order.id, status = %target, "order payment settled");
                self.event_sender.send_or_log(Event::OrderStatusChanged {
                    order_id: order.id,
                    old_status: from,
                    new_status: target,
                });
                Ok(ReconcileOutcome::Transitioned {
                    order_id: order.id,
                    status: target,
                })
            }
            (_, None) => Err(ServiceError::InternalError(format!(
                "order with reference {} vanished after update",
                reference
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"payment.captured","data":{"object":{"id":"order_Abc"}}}"#;
    const NOW: i64 = 1_700_000_000;

    fn generic_headers(timestamp: i64, signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&timestamp.to_string()).unwrap());
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(signature).unwrap());
        headers
    }

    #[test]
    fn accepts_generic_headers() {
        let sig = sign_payload(SECRET, &NOW.to_string(), BODY).unwrap();
        let headers = generic_headers(NOW, &sig);
        assert!(verify_signature(&headers, BODY, Some(SECRET), 300, NOW).is_ok());
    }

    #[test]
    fn accepts_stripe_style_header_with_rotated_secrets() {
        let sig = sign_payload(SECRET, &NOW.to_string(), BODY).unwrap();
        let value = format!("t={},v1={},v1={}", NOW, "00".repeat(32), sig);
        let mut headers = HeaderMap::new();
        headers.insert(STRIPE_SIGNATURE_HEADER, HeaderValue::from_str(&value).unwrap());

        assert!(verify_signature(&headers, BODY, Some(SECRET), 300, NOW).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let sig = sign_payload(SECRET, &NOW.to_string(), BODY).unwrap();
        let headers = generic_headers(NOW, &sig);
        let tampered = br#"{"id":"evt_1","type":"payment.captured","data":{"object":{"id":"order_Xyz"}}}"#;

        assert_matches!(
            verify_signature(&headers, tampered, Some(SECRET), 300, NOW),
            Err(ServiceError::InvalidSignature)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let sig = sign_payload("another_secret", &NOW.to_string(), BODY).unwrap();
        let headers = generic_headers(NOW, &sig);
        assert!(verify_signature(&headers, BODY, Some(SECRET), 300, NOW).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let ts = NOW - 301;
        let sig = sign_payload(SECRET, &ts.to_string(), BODY).unwrap();
        let headers = generic_headers(ts, &sig);
        assert!(verify_signature(&headers, BODY, Some(SECRET), 300, NOW).is_err());
    }

    #[test]
    fn missing_secret_or_headers_are_rejected() {
        let sig = sign_payload(SECRET, &NOW.to_string(), BODY).unwrap();
        let headers = generic_headers(NOW, &sig);

        assert!(verify_signature(&headers, BODY, None, 300, NOW).is_err());
        assert!(verify_signature(&headers, BODY, Some(""), 300, NOW).is_err());
        assert!(verify_signature(&HeaderMap::new(), BODY, Some(SECRET), 300, NOW).is_err());
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        let headers = generic_headers(NOW, "not-hex-at-all");
        assert!(verify_signature(&headers, BODY, Some(SECRET), 300, NOW).is_err());
    }

    #[test]
    fn event_kinds_map_to_target_status() {
        let event: ProviderEvent = serde_json::from_slice(BODY).unwrap();
        assert_eq!(event.reference(), Some("order_Abc"));
        assert_eq!(event.target_status(), Some(OrderStatus::Processing));

        let failed: ProviderEvent =
            serde_json::from_str(r#"{"type":"payment_intent.payment_failed"}"#).unwrap();
        assert_eq!(failed.target_status(), Some(OrderStatus::PaymentFailed));
        assert_eq!(failed.reference(), None);

        let refund: ProviderEvent = serde_json::from_str(r#"{"type":"refund.created"}"#).unwrap();
        assert_eq!(refund.target_status(), None);
    }
}
