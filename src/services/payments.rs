use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, instrument};

use crate::config::AppConfig;

/// What the client needs to complete payment with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHandle {
    /// Provider-side id; incoming webhooks are matched on it.
    pub provider_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider unreachable: {0}")]
    Transport(String),

    #[error("payment provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

/// External capability that opens a payment request for a new order.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// `amount_minor` is in the currency's minor units (cents).
    async fn create_payment_request(
        &self,
        amount_minor: i64,
        currency: &str,
        reference: &str,
    ) -> Result<PaymentHandle, PaymentError>;
}

#[derive(Debug, Serialize)]
struct CreateProviderOrder<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProviderOrder {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
}

/// Provider reached over HTTP with basic auth: `POST {base_url}/orders`.
#[derive(Clone)]
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentProvider {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, PaymentError> {
        Self::new(
            cfg.payment_provider_url.clone(),
            cfg.payment_key_id.clone(),
            cfg.payment_key_secret.clone(),
            Duration::from_secs(cfg.payment_timeout_secs),
        )
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    #[instrument(skip(self), fields(provider = %self.base_url))]
    async fn create_payment_request(
        &self,
        amount_minor: i64,
        currency: &str,
        reference: &str,
    ) -> Result<PaymentHandle, PaymentError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateProviderOrder {
                amount: amount_minor,
                currency,
                receipt: reference,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Payment provider request failed: {}", e);
                PaymentError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Payment provider rejected order");
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let order: ProviderOrder = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;

        Ok(PaymentHandle {
            provider_reference: order.id,
            client_secret: order.client_secret,
            key_id: Some(self.key_id.clone()).filter(|k| !k.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpPaymentProvider {
        HttpPaymentProvider::new(
            server.uri(),
            "rzp_test_key",
            "rzp_test_secret",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn posts_minor_units_and_returns_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header_exists("authorization"))
            .and(body_json(serde_json::json!({
                "amount": 45000,
                "currency": "USD",
                "receipt": "order-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order_Abc123",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let handle = provider(&server)
            .create_payment_request(45000, "USD", "order-1")
            .await
            .unwrap();

        assert_eq!(handle.provider_reference, "order_Abc123");
        assert_eq!(handle.client_secret, None);
        assert_eq!(handle.key_id.as_deref(), Some("rzp_test_key"));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .create_payment_request(100, "USD", "order-2")
            .await
            .unwrap_err();

        assert_matches!(err, PaymentError::Rejected { status: 401, .. });
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .create_payment_request(100, "USD", "order-3")
            .await
            .unwrap_err();

        assert_matches!(err, PaymentError::InvalidResponse(_));
    }
}
