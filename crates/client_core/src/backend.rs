use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::{DeserializeOwned, IgnoredAny};
use shared::{
    domain::{CouponId, CouponSummary, StoreOption},
    protocol::{coupon_route, coupons_route, stores_route, ApiEnvelope, UpdateOrderRequest},
};
use tracing::debug;
use url::Url;

use crate::error::BackendError;

const MAX_DETAIL_CHARS: usize = 200;

/// Port to the content store. Each call is one suspension point.
#[async_trait]
pub trait CouponBackend: Send + Sync {
    async fn fetch_coupons(&self) -> Result<Vec<CouponSummary>, BackendError>;
    async fn fetch_store_names(&self) -> Result<Vec<StoreOption>, BackendError>;
    async fn update_order(&self, id: &CouponId, order: u32) -> Result<(), BackendError>;
}

pub struct HttpCouponBackend {
    http: Client,
    base_url: String,
}

impl HttpCouponBackend {
    pub fn new(server_url: &str) -> Result<Self, BackendError> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self, BackendError> {
        let parsed = Url::parse(server_url.trim()).map_err(|err| BackendError::InvalidUrl {
            url: server_url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::InvalidUrl {
                url: server_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl CouponBackend for HttpCouponBackend {
    async fn fetch_coupons(&self) -> Result<Vec<CouponSummary>, BackendError> {
        let url = self.endpoint(coupons_route());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| transport(&url, source))?;
        let envelope: ApiEnvelope<Vec<CouponSummary>> = read_envelope(&url, response).await?;
        require_data(&url, envelope)
    }

    async fn fetch_store_names(&self) -> Result<Vec<StoreOption>, BackendError> {
        let url = self.endpoint(stores_route());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| transport(&url, source))?;
        let envelope: ApiEnvelope<Vec<StoreOption>> = read_envelope(&url, response).await?;
        require_data(&url, envelope)
    }

    async fn update_order(&self, id: &CouponId, order: u32) -> Result<(), BackendError> {
        let url = self.endpoint(&coupon_route(id));
        let response = self
            .http
            .patch(&url)
            .json(&UpdateOrderRequest {
                order: i64::from(order),
            })
            .send()
            .await
            .map_err(|source| transport(&url, source))?;
        let _: ApiEnvelope<IgnoredAny> = read_envelope(&url, response).await?;
        debug!(coupon_id = %id, order, "order update acknowledged");
        Ok(())
    }
}

fn transport(url: &str, source: reqwest::Error) -> BackendError {
    BackendError::Transport {
        url: url.to_string(),
        source,
    }
}

/// Rejects non-2xx statuses and envelopes whose `success` flag is missing or false.
async fn read_envelope<T: DeserializeOwned>(
    url: &str,
    response: Response,
) -> Result<ApiEnvelope<T>, BackendError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|source| transport(url, source))?;

    if !status.is_success() {
        return Err(BackendError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            detail: error_detail(&bytes),
        });
    }

    let envelope: ApiEnvelope<T> =
        serde_json::from_slice(&bytes).map_err(|err| BackendError::Malformed {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
    if !envelope.success {
        return Err(BackendError::Unsuccessful {
            url: url.to_string(),
            detail: envelope
                .error
                .map(|err| err.message)
                .unwrap_or_else(|| "success flag missing or false".to_string()),
        });
    }
    Ok(envelope)
}

fn require_data<T>(url: &str, envelope: ApiEnvelope<T>) -> Result<T, BackendError> {
    envelope.data.ok_or_else(|| BackendError::Malformed {
        url: url.to_string(),
        reason: "missing data field".to_string(),
    })
}

fn error_detail(bytes: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ApiEnvelope<IgnoredAny>>(bytes) {
        if let Some(error) = envelope.error {
            return error.message;
        }
    }
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        return "empty response body".to_string();
    }
    text.chars().take(MAX_DETAIL_CHARS).collect()
}
