use serde::{Deserialize, Serialize};

use crate::{domain::CouponId, error::ApiError};

/// Body shape shared by every content-store route: `success` plus either
/// `data` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdated {
    pub id: CouponId,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponDeleted {
    pub id: CouponId,
}

pub fn coupons_route() -> &'static str {
    "/coupons"
}

pub fn coupon_route(id: &CouponId) -> String {
    format!("/coupons/{}", id.as_str())
}

pub fn stores_route() -> &'static str {
    "/stores"
}
