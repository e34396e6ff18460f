use shared::{
    domain::{CouponId, CouponSummary, ReferenceKind, ReferenceOption, StoreOption},
    error::{ApiError, ErrorCode},
    protocol::{CouponDeleted, OrderUpdated},
};
use storage::Storage;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn health(ctx: &ApiContext) -> Result<(), ApiError> {
    ctx.storage.health_check().await.map_err(|err| {
        warn!(error = %err, "content store health check failed");
        ApiError::new(ErrorCode::Unavailable, err.to_string())
    })
}

/// All coupon summaries, ascending by persisted `order`.
pub async fn list_coupons(ctx: &ApiContext) -> Result<Vec<CouponSummary>, ApiError> {
    ctx.storage.list_coupon_summaries().await.map_err(internal)
}

pub async fn load_coupon(ctx: &ApiContext, id: &CouponId) -> Result<CouponSummary, ApiError> {
    ctx.storage
        .load_coupon_summary(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("coupon {id} not found")))
}

/// Persists a single coupon's `order`. The store never renumbers siblings.
pub async fn update_coupon_order(
    ctx: &ApiContext,
    id: &CouponId,
    order: i64,
) -> Result<OrderUpdated, ApiError> {
    let order = u32::try_from(order).map_err(|_| {
        ApiError::validation(format!("order must be between 0 and {}, got {order}", u32::MAX))
    })?;
    let found = ctx
        .storage
        .set_coupon_order(id, order)
        .await
        .map_err(internal)?;
    if !found {
        return Err(ApiError::not_found(format!("coupon {id} not found")));
    }
    info!(coupon_id = %id, order, "coupon order updated");
    Ok(OrderUpdated {
        id: id.clone(),
        order,
    })
}

pub async fn delete_coupon(ctx: &ApiContext, id: &CouponId) -> Result<CouponDeleted, ApiError> {
    let found = ctx.storage.delete_coupon(id).await.map_err(internal)?;
    if !found {
        return Err(ApiError::not_found(format!("coupon {id} not found")));
    }
    info!(coupon_id = %id, "coupon deleted");
    Ok(CouponDeleted { id: id.clone() })
}

pub async fn list_store_names(ctx: &ApiContext) -> Result<Vec<StoreOption>, ApiError> {
    ctx.storage.list_store_options().await.map_err(internal)
}

pub async fn list_reference_options(
    ctx: &ApiContext,
    raw_kind: &str,
) -> Result<Vec<ReferenceOption>, ApiError> {
    let kind = ReferenceKind::parse(raw_kind)
        .ok_or_else(|| ApiError::validation(format!("invalid reference type '{raw_kind}'")))?;
    ctx.storage
        .list_reference_options(kind)
        .await
        .map_err(internal)
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
