use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use server_api::{
    delete_coupon, health, list_coupons, list_reference_options, list_store_names, load_coupon,
    update_coupon_order, ApiContext,
};
use shared::{
    domain::{CouponId, CouponSummary, ReferenceOption, StoreOption},
    error::{ApiError, ErrorCode},
    protocol::{ApiEnvelope, CouponDeleted, OrderUpdated, UpdateOrderRequest},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type ApiResult<T> = Result<Json<ApiEnvelope<T>>, ApiFailure>;

struct ApiFailure(ApiError);

impl From<ApiError> for ApiFailure {
    fn from(value: ApiError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match self.0.code {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = ?self.0.code, message = %self.0.message, "request failed");
        }
        (status, Json(ApiEnvelope::<()>::failure(self.0))).into_response()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/coupons", get(http_list_coupons))
        .route(
            "/coupons/:coupon_id",
            get(http_load_coupon)
                .patch(http_update_coupon_order)
                .delete(http_delete_coupon),
        )
        .route("/stores", get(http_list_stores))
        .route("/references/:kind", get(http_list_references))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiFailure> {
    health(&state.api).await?;
    Ok("ok")
}

async fn http_list_coupons(State(state): State<Arc<AppState>>) -> ApiResult<Vec<CouponSummary>> {
    let coupons = list_coupons(&state.api).await?;
    Ok(Json(ApiEnvelope::ok(coupons)))
}

async fn http_load_coupon(
    State(state): State<Arc<AppState>>,
    Path(coupon_id): Path<String>,
) -> ApiResult<CouponSummary> {
    let coupon = load_coupon(&state.api, &CouponId(coupon_id)).await?;
    Ok(Json(ApiEnvelope::ok(coupon)))
}

async fn http_update_coupon_order(
    State(state): State<Arc<AppState>>,
    Path(coupon_id): Path<String>,
    payload: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> ApiResult<OrderUpdated> {
    let Json(req) = payload.map_err(|rejection| {
        warn!(%coupon_id, %rejection, "rejected order update body");
        ApiError::validation(rejection.body_text())
    })?;
    let updated = update_coupon_order(&state.api, &CouponId(coupon_id), req.order).await?;
    Ok(Json(ApiEnvelope::ok(updated)))
}

async fn http_delete_coupon(
    State(state): State<Arc<AppState>>,
    Path(coupon_id): Path<String>,
) -> ApiResult<CouponDeleted> {
    let deleted = delete_coupon(&state.api, &CouponId(coupon_id)).await?;
    Ok(Json(ApiEnvelope::ok(deleted)))
}

async fn http_list_stores(State(state): State<Arc<AppState>>) -> ApiResult<Vec<StoreOption>> {
    let stores = list_store_names(&state.api).await?;
    Ok(Json(ApiEnvelope::ok(stores)))
}

async fn http_list_references(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<Vec<ReferenceOption>> {
    let options = list_reference_options(&state.api, &kind).await?;
    Ok(Json(ApiEnvelope::ok(options)))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
