use std::sync::Arc;

use shared::domain::{CouponSummary, StoreOption};
use tracing::{error, info};

use crate::{
    backend::CouponBackend,
    error::{FetchError, Resource},
    reference::ReferenceDataSupplier,
};

/// Active search term and store filter of the admin list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub search_term: String,
    pub store_filter: String,
}

impl ViewFilter {
    pub fn new(search_term: impl Into<String>, store_filter: impl Into<String>) -> Self {
        Self {
            search_term: search_term.into(),
            store_filter: store_filter.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search_term.is_empty() && self.store_filter.is_empty()
    }

    pub fn apply(&self, all: &[CouponSummary]) -> Vec<CouponSummary> {
        apply_view(all, &self.search_term, &self.store_filter)
    }
}

/// Stable filter over `all`: case-insensitive substring of `search_term` in the
/// title or store name, and exact `store_filter` match on the store name. Empty
/// inputs match everything. Never re-sorts.
pub fn apply_view(
    all: &[CouponSummary],
    search_term: &str,
    store_filter: &str,
) -> Vec<CouponSummary> {
    let needle = search_term.to_lowercase();
    all.iter()
        .filter(|coupon| {
            needle.is_empty()
                || coupon.title.to_lowercase().contains(&needle)
                || coupon.store_name.to_lowercase().contains(&needle)
        })
        .filter(|coupon| store_filter.is_empty() || coupon.store_name == store_filter)
        .cloned()
        .collect()
}

pub struct ListingService {
    backend: Arc<dyn CouponBackend>,
    references: ReferenceDataSupplier,
}

impl ListingService {
    pub fn new(backend: Arc<dyn CouponBackend>) -> Self {
        Self {
            references: ReferenceDataSupplier::new(Arc::clone(&backend)),
            backend,
        }
    }

    /// Every coupon, ascending by persisted `order`. Equal orders keep the
    /// store's relative order.
    pub async fn fetch_all(&self) -> Result<Vec<CouponSummary>, FetchError> {
        let mut coupons = self.backend.fetch_coupons().await.map_err(|source| {
            error!(error = %source, "coupon listing failed");
            FetchError::new(Resource::Coupons, source)
        })?;
        coupons.sort_by_key(|coupon| coupon.order);
        info!(count = coupons.len(), "coupon listing loaded");
        Ok(coupons)
    }

    pub async fn fetch_store_names(&self) -> Result<Vec<StoreOption>, FetchError> {
        self.references.fetch_store_names().await
    }

    pub fn references(&self) -> &ReferenceDataSupplier {
        &self.references
    }
}

#[cfg(test)]
#[path = "tests/listing_tests.rs"]
mod tests;
