use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use shared::domain::{CouponId, CouponSummary, StoreId, StoreOption};
use tokio::sync::Mutex;

use crate::{backend::CouponBackend, error::BackendError};

pub(crate) fn coupon(id: &str, title: &str, store: &str, order: u32) -> CouponSummary {
    CouponSummary {
        id: CouponId::new(id),
        title: title.to_string(),
        store_name: store.to_string(),
        store_slug: store.to_lowercase(),
        coupon_type: "Deal".to_string(),
        expire_date: None,
        publish_date: None,
        code: None,
        featured: None,
        order,
    }
}

pub(crate) fn ids(coupons: &[CouponSummary]) -> Vec<&str> {
    coupons.iter().map(|c| c.id.as_str()).collect()
}

pub(crate) fn orders(coupons: &[CouponSummary]) -> Vec<u32> {
    coupons.iter().map(|c| c.order).collect()
}

/// In-memory content store. Updates persist into `coupons` unless the id is
/// listed in `fail_updates`.
pub(crate) struct TestBackend {
    pub coupons: Mutex<Vec<CouponSummary>>,
    pub stores: Vec<StoreOption>,
    pub fail_updates: Mutex<HashSet<CouponId>>,
    pub fail_fetch: AtomicBool,
    pub fail_stores: AtomicBool,
    pub fetches: AtomicUsize,
    pub updates: Mutex<Vec<(CouponId, u32)>>,
}

impl TestBackend {
    pub fn with_coupons(coupons: Vec<CouponSummary>) -> Self {
        let mut names: Vec<String> = coupons.iter().map(|c| c.store_name.clone()).collect();
        names.sort();
        names.dedup();
        Self {
            coupons: Mutex::new(coupons),
            stores: names
                .into_iter()
                .map(|name| StoreOption {
                    id: StoreId::new(name.to_lowercase()),
                    name,
                })
                .collect(),
            fail_updates: Mutex::new(HashSet::new()),
            fail_fetch: AtomicBool::new(false),
            fail_stores: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub async fn fail_update_of(&self, id: &str) {
        self.fail_updates.lock().await.insert(CouponId::new(id));
    }

    /// Removes a coupon as if another admin deleted it.
    pub async fn delete(&self, id: &str) {
        self.coupons.lock().await.retain(|c| c.id.as_str() != id);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn persisted(&self) -> Vec<CouponSummary> {
        let mut coupons = self.coupons.lock().await.clone();
        coupons.sort_by_key(|c| c.order);
        coupons
    }
}

#[async_trait]
impl CouponBackend for TestBackend {
    async fn fetch_coupons(&self) -> Result<Vec<CouponSummary>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                url: "test://coupons".to_string(),
                status: 500,
                detail: "listing unavailable".to_string(),
            });
        }
        Ok(self.persisted().await)
    }

    async fn fetch_store_names(&self) -> Result<Vec<StoreOption>, BackendError> {
        if self.fail_stores.load(Ordering::SeqCst) {
            return Err(BackendError::Unsuccessful {
                url: "test://stores".to_string(),
                detail: "lookup unavailable".to_string(),
            });
        }
        Ok(self.stores.clone())
    }

    async fn update_order(&self, id: &CouponId, order: u32) -> Result<(), BackendError> {
        if self.fail_updates.lock().await.contains(id) {
            return Err(BackendError::Status {
                url: format!("test://coupons/{id}"),
                status: 500,
                detail: "write rejected".to_string(),
            });
        }
        self.updates.lock().await.push((id.clone(), order));
        let mut coupons = self.coupons.lock().await;
        match coupons.iter_mut().find(|c| &c.id == id) {
            Some(coupon) => {
                coupon.order = order;
                Ok(())
            }
            None => Err(BackendError::Status {
                url: format!("test://coupons/{id}"),
                status: 404,
                detail: "coupon not found".to_string(),
            }),
        }
    }
}
