use std::sync::Arc;

use shared::domain::StoreOption;
use tracing::warn;

use crate::{
    backend::CouponBackend,
    error::{FetchError, Resource},
};

pub struct ReferenceDataSupplier {
    backend: Arc<dyn CouponBackend>,
}

impl ReferenceDataSupplier {
    pub fn new(backend: Arc<dyn CouponBackend>) -> Self {
        Self { backend }
    }

    pub async fn fetch_store_names(&self) -> Result<Vec<StoreOption>, FetchError> {
        self.backend
            .fetch_store_names()
            .await
            .map_err(|source| FetchError::new(Resource::StoreNames, source))
    }

    /// Store filter dropdown entries; a failed lookup yields no entries.
    pub async fn store_filter_options(&self) -> Vec<StoreOption> {
        match self.fetch_store_names().await {
            Ok(stores) => stores,
            Err(err) => {
                warn!(error = %err, "store lookup failed; filter dropdown left empty");
                Vec::new()
            }
        }
    }
}
