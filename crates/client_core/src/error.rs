use std::fmt;

use shared::domain::CouponId;
use thiserror::Error;

/// A single request against the content store went wrong.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}: {detail}")]
    Status {
        url: String,
        status: u16,
        detail: String,
    },
    #[error("{url} did not report success: {detail}")]
    Unsuccessful { url: String, detail: String },
    #[error("{url} returned a malformed body: {reason}")]
    Malformed { url: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Coupons,
    StoreNames,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Coupons => f.write_str("coupons"),
            Resource::StoreNames => f.write_str("store names"),
        }
    }
}

/// Listing or lookup failed. Never collapsed into an empty result.
#[derive(Debug, Error)]
#[error("failed to fetch {resource}: {source}")]
pub struct FetchError {
    pub resource: Resource,
    #[source]
    pub source: BackendError,
}

impl FetchError {
    pub fn new(resource: Resource, source: BackendError) -> Self {
        Self { resource, source }
    }
}

#[derive(Debug)]
pub struct FailedUpdate {
    pub id: CouponId,
    pub order: u32,
    pub error: BackendError,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("a save is already in progress")]
    InProgress,
    #[error("there are no unsaved changes")]
    NothingToSave,
    #[error("coupons must be reloaded before saving")]
    NotLoaded,
    #[error("no save is in progress to finish")]
    NotSaving,
    #[error("{} of {attempted} order updates failed", .failed.len())]
    Partial {
        attempted: usize,
        failed: Vec<FailedUpdate>,
        /// Set when the refetch that follows the failed save also failed.
        resync: Option<FetchError>,
    },
}

impl SaveError {
    pub fn failed_ids(&self) -> Vec<CouponId> {
        match self {
            SaveError::Partial { failed, .. } => failed.iter().map(|f| f.id.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("cannot reorder while a save is in progress")]
    SaveInProgress,
    #[error("index {index} is out of range for a view of {len} coupons")]
    OutOfRange { index: usize, len: usize },
    #[error("coupon {0} is not in the current view")]
    NotVisible(CouponId),
}
