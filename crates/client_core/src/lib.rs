//! Admin-side coupon listing, filtering and manual ordering.
//!
//! [`listing::ListingService`] loads the coupon collection and
//! [`listing::apply_view`] narrows it to the visible subset.
//! [`ordering::OrderingEngine`] applies moves to that subset and persists the
//! renumbered `order` values through a [`backend::CouponBackend`].

pub mod backend;
pub mod error;
pub mod listing;
pub mod ordering;
pub mod reference;

pub use backend::{CouponBackend, HttpCouponBackend};
pub use error::{BackendError, FailedUpdate, FetchError, MoveError, Resource, SaveError};
pub use listing::{apply_view, ListingService, ViewFilter};
pub use ordering::{
    merge_visible, move_item, persist_order, EngineState, OrderingEngine, OrderingEvent,
    PersistOutcome, SaveReport, SaveTicket,
};
pub use reference::ReferenceDataSupplier;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
