use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use shared::domain::{CouponId, CouponSummary, StoreOption};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    backend::CouponBackend,
    error::{FailedUpdate, FetchError, MoveError, SaveError},
    listing::{ListingService, ViewFilter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Clean,
    Dirty,
    Saving,
}

/// Structured notifications for whoever renders success/failure to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingEvent {
    Loaded { count: usize },
    FetchFailed { message: String },
    Reordered { visible: usize },
    SaveStarted { pending: usize },
    Saved { updated: usize },
    SaveFailed { attempted: usize, failed: Vec<CouponId> },
    Resynced { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub updated: usize,
}

/// Snapshot of the visible view taken when a save begins. Each entry is
/// written with its index as the new `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    updates: Vec<(CouponId, u32)>,
}

impl SaveTicket {
    pub fn updates(&self) -> &[(CouponId, u32)] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

#[derive(Debug)]
pub struct PersistOutcome {
    pub attempted: usize,
    pub failed: Vec<FailedUpdate>,
}

/// Single-element list move followed by dense renumbering. `source == target`
/// returns the view untouched.
pub fn move_item(
    view: &[CouponSummary],
    source: usize,
    target: usize,
) -> Result<Vec<CouponSummary>, MoveError> {
    let len = view.len();
    for index in [source, target] {
        if index >= len {
            return Err(MoveError::OutOfRange { index, len });
        }
    }
    let mut moved = view.to_vec();
    if source == target {
        return Ok(moved);
    }
    let item = moved.remove(source);
    moved.insert(target, item);
    renumber(&mut moved);
    Ok(moved)
}

pub fn renumber(view: &mut [CouponSummary]) {
    for (index, coupon) in view.iter_mut().enumerate() {
        coupon.order = order_for_index(index);
    }
}

/// Copies the `order` of each visible coupon into `working_set` by id, then
/// restores ascending order. Coupons absent from `visible` keep their `order`
/// and their relative position.
pub fn merge_visible(working_set: &mut [CouponSummary], visible: &[CouponSummary]) {
    let renumbered: HashMap<&CouponId, u32> = visible
        .iter()
        .map(|coupon| (&coupon.id, coupon.order))
        .collect();
    for coupon in working_set.iter_mut() {
        if let Some(order) = renumbered.get(&coupon.id) {
            coupon.order = *order;
        }
    }
    working_set.sort_by_key(|coupon| coupon.order);
}

/// Issues every update of `ticket` concurrently and waits for all of them.
pub async fn persist_order(backend: &dyn CouponBackend, ticket: &SaveTicket) -> PersistOutcome {
    let calls = ticket
        .updates
        .iter()
        .map(|(id, order)| async move { (id, *order, backend.update_order(id, *order).await) });
    let results = join_all(calls).await;

    let mut failed = Vec::new();
    for (id, order, result) in results {
        if let Err(error) = result {
            warn!(coupon_id = %id, order, %error, "order update failed");
            failed.push(FailedUpdate {
                id: id.clone(),
                order,
                error,
            });
        }
    }
    PersistOutcome {
        attempted: ticket.updates.len(),
        failed,
    }
}

fn order_for_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

pub struct OrderingEngine {
    backend: Arc<dyn CouponBackend>,
    listing: ListingService,
    working_set: Vec<CouponSummary>,
    filter: ViewFilter,
    state: EngineState,
    synced: bool,
    events: broadcast::Sender<OrderingEvent>,
}

impl OrderingEngine {
    pub fn new(backend: Arc<dyn CouponBackend>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            listing: ListingService::new(Arc::clone(&backend)),
            backend,
            working_set: Vec::new(),
            filter: ViewFilter::default(),
            state: EngineState::Clean,
            synced: false,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<OrderingEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn has_changes(&self) -> bool {
        self.state != EngineState::Clean
    }

    pub fn is_saving(&self) -> bool {
        self.state == EngineState::Saving
    }

    pub fn working_set(&self) -> &[CouponSummary] {
        &self.working_set
    }

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn set_search_term(&mut self, search_term: impl Into<String>) {
        self.filter.search_term = search_term.into();
    }

    pub fn set_store_filter(&mut self, store_filter: impl Into<String>) {
        self.filter.store_filter = store_filter.into();
    }

    pub fn set_filter(&mut self, filter: ViewFilter) {
        self.filter = filter;
    }

    pub fn visible(&self) -> Vec<CouponSummary> {
        self.filter.apply(&self.working_set)
    }

    pub async fn store_filter_options(&self) -> Vec<StoreOption> {
        self.listing.references().store_filter_options().await
    }

    /// Replaces the working set with the store's current listing. On failure the
    /// previous working set stays and the error is returned.
    pub async fn load(&mut self) -> Result<usize, FetchError> {
        match self.listing.fetch_all().await {
            Ok(coupons) => {
                let count = coupons.len();
                self.working_set = coupons;
                self.synced = true;
                if self.state != EngineState::Saving {
                    self.state = EngineState::Clean;
                }
                self.emit(OrderingEvent::Loaded { count });
                Ok(count)
            }
            Err(err) => {
                self.emit(OrderingEvent::FetchFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Moves within the visible view. Returns `false` for a no-op move.
    pub fn move_visible(&mut self, source: usize, target: usize) -> Result<bool, MoveError> {
        if self.state == EngineState::Saving {
            return Err(MoveError::SaveInProgress);
        }
        let view = self.visible();
        let moved = move_item(&view, source, target)?;
        if source == target {
            return Ok(false);
        }
        merge_visible(&mut self.working_set, &moved);
        self.state = EngineState::Dirty;
        self.emit(OrderingEvent::Reordered {
            visible: moved.len(),
        });
        Ok(true)
    }

    /// Drag adapter: drop `active` onto the slot currently held by `over`.
    pub fn move_by_id(&mut self, active: &CouponId, over: &CouponId) -> Result<bool, MoveError> {
        if self.state == EngineState::Saving {
            return Err(MoveError::SaveInProgress);
        }
        if active == over {
            return Ok(false);
        }
        let view = self.visible();
        let position = |id: &CouponId| {
            view.iter()
                .position(|coupon| &coupon.id == id)
                .ok_or_else(|| MoveError::NotVisible(id.clone()))
        };
        let source = position(active)?;
        let target = position(over)?;
        self.move_visible(source, target)
    }

    /// Dirty -> Saving. The ticket covers the view visible right now.
    pub fn begin_save(&mut self) -> Result<SaveTicket, SaveError> {
        match self.state {
            EngineState::Saving => return Err(SaveError::InProgress),
            EngineState::Clean => return Err(SaveError::NothingToSave),
            EngineState::Dirty => {}
        }
        if !self.synced {
            return Err(SaveError::NotLoaded);
        }
        let updates = self
            .visible()
            .into_iter()
            .enumerate()
            .map(|(index, coupon)| (coupon.id, order_for_index(index)))
            .collect::<Vec<_>>();
        self.state = EngineState::Saving;
        self.emit(OrderingEvent::SaveStarted {
            pending: updates.len(),
        });
        Ok(SaveTicket { updates })
    }

    /// Saving -> Clean when every update landed. Otherwise Saving -> Dirty, the
    /// working set is discarded and refetched. Outside Saving the ticket is stale
    /// and nothing changes.
    pub async fn finish_save(
        &mut self,
        ticket: SaveTicket,
        outcome: PersistOutcome,
    ) -> Result<SaveReport, SaveError> {
        if self.state != EngineState::Saving {
            warn!(pending = ticket.len(), "ignoring save result with no save in progress");
            return Err(SaveError::NotSaving);
        }
        if outcome.failed.is_empty() {
            let saved: HashMap<&CouponId, u32> = ticket
                .updates
                .iter()
                .map(|(id, order)| (id, *order))
                .collect();
            for coupon in self.working_set.iter_mut() {
                if let Some(order) = saved.get(&coupon.id) {
                    coupon.order = *order;
                }
            }
            self.working_set.sort_by_key(|coupon| coupon.order);
            self.state = EngineState::Clean;
            info!(updated = outcome.attempted, "coupon order saved");
            self.emit(OrderingEvent::Saved {
                updated: outcome.attempted,
            });
            return Ok(SaveReport {
                updated: outcome.attempted,
            });
        }

        self.state = EngineState::Dirty;
        self.emit(OrderingEvent::SaveFailed {
            attempted: outcome.attempted,
            failed: outcome.failed.iter().map(|f| f.id.clone()).collect(),
        });
        warn!(
            attempted = outcome.attempted,
            failed = outcome.failed.len(),
            "coupon order save failed; resynchronizing"
        );

        let resync = self.resync().await.err();
        Err(SaveError::Partial {
            attempted: outcome.attempted,
            failed: outcome.failed,
            resync,
        })
    }

    pub async fn save(&mut self) -> Result<SaveReport, SaveError> {
        let ticket = self.begin_save()?;
        let outcome = persist_order(self.backend.as_ref(), &ticket).await;
        self.finish_save(ticket, outcome).await
    }

    /// Drops local ordering and reloads; state stays Dirty.
    async fn resync(&mut self) -> Result<(), FetchError> {
        self.working_set.clear();
        self.synced = false;
        match self.listing.fetch_all().await {
            Ok(coupons) => {
                let count = coupons.len();
                self.working_set = coupons;
                self.synced = true;
                info!(count, "working set resynchronized");
                self.emit(OrderingEvent::Resynced { count });
                Ok(())
            }
            Err(err) => {
                self.emit(OrderingEvent::FetchFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn emit(&self, event: OrderingEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/ordering_tests.rs"]
mod tests;
