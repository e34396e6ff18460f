use std::sync::atomic::Ordering;

use super::*;
use crate::error::BackendError;
use crate::test_support::{coupon, ids, orders, TestBackend};

fn abc() -> Vec<CouponSummary> {
    vec![
        coupon("A", "Alpha", "Acme", 0),
        coupon("B", "Bravo", "Acme", 1),
        coupon("C", "Charlie", "Acme", 2),
    ]
}

async fn loaded_engine(coupons: Vec<CouponSummary>) -> (OrderingEngine, Arc<TestBackend>) {
    let backend = Arc::new(TestBackend::with_coupons(coupons));
    let mut engine = OrderingEngine::new(backend.clone());
    engine.load().await.expect("load");
    (engine, backend)
}

#[test]
fn moving_first_to_last_shifts_the_rest_up() {
    let moved = move_item(&abc(), 0, 2).expect("move");
    assert_eq!(ids(&moved), vec!["B", "C", "A"]);
    assert_eq!(orders(&moved), vec![0, 1, 2]);
}

#[test]
fn moving_last_to_first_shifts_the_rest_down() {
    let moved = move_item(&abc(), 2, 0).expect("move");
    assert_eq!(ids(&moved), vec!["C", "A", "B"]);
    assert_eq!(orders(&moved), vec![0, 1, 2]);
}

#[test]
fn same_index_move_returns_input_untouched() {
    let sparse = vec![
        coupon("A", "Alpha", "Acme", 4),
        coupon("B", "Bravo", "Acme", 4),
        coupon("C", "Charlie", "Acme", 9),
    ];
    for index in 0..sparse.len() {
        assert_eq!(move_item(&sparse, index, index).expect("move"), sparse);
    }
}

#[test]
fn move_renumbers_sparse_orders_densely() {
    let sparse = vec![
        coupon("A", "Alpha", "Acme", 3),
        coupon("B", "Bravo", "Acme", 3),
        coupon("C", "Charlie", "Acme", 17),
        coupon("D", "Delta", "Acme", 40),
    ];
    let moved = move_item(&sparse, 3, 1).expect("move");
    assert_eq!(ids(&moved), vec!["A", "D", "B", "C"]);
    assert_eq!(orders(&moved), vec![0, 1, 2, 3]);
}

#[test]
fn out_of_range_indices_are_rejected() {
    assert_eq!(
        move_item(&abc(), 3, 0),
        Err(MoveError::OutOfRange { index: 3, len: 3 })
    );
    assert_eq!(
        move_item(&abc(), 0, 5),
        Err(MoveError::OutOfRange { index: 5, len: 3 })
    );
    assert_eq!(
        move_item(&[], 0, 0),
        Err(MoveError::OutOfRange { index: 0, len: 0 })
    );
}

#[test]
fn merge_leaves_hidden_coupons_alone() {
    let mut working = vec![
        coupon("A", "Alpha", "Acme", 0),
        coupon("H", "Hidden", "Zeta", 1),
        coupon("B", "Bravo", "Acme", 2),
    ];
    let visible = vec![coupon("B", "Bravo", "Acme", 0), coupon("A", "Alpha", "Acme", 1)];
    merge_visible(&mut working, &visible);

    assert_eq!(ids(&working), vec!["B", "A", "H"]);
    assert_eq!(orders(&working), vec![0, 1, 1]);
}

#[test]
fn merge_keeps_relative_order_of_hidden_coupons() {
    let mut working = vec![
        coupon("H1", "Hidden one", "Zeta", 0),
        coupon("A", "Alpha", "Acme", 1),
        coupon("H2", "Hidden two", "Zeta", 2),
        coupon("B", "Bravo", "Acme", 3),
        coupon("H3", "Hidden three", "Zeta", 4),
    ];
    let visible = vec![coupon("B", "Bravo", "Acme", 0), coupon("A", "Alpha", "Acme", 1)];
    merge_visible(&mut working, &visible);

    let hidden: Vec<&str> = ids(&working)
        .into_iter()
        .filter(|id| id.starts_with('H'))
        .collect();
    assert_eq!(hidden, vec!["H1", "H2", "H3"]);
    assert!(working.windows(2).all(|pair| pair[0].order <= pair[1].order));
}

#[tokio::test]
async fn engine_starts_clean_after_load() {
    let (engine, _backend) = loaded_engine(abc()).await;
    assert_eq!(engine.state(), EngineState::Clean);
    assert!(!engine.has_changes());
    assert_eq!(ids(engine.working_set()), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn no_op_move_does_not_mark_dirty() {
    let (mut engine, _backend) = loaded_engine(abc()).await;
    let before = engine.working_set().to_vec();
    for index in 0..3 {
        assert_eq!(engine.move_visible(index, index), Ok(false));
    }
    assert_eq!(
        engine.move_by_id(&CouponId::new("B"), &CouponId::new("B")),
        Ok(false)
    );
    assert_eq!(engine.state(), EngineState::Clean);
    assert_eq!(engine.working_set(), before.as_slice());
}

#[tokio::test]
async fn drag_first_onto_last_reorders_and_marks_dirty() {
    let (mut engine, _backend) = loaded_engine(abc()).await;
    let mut events = engine.subscribe_events();

    assert_eq!(
        engine.move_by_id(&CouponId::new("A"), &CouponId::new("C")),
        Ok(true)
    );
    assert_eq!(ids(&engine.visible()), vec!["B", "C", "A"]);
    assert_eq!(orders(&engine.visible()), vec![0, 1, 2]);
    assert_eq!(engine.state(), EngineState::Dirty);
    assert_eq!(
        events.recv().await.expect("event"),
        OrderingEvent::Reordered { visible: 3 }
    );

    engine.move_visible(0, 1).expect("second move");
    assert_eq!(ids(&engine.visible()), vec!["C", "B", "A"]);
    assert_eq!(engine.state(), EngineState::Dirty);
}

#[tokio::test]
async fn drag_onto_hidden_coupon_is_rejected() {
    let (mut engine, _backend) = loaded_engine(vec![
        coupon("A", "Alpha", "Acme", 0),
        coupon("H", "Hidden", "Zeta", 1),
    ])
    .await;
    engine.set_store_filter("Acme");
    assert_eq!(
        engine.move_by_id(&CouponId::new("A"), &CouponId::new("H")),
        Err(MoveError::NotVisible(CouponId::new("H")))
    );
    assert_eq!(engine.state(), EngineState::Clean);
}

#[tokio::test]
async fn moving_within_filtered_view_keeps_hidden_order() {
    let (mut engine, _backend) = loaded_engine(vec![
        coupon("A", "Alpha", "Acme", 0),
        coupon("H", "Hidden", "Zeta", 1),
        coupon("B", "Bravo", "Acme", 2),
    ])
    .await;
    engine.set_store_filter("Acme");
    assert_eq!(ids(&engine.visible()), vec!["A", "B"]);

    engine
        .move_by_id(&CouponId::new("B"), &CouponId::new("A"))
        .expect("move");

    let visible = engine.visible();
    assert_eq!(ids(&visible), vec!["B", "A"]);
    assert_eq!(orders(&visible), vec![0, 1]);

    let hidden = engine
        .working_set()
        .iter()
        .find(|c| c.id.as_str() == "H")
        .expect("hidden coupon");
    assert_eq!(hidden.order, 1);
}

#[tokio::test]
async fn save_persists_visible_view_and_returns_to_clean() {
    let (mut engine, backend) = loaded_engine(abc()).await;
    engine.move_visible(0, 2).expect("move");

    let report = engine.save().await.expect("save");
    assert_eq!(report, SaveReport { updated: 3 });
    assert_eq!(engine.state(), EngineState::Clean);

    let persisted = backend.persisted().await;
    assert_eq!(ids(&persisted), vec!["B", "C", "A"]);
    assert_eq!(orders(&persisted), vec![0, 1, 2]);
}

#[tokio::test]
async fn save_only_writes_coupons_visible_at_save_time() {
    let (mut engine, backend) = loaded_engine(vec![
        coupon("A", "Alpha", "Acme", 0),
        coupon("H", "Hidden", "Zeta", 1),
        coupon("B", "Bravo", "Acme", 2),
    ])
    .await;
    engine.set_store_filter("Acme");
    engine.move_visible(1, 0).expect("move");
    engine.save().await.expect("save");

    let mut written = backend.updates.lock().await.clone();
    written.sort();
    assert_eq!(
        written,
        vec![(CouponId::new("A"), 1), (CouponId::new("B"), 0)]
    );
    let persisted = backend.persisted().await;
    let hidden = persisted
        .iter()
        .find(|c| c.id.as_str() == "H")
        .expect("hidden");
    assert_eq!(hidden.order, 1);
}

#[tokio::test]
async fn one_failed_update_fails_the_whole_save_and_refetches() {
    let (mut engine, backend) = loaded_engine(vec![
        coupon("c1", "One", "Acme", 0),
        coupon("c2", "Two", "Acme", 1),
        coupon("c3", "Three", "Acme", 2),
        coupon("c4", "Four", "Acme", 3),
        coupon("c5", "Five", "Acme", 4),
    ])
    .await;
    backend.fail_update_of("c3").await;
    let fetches_before = backend.fetch_count();
    let mut events = engine.subscribe_events();

    engine.move_visible(4, 0).expect("move");
    let err = engine.save().await.expect_err("save should fail");

    match &err {
        SaveError::Partial {
            attempted,
            failed,
            resync,
        } => {
            assert_eq!(*attempted, 5);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].id, CouponId::new("c3"));
            assert!(resync.is_none());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.failed_ids(), vec![CouponId::new("c3")]);
    assert!(engine.has_changes());
    assert_eq!(engine.state(), EngineState::Dirty);
    assert_eq!(backend.fetch_count(), fetches_before + 1);

    // Working set mirrors the store, not the local guess.
    let persisted = backend.persisted().await;
    assert_eq!(engine.working_set(), persisted.as_slice());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&OrderingEvent::SaveFailed {
        attempted: 5,
        failed: vec![CouponId::new("c3")],
    }));
    assert!(seen.contains(&OrderingEvent::Resynced { count: 5 }));
}

#[tokio::test]
async fn failed_resync_discards_working_set_and_blocks_saving() {
    let (mut engine, backend) = loaded_engine(abc()).await;
    backend.fail_update_of("A").await;
    backend.fail_fetch.store(true, Ordering::SeqCst);

    engine.move_visible(0, 1).expect("move");
    let err = engine.save().await.expect_err("save should fail");
    match err {
        SaveError::Partial { resync, .. } => assert!(resync.is_some()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(engine.working_set().is_empty());
    assert!(matches!(engine.save().await, Err(SaveError::NotLoaded)));

    backend.fail_fetch.store(false, Ordering::SeqCst);
    engine.load().await.expect("reload");
    assert_eq!(engine.working_set().len(), 3);
    assert_eq!(engine.state(), EngineState::Clean);
}

#[tokio::test]
async fn moves_are_refused_while_saving() {
    let (mut engine, backend) = loaded_engine(abc()).await;
    engine.move_visible(0, 2).expect("move");

    let ticket = engine.begin_save().expect("begin");
    assert!(engine.is_saving());
    assert_eq!(engine.move_visible(0, 1), Err(MoveError::SaveInProgress));
    assert_eq!(
        engine.move_by_id(&CouponId::new("A"), &CouponId::new("B")),
        Err(MoveError::SaveInProgress)
    );
    assert!(matches!(engine.begin_save(), Err(SaveError::InProgress)));

    let outcome = persist_order(backend.as_ref(), &ticket).await;
    engine.finish_save(ticket, outcome).await.expect("finish");
    assert_eq!(engine.state(), EngineState::Clean);
    assert_eq!(engine.move_visible(0, 1), Ok(true));
}

#[tokio::test]
async fn save_ticket_snapshots_dense_indices_of_current_view() {
    let (mut engine, _backend) = loaded_engine(vec![
        coupon("A", "Alpha", "Acme", 5),
        coupon("H", "Hidden", "Zeta", 6),
        coupon("B", "Bravo", "Acme", 9),
    ])
    .await;
    engine.set_store_filter("Acme");
    engine.move_visible(0, 1).expect("move");

    let ticket = engine.begin_save().expect("begin");
    assert_eq!(
        ticket.updates(),
        &[(CouponId::new("B"), 0), (CouponId::new("A"), 1)]
    );
}

#[tokio::test]
async fn saving_without_changes_is_refused() {
    let (mut engine, backend) = loaded_engine(abc()).await;
    assert!(matches!(engine.save().await, Err(SaveError::NothingToSave)));
    assert!(backend.updates.lock().await.is_empty());
}

#[tokio::test]
async fn failed_load_keeps_previous_working_set() {
    let (mut engine, backend) = loaded_engine(abc()).await;
    let mut events = engine.subscribe_events();
    backend.fail_fetch.store(true, Ordering::SeqCst);

    let err = engine.load().await.expect_err("should fail");
    assert_eq!(err.resource, crate::error::Resource::Coupons);
    assert_eq!(engine.working_set().len(), 3);
    assert!(matches!(
        events.recv().await.expect("event"),
        OrderingEvent::FetchFailed { .. }
    ));
}

#[tokio::test]
async fn save_touching_a_deleted_coupon_fails_and_drops_it_from_the_listing() {
    let (mut engine, backend) = loaded_engine(abc()).await;
    backend.delete("B").await;
    let fetches_before = backend.fetch_count();

    engine.move_visible(2, 0).expect("move");
    let err = engine.save().await.expect_err("save should fail");

    match &err {
        SaveError::Partial {
            attempted, failed, ..
        } => {
            assert_eq!(*attempted, 3);
            assert_eq!(failed.len(), 1);
            assert!(matches!(
                failed[0].error,
                BackendError::Status { status: 404, .. }
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.failed_ids(), vec![CouponId::new("B")]);
    assert!(engine.has_changes());
    assert_eq!(backend.fetch_count(), fetches_before + 1);
    assert_eq!(ids(engine.working_set()), vec!["C", "A"]);
}

#[tokio::test]
async fn stale_ticket_is_rejected_once_the_save_finished() {
    let (mut engine, backend) = loaded_engine(abc()).await;
    engine.move_visible(0, 2).expect("move");
    let ticket = engine.begin_save().expect("begin");
    let stale = ticket.clone();
    let outcome = persist_order(backend.as_ref(), &ticket).await;
    engine.finish_save(ticket, outcome).await.expect("finish");
    assert_eq!(engine.state(), EngineState::Clean);

    let replay = PersistOutcome {
        attempted: stale.len(),
        failed: Vec::new(),
    };
    assert!(matches!(
        engine.finish_save(stale.clone(), replay).await,
        Err(SaveError::NotSaving)
    ));
    assert_eq!(engine.state(), EngineState::Clean);

    engine.move_visible(0, 1).expect("move");
    let before = engine.working_set().to_vec();
    let replay = PersistOutcome {
        attempted: stale.len(),
        failed: Vec::new(),
    };
    assert!(matches!(
        engine.finish_save(stale, replay).await,
        Err(SaveError::NotSaving)
    ));
    assert_eq!(engine.state(), EngineState::Dirty);
    assert_eq!(engine.working_set(), before.as_slice());
}
