//! Integration tests for group-level motion operations
//!
//! Covers the bring-up sequence and the "not allowed action" handling of
//! stop/disable/enable against the simulated controller.

use fts_control::config::TopologyConfig;
use fts_control::error::FtsError;
use fts_control::hardware::capabilities::{GroupMethod, LinkFault};
use fts_control::hardware::mock::{MockMotionLink, MockOp, MockTransport};
use fts_control::motion::{ActionOutcome, MotionGroupManager};
use fts_control::topology::Topology;
use std::sync::Arc;
use std::time::Duration;

async fn setup(link: MockMotionLink) -> (Arc<MockMotionLink>, MotionGroupManager) {
    let link = Arc::new(link);
    let topology = Topology::load(
        &MockTransport::with_sample_description(),
        link.as_ref(),
        &TopologyConfig::default(),
    )
    .await
    .unwrap();
    let manager = MotionGroupManager::new(link.clone(), Arc::new(topology));
    link.clear_calls().await;
    (link, manager)
}

// =============================================================================
// Bring-up
// =============================================================================

#[tokio::test]
async fn test_initialize_session_homes_every_group_in_order() {
    let (link, manager) = setup(MockMotionLink::fts_default()).await;

    manager.initialize_session().await.unwrap();

    for group in ["GROUP1", "GROUP2", "GROUP3"] {
        assert_eq!(
            link.actions_for(group).await,
            vec![
                GroupMethod::Kill,
                GroupMethod::InitializeWithEncoderCalibration,
                GroupMethod::HomeSearch
            ]
        );
        assert_eq!(link.status_of(group).await, Some(11));
    }
}

#[tokio::test]
async fn test_initialize_session_stops_at_first_failing_group() {
    let (link, manager) = setup(MockMotionLink::fts_default()).await;
    link.inject_fault(
        MockOp::GroupAction(GroupMethod::HomeSearch),
        Some("GROUP2"),
        0,
        LinkFault::new(-85, "Home search timeout"),
    )
    .await;

    let err = manager.initialize_session().await.unwrap_err();

    assert_eq!(err.hardware_code(), Some(-85));
    assert_eq!(link.status_of("GROUP1").await, Some(11));
    assert!(link.actions_for("GROUP3").await.is_empty());
    assert_eq!(link.status_of("GROUP3").await, Some(0));
}

#[tokio::test]
async fn test_session_bring_up_is_repeatable() {
    let (link, manager) = setup(MockMotionLink::fts_default()).await;
    manager.initialize_session().await.unwrap();
    manager.move_absolute("GROUP1", 12.5).await.unwrap();

    manager.initialize_session().await.unwrap();

    assert_eq!(link.status_of("GROUP1").await, Some(11));
    assert_eq!(link.setpoint_of("GROUP1").await, Some(0.0));
}

// =============================================================================
// Stop / Disable / Enable
// =============================================================================

#[tokio::test]
async fn test_stop_on_idle_group_is_not_applicable() {
    let (_link, manager) = setup(MockMotionLink::fts_default()).await;
    manager.initialize_session().await.unwrap();

    assert_eq!(
        manager.stop("GROUP3").await.unwrap(),
        ActionOutcome::NotApplicable
    );
}

#[tokio::test]
async fn test_stop_aborts_a_moving_group() {
    let (link, manager) = setup(
        MockMotionLink::fts_default().with_move_delay(Duration::from_millis(300)),
    )
    .await;
    manager.initialize_session().await.unwrap();

    let mover = manager.clone();
    let motion = tokio::spawn(async move { mover.move_absolute("GROUP3", 100.0).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(link.status_of("GROUP3").await, Some(44));

    assert_eq!(manager.stop("GROUP3").await.unwrap(), ActionOutcome::Applied);
    assert_eq!(link.status_of("GROUP3").await, Some(12));
    motion.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stop_surfaces_other_device_errors() {
    let (link, manager) = setup(MockMotionLink::fts_default()).await;
    link.inject_fault(
        MockOp::GroupAction(GroupMethod::MoveAbort),
        Some("GROUP3"),
        0,
        LinkFault::timeout("timeout"),
    )
    .await;

    let err = manager.stop("GROUP3").await.unwrap_err();
    assert!(matches!(err, FtsError::HardwareAction { code: -2, .. }));
}

#[tokio::test]
async fn test_stop_all_visits_every_group() {
    let (link, manager) = setup(MockMotionLink::fts_default()).await;
    manager.initialize_session().await.unwrap();
    link.clear_calls().await;

    manager.stop_all().await.unwrap();

    for group in ["GROUP1", "GROUP2", "GROUP3"] {
        assert_eq!(link.actions_for(group).await, vec![GroupMethod::MoveAbort]);
    }
}

#[tokio::test]
async fn test_enable_on_enabled_group_is_not_applicable() {
    let (_link, manager) = setup(MockMotionLink::fts_default()).await;
    manager.initialize_session().await.unwrap();

    assert_eq!(
        manager.enable("GROUP1").await.unwrap(),
        ActionOutcome::NotApplicable
    );
    assert_eq!(manager.disable("GROUP1").await.unwrap(), ActionOutcome::Applied);
    assert_eq!(manager.enable("GROUP1").await.unwrap(), ActionOutcome::Applied);
}
