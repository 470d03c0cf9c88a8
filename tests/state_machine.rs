//! Integration tests for the instrument state machine
//!
//! Each test drives an `FtsStateMachine` over the simulated controller and
//! checks both the resulting operating state and what reached the hardware.

use fts_control::config::FtsConfig;
use fts_control::error::FtsError;
use fts_control::fts::{CommandKind, FtsStateMachine, OperatingState, PointingPosition};
use fts_control::hardware::capabilities::{AuxiliaryDevice, GroupMethod, LinkFault};
use fts_control::hardware::mock::{MockAuxiliary, MockMotionLink, MockOp, MockTransport};
use fts_control::motion::ScanRequest;
use std::sync::Arc;
use tempfile::TempDir;

struct Rig {
    fts: FtsStateMachine,
    link: Arc<MockMotionLink>,
    chopper: Arc<MockAuxiliary>,
    _output: TempDir,
}

fn rig() -> Rig {
    let output = tempfile::tempdir().unwrap();
    let mut config = FtsConfig::default();
    config.storage.output_dir = output.path().to_path_buf();

    let link = Arc::new(MockMotionLink::fts_default());
    let chopper = Arc::new(MockAuxiliary::new("chopper"));
    let fts = FtsStateMachine::new(
        config,
        link.clone(),
        Arc::new(MockTransport::with_sample_description()),
    )
    .with_auxiliary(chopper.clone());

    Rig {
        fts,
        link,
        chopper,
        _output: output,
    }
}

fn pointing(linear: f64, angle: f64) -> PointingPosition {
    PointingPosition { linear, angle }
}

fn short_scan() -> ScanRequest {
    ScanRequest::default().with_range(10.0, 50.0).with_repeat(2)
}

async fn configured() -> Rig {
    let mut rig = rig();
    rig.fts.initialize().await.unwrap();
    rig.fts.configure(pointing(10.0, 45.0), false).await.unwrap();
    rig
}

// =============================================================================
// Command Legality
// =============================================================================

#[tokio::test]
async fn test_scan_before_initialize_is_rejected_without_hardware() {
    let mut rig = rig();

    let err = rig.fts.scan(short_scan()).await.unwrap_err();

    assert!(matches!(
        err,
        FtsError::InvalidCommand {
            command: CommandKind::Scan,
            state: OperatingState::Uninitialized
        }
    ));
    assert_eq!(rig.fts.state(), OperatingState::Uninitialized);
    assert!(rig.link.calls().await.is_empty());
}

#[tokio::test]
async fn test_save_before_scan_is_rejected() {
    let mut rig = configured().await;
    let err = rig.fts.save().await.unwrap_err();
    assert!(err.is_invalid_command());
    assert_eq!(rig.fts.state(), OperatingState::Configured);
}

#[tokio::test]
async fn test_status_without_session_reports_no_groups() {
    let rig = rig();
    let report = rig.fts.status().await.unwrap();
    assert_eq!(report.state, OperatingState::Uninitialized);
    assert!(report.firmware.is_none());
    assert!(report.groups.is_empty());
}

// =============================================================================
// Acquisition Cycle
// =============================================================================

#[tokio::test]
async fn test_full_acquisition_cycle() {
    let mut rig = rig();

    rig.fts.initialize().await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Initialized);

    rig.fts.configure(pointing(10.0, 45.0), false).await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Configured);
    assert_eq!(rig.link.setpoint_of("GROUP1").await, Some(10.0));
    assert_eq!(rig.link.setpoint_of("GROUP2").await, Some(45.0));

    let result = rig.fts.scan(short_scan()).await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Finished);
    assert_eq!(result.timestamps.len(), 8);
    assert_eq!(result.group, "GROUP3");
    assert_eq!(rig.fts.last_scan(), Some(&result));

    let saved = rig.fts.save().await.unwrap();
    assert_eq!(saved.run_id, result.run_id);
    assert!(saved.gathering_file.exists());
    assert!(saved.timestamp_file.unwrap().exists());
    assert_eq!(rig.fts.state(), OperatingState::Finished);

    let report = rig.fts.status().await.unwrap();
    assert_eq!(report.firmware.as_deref(), Some("XPS-D-N13019"));
    let names: Vec<_> = report.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["GROUP1", "GROUP2", "GROUP3"]);
    assert_eq!(report.groups[2].category, "MovingLinear");
}

#[tokio::test]
async fn test_relative_pointing_adds_to_setpoint() {
    let mut rig = configured().await;
    rig.fts.scan(short_scan()).await.unwrap();

    rig.fts.configure(pointing(-2.5, 5.0), true).await.unwrap();

    assert_eq!(rig.fts.state(), OperatingState::Configured);
    assert_eq!(rig.link.setpoint_of("GROUP1").await, Some(7.5));
    assert_eq!(rig.link.setpoint_of("GROUP2").await, Some(50.0));
}

#[tokio::test]
async fn test_invalid_range_keeps_configured_state() {
    let mut rig = configured().await;
    rig.link.clear_calls().await;

    let err = rig
        .fts
        .scan(ScanRequest::default().with_range(-200.0, 50.0))
        .await
        .unwrap_err();

    assert!(matches!(err, FtsError::InvalidRange { .. }));
    assert_eq!(rig.fts.state(), OperatingState::Configured);
    assert!(rig.link.calls().await.is_empty());
}

#[tokio::test]
async fn test_rejected_pointing_keeps_initialized_state() {
    let mut rig = rig();
    rig.fts.initialize().await.unwrap();

    let err = rig
        .fts
        .configure(pointing(1_000.0, 0.0), false)
        .await
        .unwrap_err();

    assert_eq!(err.hardware_code(), Some(-17));
    assert_eq!(rig.fts.state(), OperatingState::Initialized);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_bring_up_still_enters_initialized() {
    let mut rig = rig();
    rig.link
        .inject_fault(
            MockOp::GroupAction(GroupMethod::HomeSearch),
            Some("GROUP2"),
            0,
            LinkFault::new(-85, "Home search timeout"),
        )
        .await;

    let err = rig.fts.initialize().await.unwrap_err();

    assert_eq!(err.hardware_code(), Some(-85));
    assert_eq!(rig.fts.state(), OperatingState::Initialized);
    assert!(rig.link.actions_for("GROUP3").await.is_empty());
}

#[tokio::test]
async fn test_failed_scan_stays_scanning_until_stop() {
    let mut rig = configured().await;
    rig.link
        .inject_fault(
            MockOp::Move,
            Some("GROUP3"),
            2,
            LinkFault::new(-33, "Motion done timeout"),
        )
        .await;

    let err = rig.fts.scan(short_scan()).await.unwrap_err();
    assert_eq!(err.hardware_code(), Some(-33));
    assert_eq!(rig.fts.state(), OperatingState::Scanning);
    assert!(rig.fts.last_scan().is_none());

    let err = rig
        .fts
        .configure(pointing(0.0, 0.0), false)
        .await
        .unwrap_err();
    assert!(err.is_invalid_command());

    rig.fts.stop().await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Uninitialized);

    rig.fts.initialize().await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Initialized);
}

// =============================================================================
// Stop, Pause, Resume
// =============================================================================

#[tokio::test]
async fn test_stop_aborts_groups_and_disables_auxiliaries() {
    let mut rig = configured().await;
    rig.chopper.enable().await.unwrap();
    rig.link.clear_calls().await;

    rig.fts.stop().await.unwrap();

    assert_eq!(rig.fts.state(), OperatingState::Uninitialized);
    assert!(!rig.chopper.is_enabled().await.unwrap());
    for group in ["GROUP1", "GROUP2", "GROUP3"] {
        assert_eq!(rig.link.actions_for(group).await, vec![GroupMethod::MoveAbort]);
    }
}

#[tokio::test]
async fn test_failed_auxiliary_disable_keeps_state() {
    let mut rig = configured().await;
    rig.chopper.set_fail_disable(true);

    assert!(rig.fts.stop().await.is_err());
    assert_eq!(rig.fts.state(), OperatingState::Configured);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let mut rig = configured().await;

    rig.fts.pause().await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Paused);
    assert_eq!(rig.link.status_of("GROUP3").await, Some(20));

    let err = rig.fts.scan(short_scan()).await.unwrap_err();
    assert!(err.is_invalid_command());

    rig.fts.resume().await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Configured);
    assert_eq!(rig.link.status_of("GROUP3").await, Some(12));

    rig.fts.scan(short_scan()).await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Finished);
}

// =============================================================================
// Reboot and Close
// =============================================================================

#[tokio::test]
async fn test_reboot_reconnects_and_resets_state() {
    let mut rig = configured().await;
    rig.fts.scan(short_scan()).await.unwrap();
    rig.link.clear_calls().await;

    rig.fts.reboot().await.unwrap();

    assert_eq!(rig.fts.state(), OperatingState::Uninitialized);
    assert!(rig.fts.last_scan().is_none());
    assert!(rig.link.is_open().await);
    let calls = rig.link.calls().await;
    assert!(matches!(
        calls.first(),
        Some(fts_control::hardware::mock::LinkCall::Close)
    ));

    rig.fts.initialize().await.unwrap();
    assert_eq!(rig.fts.state(), OperatingState::Initialized);
}

#[tokio::test]
async fn test_close_rejects_every_later_command() {
    let mut rig = configured().await;
    rig.chopper.enable().await.unwrap();

    rig.fts.close().await.unwrap();

    assert!(rig.fts.is_closed());
    assert!(!rig.link.is_open().await);
    assert!(!rig.chopper.is_enabled().await.unwrap());
    assert!(matches!(
        rig.fts.status().await.unwrap_err(),
        FtsError::Closed {
            command: CommandKind::Status
        }
    ));
    assert!(matches!(
        rig.fts.initialize().await.unwrap_err(),
        FtsError::Closed { .. }
    ));
    assert!(rig.fts.close().await.unwrap_err().is_invalid_command());
}
