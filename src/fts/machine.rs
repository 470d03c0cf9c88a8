//! The instrument state machine.
//!
//! [`FtsStateMachine`] owns the operating state and the hardware session. Every
//! command is checked against the current state before anything is sent to
//! the hardware; legal commands delegate to the group manager or the scan
//! orchestrator, and the state changes only once the delegate succeeded.
//!
//! Exceptions to "failure leaves state unchanged":
//!
//! - `initialize` always lands in `Initialized`, returning the bring-up error
//!   if there was one.
//! - `scan` enters `Scanning` as soon as hardware is touched. A failed scan
//!   stays there until an explicit `stop`, since stages may be mid-travel.

use crate::config::FtsConfig;
use crate::data::{ArtifactWriter, SavedArtifacts};
use crate::error::{FtsError, FtsResult};
use crate::fts::state::{CommandKind, OperatingState};
use crate::hardware::capabilities::{AuxiliaryDevice, ConfigTransport, MotionLink};
use crate::motion::{AbortFlag, GatheringSettings, ScanRequest, ScanResult};
use crate::session::MotionSession;
use crate::topology::GroupCategory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Target of the pointing mirror.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointingPosition {
    /// Pointing-linear stage target
    pub linear: f64,
    /// Pointing-rotary stage target
    pub angle: f64,
}

/// Status of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatusReport {
    /// Group name
    pub name: String,
    /// Instrument role
    pub category: String,
    /// Raw controller status code
    pub code: i32,
}

/// Answer to a `status` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Operating state
    pub state: OperatingState,
    /// Controller firmware, when a session exists
    pub firmware: Option<String>,
    /// Per-group status, in topology order; empty without a session
    pub groups: Vec<GroupStatusReport>,
}

/// Top-level controller of the spectrometer.
pub struct FtsStateMachine {
    config: FtsConfig,
    link: Arc<dyn MotionLink>,
    transport: Arc<dyn ConfigTransport>,
    auxiliaries: Vec<Arc<dyn AuxiliaryDevice>>,
    session: Option<MotionSession>,
    state: OperatingState,
    closed: bool,
    abort: AbortFlag,
    last_scan: Option<ScanResult>,
    state_tx: watch::Sender<OperatingState>,
}

impl FtsStateMachine {
    /// Create an uninitialized controller. No hardware is contacted yet.
    pub fn new(
        config: FtsConfig,
        link: Arc<dyn MotionLink>,
        transport: Arc<dyn ConfigTransport>,
    ) -> Self {
        let (state_tx, _) = watch::channel(OperatingState::Uninitialized);
        Self {
            config,
            link,
            transport,
            auxiliaries: Vec::new(),
            session: None,
            state: OperatingState::Uninitialized,
            closed: false,
            abort: AbortFlag::new(),
            last_scan: None,
            state_tx,
        }
    }

    /// Register an auxiliary device (chopper, IR source).
    pub fn with_auxiliary(mut self, device: Arc<dyn AuxiliaryDevice>) -> Self {
        self.auxiliaries.push(device);
        self
    }

    /// Current operating state.
    pub fn state(&self) -> OperatingState {
        self.state
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Receiver that follows every state change.
    pub fn subscribe(&self) -> watch::Receiver<OperatingState> {
        self.state_tx.subscribe()
    }

    /// Flag that aborts a running scan between hardware calls.
    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }

    /// Result of the last successful scan.
    pub fn last_scan(&self) -> Option<&ScanResult> {
        self.last_scan.as_ref()
    }

    /// Active configuration.
    pub fn config(&self) -> &FtsConfig {
        &self.config
    }

    /// Scan request with the configured defaults.
    pub fn default_scan_request(&self) -> ScanRequest {
        ScanRequest::default().with_repeat(self.config.scan.repeat)
    }

    fn check(&self, command: CommandKind) -> FtsResult<()> {
        if self.closed {
            warn!(%command, "rejected: controller closed");
            return Err(FtsError::Closed { command });
        }
        if !self.state.permits(command) {
            warn!(%command, state = %self.state, "rejected: not allowed in current state");
            return Err(FtsError::InvalidCommand {
                command,
                state: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, to: OperatingState, command: CommandKind) {
        let from = self.state;
        self.state = to;
        self.state_tx.send_replace(to);
        info!(%command, %from, %to, "state transition");
    }

    fn session(&self) -> FtsResult<&MotionSession> {
        self.session.as_ref().ok_or_else(|| {
            FtsError::Configuration("no hardware session; initialize first".to_string())
        })
    }

    async fn disable_auxiliaries(&self) -> FtsResult<()> {
        for device in &self.auxiliaries {
            device.disable().await?;
            info!(device = device.name(), "auxiliary disabled");
        }
        Ok(())
    }

    /// Disable auxiliaries and release the session. The session is dropped
    /// even if a step fails; the first failure is returned.
    async fn teardown(&mut self) -> FtsResult<()> {
        let auxiliaries = self.disable_auxiliaries().await;
        let session = match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        };
        auxiliaries.and(session)
    }

    async fn bring_up(&mut self) -> FtsResult<()> {
        if self.session.is_none() {
            let session = MotionSession::establish(
                self.link.clone(),
                self.transport.clone(),
                &self.config,
            )
            .await?;
            self.session = Some(session);
        }
        self.session()?.group_manager().initialize_session().await
    }

    /// Connect if needed, then kill, initialize and home every group.
    pub async fn initialize(&mut self) -> FtsResult<()> {
        self.check(CommandKind::Initialize)?;
        self.abort.reset();

        let outcome = self.bring_up().await;
        self.transition(OperatingState::Initialized, CommandKind::Initialize);
        if let Err(e) = &outcome {
            error!(error = %e, "bring-up incomplete");
        }
        outcome
    }

    /// Move the pointing mirror, absolute or relative.
    pub async fn configure(&mut self, position: PointingPosition, relative: bool) -> FtsResult<()> {
        self.check(CommandKind::Configure)?;
        let session = self.session()?;
        let topology = session.topology();
        let linear = topology.group_for(&GroupCategory::PointingLinear)?.name.clone();
        let rotary = topology.group_for(&GroupCategory::PointingRotary)?.name.clone();
        let groups = session.group_manager();

        if relative {
            groups.move_relative(&linear, position.linear).await?;
            groups.move_relative(&rotary, position.angle).await?;
        } else {
            groups.move_absolute(&linear, position.linear).await?;
            groups.move_absolute(&rotary, position.angle).await?;
        }
        info!(linear = position.linear, angle = position.angle, relative, "pointing configured");

        self.transition(OperatingState::Configured, CommandKind::Configure);
        Ok(())
    }

    /// Run a scan. Range and motion parameters are validated before the
    /// state changes to `Scanning`.
    pub async fn scan(&mut self, request: ScanRequest) -> FtsResult<ScanResult> {
        self.check(CommandKind::Scan)?;
        let orchestrator = self.session()?.scan_orchestrator(
            GatheringSettings::from(&self.config.gathering),
            self.abort.clone(),
        );
        let plan = orchestrator.plan(&request)?;

        self.transition(OperatingState::Scanning, CommandKind::Scan);
        match orchestrator.execute(&plan).await {
            Ok(result) => {
                self.last_scan = Some(result.clone());
                self.transition(OperatingState::Finished, CommandKind::Scan);
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "scan failed; stages left at last commanded position, stop required");
                Err(e)
            }
        }
    }

    /// Abort motion on every group and disable auxiliaries.
    ///
    /// Stopping is a hard reset: the instrument must be initialized again.
    pub async fn stop(&mut self) -> FtsResult<()> {
        // The abort raised by the handle never outlives this command.
        let outcome = self.halt().await;
        self.abort.reset();
        outcome?;

        self.transition(OperatingState::Uninitialized, CommandKind::Stop);
        Ok(())
    }

    async fn halt(&self) -> FtsResult<()> {
        self.check(CommandKind::Stop)?;
        if let Some(session) = &self.session {
            session.group_manager().stop_all().await?;
        }
        self.disable_auxiliaries().await
    }

    /// Disable motion on every group.
    pub async fn pause(&mut self) -> FtsResult<()> {
        self.check(CommandKind::Pause)?;
        self.session()?.group_manager().pause_all().await?;
        self.transition(OperatingState::Paused, CommandKind::Pause);
        Ok(())
    }

    /// Re-enable motion on every group.
    pub async fn resume(&mut self) -> FtsResult<()> {
        self.check(CommandKind::Resume)?;
        self.session()?.group_manager().resume_all().await?;
        self.transition(OperatingState::Configured, CommandKind::Resume);
        Ok(())
    }

    /// Report the state and, with a session, every group's status code.
    pub async fn status(&self) -> FtsResult<StatusReport> {
        self.check(CommandKind::Status)?;
        let Some(session) = &self.session else {
            return Ok(StatusReport {
                state: self.state,
                firmware: None,
                groups: Vec::new(),
            });
        };

        let manager = session.group_manager();
        let mut groups = Vec::new();
        for group in session.topology().groups() {
            let code = manager.status(&group.name).await?;
            groups.push(GroupStatusReport {
                name: group.name.clone(),
                category: group.category.to_string(),
                code: code.code(),
            });
        }
        Ok(StatusReport {
            state: self.state,
            firmware: Some(session.firmware().to_string()),
            groups,
        })
    }

    /// Save the last scan's gathering file and timestamps.
    pub async fn save(&mut self) -> FtsResult<SavedArtifacts> {
        self.check(CommandKind::Save)?;
        let session = self.session()?;
        let result = self
            .last_scan
            .as_ref()
            .ok_or_else(|| FtsError::Configuration("no completed scan to save".to_string()))?;

        ArtifactWriter::new(&self.config.storage)
            .save(
                session.transport().as_ref(),
                &self.config.gathering.remote_file,
                result,
            )
            .await
    }

    /// Tear the session down and connect again. Ends in `Uninitialized`.
    pub async fn reboot(&mut self) -> FtsResult<()> {
        self.check(CommandKind::Reboot)?;
        let teardown = self.teardown().await;
        self.abort.reset();
        self.last_scan = None;
        self.transition(OperatingState::Uninitialized, CommandKind::Reboot);
        teardown?;

        let session =
            MotionSession::establish(self.link.clone(), self.transport.clone(), &self.config)
                .await?;
        self.session = Some(session);
        Ok(())
    }

    /// Release the hardware session. Every later command fails.
    pub async fn close(&mut self) -> FtsResult<()> {
        self.check(CommandKind::Close)?;
        let teardown = self.teardown().await;
        self.closed = true;
        info!(state = %self.state, "controller closed");
        teardown
    }
}
