//! Mock Hardware Implementations
//!
//! Simulated collaborators for running the controller without an instrument.
//! All mocks use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockMotionLink` - stateful simulation of the XPS group state machine
//! - `MockTransport` - in-memory controller file tree
//! - `MockAuxiliary` - switchable chopper / IR source
//!
//! # Simulated Group Status Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0    | Not initialized |
//! | 7    | Not initialized after kill |
//! | 42   | Not referenced (initialized, homing required) |
//! | 11   | Ready from homing |
//! | 12   | Ready from motion |
//! | 20   | Disabled |
//! | 44   | Moving |
//!
//! Actions that do not apply in the current status answer -22, like the real
//! controller.

use crate::error::{FtsError, FtsResult};
use crate::hardware::capabilities::{
    AuxiliaryDevice, ConfigTransport, GatheringChannel, GroupMethod, LinkFault, LinkResult,
    MotionLink, MoveMode, SGammaProfile,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Status: not initialized.
pub const STATUS_NOT_INITIALIZED: i32 = 0;
/// Status: not initialized after kill.
pub const STATUS_KILLED: i32 = 7;
/// Status: ready after homing.
pub const STATUS_READY_FROM_HOMING: i32 = 11;
/// Status: ready after a move.
pub const STATUS_READY_FROM_MOTION: i32 = 12;
/// Status: motion disabled.
pub const STATUS_DISABLED: i32 = 20;
/// Status: initialized, homing required.
pub const STATUS_NOT_REFERENCED: i32 = 42;
/// Status: move in progress.
pub const STATUS_MOVING: i32 = 44;

/// Description of the three-group spectrometer used by the simulation.
pub const SAMPLE_SYSTEM_INI: &str = "\
[GENERAL]
BootScriptFileName =
BootScriptArguments =

[GROUPS]
PointingLinear = GROUP1
PointingRotary = GROUP2
MovingLinear = GROUP3
XYInUse =

[GROUP1]
PositionerInUse = Pos

[GROUP2]
PositionerInUse = Pos

[GROUP3]
PositionerInUse = Pos

[GROUP1.Pos]
PlugNumber = 1
StageName = ILS100CC

[GROUP2.Pos]
PlugNumber = 2
StageName = URS75BCC

[GROUP3.Pos]
PlugNumber = 3
StageName = ILS250CC
";

/// Remote location of the simulated gathering buffer.
pub const SAMPLE_GATHERING_PATH: &str = "Public/Gathering.dat";

const SAMPLE_GATHERING: &str = "\
GROUP3.Pos.CurrentPosition\tGROUP3.Pos.CurrentVelocity\tGROUP3.Pos.CurrentAcceleration
0.000000\t0.000000\t0.000000
0.250000\t12.500000\t400.000000
";

// =============================================================================
// MockMotionLink - Simulated XPS Controller
// =============================================================================

/// MotionLink operation kinds, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    /// `open`
    Open,
    /// `login`
    Login,
    /// `firmware_version`
    FirmwareVersion,
    /// `close`
    Close,
    /// `group_action` with the given method
    GroupAction(GroupMethod),
    /// `move_group`
    Move,
    /// `group_status`
    GroupStatus,
    /// `setpoint_position`
    SetpointPosition,
    /// `gathering_configure`
    GatheringConfigure,
    /// `gathering_run`
    GatheringRun,
    /// `gathering_stop`
    GatheringStop,
    /// `gathering_stop_and_save`
    GatheringStopAndSave,
    /// `positioner_max_velocity_acceleration`
    MaxVelocityAcceleration,
    /// `positioner_user_travel_limits`
    TravelLimits,
    /// `sgamma_parameters`
    SGammaGet,
    /// `set_sgamma_parameters`
    SGammaSet,
}

/// One recorded MotionLink call.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    /// Connection opened
    Open {
        /// Host
        host: String,
        /// Port
        port: u16,
    },
    /// Login
    Login {
        /// User
        username: String,
    },
    /// Firmware query
    FirmwareVersion,
    /// Connection closed
    Close,
    /// Per-group action
    GroupAction {
        /// Group
        group: String,
        /// Action
        method: GroupMethod,
    },
    /// Group move
    Move {
        /// Group
        group: String,
        /// Per-axis targets
        values: Vec<f64>,
        /// Absolute or relative
        mode: MoveMode,
    },
    /// Status query
    GroupStatus {
        /// Group
        group: String,
    },
    /// Setpoint query
    SetpointPosition {
        /// Group
        group: String,
    },
    /// Gathering channel selection
    GatheringConfigure {
        /// Channel names
        channels: Vec<String>,
    },
    /// Gathering start
    GatheringRun {
        /// Samples
        dataset_count: u32,
        /// Servo cycles per sample
        interval: u32,
    },
    /// Gathering stop
    GatheringStop,
    /// Gathering stop and save
    GatheringStopAndSave,
    /// Velocity/acceleration limit query
    MaxVelocityAcceleration {
        /// Positioner
        positioner: String,
    },
    /// Travel limit query
    TravelLimits {
        /// Positioner
        positioner: String,
    },
    /// SGamma read
    SGammaGet {
        /// Positioner
        positioner: String,
    },
    /// SGamma write
    SGammaSet {
        /// Positioner
        positioner: String,
        /// New profile
        profile: SGammaProfile,
    },
}

impl LinkCall {
    fn op(&self) -> MockOp {
        match self {
            LinkCall::Open { .. } => MockOp::Open,
            LinkCall::Login { .. } => MockOp::Login,
            LinkCall::FirmwareVersion => MockOp::FirmwareVersion,
            LinkCall::Close => MockOp::Close,
            LinkCall::GroupAction { method, .. } => MockOp::GroupAction(*method),
            LinkCall::Move { .. } => MockOp::Move,
            LinkCall::GroupStatus { .. } => MockOp::GroupStatus,
            LinkCall::SetpointPosition { .. } => MockOp::SetpointPosition,
            LinkCall::GatheringConfigure { .. } => MockOp::GatheringConfigure,
            LinkCall::GatheringRun { .. } => MockOp::GatheringRun,
            LinkCall::GatheringStop => MockOp::GatheringStop,
            LinkCall::GatheringStopAndSave => MockOp::GatheringStopAndSave,
            LinkCall::MaxVelocityAcceleration { .. } => MockOp::MaxVelocityAcceleration,
            LinkCall::TravelLimits { .. } => MockOp::TravelLimits,
            LinkCall::SGammaGet { .. } => MockOp::SGammaGet,
            LinkCall::SGammaSet { .. } => MockOp::SGammaSet,
        }
    }

    /// Group or positioner the call addressed, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            LinkCall::GroupAction { group, .. }
            | LinkCall::Move { group, .. }
            | LinkCall::GroupStatus { group }
            | LinkCall::SetpointPosition { group } => Some(group.as_str()),
            LinkCall::MaxVelocityAcceleration { positioner }
            | LinkCall::TravelLimits { positioner }
            | LinkCall::SGammaGet { positioner }
            | LinkCall::SGammaSet { positioner, .. } => Some(positioner.as_str()),
            _ => None,
        }
    }
}

struct FaultRule {
    op: MockOp,
    target: Option<String>,
    skip: usize,
    fault: LinkFault,
}

struct MockGroup {
    status: i32,
    setpoint: f64,
    positioner: String,
}

struct MockStage {
    min_target: f64,
    max_target: f64,
    max_velocity: f64,
    max_acceleration: f64,
    sgamma: SGammaProfile,
}

#[derive(Default)]
struct MockState {
    open: bool,
    groups: HashMap<String, MockGroup>,
    stages: HashMap<String, MockStage>,
    gathering_channels: Vec<String>,
    gathering_running: bool,
    calls: Vec<LinkCall>,
    faults: Vec<FaultRule>,
}

impl MockState {
    /// Record the call and fire the first matching injected fault.
    fn record(&mut self, call: LinkCall) -> LinkResult<()> {
        let op = call.op();
        let target = call.target().map(str::to_string);
        self.calls.push(call);

        let hit = self.faults.iter_mut().position(|rule| {
            let matches = rule.op == op
                && (rule.target.is_none() || rule.target.as_deref() == target.as_deref());
            if matches && rule.skip > 0 {
                rule.skip -= 1;
                return false;
            }
            matches
        });
        match hit {
            Some(index) => Err(self.faults.remove(index).fault),
            None => Ok(()),
        }
    }

    fn group_mut(&mut self, group: &str) -> LinkResult<&mut MockGroup> {
        self.groups.get_mut(group).ok_or_else(|| {
            LinkFault::new(-19, "GroupName doesn't exist or unknown command")
        })
    }

    fn stage(&self, positioner: &str) -> LinkResult<&MockStage> {
        self.stages.get(positioner).ok_or_else(|| {
            LinkFault::new(-18, "Positioner Name doesn't exist or unknown command")
        })
    }
}

fn not_allowed() -> LinkFault {
    LinkFault::new(LinkFault::NOT_ALLOWED_ACTION, "Not allowed action")
}

/// Simulated XPS controller.
///
/// Groups follow the controller's status rules closely enough to exercise
/// bring-up, scanning and shutdown paths. Every call is logged and can be
/// made to fail with [`MockMotionLink::inject_fault`].
///
/// # Example
///
/// ```rust,ignore
/// let link = MockMotionLink::fts_default();
/// link.group_action("GROUP3", GroupMethod::Kill).await?;
/// assert_eq!(link.status_of("GROUP3").await, Some(7));
/// ```
pub struct MockMotionLink {
    state: Mutex<MockState>,
    move_delay: Duration,
    firmware: String,
}

impl MockMotionLink {
    /// Controller without groups.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            move_delay: Duration::ZERO,
            firmware: "XPS-D-N13019".to_string(),
        }
    }

    /// Three single-axis groups matching [`SAMPLE_SYSTEM_INI`], all not initialized.
    pub fn fts_default() -> Self {
        Self::new()
            .with_group("GROUP1", "GROUP1.Pos", -50.0, 50.0)
            .with_group("GROUP2", "GROUP2.Pos", -180.0, 180.0)
            .with_group("GROUP3", "GROUP3.Pos", -125.0, 125.0)
    }

    /// Add a single-axis group with the given travel limits.
    pub fn with_group(
        mut self,
        group: &str,
        positioner: &str,
        min_target: f64,
        max_target: f64,
    ) -> Self {
        {
            let state = self.state.get_mut();
            state.groups.insert(
                group.to_string(),
                MockGroup {
                    status: STATUS_NOT_INITIALIZED,
                    setpoint: 0.0,
                    positioner: positioner.to_string(),
                },
            );
            state.stages.insert(
                positioner.to_string(),
                MockStage {
                    min_target,
                    max_target,
                    max_velocity: 100.0,
                    max_acceleration: 400.0,
                    sgamma: SGammaProfile {
                        velocity: 20.0,
                        acceleration: 80.0,
                        min_jerk_time: 0.005,
                        max_jerk_time: 0.05,
                    },
                },
            );
        }
        self
    }

    /// Make every move take `delay`, with the group reporting "moving" meanwhile.
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    /// Fail the `skip + 1`-th matching call with `fault`, once.
    ///
    /// `target` restricts the rule to one group or positioner.
    pub async fn inject_fault(&self, op: MockOp, target: Option<&str>, skip: usize, fault: LinkFault) {
        self.state.lock().await.faults.push(FaultRule {
            op,
            target: target.map(str::to_string),
            skip,
            fault,
        });
    }

    /// Force a group into a status code.
    pub async fn set_status(&self, group: &str, status: i32) {
        if let Some(g) = self.state.lock().await.groups.get_mut(group) {
            g.status = status;
        }
    }

    /// Current status code of a group.
    pub async fn status_of(&self, group: &str) -> Option<i32> {
        self.state.lock().await.groups.get(group).map(|g| g.status)
    }

    /// Current setpoint of a group.
    pub async fn setpoint_of(&self, group: &str) -> Option<f64> {
        self.state.lock().await.groups.get(group).map(|g| g.setpoint)
    }

    /// Current SGamma profile of a positioner.
    pub async fn sgamma_of(&self, positioner: &str) -> Option<SGammaProfile> {
        self.state
            .lock()
            .await
            .stages
            .get(positioner)
            .map(|s| s.sgamma)
    }

    /// Whether the link is open.
    pub async fn is_open(&self) -> bool {
        self.state.lock().await.open
    }

    /// Whether a gathering run is in progress.
    pub async fn is_gathering(&self) -> bool {
        self.state.lock().await.gathering_running
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<LinkCall> {
        self.state.lock().await.calls.clone()
    }

    /// Forget the call log.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// First-axis targets of every move sent to `group`.
    pub async fn moves_for(&self, group: &str) -> Vec<f64> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                LinkCall::Move { group: g, values, .. } if g == group => values.first().copied(),
                _ => None,
            })
            .collect()
    }

    /// Group actions sent to `group`, in order.
    pub async fn actions_for(&self, group: &str) -> Vec<GroupMethod> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                LinkCall::GroupAction { group: g, method } if g == group => Some(*method),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockMotionLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MotionLink for MockMotionLink {
    async fn open(&self, host: &str, port: u16, _timeout: Duration) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::Open {
            host: host.to_string(),
            port,
        })?;
        state.open = true;
        Ok(())
    }

    async fn login(&self, username: &str, _password: &str) -> LinkResult<()> {
        self.state.lock().await.record(LinkCall::Login {
            username: username.to_string(),
        })
    }

    async fn firmware_version(&self) -> LinkResult<String> {
        self.state.lock().await.record(LinkCall::FirmwareVersion)?;
        Ok(self.firmware.clone())
    }

    async fn close(&self) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::Close)?;
        state.open = false;
        Ok(())
    }

    async fn group_action(&self, group: &str, method: GroupMethod) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::GroupAction {
            group: group.to_string(),
            method,
        })?;

        let home_position = {
            let positioner = state.group_mut(group)?.positioner.clone();
            let stage = state.stage(&positioner)?;
            0.0_f64.clamp(stage.min_target, stage.max_target)
        };
        let g = state.group_mut(group)?;
        let next = match (method, g.status) {
            (GroupMethod::Kill, _) => STATUS_KILLED,
            (
                GroupMethod::Initialize | GroupMethod::InitializeWithEncoderCalibration,
                STATUS_NOT_INITIALIZED | STATUS_KILLED,
            ) => STATUS_NOT_REFERENCED,
            (
                GroupMethod::HomeSearch,
                STATUS_NOT_REFERENCED | STATUS_READY_FROM_HOMING | STATUS_READY_FROM_MOTION,
            ) => {
                g.setpoint = home_position;
                STATUS_READY_FROM_HOMING
            }
            (GroupMethod::MoveAbort, STATUS_MOVING) => STATUS_READY_FROM_MOTION,
            (
                GroupMethod::MotionDisable,
                STATUS_READY_FROM_HOMING | STATUS_READY_FROM_MOTION,
            ) => STATUS_DISABLED,
            (GroupMethod::MotionEnable, STATUS_DISABLED) => STATUS_READY_FROM_MOTION,
            _ => return Err(not_allowed()),
        };
        debug!(group, %method, from = g.status, to = next, "mock group action");
        g.status = next;
        Ok(())
    }

    async fn move_group(
        &self,
        group: &str,
        axis_values: &[f64],
        mode: MoveMode,
    ) -> LinkResult<()> {
        let target = {
            let mut state = self.state.lock().await;
            state.record(LinkCall::Move {
                group: group.to_string(),
                values: axis_values.to_vec(),
                mode,
            })?;

            let (status, setpoint, positioner) = {
                let g = state.group_mut(group)?;
                (g.status, g.setpoint, g.positioner.clone())
            };
            if !matches!(status, STATUS_READY_FROM_HOMING | STATUS_READY_FROM_MOTION) {
                return Err(not_allowed());
            }
            let value = *axis_values
                .first()
                .ok_or_else(|| LinkFault::new(-17, "Parameter out of range or incorrect"))?;
            let target = match mode {
                MoveMode::Absolute => value,
                MoveMode::Relative => setpoint + value,
            };
            let stage = state.stage(&positioner)?;
            if target < stage.min_target || target > stage.max_target {
                return Err(LinkFault::new(-17, "Parameter out of range or incorrect"));
            }
            let g = state.group_mut(group)?;
            g.setpoint = target;
            if self.move_delay.is_zero() {
                g.status = STATUS_READY_FROM_MOTION;
                return Ok(());
            }
            g.status = STATUS_MOVING;
            target
        };

        sleep(self.move_delay).await;

        let mut state = self.state.lock().await;
        let g = state.group_mut(group)?;
        if g.status == STATUS_MOVING {
            g.status = STATUS_READY_FROM_MOTION;
        }
        debug!(group, target, "mock move complete");
        Ok(())
    }

    async fn group_status(&self, group: &str) -> LinkResult<i32> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::GroupStatus {
            group: group.to_string(),
        })?;
        Ok(state.group_mut(group)?.status)
    }

    async fn setpoint_position(&self, group: &str) -> LinkResult<f64> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::SetpointPosition {
            group: group.to_string(),
        })?;
        Ok(state.group_mut(group)?.setpoint)
    }

    async fn gathering_configure(&self, channels: &[GatheringChannel]) -> LinkResult<()> {
        let names: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        let mut state = self.state.lock().await;
        state.record(LinkCall::GatheringConfigure {
            channels: names.clone(),
        })?;
        state.gathering_channels = names;
        Ok(())
    }

    async fn gathering_run(&self, dataset_count: u32, interval: u32) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::GatheringRun {
            dataset_count,
            interval,
        })?;
        if state.gathering_channels.is_empty() {
            return Err(LinkFault::new(-60, "Gathering not configured"));
        }
        state.gathering_running = true;
        Ok(())
    }

    async fn gathering_stop(&self) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::GatheringStop)?;
        state.gathering_running = false;
        Ok(())
    }

    async fn gathering_stop_and_save(&self) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::GatheringStopAndSave)?;
        state.gathering_running = false;
        Ok(())
    }

    async fn positioner_max_velocity_acceleration(
        &self,
        positioner: &str,
    ) -> LinkResult<(f64, f64)> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::MaxVelocityAcceleration {
            positioner: positioner.to_string(),
        })?;
        let stage = state.stage(positioner)?;
        Ok((stage.max_velocity, stage.max_acceleration))
    }

    async fn positioner_user_travel_limits(&self, positioner: &str) -> LinkResult<(f64, f64)> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::TravelLimits {
            positioner: positioner.to_string(),
        })?;
        let stage = state.stage(positioner)?;
        Ok((stage.min_target, stage.max_target))
    }

    async fn sgamma_parameters(&self, positioner: &str) -> LinkResult<SGammaProfile> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::SGammaGet {
            positioner: positioner.to_string(),
        })?;
        Ok(state.stage(positioner)?.sgamma)
    }

    async fn set_sgamma_parameters(
        &self,
        positioner: &str,
        profile: &SGammaProfile,
    ) -> LinkResult<()> {
        let mut state = self.state.lock().await;
        state.record(LinkCall::SGammaSet {
            positioner: positioner.to_string(),
            profile: *profile,
        })?;
        state.stage(positioner)?;
        if let Some(stage) = state.stages.get_mut(positioner) {
            stage.sgamma = *profile;
        }
        Ok(())
    }
}

// =============================================================================
// MockTransport - In-Memory Controller File Tree
// =============================================================================

/// In-memory [`ConfigTransport`].
pub struct MockTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    unreachable: AtomicBool,
}

impl MockTransport {
    /// Empty file tree.
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    /// File tree holding [`SAMPLE_SYSTEM_INI`] and a short gathering file.
    pub fn with_sample_description() -> Self {
        let mut transport = Self::new();
        let files = transport.files.get_mut();
        files.insert(
            "Config/system.ini".to_string(),
            SAMPLE_SYSTEM_INI.as_bytes().to_vec(),
        );
        files.insert(
            SAMPLE_GATHERING_PATH.to_string(),
            SAMPLE_GATHERING.as_bytes().to_vec(),
        );
        transport
    }

    /// Store a text file.
    pub async fn put_text(&self, remote_path: &str, text: &str) {
        self.files
            .lock()
            .await
            .insert(remote_path.to_string(), text.as_bytes().to_vec());
    }

    /// Contents of a stored file.
    pub async fn file(&self, remote_path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(remote_path).cloned()
    }

    /// Make every call fail as if the file server were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    async fn read(&self, remote_path: &str) -> FtsResult<Vec<u8>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(FtsError::Transport("file server unreachable".into()));
        }
        self.files
            .lock()
            .await
            .get(remote_path)
            .cloned()
            .ok_or_else(|| FtsError::Transport(format!("no such remote file '{remote_path}'")))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigTransport for MockTransport {
    async fn fetch_text(&self, remote_path: &str) -> FtsResult<Vec<String>> {
        let bytes = self.read(remote_path).await?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }

    async fn save_file(&self, remote_path: &str, local_path: &Path) -> FtsResult<()> {
        let bytes = self.read(remote_path).await?;
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> FtsResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(FtsError::Transport("file server unreachable".into()));
        }
        let bytes = tokio::fs::read(local_path).await?;
        self.files
            .lock()
            .await
            .insert(remote_path.to_string(), bytes);
        Ok(())
    }
}

// =============================================================================
// MockAuxiliary - Switchable Device
// =============================================================================

/// Simulated chopper or IR source.
pub struct MockAuxiliary {
    name: String,
    enabled: AtomicBool,
    fail_disable: AtomicBool,
}

impl MockAuxiliary {
    /// New device, switched off.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: AtomicBool::new(false),
            fail_disable: AtomicBool::new(false),
        }
    }

    /// Make `disable` fail.
    pub fn set_fail_disable(&self, fail: bool) {
        self.fail_disable.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuxiliaryDevice for MockAuxiliary {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enable(&self) -> FtsResult<()> {
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disable(&self) -> FtsResult<()> {
        if self.fail_disable.load(Ordering::SeqCst) {
            return Err(FtsError::HardwareAction {
                target: self.name.clone(),
                action: "disable".into(),
                code: -1,
                message: "device not responding".into(),
            });
        }
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_enabled(&self) -> FtsResult<bool> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bring_up_sequence_reaches_ready() {
        let link = MockMotionLink::fts_default();
        link.group_action("GROUP3", GroupMethod::Kill).await.unwrap();
        assert_eq!(link.status_of("GROUP3").await, Some(STATUS_KILLED));
        link.group_action("GROUP3", GroupMethod::InitializeWithEncoderCalibration)
            .await
            .unwrap();
        assert_eq!(link.status_of("GROUP3").await, Some(STATUS_NOT_REFERENCED));
        link.group_action("GROUP3", GroupMethod::HomeSearch)
            .await
            .unwrap();
        assert_eq!(
            link.group_status("GROUP3").await.unwrap(),
            STATUS_READY_FROM_HOMING
        );
    }

    #[tokio::test]
    async fn abort_on_idle_group_is_not_allowed() {
        let link = MockMotionLink::fts_default();
        let fault = link
            .group_action("GROUP1", GroupMethod::MoveAbort)
            .await
            .unwrap_err();
        assert!(fault.is_not_allowed_action());
    }

    #[tokio::test]
    async fn move_requires_ready_group_and_respects_limits() {
        let link = MockMotionLink::fts_default();
        assert!(link
            .move_group("GROUP3", &[10.0], MoveMode::Absolute)
            .await
            .unwrap_err()
            .is_not_allowed_action());

        link.set_status("GROUP3", STATUS_READY_FROM_HOMING).await;
        link.move_group("GROUP3", &[10.0], MoveMode::Absolute)
            .await
            .unwrap();
        link.move_group("GROUP3", &[5.0], MoveMode::Relative)
            .await
            .unwrap();
        assert_eq!(link.setpoint_of("GROUP3").await, Some(15.0));

        let fault = link
            .move_group("GROUP3", &[500.0], MoveMode::Absolute)
            .await
            .unwrap_err();
        assert_eq!(fault.code, -17);
        assert_eq!(link.moves_for("GROUP3").await, vec![10.0, 5.0, 500.0]);
    }

    #[tokio::test]
    async fn injected_fault_fires_once_after_skips() {
        let link = MockMotionLink::fts_default();
        link.inject_fault(MockOp::GroupStatus, Some("GROUP2"), 1, LinkFault::timeout("read"))
            .await;

        assert!(link.group_status("GROUP2").await.is_ok());
        assert!(link.group_status("GROUP1").await.is_ok());
        assert_eq!(
            link.group_status("GROUP2").await.unwrap_err().code,
            LinkFault::TIMEOUT
        );
        assert!(link.group_status("GROUP2").await.is_ok());
    }

    #[tokio::test]
    async fn delayed_move_reports_moving_until_done() {
        let link = std::sync::Arc::new(
            MockMotionLink::fts_default().with_move_delay(Duration::from_millis(100)),
        );
        link.set_status("GROUP3", STATUS_READY_FROM_HOMING).await;

        let mover = {
            let link = link.clone();
            tokio::spawn(async move { link.move_group("GROUP3", &[20.0], MoveMode::Absolute).await })
        };
        sleep(Duration::from_millis(30)).await;
        assert_eq!(link.status_of("GROUP3").await, Some(STATUS_MOVING));

        mover.await.unwrap().unwrap();
        assert_eq!(link.status_of("GROUP3").await, Some(STATUS_READY_FROM_MOTION));
    }

    #[tokio::test]
    async fn transport_serves_sample_description() {
        let transport = MockTransport::with_sample_description();
        let lines = transport.fetch_text("Config/system.ini").await.unwrap();
        assert!(lines.iter().any(|l| l == "MovingLinear = GROUP3"));

        transport.set_unreachable(true);
        assert!(transport.fetch_text("Config/system.ini").await.is_err());
    }

    #[tokio::test]
    async fn auxiliary_switches() {
        let chopper = MockAuxiliary::new("chopper");
        chopper.enable().await.unwrap();
        assert!(chopper.is_enabled().await.unwrap());
        chopper.set_fail_disable(true);
        assert!(chopper.disable().await.is_err());
        assert!(chopper.is_enabled().await.unwrap());
    }
}
