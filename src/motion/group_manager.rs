//! Named-group motion operations.
//!
//! [`MotionGroupManager`] turns "home GROUP3" into MotionLink calls and decides
//! what the controller's result codes mean. Two classes of action exist:
//!
//! - **Strict** actions (`kill`, `initialize`, `home`, moves, `status`): any
//!   non-zero result is a [`FtsError::HardwareAction`].
//! - **Motion-state** actions (`stop`, `disable`, `enable`): the controller
//!   answers -22 when the transition does not apply (stopping a group that is
//!   not moving). That answer is reported as [`ActionOutcome::NotApplicable`]
//!   so routine shutdown does not fail on an already-stopped group.

use crate::error::{FtsError, FtsResult};
use crate::hardware::capabilities::{GroupMethod, MotionLink, MoveMode};
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Raw group status code reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupStatusCode(pub i32);

impl GroupStatusCode {
    /// Homing succeeded; the group is referenced and ready.
    pub const READY_FROM_HOMING: GroupStatusCode = GroupStatusCode(11);

    /// Numeric code.
    pub fn code(self) -> i32 {
        self.0
    }

    /// True only for [`GroupStatusCode::READY_FROM_HOMING`].
    pub fn is_ready_from_homing(self) -> bool {
        self == Self::READY_FROM_HOMING
    }
}

impl fmt::Display for GroupStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a motion-state action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The controller performed the transition.
    Applied,
    /// The transition does not apply in the group's current state (code -22).
    NotApplicable,
}

/// Motion operations on the groups of one topology.
#[derive(Clone)]
pub struct MotionGroupManager {
    link: Arc<dyn MotionLink>,
    topology: Arc<Topology>,
}

impl MotionGroupManager {
    /// Create a manager over `link` for the groups in `topology`.
    pub fn new(link: Arc<dyn MotionLink>, topology: Arc<Topology>) -> Self {
        Self { link, topology }
    }

    /// Topology the manager validates group names against.
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    async fn strict_action(&self, group: &str, method: GroupMethod) -> FtsResult<()> {
        self.topology.lookup_group(group)?;
        self.link
            .group_action(group, method)
            .await
            .map_err(|fault| FtsError::hardware(group, method.api_name(), fault))
    }

    async fn motion_state_action(
        &self,
        group: &str,
        method: GroupMethod,
    ) -> FtsResult<ActionOutcome> {
        debug_assert!(method.is_motion_state());
        self.topology.lookup_group(group)?;
        match self.link.group_action(group, method).await {
            Ok(()) => Ok(ActionOutcome::Applied),
            Err(fault) if fault.is_not_allowed_action() => {
                debug!(group, %method, "not applicable in current group state");
                Ok(ActionOutcome::NotApplicable)
            }
            Err(fault) => Err(FtsError::hardware(group, method.api_name(), fault)),
        }
    }

    /// Kill a group (de-energize, status "not initialized").
    pub async fn kill(&self, group: &str) -> FtsResult<()> {
        self.strict_action(group, GroupMethod::Kill).await?;
        debug!(group, "group killed");
        Ok(())
    }

    /// Initialize a group, optionally with encoder calibration, then home it
    /// if `homing` is set and initialization succeeded.
    pub async fn initialize(&self, group: &str, with_encoder: bool, homing: bool) -> FtsResult<()> {
        let method = if with_encoder {
            GroupMethod::InitializeWithEncoderCalibration
        } else {
            GroupMethod::Initialize
        };
        self.strict_action(group, method).await?;
        debug!(group, with_encoder, "group initialized");

        if homing {
            self.home(group).await?;
        }
        Ok(())
    }

    /// Run the reference search of a group.
    pub async fn home(&self, group: &str) -> FtsResult<()> {
        self.strict_action(group, GroupMethod::HomeSearch).await?;
        debug!(group, "group homed");
        Ok(())
    }

    async fn move_group(&self, group: &str, value: f64, mode: MoveMode) -> FtsResult<()> {
        self.topology.lookup_group(group)?;
        self.link
            .move_group(group, &[value], mode)
            .await
            .map_err(|fault| FtsError::hardware(group, mode.api_name(), fault))
    }

    /// Move the group's axis to `value`.
    pub async fn move_absolute(&self, group: &str, value: f64) -> FtsResult<()> {
        self.move_group(group, value, MoveMode::Absolute).await
    }

    /// Move the group's axis by `value`.
    pub async fn move_relative(&self, group: &str, value: f64) -> FtsResult<()> {
        self.move_group(group, value, MoveMode::Relative).await
    }

    /// Current status code of a group.
    pub async fn status(&self, group: &str) -> FtsResult<GroupStatusCode> {
        self.topology.lookup_group(group)?;
        self.link
            .group_status(group)
            .await
            .map(GroupStatusCode)
            .map_err(|fault| FtsError::hardware(group, "GroupStatusGet", fault))
    }

    /// Last commanded position of a group.
    pub async fn setpoint_position(&self, group: &str) -> FtsResult<f64> {
        self.topology.lookup_group(group)?;
        self.link
            .setpoint_position(group)
            .await
            .map_err(|fault| FtsError::hardware(group, "GroupPositionSetpointGet", fault))
    }

    /// Abort the move in progress.
    pub async fn stop(&self, group: &str) -> FtsResult<ActionOutcome> {
        self.motion_state_action(group, GroupMethod::MoveAbort).await
    }

    /// Disable motion on a group.
    pub async fn disable(&self, group: &str) -> FtsResult<ActionOutcome> {
        self.motion_state_action(group, GroupMethod::MotionDisable)
            .await
    }

    /// Re-enable motion on a group.
    pub async fn enable(&self, group: &str) -> FtsResult<ActionOutcome> {
        self.motion_state_action(group, GroupMethod::MotionEnable)
            .await
    }

    /// Stop every group in topology order. The first failure aborts the rest.
    pub async fn stop_all(&self) -> FtsResult<()> {
        for group in self.topology.groups() {
            self.stop(&group.name).await?;
        }
        Ok(())
    }

    /// Disable every group in topology order. The first failure aborts the rest.
    pub async fn pause_all(&self) -> FtsResult<()> {
        for group in self.topology.groups() {
            self.disable(&group.name).await?;
        }
        Ok(())
    }

    /// Enable every group in topology order. The first failure aborts the rest.
    pub async fn resume_all(&self) -> FtsResult<()> {
        for group in self.topology.groups() {
            self.enable(&group.name).await?;
        }
        Ok(())
    }

    /// Bring every group from an unknown state to homed and ready.
    ///
    /// Each group is killed first, then initialized with encoder calibration
    /// and homed. Stops at the first failing group; later groups are not touched.
    #[instrument(skip(self))]
    pub async fn initialize_session(&self) -> FtsResult<()> {
        for group in self.topology.groups() {
            self.kill(&group.name).await?;
            self.initialize(&group.name, true, true).await?;
            info!(group = %group.name, category = %group.category, "group ready");
        }
        Ok(())
    }
}
