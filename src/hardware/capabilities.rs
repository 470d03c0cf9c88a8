//! Hardware Capabilities
//!
//! The controller core never talks to a socket or a file server directly. It
//! consumes three small capability traits instead:
//!
//! - [`MotionLink`] - command execution against the multi-axis motion controller
//! - [`ConfigTransport`] - reading the topology description and moving data files
//! - [`AuxiliaryDevice`] - the optical chopper and infrared source
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Takes `&self`; implementations keep connection state behind a `tokio::sync::Mutex`
//!
//! `MotionLink` calls report failures as a raw [`LinkFault`] (result code plus
//! device message). Interpreting the code is left to
//! [`MotionGroupManager`](crate::motion::MotionGroupManager), which is the only
//! place that knows which codes are harmless for which action.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn home_scanner(link: &dyn MotionLink) -> LinkResult<i32> {
//!     link.group_action("GROUP3", GroupMethod::HomeSearch).await?;
//!     link.group_status("GROUP3").await
//! }
//! ```

use crate::error::FtsResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Failed MotionLink call: the controller result code and its error string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("controller returned {code}: {message}")]
pub struct LinkFault {
    /// Raw result code (always non-zero)
    pub code: i32,
    /// Device-reported error string
    pub message: String,
}

impl LinkFault {
    /// Action not applicable in the group's current hardware state.
    pub const NOT_ALLOWED_ACTION: i32 = -22;
    /// Socket or reply-format failure on the link itself.
    pub const COMMUNICATION: i32 = -1;
    /// Send or receive did not complete within the link timeout.
    pub const TIMEOUT: i32 = -2;

    /// Create a fault with the given code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Link-level communication failure.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::new(Self::COMMUNICATION, message)
    }

    /// Link-level timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(Self::TIMEOUT, message)
    }

    /// True when the controller reported "not allowed action".
    pub fn is_not_allowed_action(&self) -> bool {
        self.code == Self::NOT_ALLOWED_ACTION
    }
}

/// Result of a MotionLink call.
pub type LinkResult<T> = Result<T, LinkFault>;

/// Closed set of per-group actions the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupMethod {
    /// De-energize the group and put it in the killed state
    Kill,
    /// Initialize without encoder calibration
    Initialize,
    /// Initialize with encoder calibration
    InitializeWithEncoderCalibration,
    /// Reference search
    HomeSearch,
    /// Abort the move in progress (group "stop")
    MoveAbort,
    /// Disable motion, keeping the group referenced (group "pause")
    MotionDisable,
    /// Re-enable motion after a disable (group "resume")
    MotionEnable,
}

impl GroupMethod {
    /// Controller function name.
    pub fn api_name(&self) -> &'static str {
        match self {
            GroupMethod::Kill => "GroupKill",
            GroupMethod::Initialize => "GroupInitialize",
            GroupMethod::InitializeWithEncoderCalibration => {
                "GroupInitializeWithEncoderCalibration"
            }
            GroupMethod::HomeSearch => "GroupHomeSearch",
            GroupMethod::MoveAbort => "GroupMoveAbort",
            GroupMethod::MotionDisable => "GroupMotionDisable",
            GroupMethod::MotionEnable => "GroupMotionEnable",
        }
    }

    /// Actions that only change the motion state of an already initialized group.
    ///
    /// For these the controller answers -22 when the transition does not apply.
    pub fn is_motion_state(&self) -> bool {
        matches!(
            self,
            GroupMethod::MoveAbort | GroupMethod::MotionDisable | GroupMethod::MotionEnable
        )
    }
}

impl fmt::Display for GroupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Absolute or relative group move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveMode {
    /// Target is an absolute position
    Absolute,
    /// Target is a displacement from the current setpoint
    Relative,
}

impl MoveMode {
    /// Controller function name.
    pub fn api_name(&self) -> &'static str {
        match self {
            MoveMode::Absolute => "GroupMoveAbsolute",
            MoveMode::Relative => "GroupMoveRelative",
        }
    }
}

/// Quantity recorded by a gathering channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatheringQuantity {
    /// Encoder position
    CurrentPosition,
    /// Encoder velocity
    CurrentVelocity,
    /// Encoder acceleration
    CurrentAcceleration,
}

/// One gathering channel: a positioner plus the quantity to sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatheringChannel {
    /// Full positioner name (`GROUP.POSITIONER`)
    pub positioner: String,
    /// Sampled quantity
    pub quantity: GatheringQuantity,
}

impl GatheringChannel {
    /// Position, velocity and acceleration of one positioner.
    pub fn kinematics(positioner: &str) -> Vec<GatheringChannel> {
        [
            GatheringQuantity::CurrentPosition,
            GatheringQuantity::CurrentVelocity,
            GatheringQuantity::CurrentAcceleration,
        ]
        .into_iter()
        .map(|quantity| GatheringChannel {
            positioner: positioner.to_string(),
            quantity,
        })
        .collect()
    }
}

impl fmt::Display for GatheringChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quantity = match self.quantity {
            GatheringQuantity::CurrentPosition => "CurrentPosition",
            GatheringQuantity::CurrentVelocity => "CurrentVelocity",
            GatheringQuantity::CurrentAcceleration => "CurrentAcceleration",
        };
        write!(f, "{}.{}", self.positioner, quantity)
    }
}

/// SGamma motion profile of one positioner, as stored on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SGammaProfile {
    /// Velocity (units/s)
    pub velocity: f64,
    /// Acceleration (units/s²)
    pub acceleration: f64,
    /// Minimum jerk time (s)
    pub min_jerk_time: f64,
    /// Maximum jerk time (s)
    pub max_jerk_time: f64,
}

/// Capability: Motion Controller Link
///
/// Low-level command execution against the multi-axis controller. Every call
/// blocks (asynchronously) until the controller answers or the link timeout
/// expires; a timeout is reported as a [`LinkFault`] with code
/// [`LinkFault::TIMEOUT`] and is never retried here.
#[async_trait]
pub trait MotionLink: Send + Sync {
    /// Connect to the controller.
    async fn open(&self, host: &str, port: u16, timeout: Duration) -> LinkResult<()>;

    /// Authenticate the session.
    async fn login(&self, username: &str, password: &str) -> LinkResult<()>;

    /// Controller firmware version string.
    async fn firmware_version(&self) -> LinkResult<String>;

    /// Release the connection. Closing an unopened link is a no-op.
    async fn close(&self) -> LinkResult<()>;

    /// Run one per-group action.
    async fn group_action(&self, group: &str, method: GroupMethod) -> LinkResult<()>;

    /// Move a group; `axis_values` holds one target per positioner.
    async fn move_group(&self, group: &str, axis_values: &[f64], mode: MoveMode)
        -> LinkResult<()>;

    /// Raw group status code.
    async fn group_status(&self, group: &str) -> LinkResult<i32>;

    /// Last commanded position of the group's first positioner.
    async fn setpoint_position(&self, group: &str) -> LinkResult<f64>;

    /// Select the channels recorded by the next gathering run.
    async fn gathering_configure(&self, channels: &[GatheringChannel]) -> LinkResult<()>;

    /// Start gathering `dataset_count` samples every `interval` servo cycles.
    async fn gathering_run(&self, dataset_count: u32, interval: u32) -> LinkResult<()>;

    /// Stop the gathering run.
    async fn gathering_stop(&self) -> LinkResult<()>;

    /// Stop the gathering run and persist the buffer to the controller file system.
    async fn gathering_stop_and_save(&self) -> LinkResult<()>;

    /// Maximum velocity and acceleration of a positioner.
    async fn positioner_max_velocity_acceleration(&self, positioner: &str)
        -> LinkResult<(f64, f64)>;

    /// User travel limits (min target, max target) of a positioner.
    async fn positioner_user_travel_limits(&self, positioner: &str) -> LinkResult<(f64, f64)>;

    /// Current SGamma profile of a positioner.
    async fn sgamma_parameters(&self, positioner: &str) -> LinkResult<SGammaProfile>;

    /// Replace the SGamma profile of a positioner.
    async fn set_sgamma_parameters(
        &self,
        positioner: &str,
        profile: &SGammaProfile,
    ) -> LinkResult<()>;
}

/// Capability: Configuration/File Transport
///
/// Access to the controller's file system. Remote paths are relative to the
/// controller's file root (for example `Config/system.ini`).
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    /// Read a remote text file as an ordered sequence of lines.
    async fn fetch_text(&self, remote_path: &str) -> FtsResult<Vec<String>>;

    /// Copy a remote file to a local path.
    async fn save_file(&self, remote_path: &str, local_path: &Path) -> FtsResult<()>;

    /// Copy a local file to a remote path.
    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> FtsResult<()>;
}

/// Capability: Auxiliary Device
///
/// Devices around the interferometer that are simply switched on or off
/// (optical chopper, infrared source).
#[async_trait]
pub trait AuxiliaryDevice: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Switch the device on.
    async fn enable(&self) -> FtsResult<()>;

    /// Switch the device off.
    async fn disable(&self) -> FtsResult<()>;

    /// Whether the device is currently on.
    async fn is_enabled(&self) -> FtsResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_state_actions_are_the_reversible_ones() {
        assert!(GroupMethod::MoveAbort.is_motion_state());
        assert!(GroupMethod::MotionDisable.is_motion_state());
        assert!(GroupMethod::MotionEnable.is_motion_state());
        assert!(!GroupMethod::Kill.is_motion_state());
        assert!(!GroupMethod::HomeSearch.is_motion_state());
    }

    #[test]
    fn gathering_channels_name_positioner_quantities() {
        let names: Vec<String> = GatheringChannel::kinematics("GROUP3.Pos")
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "GROUP3.Pos.CurrentPosition",
                "GROUP3.Pos.CurrentVelocity",
                "GROUP3.Pos.CurrentAcceleration"
            ]
        );
    }

    #[test]
    fn fault_recognizes_not_allowed_action() {
        assert!(LinkFault::new(-22, "Not allowed action").is_not_allowed_action());
        assert!(!LinkFault::timeout("read").is_not_allowed_action());
    }
}
