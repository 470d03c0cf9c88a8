//! Back-and-forth scan with synchronized data gathering.
//!
//! A scan drives the moving-mirror group between two bounds while the
//! controller records the axis position, velocity and acceleration. The host
//! records a wall-clock timestamp at every leg boundary so the gathered
//! samples can be correlated with scan phases afterwards.
//!
//! # Sequence
//!
//! ```text
//! t0 gather ─> plus ─┬─ t ─> minus ─ t ─> plus ─┬─ t ─> minus ─ t ─> origin ─ t
//!                    └──────── repeat ×─────────┘
//! ```
//!
//! `repeat` passes yield `2 * repeat + 4` timestamps and `2 * repeat + 3` moves.
//!
//! # Cancellation
//!
//! The orchestrator checks its [`AbortFlag`] before every hardware call. A
//! raised flag fails the scan with [`FtsError::ScanAborted`]; the move in
//! flight, if any, is allowed to complete first.

use crate::config::GatheringConfig;
use crate::error::{FtsError, FtsResult};
use crate::hardware::capabilities::{GatheringChannel, MotionLink, SGammaProfile};
use crate::motion::group_manager::MotionGroupManager;
use crate::topology::{GroupCategory, StageLimits, Topology};
use crate::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default number of back-and-forth passes.
pub const DEFAULT_REPEAT: u32 = 15;

// =============================================================================
// Abort Flag
// =============================================================================

/// Shared cancellation flag for a running scan.
///
/// Cloning shares the flag. Raised from any task with [`AbortFlag::trigger`],
/// observed by the orchestrator between hardware calls.
#[derive(Debug, Clone)]
pub struct AbortFlag {
    flag: Arc<AtomicBool>,
    reason: Arc<RwLock<Option<String>>>,
}

impl Default for AbortFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortFlag {
    /// Create a lowered flag.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(RwLock::new(None)),
        }
    }

    /// Raise the flag.
    pub fn trigger(&self, reason: impl Into<String>) {
        self.flag.store(true, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.write() {
            *r = Some(reason.into());
        }
    }

    /// Check if the flag is raised.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reason given when the flag was raised.
    pub fn reason(&self) -> Option<String> {
        self.reason.read().ok().and_then(|r| r.clone())
    }

    /// Lower the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.write() {
            *r = None;
        }
    }
}

// =============================================================================
// Requests and Results
// =============================================================================

/// Requested SGamma profile changes. Absent fields keep the controller's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SGammaParams {
    /// Velocity
    pub velocity: Option<f64>,
    /// Acceleration
    pub acceleration: Option<f64>,
    /// Minimum jerk time
    pub min_jerk_time: Option<f64>,
    /// Maximum jerk time
    pub max_jerk_time: Option<f64>,
}

impl SGammaParams {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.velocity.is_none()
            && self.acceleration.is_none()
            && self.min_jerk_time.is_none()
            && self.max_jerk_time.is_none()
    }

    /// Overlay the set fields on `current`.
    pub fn merge(&self, current: SGammaProfile) -> SGammaProfile {
        SGammaProfile {
            velocity: self.velocity.unwrap_or(current.velocity),
            acceleration: self.acceleration.unwrap_or(current.acceleration),
            min_jerk_time: self.min_jerk_time.unwrap_or(current.min_jerk_time),
            max_jerk_time: self.max_jerk_time.unwrap_or(current.max_jerk_time),
        }
    }

    /// Check the set fields against a stage's dynamic limits.
    pub fn validate(&self, stage: &str, limits: &StageLimits) -> FtsResult<()> {
        let check = |name: &str, value: Option<f64>, max: Option<f64>| -> FtsResult<()> {
            let Some(value) = value else { return Ok(()) };
            validation::is_positive_finite(value).map_err(|e| {
                FtsError::InvalidParameter(format!("{name} {value} for '{stage}': {e}"))
            })?;
            if let Some(max) = max {
                if value > max {
                    return Err(FtsError::InvalidParameter(format!(
                        "{name} {value} for '{stage}' exceeds stage maximum {max}"
                    )));
                }
            }
            Ok(())
        };

        check("velocity", self.velocity, Some(limits.max_velocity))?;
        check("acceleration", self.acceleration, Some(limits.max_acceleration))?;
        check("min_jerk_time", self.min_jerk_time, None)?;
        check("max_jerk_time", self.max_jerk_time, None)?;

        if let (Some(min), Some(max)) = (self.min_jerk_time, self.max_jerk_time) {
            check_jerk_order(stage, min, max)?;
        }
        Ok(())
    }
}

fn check_jerk_order(stage: &str, min: f64, max: f64) -> FtsResult<()> {
    if min > max {
        return Err(FtsError::InvalidParameter(format!(
            "min_jerk_time {min} exceeds max_jerk_time {max} for '{stage}'"
        )));
    }
    Ok(())
}

/// A scan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// `(minus, plus)` bounds; the stage's full travel when absent
    pub range: Option<(f64, f64)>,
    /// Full back-and-forth passes
    pub repeat: u32,
    /// Motion profile changes applied before the scan
    pub motion_params: Option<SGammaParams>,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            range: None,
            repeat: DEFAULT_REPEAT,
            motion_params: None,
        }
    }
}

impl ScanRequest {
    /// Scan between `minus` and `plus`.
    pub fn with_range(mut self, minus: f64, plus: f64) -> Self {
        self.range = Some((minus, plus));
        self
    }

    /// Set the number of passes.
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Apply a motion profile first.
    pub fn with_motion_params(mut self, params: SGammaParams) -> Self {
        self.motion_params = Some(params);
        self
    }
}

/// Validated scan, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    /// Scanning group
    pub group: String,
    /// Scanning positioner
    pub positioner: String,
    /// Lower bound
    pub minus: f64,
    /// Upper bound
    pub plus: f64,
    /// Full back-and-forth passes
    pub repeat: u32,
    /// Motion profile changes
    pub motion_params: Option<SGammaParams>,
}

impl ScanPlan {
    /// Timestamps a successful run produces.
    pub fn timestamp_count(&self) -> usize {
        2 * self.repeat as usize + 4
    }

    /// Moves a successful run sends to the scanning group.
    pub fn move_count(&self) -> usize {
        2 * self.repeat as usize + 3
    }
}

/// Outcome of a completed scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Identifier of this run
    pub run_id: Uuid,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Scanning group
    pub group: String,
    /// Lower bound used
    pub minus: f64,
    /// Upper bound used
    pub plus: f64,
    /// Setpoint the scan returned to
    pub origin: f64,
    /// Passes performed
    pub repeat: u32,
    /// Seconds since the Unix epoch at each leg boundary, non-decreasing
    pub timestamps: Vec<f64>,
}

/// Gathering run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatheringSettings {
    /// Samples to record
    pub dataset_count: u32,
    /// Servo cycles per sample
    pub interval: u32,
}

impl From<&GatheringConfig> for GatheringSettings {
    fn from(config: &GatheringConfig) -> Self {
        Self {
            dataset_count: config.dataset_count,
            interval: config.interval,
        }
    }
}

/// Wall-clock anchored at start, advanced by a monotonic clock.
struct ScanClock {
    started_at: DateTime<Utc>,
    epoch_start: f64,
    start: Instant,
}

impl ScanClock {
    fn start() -> Self {
        let started_at = Utc::now();
        Self {
            started_at,
            epoch_start: started_at.timestamp_micros() as f64 / 1e6,
            start: Instant::now(),
        }
    }

    fn now(&self) -> f64 {
        self.epoch_start + self.start.elapsed().as_secs_f64()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs scans on the topology's moving-linear group.
pub struct ScanOrchestrator {
    link: Arc<dyn MotionLink>,
    groups: MotionGroupManager,
    gathering: GatheringSettings,
    abort: AbortFlag,
}

impl ScanOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        link: Arc<dyn MotionLink>,
        topology: Arc<Topology>,
        gathering: GatheringSettings,
        abort: AbortFlag,
    ) -> Self {
        let groups = MotionGroupManager::new(link.clone(), topology);
        Self {
            link,
            groups,
            gathering,
            abort,
        }
    }

    /// Resolve and validate a request without touching hardware.
    pub fn plan(&self, request: &ScanRequest) -> FtsResult<ScanPlan> {
        let topology = self.groups.topology();
        let scanner = topology.group_for(&GroupCategory::MovingLinear)?;
        let positioner = scanner.primary_positioner().to_string();
        let limits = topology.lookup_stage_limits(&positioner)?;

        let (minus, plus) = request
            .range
            .unwrap_or((limits.min_target, limits.max_target));
        validation::is_valid_scan_range(minus, plus, limits.min_target, limits.max_target)
            .map_err(|reason| {
                debug!(reason, "scan range rejected");
                FtsError::InvalidRange {
                    stage: positioner.clone(),
                    minus,
                    plus,
                    min_target: limits.min_target,
                    max_target: limits.max_target,
                }
            })?;

        if let Some(params) = &request.motion_params {
            params.validate(&positioner, limits)?;
        }

        Ok(ScanPlan {
            group: scanner.name.clone(),
            positioner,
            minus,
            plus,
            repeat: request.repeat,
            motion_params: request.motion_params.filter(|p| !p.is_empty()),
        })
    }

    /// Plan and execute a scan.
    pub async fn run(&self, request: &ScanRequest) -> FtsResult<ScanResult> {
        let plan = self.plan(request)?;
        self.execute(&plan).await
    }

    fn checkpoint(&self, next: &str) -> FtsResult<()> {
        if self.abort.is_triggered() {
            let reason = self
                .abort
                .reason()
                .unwrap_or_else(|| "stop requested".to_string());
            warn!(next, %reason, "scan aborted");
            return Err(FtsError::ScanAborted(format!("{reason} (before {next})")));
        }
        Ok(())
    }

    async fn apply_motion_params(&self, plan: &ScanPlan) -> FtsResult<()> {
        let Some(params) = &plan.motion_params else {
            return Ok(());
        };
        let positioner = plan.positioner.as_str();

        self.checkpoint("PositionerSGammaParametersGet")?;
        let current = self
            .link
            .sgamma_parameters(positioner)
            .await
            .map_err(|f| FtsError::hardware(positioner, "PositionerSGammaParametersGet", f))?;

        let merged = params.merge(current);
        check_jerk_order(positioner, merged.min_jerk_time, merged.max_jerk_time)?;
        if merged == current {
            debug!(positioner, "motion profile unchanged");
            return Ok(());
        }

        self.checkpoint("PositionerSGammaParametersSet")?;
        self.link
            .set_sgamma_parameters(positioner, &merged)
            .await
            .map_err(|f| FtsError::hardware(positioner, "PositionerSGammaParametersSet", f))?;
        info!(
            positioner,
            velocity = merged.velocity,
            acceleration = merged.acceleration,
            "motion profile updated"
        );
        Ok(())
    }

    async fn ensure_homed(&self, group: &str) -> FtsResult<()> {
        self.checkpoint("GroupStatusGet")?;
        let status = self.groups.status(group).await?;
        if status.is_ready_from_homing() {
            return Ok(());
        }

        info!(group, %status, "scanning group not ready from homing, homing");
        self.checkpoint("GroupHomeSearch")?;
        self.groups.home(group).await?;

        self.checkpoint("GroupStatusGet")?;
        let status = self.groups.status(group).await?;
        if !status.is_ready_from_homing() {
            return Err(FtsError::HardwareAction {
                target: group.to_string(),
                action: "GroupHomeSearch".to_string(),
                code: status.code(),
                message: format!("group not ready after homing (status {status})"),
            });
        }
        Ok(())
    }

    async fn move_to(&self, group: &str, target: f64) -> FtsResult<()> {
        self.checkpoint("GroupMoveAbsolute")?;
        self.groups.move_absolute(group, target).await
    }

    /// Execute a validated plan.
    #[instrument(skip(self, plan), fields(group = %plan.group, repeat = plan.repeat))]
    pub async fn execute(&self, plan: &ScanPlan) -> FtsResult<ScanResult> {
        let group = plan.group.as_str();
        let run_id = Uuid::new_v4();
        info!(%run_id, minus = plan.minus, plus = plan.plus, "scan starting");

        self.apply_motion_params(plan).await?;
        self.ensure_homed(group).await?;

        self.checkpoint("GroupPositionSetpointGet")?;
        let origin = self.groups.setpoint_position(group).await?;

        self.checkpoint("GatheringConfigurationSet")?;
        self.link
            .gathering_configure(&GatheringChannel::kinematics(&plan.positioner))
            .await
            .map_err(|f| FtsError::hardware("controller", "GatheringConfigurationSet", f))?;

        let clock = ScanClock::start();
        let mut timestamps = Vec::with_capacity(plan.timestamp_count());

        self.checkpoint("GatheringRun")?;
        timestamps.push(clock.now());
        self.link
            .gathering_run(self.gathering.dataset_count, self.gathering.interval)
            .await
            .map_err(|f| FtsError::hardware("controller", "GatheringRun", f))?;

        self.move_to(group, plan.plus).await?;

        for pass in 0..plan.repeat {
            timestamps.push(clock.now());
            self.move_to(group, plan.minus).await?;
            timestamps.push(clock.now());
            self.move_to(group, plan.plus).await?;
            debug!(pass, "scan pass complete");
        }

        timestamps.push(clock.now());
        self.move_to(group, plan.minus).await?;
        timestamps.push(clock.now());
        self.move_to(group, origin).await?;
        timestamps.push(clock.now());

        self.checkpoint("GatheringStop")?;
        self.link
            .gathering_stop()
            .await
            .map_err(|f| FtsError::hardware("controller", "GatheringStop", f))?;
        self.checkpoint("GatheringStopAndSave")?;
        self.link
            .gathering_stop_and_save()
            .await
            .map_err(|f| FtsError::hardware("controller", "GatheringStopAndSave", f))?;

        info!(%run_id, samples = timestamps.len(), "scan complete");
        Ok(ScanResult {
            run_id,
            started_at: clock.started_at,
            group: plan.group.clone(),
            minus: plan.minus,
            plus: plan.plus,
            origin,
            repeat: plan.repeat,
            timestamps,
        })
    }
}
