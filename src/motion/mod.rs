//! Motion control on top of the [`MotionLink`](crate::hardware::MotionLink)
//! capability: per-group operations and the scan procedure.

pub mod group_manager;
pub mod scan;

pub use group_manager::{ActionOutcome, GroupStatusCode, MotionGroupManager};
pub use scan::{
    AbortFlag, GatheringSettings, SGammaParams, ScanOrchestrator, ScanPlan, ScanRequest,
    ScanResult,
};
