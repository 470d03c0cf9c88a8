//! Instrument-level control: operating states, the state machine and the
//! actor that serializes commands to it.

pub mod actor;
pub mod machine;
pub mod state;

pub use actor::{spawn, FtsActor, FtsHandle, FtsRequest};
pub use machine::{FtsStateMachine, GroupStatusReport, PointingPosition, StatusReport};
pub use state::{CommandKind, OperatingState};
