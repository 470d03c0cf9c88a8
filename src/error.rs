//! Custom error types for the instrument controller.
//!
//! This module defines `FtsError`, the single error type returned by every
//! component of the crate. Using the `thiserror` crate, it gives each failure
//! class of the spectrometer its own variant so callers can react to them
//! without parsing strings.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: the topology is inconsistent or a required group/stage
//!   is missing.
//! - **`InvalidRange`**: requested scan bounds fall outside the stage's travel limits.
//! - **`InvalidParameter`**: malformed motion profile or scan parameters.
//! - **`InvalidCommand`** / **`Closed`**: the command is not legal in the current
//!   operating state, or the controller has already been closed.
//! - **`HardwareAction`**: the motion controller answered a call with a non-zero
//!   result code. The device message is kept verbatim.
//! - **`Transport`**: the configuration/file transport failed to connect, read or write.
//! - **`ScanAborted`**: an explicit stop was observed between two hardware calls of a scan.
//! - **`ActorUnavailable`**: the task owning the state machine has exited.
//!
//! The controller's "not allowed action" result (-22) on motion-state actions is
//! *not* represented here. Those calls return
//! [`ActionOutcome::NotApplicable`](crate::motion::ActionOutcome) instead.

use crate::fts::state::{CommandKind, OperatingState};
use crate::hardware::capabilities::LinkFault;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type FtsResult<T> = std::result::Result<T, FtsError>;

/// How an operator is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The request can be corrected and retried without inspecting the instrument.
    Recoverable,
    /// Hardware or configuration fault; the instrument must be inspected first.
    Fatal,
}

/// Primary error type for the spectrometer controller.
#[derive(Error, Debug)]
pub enum FtsError {
    /// Topology inconsistent, or a group/stage/session the command needs is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file could not be loaded or deserialized.
    #[error("Configuration file error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Scan bounds outside the stage travel limits, or not strictly ordered.
    #[error(
        "Invalid scan range [{minus}, {plus}] for stage '{stage}' (travel limits [{min_target}, {max_target}])"
    )]
    InvalidRange {
        /// Stage the range was validated against
        stage: String,
        /// Requested minus bound
        minus: f64,
        /// Requested plus bound
        plus: f64,
        /// Stage minimum target
        min_target: f64,
        /// Stage maximum target
        max_target: f64,
    },

    /// Motion profile or scan parameter rejected before reaching hardware.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Command issued outside the states that permit it.
    #[error("Command '{command}' is not allowed in state {state}")]
    InvalidCommand {
        /// Rejected command
        command: CommandKind,
        /// State at the time of the request
        state: OperatingState,
    },

    /// Command issued after the controller was closed.
    #[error("Command '{command}' rejected: controller has been closed")]
    Closed {
        /// Rejected command
        command: CommandKind,
    },

    /// Non-zero, non-no-op result from the motion controller.
    #[error("{action} on '{target}' failed with code {code}: {message}")]
    HardwareAction {
        /// Group, positioner or "controller" for session-wide calls
        target: String,
        /// Controller function that failed
        action: String,
        /// Raw controller result code
        code: i32,
        /// Device-reported error string
        message: String,
    },

    /// Configuration transport connect/read/write failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A stop request interrupted a running scan.
    #[error("Scan aborted: {0}")]
    ScanAborted(String),

    /// Local file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure writing scan artifacts.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The controller task is gone or dropped the request.
    #[error("Controller task unavailable: {0}")]
    ActorUnavailable(String),
}

impl FtsError {
    /// Build a `HardwareAction` error from a raw link fault.
    pub fn hardware(target: impl Into<String>, action: impl Into<String>, fault: LinkFault) -> Self {
        FtsError::HardwareAction {
            target: target.into(),
            action: action.into(),
            code: fault.code,
            message: fault.message,
        }
    }

    /// True for both "illegal in this state" and "controller closed".
    pub fn is_invalid_command(&self) -> bool {
        matches!(self, FtsError::InvalidCommand { .. } | FtsError::Closed { .. })
    }

    /// Controller result code, if this error came from the hardware.
    pub fn hardware_code(&self) -> Option<i32> {
        match self {
            FtsError::HardwareAction { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Classify the error for operator handling.
    pub fn severity(&self) -> Severity {
        match self {
            FtsError::InvalidRange { .. }
            | FtsError::InvalidParameter(_)
            | FtsError::InvalidCommand { .. }
            | FtsError::Closed { .. }
            | FtsError::ScanAborted(_)
            | FtsError::Transport(_) => Severity::Recoverable,
            FtsError::Configuration(_)
            | FtsError::Config(_)
            | FtsError::HardwareAction { .. }
            | FtsError::Io(_)
            | FtsError::Storage(_)
            | FtsError::ActorUnavailable(_) => Severity::Fatal,
        }
    }
}

impl From<figment::Error> for FtsError {
    fn from(value: figment::Error) -> Self {
        FtsError::Config(Box::new(value))
    }
}

impl From<csv::Error> for FtsError {
    fn from(value: csv::Error) -> Self {
        FtsError::Storage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_error_keeps_device_message() {
        let fault = LinkFault::new(-17, "Parameter out of range or incorrect");
        let err = FtsError::hardware("GROUP3", "GroupMoveAbsolute", fault);

        assert_eq!(err.hardware_code(), Some(-17));
        let text = err.to_string();
        assert!(text.contains("GROUP3"));
        assert!(text.contains("Parameter out of range or incorrect"));
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn closed_counts_as_invalid_command() {
        let err = FtsError::Closed {
            command: CommandKind::Scan,
        };
        assert!(err.is_invalid_command());
        assert_eq!(err.severity(), Severity::Recoverable);
    }

    #[test]
    fn invalid_range_reports_limits() {
        let err = FtsError::InvalidRange {
            stage: "GROUP3.Pos".into(),
            minus: -5.0,
            plus: 50.0,
            min_target: 0.0,
            max_target: 100.0,
        };
        let text = err.to_string();
        assert!(text.contains("[-5, 50]"));
        assert!(text.contains("[0, 100]"));
    }
}
