//! Operating state and command legality.
//!
//! The spectrometer is always in exactly one [`OperatingState`]. Which commands
//! may be issued depends on that state:
//!
//! ```text
//! Uninitialized ──initialize──> Initialized ──configure──> Configured ──scan──> Scanning
//!       ▲                                                  │   ▲              │
//!       │                                             pause│   │resume        │ success
//!       │                                                  ▼   │              ▼
//!       └──────────────stop (from any active state)──── Paused           Finished
//!                                                                            │
//!                                                          configure <───────┘
//! ```
//!
//! `status`, `close` and `reboot` are accepted in every state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating state of the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingState {
    /// No verified hardware session
    Uninitialized,
    /// Bring-up attempted, stages killed and re-initialized
    Initialized,
    /// Pointing mirror positioned, ready to scan
    Configured,
    /// A scan is in progress, or faulted and awaiting an explicit stop
    Scanning,
    /// All groups motion-disabled
    Paused,
    /// Last scan completed; data can be saved
    Finished,
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingState::Uninitialized => write!(f, "Uninitialized"),
            OperatingState::Initialized => write!(f, "Initialized"),
            OperatingState::Configured => write!(f, "Configured"),
            OperatingState::Scanning => write!(f, "Scanning"),
            OperatingState::Paused => write!(f, "Paused"),
            OperatingState::Finished => write!(f, "Finished"),
        }
    }
}

/// Commands accepted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Establish the hardware session and bring up every group
    Initialize,
    /// Position the pointing mirror
    Configure,
    /// Run a back-and-forth scan
    Scan,
    /// Persist the gathered data
    Save,
    /// Tear down and rebuild the session
    Reboot,
    /// Report state and group status
    Status,
    /// Abort all motion (hard reset)
    Stop,
    /// Disable motion on every group
    Pause,
    /// Re-enable motion on every group
    Resume,
    /// Release the hardware session for good
    Close,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Initialize => "initialize",
            CommandKind::Configure => "configure",
            CommandKind::Scan => "scan",
            CommandKind::Save => "save",
            CommandKind::Reboot => "reboot",
            CommandKind::Status => "status",
            CommandKind::Stop => "stop",
            CommandKind::Pause => "pause",
            CommandKind::Resume => "resume",
            CommandKind::Close => "close",
        };
        f.write_str(name)
    }
}

impl OperatingState {
    /// Check whether `command` may be issued in this state.
    pub fn permits(&self, command: CommandKind) -> bool {
        use CommandKind as C;
        use OperatingState as S;

        if matches!(command, C::Status | C::Close | C::Reboot) {
            return true;
        }

        match self {
            S::Uninitialized => matches!(command, C::Initialize),
            S::Initialized => matches!(command, C::Configure),
            S::Configured => matches!(command, C::Scan | C::Pause | C::Stop),
            S::Scanning => matches!(command, C::Stop),
            S::Paused => matches!(command, C::Resume | C::Stop),
            S::Finished => matches!(command, C::Save | C::Configure),
        }
    }

    /// Check if a scan may start.
    pub fn can_scan(&self) -> bool {
        self.permits(CommandKind::Scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [OperatingState; 6] = [
        OperatingState::Uninitialized,
        OperatingState::Initialized,
        OperatingState::Configured,
        OperatingState::Scanning,
        OperatingState::Paused,
        OperatingState::Finished,
    ];

    #[test]
    fn diagnostic_commands_always_permitted() {
        for state in ALL_STATES {
            assert!(state.permits(CommandKind::Status), "status in {state}");
            assert!(state.permits(CommandKind::Close), "close in {state}");
            assert!(state.permits(CommandKind::Reboot), "reboot in {state}");
        }
    }

    #[test]
    fn scan_only_from_configured() {
        let allowed: Vec<_> = ALL_STATES.into_iter().filter(|s| s.can_scan()).collect();
        assert_eq!(allowed, vec![OperatingState::Configured]);
    }

    #[test]
    fn scanning_accepts_only_stop() {
        let s = OperatingState::Scanning;
        assert!(s.permits(CommandKind::Stop));
        assert!(!s.permits(CommandKind::Pause));
        assert!(!s.permits(CommandKind::Scan));
        assert!(!s.permits(CommandKind::Configure));
    }

    #[test]
    fn uninitialized_rejects_stop() {
        assert!(!OperatingState::Uninitialized.permits(CommandKind::Stop));
        assert!(OperatingState::Uninitialized.permits(CommandKind::Initialize));
    }

    #[test]
    fn finished_allows_reconfigure_and_save() {
        let s = OperatingState::Finished;
        assert!(s.permits(CommandKind::Save));
        assert!(s.permits(CommandKind::Configure));
        assert!(!s.permits(CommandKind::Scan));
    }

    #[test]
    fn command_names_are_lowercase() {
        assert_eq!(CommandKind::Initialize.to_string(), "initialize");
        assert_eq!(
            serde_json::to_string(&CommandKind::Resume).unwrap(),
            "\"resume\""
        );
    }
}
