//! Observable worker state and the caller-initiated transition table

use serde::{Deserialize, Serialize};

/// Discrete, externally visible state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// No plan executing
    #[default]
    Idle,
    /// A plan is executing
    Running,
    /// A plan is suspended and can be resumed
    Paused,
}

impl WorkerState {
    pub const ALL: [WorkerState; 3] = [WorkerState::Idle, WorkerState::Running, WorkerState::Paused];

    /// Targets a caller may request from this state
    ///
    /// This is the only place the transition table is defined. IDLE has no
    /// caller-initiated edge; the engine alone moves the worker out of it.
    pub fn allowed_targets(self) -> &'static [WorkerState] {
        match self {
            Self::Running => &[Self::Paused],
            Self::Paused => &[Self::Running],
            Self::Idle => &[],
        }
    }

    /// Whether a caller may request `target` while in this state
    pub fn can_request(self, target: WorkerState) -> bool {
        self.allowed_targets().contains(&target)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
        }
    }
}

impl std::str::FromStr for WorkerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IDLE" => Ok(Self::Idle),
            "RUNNING" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            other => Err(format!("unknown worker state '{}'", other)),
        }
    }
}

/// Result of a caller-initiated transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    /// Whether the request was in the transition table
    pub accepted: bool,
    /// State observed after the request was handled
    pub state: WorkerState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        assert!(WorkerState::Running.can_request(WorkerState::Paused));
        assert!(WorkerState::Paused.can_request(WorkerState::Running));

        assert!(!WorkerState::Idle.can_request(WorkerState::Running));
        assert!(!WorkerState::Idle.can_request(WorkerState::Paused));
        assert!(!WorkerState::Idle.can_request(WorkerState::Idle));
        assert!(!WorkerState::Running.can_request(WorkerState::Idle));
        assert!(!WorkerState::Running.can_request(WorkerState::Running));
        assert!(!WorkerState::Paused.can_request(WorkerState::Idle));
        assert!(!WorkerState::Paused.can_request(WorkerState::Paused));
    }

    #[test]
    fn test_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&WorkerState::Idle).unwrap(), "\"IDLE\"");
        assert_eq!(serde_json::to_string(&WorkerState::Paused).unwrap(), "\"PAUSED\"");
        let state: WorkerState = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(state, WorkerState::Running);
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("paused".parse::<WorkerState>().unwrap(), WorkerState::Paused);
        assert_eq!("Running".parse::<WorkerState>().unwrap(), WorkerState::Running);
        assert!("halted".parse::<WorkerState>().is_err());
    }

    #[test]
    fn test_display_matches_wire_form() {
        for state in WorkerState::ALL {
            let wire = serde_json::to_string(&state).unwrap();
            assert_eq!(wire, format!("\"{}\"", state));
        }
    }
}
