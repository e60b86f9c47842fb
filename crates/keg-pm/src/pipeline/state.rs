use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ErrorKind, KegError, Result};

/// Progress of one install run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallState {
    Pending,
    Fetched,
    Verified,
    Provisioned,
    Installed,
    Accepted,
    Failed(ErrorKind),
}

impl InstallState {
    /// Position in the success path, `None` for `Failed`
    fn ordinal(&self) -> Option<u8> {
        match self {
            InstallState::Pending => Some(0),
            InstallState::Fetched => Some(1),
            InstallState::Verified => Some(2),
            InstallState::Provisioned => Some(3),
            InstallState::Installed => Some(4),
            InstallState::Accepted => Some(5),
            InstallState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallState::Accepted | InstallState::Failed(_))
    }

    /// Forward by exactly one step, or to `Failed` from any non-terminal state
    pub fn can_transition_to(&self, next: InstallState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::Pending => f.write_str("PENDING"),
            InstallState::Fetched => f.write_str("FETCHED"),
            InstallState::Verified => f.write_str("VERIFIED"),
            InstallState::Provisioned => f.write_str("PROVISIONED"),
            InstallState::Installed => f.write_str("INSTALLED"),
            InstallState::Accepted => f.write_str("ACCEPTED"),
            InstallState::Failed(kind) => write!(f, "FAILED({})", kind),
        }
    }
}

/// Records the states of a run and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct StateTracker {
    history: Vec<InstallState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            history: vec![InstallState::Pending],
        }
    }

    pub fn current(&self) -> InstallState {
        self.history
            .last()
            .copied()
            .unwrap_or(InstallState::Pending)
    }

    /// Move to `next`, returning the state that was left
    pub fn advance(&mut self, next: InstallState) -> Result<InstallState> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(KegError::InvalidTransition { from, to: next });
        }
        log::debug!("{} -> {}", from, next);
        self.history.push(next);
        Ok(from)
    }

    pub fn history(&self) -> &[InstallState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<InstallState> {
        self.history
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstallErrorKind;

    const SUCCESS_PATH: [InstallState; 5] = [
        InstallState::Fetched,
        InstallState::Verified,
        InstallState::Provisioned,
        InstallState::Installed,
        InstallState::Accepted,
    ];

    #[test]
    fn test_success_path() {
        let mut tracker = StateTracker::new();
        for state in SUCCESS_PATH {
            tracker.advance(state).unwrap();
        }
        assert_eq!(tracker.history().len(), 6);
        assert_eq!(tracker.current(), InstallState::Accepted);
        assert!(tracker.current().is_terminal());
    }

    #[test]
    fn test_rejects_skip_and_backward() {
        let mut tracker = StateTracker::new();
        let err = tracker.advance(InstallState::Verified).unwrap_err();
        assert!(matches!(
            err,
            KegError::InvalidTransition {
                from: InstallState::Pending,
                to: InstallState::Verified
            }
        ));

        tracker.advance(InstallState::Fetched).unwrap();
        tracker.advance(InstallState::Verified).unwrap();
        assert!(tracker.advance(InstallState::Fetched).is_err());
        assert!(tracker.advance(InstallState::Verified).is_err());
        assert_eq!(tracker.current(), InstallState::Verified);
    }

    #[test]
    fn test_failure_from_any_non_terminal_state() {
        let failed = InstallState::Failed(ErrorKind::Network);
        assert!(InstallState::Pending.can_transition_to(failed));
        assert!(InstallState::Installed.can_transition_to(failed));
        assert!(!InstallState::Accepted.can_transition_to(failed));
        assert!(!failed.can_transition_to(InstallState::Pending));
        assert!(!failed.can_transition_to(failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(InstallState::Provisioned.to_string(), "PROVISIONED");
        assert_eq!(
            InstallState::Failed(ErrorKind::Install(InstallErrorKind::CorruptArchive)).to_string(),
            "FAILED(InstallError(corrupt archive))"
        );
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&[
            InstallState::Pending,
            InstallState::Failed(ErrorKind::Integrity),
        ])
        .unwrap();
        assert_eq!(json, r#"["pending",{"failed":{"kind":"integrity"}}]"#);
    }
}
