//! Application status state machine.
//!
//! ```text
//! found ──> applied ──> interview ──> hired
//!   │          │  │          │  └────> rejected
//!   │          │  └──> rejected
//!   └──────────┴─────────────┴──────> withdrawn
//! ```
//!
//! `rejected`, `hired` and `withdrawn` are terminal.

use crate::error::{Error, Result};
use crate::models::ApplicationStatus;

impl ApplicationStatus {
    /// Statuses reachable in one step from `self`.
    pub fn next_states(self) -> &'static [ApplicationStatus] {
        use ApplicationStatus::*;
        match self {
            Found => &[Applied, Withdrawn],
            Applied => &[Interview, Rejected, Withdrawn],
            Interview => &[Rejected, Hired, Withdrawn],
            Rejected | Hired | Withdrawn => &[],
        }
    }

    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        self.next_states().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }
}

/// Checks a requested transition for `application_id`. Never coerces an
/// invalid request into a valid one.
pub fn check_transition(application_id: i64, from: ApplicationStatus, to: ApplicationStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            application_id,
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationStatus::*;

    #[test]
    fn test_permitted_transitions() {
        let permitted = [
            (Found, Applied),
            (Found, Withdrawn),
            (Applied, Interview),
            (Applied, Rejected),
            (Applied, Withdrawn),
            (Interview, Rejected),
            (Interview, Hired),
            (Interview, Withdrawn),
        ];
        for from in ApplicationStatus::ALL {
            for to in ApplicationStatus::ALL {
                let expected = permitted.contains(&(*from, *to));
                assert_eq!(
                    from.can_transition_to(*to),
                    expected,
                    "{} -> {} should be {}",
                    from,
                    to,
                    if expected { "allowed" } else { "rejected" }
                );
            }
        }
    }

    #[test]
    fn test_found_cannot_skip_to_interview() {
        let err = check_transition(1, Found, Interview).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition { application_id: 1, from: Found, to: Interview }
        ));
    }

    #[test]
    fn test_applied_interview_hired_path() {
        assert!(check_transition(1, Found, Applied).is_ok());
        assert!(check_transition(1, Applied, Interview).is_ok());
        assert!(check_transition(1, Interview, Hired).is_ok());
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for terminal in [Rejected, Hired, Withdrawn] {
            assert!(terminal.is_terminal());
            for to in ApplicationStatus::ALL {
                assert!(check_transition(9, terminal, *to).is_err());
            }
        }
        assert!(!Found.is_terminal());
    }

    #[test]
    fn test_self_transition_rejected() {
        assert!(check_transition(2, Applied, Applied).is_err());
    }
}
