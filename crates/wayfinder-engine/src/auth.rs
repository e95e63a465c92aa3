//! Authentication gate
//!
//! Intercepts actions that need an authenticated identity. An
//! unauthenticated attempt parks the action and asks the UI for a login or
//! register dialog; a successful login resumes it exactly once.
//!
//! ```text
//! Idle ──require──▶ AwaitingAuth ──authenticated──▶ Resumed ──finish──▶ Idle
//!                        │  ▲
//!                 cancel │  │ require (replaces the parked action)
//!                        ▼  │
//!                       Idle
//! ```

use std::fmt;
use wayfinder_core::AuthContext;

/// Gate phase without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPhase {
    /// Nothing pending
    Idle,
    /// An action waits for authentication
    AwaitingAuth,
    /// The parked action is being replayed
    Resumed,
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthPhase::Idle => f.write_str("idle"),
            AuthPhase::AwaitingAuth => f.write_str("awaiting-auth"),
            AuthPhase::Resumed => f.write_str("resumed"),
        }
    }
}

/// Rejected gate transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal auth transition {from} -> {to}")]
pub struct AuthTransitionError {
    /// Phase the gate was in
    pub from: AuthPhase,
    /// Phase that was requested
    pub to: AuthPhase,
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: AuthPhase) -> Vec<AuthPhase> {
    use AuthPhase::{AwaitingAuth, Idle, Resumed};
    match from {
        Idle => vec![AwaitingAuth],
        AwaitingAuth => vec![AwaitingAuth, Resumed, Idle],
        Resumed => vec![Idle, AwaitingAuth],
    }
}

/// Check a transition against [`allowed_transitions`]
///
/// # Errors
/// [`AuthTransitionError`] when the move is not allowed
pub fn validate_transition(from: AuthPhase, to: AuthPhase) -> Result<(), AuthTransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(AuthTransitionError { from, to })
    }
}

/// Gate state with the parked action
#[derive(Debug)]
pub enum AuthState<A> {
    /// Nothing pending
    Idle,
    /// `action` waits for the `context` dialog to succeed
    AwaitingAuth {
        /// Parked action
        action: A,
        /// Dialog to show
        context: AuthContext,
    },
    /// The parked action has been handed out for replay
    Resumed,
}

impl<A> AuthState<A> {
    /// Phase of this state
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        match self {
            AuthState::Idle => AuthPhase::Idle,
            AuthState::AwaitingAuth { .. } => AuthPhase::AwaitingAuth,
            AuthState::Resumed => AuthPhase::Resumed,
        }
    }
}

/// Auth gate holding at most one parked action
#[derive(Debug)]
pub struct AuthGate<A> {
    state: AuthState<A>,
}

impl<A> AuthGate<A> {
    /// Idle gate
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AuthState::Idle,
        }
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.state.phase()
    }

    /// Dialog the UI should show, if any
    #[must_use]
    pub fn pending_context(&self) -> Option<AuthContext> {
        match &self.state {
            AuthState::AwaitingAuth { context, .. } => Some(*context),
            AuthState::Idle | AuthState::Resumed => None,
        }
    }

    /// Park `action` until authentication succeeds
    ///
    /// A second request while one is pending replaces it; the displaced
    /// action is returned.
    ///
    /// # Errors
    /// Never from a well-formed gate; kept so every move goes through
    /// [`validate_transition`]
    pub fn require_auth(
        &mut self,
        action: A,
        context: AuthContext,
    ) -> Result<Option<A>, AuthTransitionError> {
        validate_transition(self.phase(), AuthPhase::AwaitingAuth)?;
        let previous = std::mem::replace(&mut self.state, AuthState::AwaitingAuth { action, context });
        Ok(match previous {
            AuthState::AwaitingAuth { action, .. } => Some(action),
            AuthState::Idle | AuthState::Resumed => None,
        })
    }

    /// Hand out the parked action for replay
    ///
    /// # Errors
    /// [`AuthTransitionError`] when nothing is parked
    pub fn begin_resume(&mut self) -> Result<A, AuthTransitionError> {
        validate_transition(self.phase(), AuthPhase::Resumed)?;
        match std::mem::replace(&mut self.state, AuthState::Resumed) {
            AuthState::AwaitingAuth { action, .. } => Ok(action),
            other => {
                let from = other.phase();
                self.state = other;
                Err(AuthTransitionError {
                    from,
                    to: AuthPhase::Resumed,
                })
            }
        }
    }

    /// Return to idle after a replay
    ///
    /// Leaves the gate alone if the replayed action parked a new one.
    pub fn finish_resume(&mut self) {
        if self.phase() == AuthPhase::Resumed {
            self.state = AuthState::Idle;
        }
    }

    /// Authentication succeeded: take the parked action, leaving the gate idle
    ///
    /// `None` when nothing was parked.
    pub fn on_authenticated(&mut self) -> Option<A> {
        let action = self.begin_resume().ok()?;
        self.finish_resume();
        Some(action)
    }

    /// Drop the parked action
    ///
    /// # Errors
    /// [`AuthTransitionError`] when nothing is parked
    pub fn cancel(&mut self) -> Result<A, AuthTransitionError> {
        let from = self.phase();
        if from != AuthPhase::AwaitingAuth {
            return Err(AuthTransitionError {
                from,
                to: AuthPhase::Idle,
            });
        }
        match std::mem::replace(&mut self.state, AuthState::Idle) {
            AuthState::AwaitingAuth { action, .. } => Ok(action),
            AuthState::Idle | AuthState::Resumed => Err(AuthTransitionError {
                from,
                to: AuthPhase::Idle,
            }),
        }
    }
}

impl<A> Default for AuthGate<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_runs_once() {
        let mut gate = AuthGate::new();
        gate.require_auth("save", AuthContext::Register).unwrap();
        assert_eq!(gate.phase(), AuthPhase::AwaitingAuth);
        assert_eq!(gate.pending_context(), Some(AuthContext::Register));

        assert_eq!(gate.on_authenticated(), Some("save"));
        assert_eq!(gate.phase(), AuthPhase::Idle);
        assert_eq!(gate.on_authenticated(), None);
    }

    #[test]
    fn second_request_replaces_first() {
        let mut gate = AuthGate::new();
        assert_eq!(gate.require_auth(1, AuthContext::Register).unwrap(), None);
        assert_eq!(gate.require_auth(2, AuthContext::Login).unwrap(), Some(1));
        assert_eq!(gate.pending_context(), Some(AuthContext::Login));
        assert_eq!(gate.on_authenticated(), Some(2));
    }

    #[test]
    fn cancel_drops_action() {
        let mut gate = AuthGate::new();
        assert!(gate.cancel().is_err());

        gate.require_auth("save", AuthContext::Register).unwrap();
        assert_eq!(gate.cancel().unwrap(), "save");
        assert_eq!(gate.phase(), AuthPhase::Idle);
        assert_eq!(gate.on_authenticated(), None);
    }

    #[test]
    fn resumed_phase_is_observable() {
        let mut gate = AuthGate::new();
        gate.require_auth("save", AuthContext::Register).unwrap();

        let action = gate.begin_resume().unwrap();
        assert_eq!(action, "save");
        assert_eq!(gate.phase(), AuthPhase::Resumed);
        assert!(gate.begin_resume().is_err());

        gate.finish_resume();
        assert_eq!(gate.phase(), AuthPhase::Idle);
    }

    #[test]
    fn transition_table() {
        assert!(validate_transition(AuthPhase::Idle, AuthPhase::AwaitingAuth).is_ok());
        assert!(validate_transition(AuthPhase::Idle, AuthPhase::Resumed).is_err());
        assert!(validate_transition(AuthPhase::Resumed, AuthPhase::Idle).is_ok());
        assert!(allowed_transitions(AuthPhase::AwaitingAuth).contains(&AuthPhase::Idle));
    }
}
