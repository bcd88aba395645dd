//! Auth state machine
//!
//! Pure transition function: receives the current phase and an event,
//! returns the next phase. `AuthStore` performs the I/O and feeds the
//! outcomes back in as events.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Nothing attempted yet
    #[default]
    Uninitialized,
    /// Restoring a session or probing the provider
    Initializing,
    Authenticated,
    Anonymous,
    /// Logout in progress; local state is already cleared
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitStarted,
    /// A session was restored, adopted or created by a login
    SessionEstablished,
    /// Initialization found no usable session
    NoSession,
    InitFailed,
    LogoutRequested,
    LogoutCompleted,
}

/// Handle a transition. Unhandled pairs leave the phase unchanged.
pub fn transition(phase: AuthPhase, event: AuthEvent) -> AuthPhase {
    use AuthEvent::*;
    use AuthPhase::*;

    match (phase, event) {
        (Uninitialized, InitStarted) => Initializing,

        (Initializing, NoSession | InitFailed) => Anonymous,

        // Credential or redirect logins can land before, during or after
        // initialization.
        (Uninitialized | Initializing | Anonymous | Authenticated, SessionEstablished) => {
            Authenticated
        }

        (_, LogoutRequested) => Terminating,
        (Terminating, LogoutCompleted) => Anonymous,

        (phase, _) => phase,
    }
}
