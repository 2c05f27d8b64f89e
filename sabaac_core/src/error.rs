use thiserror::Error;

/// Why a session refused to transition.
///
/// Every variant is recovered locally by the caller: the rejection is
/// logged, no state is mutated, and nothing beyond an unchanged snapshot
/// reaches the triggering client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Unknown session code, or an identity with no player in the session.
    #[error("no matching session or player")]
    NotFound,
    /// Out-of-turn action, malformed or missing action value, card not in
    /// hand, or a draw from an empty pile.
    #[error("invalid action: {0}")]
    InvalidAction(String),
    /// The session is not in a state that accepts this event.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}
