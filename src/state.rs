//! Lifecycle of a single association.

/// States an association moves through, from transport accept to teardown.
///
/// The happy path is `Idle → Negotiating → Active → Releasing → Closed`.
/// An abort (from either side) short-circuits any pre-`Closed` state through
/// `Aborted` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssociationState {
    /// Transport connection accepted, association negotiation not started.
    Idle,
    /// Association request received, acceptance policy running.
    Negotiating,
    /// Association accepted. Operations are dispatched only in this state.
    Active,
    /// Peer requested release; ends once the release acknowledgment is sent.
    Releasing,
    /// Abort notification received or sent. Terminal apart from `Closed`.
    Aborted,
    Closed,
}

/// A state change that the association lifecycle does not permit.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid association state transition: {from:?} -> {to:?}")]
pub(crate) struct InvalidTransition {
    pub from: AssociationState,
    pub to: AssociationState,
}

impl AssociationState {
    /// Move to `to`, failing if the lifecycle does not allow it.
    pub(crate) fn transition(self, to: AssociationState) -> Result<AssociationState, InvalidTransition> {
        use AssociationState::*;
        let ok = match (self, to) {
            (Idle, Negotiating) => true,
            (Negotiating, Active) => true,
            // a rejected proposal closes the association without ever
            // becoming active
            (Negotiating, Closed) => true,
            (Active, Releasing) => true,
            (Releasing, Closed) => true,
            (Aborted, Closed) => true,
            // abort is reachable from every pre-closed state
            (Idle | Negotiating | Active | Releasing, Aborted) => true,
            _ => false,
        };
        if ok {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Whether an incoming operation may be dispatched to a workflow.
    pub(crate) fn may_dispatch(self) -> bool {
        matches!(self, AssociationState::Active)
    }
}
