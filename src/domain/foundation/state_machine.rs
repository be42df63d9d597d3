//! Checked transitions for lifecycle enums.

use super::ValidationError;

/// A status enum whose moves between states are restricted.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Every state reachable in one step.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Returns `target` if the move is allowed.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
