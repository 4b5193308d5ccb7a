//! Start/stop/destroy phases shared by pools, workers and schedulers.
//!
//! Components compose a [`Lifecycle`] instead of sharing a base type. The
//! transition table is the single source of truth for which phase changes are
//! legal:
//!
//! ```text
//! Created ──► Started ──► Stopping ──► Stopped ──► Destroyed
//!    └─────────────────────────────────► Stopped
//! ```

use parking_lot::Mutex;

use super::error::LifecycleError;

/// Phase of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, no threads running yet.
    Created,
    /// Threads running, accepting work.
    Started,
    /// Shutdown requested; in-flight work may still finish.
    Stopping,
    /// All owned threads have been told to exit.
    Stopped,
    /// Owned threads have been joined or detached.
    Destroyed,
}

impl LifecycleState {
    /// Whether `self -> next` is in the transition table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Started | Self::Stopped)
                | (Self::Started, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
                | (Self::Stopped, Self::Destroyed)
        )
    }

    /// Whether the component still accepts work.
    #[must_use]
    pub const fn is_accepting(self) -> bool {
        matches!(self, Self::Started)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Started => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
            Self::Destroyed => 4,
        }
    }

    const fn successor(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::Started),
            Self::Started => Some(Self::Stopping),
            Self::Stopping => Some(Self::Stopped),
            Self::Stopped => Some(Self::Destroyed),
            Self::Destroyed => None,
        }
    }
}

/// Mutex-guarded lifecycle state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// New lifecycle in [`LifecycleState::Created`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Created),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn current(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Move to `next`, returning the previous phase.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] if the move is not in the table.
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition { from, to: next });
        }
        *state = next;
        Ok(from)
    }

    /// Walk forward through intermediate phases until `target` is reached.
    ///
    /// Returns `false` if `target` is behind the current phase.
    pub fn advance_to(&self, target: LifecycleState) -> bool {
        let mut state = self.state.lock();
        if state.rank() > target.rank() {
            return false;
        }
        while *state != target {
            if state.can_transition_to(target) {
                *state = target;
                break;
            }
            match state.successor() {
                Some(next) => *state = next,
                None => return false,
            }
        }
        true
    }

    /// Whether the component still accepts work.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.current().is_accepting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let lc = Lifecycle::new();
        assert_eq!(lc.transition(LifecycleState::Started), Ok(LifecycleState::Created));
        assert!(lc.is_accepting());
        lc.transition(LifecycleState::Stopping).unwrap();
        lc.transition(LifecycleState::Stopped).unwrap();
        lc.transition(LifecycleState::Destroyed).unwrap();
        assert_eq!(lc.current(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_rejects_restart() {
        let lc = Lifecycle::new();
        lc.transition(LifecycleState::Started).unwrap();
        lc.transition(LifecycleState::Stopping).unwrap();
        let err = lc.transition(LifecycleState::Started).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::Stopping,
                to: LifecycleState::Started,
            }
        );
    }

    #[test]
    fn test_double_stop_rejected() {
        let lc = Lifecycle::new();
        lc.transition(LifecycleState::Started).unwrap();
        assert!(lc.transition(LifecycleState::Stopping).is_ok());
        assert!(lc.transition(LifecycleState::Stopping).is_err());
    }

    #[test]
    fn test_advance_to_walks_intermediate_phases() {
        let lc = Lifecycle::new();
        lc.transition(LifecycleState::Started).unwrap();
        assert!(lc.advance_to(LifecycleState::Destroyed));
        assert_eq!(lc.current(), LifecycleState::Destroyed);
        assert!(!lc.advance_to(LifecycleState::Stopping));
    }

    #[test]
    fn test_advance_to_from_created() {
        let lc = Lifecycle::new();
        assert!(lc.advance_to(LifecycleState::Stopped));
        assert_eq!(lc.current(), LifecycleState::Stopped);
    }
}
