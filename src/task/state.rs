use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

// -----------------------------------------------------------------------------
// Run State
// -----------------------------------------------------------------------------

/// Lifecycle state of a task.
///
/// The state advances monotonically (`Created -> Running -> Done`) and never
/// re-enters an earlier state. `Done` is terminal: synchronous operations
/// invoked on a task thereafter fail with a `BadArg` exception.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RunState {
  Created = 0,
  Running = 1,
  Done = 2,
}

// -----------------------------------------------------------------------------
// State Cell
// -----------------------------------------------------------------------------

/// Atomic, monotonic holder of a [`RunState`].
#[derive(Debug)]
#[repr(transparent)]
pub(crate) struct StateCell {
  bits: AtomicU8,
}

impl StateCell {
  /// Creates a new cell in the `Created` state.
  #[inline]
  pub(crate) const fn new() -> Self {
    Self {
      bits: AtomicU8::new(RunState::Created as u8),
    }
  }

  /// Returns the current run-state.
  #[inline]
  pub(crate) fn load(&self) -> RunState {
    match self.bits.load(Ordering::Acquire) {
      0 => RunState::Created,
      1 => RunState::Running,
      _ => RunState::Done,
    }
  }

  /// Advances the state to `next`.
  ///
  /// Advancing is monotonic: an attempt to move backwards is a no-op.
  #[inline]
  pub(crate) fn advance(&self, next: RunState) {
    self.bits.fetch_max(next as u8, Ordering::AcqRel);
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::task::RunState;
  use crate::task::StateCell;

  #[test]
  fn test_initial_state() {
    let cell: StateCell = StateCell::new();

    assert_eq!(cell.load(), RunState::Created);
  }

  #[test]
  fn test_advance_forward() {
    let cell: StateCell = StateCell::new();

    cell.advance(RunState::Running);
    assert_eq!(cell.load(), RunState::Running);

    cell.advance(RunState::Done);
    assert_eq!(cell.load(), RunState::Done);
  }

  #[test]
  fn test_advance_is_monotonic() {
    let cell: StateCell = StateCell::new();

    cell.advance(RunState::Done);
    cell.advance(RunState::Running);

    assert_eq!(cell.load(), RunState::Done);
  }
}
