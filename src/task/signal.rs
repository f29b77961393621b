use crate::core::Exit;
use crate::core::Term;
use crate::task::HandleId;

// -----------------------------------------------------------------------------
// Signal
// -----------------------------------------------------------------------------

/// What a task's mailbox transports.
///
/// Signals are categorized into:
///
/// - **Message**: Regular application messages
/// - **Exit**: Incoming exit signals from linked tasks
#[derive(Clone, Debug)]
pub enum Signal {
  Message(Term),
  Exit(ExitSignal),
}

impl Signal {
  /// Returns `true` if the signal is a regular message.
  #[inline]
  pub fn is_message(&self) -> bool {
    matches!(self, Self::Message(_))
  }

  /// Returns `true` if the signal is an incoming exit.
  #[inline]
  pub fn is_exit(&self) -> bool {
    matches!(self, Self::Exit(_))
  }
}

impl From<ExitSignal> for Signal {
  #[inline]
  fn from(other: ExitSignal) -> Self {
    Self::Exit(other)
  }
}

impl From<Term> for Signal {
  #[inline]
  fn from(other: Term) -> Self {
    Self::Message(other)
  }
}

// -----------------------------------------------------------------------------
// Signal - Exit
// -----------------------------------------------------------------------------

/// Exit signal from a linked task.
///
/// Sent automatically when a linked task terminates, or explicitly via
/// [`Handle::exit_signal`].
///
/// [`Handle::exit_signal`]: crate::task::Handle::exit_signal
#[derive(Clone, Debug)]
#[repr(C)]
pub struct ExitSignal {
  from: HandleId,
  reason: Exit,
}

impl ExitSignal {
  /// Creates a new exit signal.
  #[inline]
  pub(crate) const fn new(from: HandleId, reason: Exit) -> Self {
    Self { from, reason }
  }

  /// Returns the identity of the task that sent the signal.
  #[inline]
  pub const fn from(&self) -> HandleId {
    self.from
  }

  /// Returns the exit reason.
  #[inline]
  pub const fn reason(&self) -> &Exit {
    &self.reason
  }
}
