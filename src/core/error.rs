use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

// -----------------------------------------------------------------------------
// Exception Class
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExceptionClass {
  Error,
}

// -----------------------------------------------------------------------------
// Exception Group
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExceptionGroup {
  /// Invalid argument, or an operation invoked outside its valid state.
  BadArg,
  /// Unrecognized mailbox message shape.
  BadSig,
  /// Operation not supported by the receiving handle.
  NotSup,
  /// Operation recognized but not implemented for this configuration.
  NotImpl,
}

impl ExceptionGroup {
  #[inline]
  const fn label(&self) -> &'static str {
    match self {
      Self::BadArg => "(BadArg) errors were found with the given argument(s)",
      Self::BadSig => "(BadSig) an unrecognized message was received",
      Self::NotSup => "(NotSup) the operation is not supported",
      Self::NotImpl => "(NotImpl) the operation is not implemented",
    }
  }
}

// -----------------------------------------------------------------------------
// Exception
// -----------------------------------------------------------------------------

/// Error type returned from invalid runtime operations.
///
/// Exceptions surface synchronously to the caller of the operation that
/// raised them; failures inside a task loop become exit reasons instead.
pub struct Exception {
  class: ExceptionClass,
  group: ExceptionGroup,
  error: String,
  trace: Backtrace,
}

impl Exception {
  /// Creates a new `Exception`.
  #[inline]
  pub fn new(group: ExceptionGroup, error: impl Into<String>) -> Self {
    Self {
      class: ExceptionClass::Error,
      group,
      error: error.into(),
      trace: Backtrace::capture(),
    }
  }

  /// Creates a new [`BadArg`] exception.
  ///
  /// [`BadArg`]: ExceptionGroup::BadArg
  #[inline]
  pub fn badarg(error: impl Into<String>) -> Self {
    Self::new(ExceptionGroup::BadArg, error)
  }

  /// Returns the exception class.
  #[inline]
  pub const fn class(&self) -> ExceptionClass {
    self.class
  }

  /// Returns the exception group.
  #[inline]
  pub const fn group(&self) -> ExceptionGroup {
    self.group
  }

  /// Returns the exception error message.
  #[inline]
  pub fn error(&self) -> &str {
    &self.error
  }

  /// Returns the thread stack backtrace leading up to the exception.
  #[inline]
  pub const fn trace(&self) -> &Backtrace {
    &self.trace
  }
}

impl Debug for Exception {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Display::fmt(self, f)
  }
}

impl Display for Exception {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "[portage]: {}: {}", self.group.label(), self.error)
  }
}

impl Error for Exception {}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::core::Exception;
  use crate::core::ExceptionClass;
  use crate::core::ExceptionGroup;

  #[test]
  fn test_badarg_constructor() {
    let error: Exception = Exception::badarg("bad settings");

    assert_eq!(error.class(), ExceptionClass::Error);
    assert_eq!(error.group(), ExceptionGroup::BadArg);
    assert_eq!(error.error(), "bad settings");
  }

  #[test]
  fn test_display_carries_group_label() {
    let error: Exception = Exception::new(ExceptionGroup::NotImpl, "framed command");
    let value: String = format!("{error}");

    assert!(value.contains("(NotImpl)"));
    assert!(value.contains("framed command"));
  }
}
