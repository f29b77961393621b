use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::core::Atom;
use crate::core::Term;

// -----------------------------------------------------------------------------
// Exit
// -----------------------------------------------------------------------------

/// Reason describing why a task stopped executing.
///
/// Exit reasons serve two purposes:
///
/// 1. **Diagnostic**: Explain what caused task termination
/// 2. **Propagation**: Delivered to every linked handle when a task exits
///
/// A reason is produced exactly once per task lifetime, at loop exit:
/// [`Exit::NORMAL`] for a clean shutdown, the causing error's reason for an
/// application-level failure, or a [`Fault`] term for an unanticipated one.
#[derive(Clone)]
pub enum Exit {
  /// Exit reason represented by a predefined atom.
  Atom(Atom),
  /// Exit reason represented by an arbitrary runtime value.
  Term(Term),
}

impl Exit {
  /// Exit reason indicating normal task termination.
  pub const NORMAL: Self = Self::Atom(Atom::NORMAL);

  /// Exit reason indicating forced task termination.
  pub const KILLED: Self = Self::Atom(Atom::KILLED);

  /// Returns `true` if this exit reason represents normal termination.
  ///
  /// # Examples
  ///
  /// ```
  /// use portage::core::Exit;
  ///
  /// assert!(Exit::NORMAL.is_normal());
  /// assert!(!Exit::KILLED.is_normal());
  /// ```
  #[inline]
  pub fn is_normal(&self) -> bool {
    matches!(self, Self::Atom(atom) if *atom == Atom::NORMAL)
  }

  /// Returns `true` if this exit reason represents forced termination.
  #[inline]
  pub fn is_killed(&self) -> bool {
    matches!(self, Self::Atom(atom) if *atom == Atom::KILLED)
  }
}

impl Debug for Exit {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Atom(inner) => Debug::fmt(inner, f),
      Self::Term(inner) => Debug::fmt(inner, f),
    }
  }
}

impl Display for Exit {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Atom(inner) => Display::fmt(inner, f),
      Self::Term(inner) => Display::fmt(inner, f),
    }
  }
}

impl From<Atom> for Exit {
  #[inline]
  fn from(other: Atom) -> Self {
    Self::Atom(other)
  }
}

impl From<Term> for Exit {
  #[inline]
  fn from(other: Term) -> Self {
    Self::Term(other)
  }
}

// -----------------------------------------------------------------------------
// Fault
// -----------------------------------------------------------------------------

/// Structured description of an unanticipated task failure.
///
/// Wraps the rendered failure description and the captured stack trace into
/// a term suitable for use as an exit reason.
#[derive(Clone, Debug)]
#[repr(C)]
pub struct Fault {
  description: String,
  trace: String,
}

impl Fault {
  /// Creates a new fault descriptor.
  #[inline]
  pub(crate) fn new(description: String, trace: String) -> Self {
    Self { description, trace }
  }

  /// Returns the rendered failure description.
  #[inline]
  pub fn description(&self) -> &str {
    &self.description
  }

  /// Returns the rendered stack trace captured at the failure boundary.
  #[inline]
  pub fn trace(&self) -> &str {
    &self.trace
  }
}

impl Display for Fault {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str(&self.description)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
