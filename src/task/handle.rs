use dyn_clone::DynClone;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::core::Exception;
use crate::core::ExceptionGroup;
use crate::core::Exit;
use crate::core::Term;
use crate::task::ExitSignal;
use crate::task::RunState;
use crate::task::Signal;

// -----------------------------------------------------------------------------
// Handle Id
// -----------------------------------------------------------------------------

/// Runtime-unique identity of an addressable task.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HandleId {
  bits: u64,
}

impl HandleId {
  /// Returns the next unused handle identity.
  #[inline]
  pub(crate) fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    Self {
      bits: COUNTER.fetch_add(1, Ordering::Relaxed),
    }
  }
}

impl Debug for HandleId {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "#{}", self.bits)
  }
}

impl Display for HandleId {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "#{}", self.bits)
  }
}

// -----------------------------------------------------------------------------
// Task
// -----------------------------------------------------------------------------

/// The narrow interface backing a local [`Handle`].
///
/// A task owns a mailbox, a run-state, and the set of handles linked to it.
/// Everything a handle can do resolves to one of these three capabilities.
pub trait Task: Debug + Send + Sync {
  /// Enqueues a signal for the owning control loop.
  fn deliver(&self, signal: Signal);

  /// Returns the current run-state of the task.
  fn run_state(&self) -> RunState;

  /// Records `other` as linked to this task.
  ///
  /// When this task terminates, `other` receives an exit signal carrying
  /// the computed exit reason.
  fn link(&self, other: DynHandle);
}

// -----------------------------------------------------------------------------
// Handle
// -----------------------------------------------------------------------------

/// Boxed, clonable handle trait object.
pub type DynHandle = Box<dyn Handle>;

/// Capability reference to an addressable task - a process or a port.
///
/// Handles can be sent messages and exit signals, and can be linked for
/// failure propagation. Every local handle resolves to exactly one [`Task`];
/// handles for entities outside the local runtime fail with a `NotSup`
/// exception when asked for their task.
pub trait Handle: Debug + DynClone + Send + Sync {
  /// Returns the identity of the referenced task.
  fn id(&self) -> HandleId;

  /// Resolves the handle to its owning task reference.
  ///
  /// # Errors
  ///
  /// Fails with a `NotSup` exception for handles that do not reference a
  /// task reachable from the local runtime.
  fn task(&self) -> Result<&dyn Task, Exception> {
    Err(Exception::new(
      ExceptionGroup::NotSup,
      "only local handles provide a task reference",
    ))
  }

  /// Sends `message` to the referenced task.
  ///
  /// Delivery to a task that has already terminated is a no-op.
  fn send(&self, message: Term) -> Result<(), Exception> {
    self.task()?.deliver(Signal::Message(message));

    Ok(())
  }

  /// Sends an exit signal with the given `reason` to the referenced task.
  fn exit_signal(&self, from: HandleId, reason: Exit) -> Result<(), Exception> {
    self.task()?.deliver(Signal::Exit(ExitSignal::new(from, reason)));

    Ok(())
  }

  /// Records a one-way link: `other` is notified when this task terminates.
  ///
  /// Establishing the reciprocal link is the caller's responsibility; this
  /// call only updates local bookkeeping.
  fn link_oneway(&self, other: DynHandle) -> Result<(), Exception> {
    self.task()?.link(other);

    Ok(())
  }
}

dyn_clone::clone_trait_object!(Handle);

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::core::ExceptionGroup;
  use crate::core::Exit;
  use crate::core::Term;
  use crate::task::Handle;
  use crate::task::HandleId;

  /// A handle for an entity outside the local runtime.
  #[derive(Clone, Debug)]
  struct ForeignHandle {
    id: HandleId,
  }

  impl Handle for ForeignHandle {
    fn id(&self) -> HandleId {
      self.id
    }
  }

  #[test]
  fn test_handle_ids_unique() {
    assert_ne!(HandleId::next(), HandleId::next());
  }

  #[test]
  fn test_foreign_handle_has_no_task() {
    let handle: ForeignHandle = ForeignHandle {
      id: HandleId::next(),
    };

    let error: _ = handle.task().unwrap_err();

    assert_eq!(error.group(), ExceptionGroup::NotSup);
  }

  #[test]
  fn test_foreign_handle_send_fails() {
    let handle: ForeignHandle = ForeignHandle {
      id: HandleId::next(),
    };

    assert!(handle.send(Term::new("hello")).is_err());
    assert!(handle.exit_signal(handle.id(), Exit::NORMAL).is_err());
  }
}
