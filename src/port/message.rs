use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::core::Atom;
use crate::core::Term;
use crate::port::Buffer;
use crate::port::ChannelId;
use crate::port::IoData;
use crate::port::PortHandle;
use crate::port::Readiness;
use crate::task::DynHandle;
use crate::task::ExitSignal;
use crate::task::Handle;

// -----------------------------------------------------------------------------
// Envelope
// -----------------------------------------------------------------------------

/// An addressed command sent to a port by an application task.
///
/// Envelopes are the application half of the port protocol: the sender
/// handle plus one [`Command`]. They are transported as [`Term`]s through
/// [`Handle::send`].
///
/// [`Handle::send`]: crate::task::Handle::send
#[derive(Clone, Debug)]
#[repr(C)]
pub struct Envelope {
  from: DynHandle,
  command: Command,
}

impl Envelope {
  /// Creates a new envelope.
  #[inline]
  pub fn new(from: impl Handle + 'static, command: Command) -> Self {
    Self {
      from: Box::new(from),
      command,
    }
  }

  /// Creates an output-command envelope.
  #[inline]
  pub fn output(from: impl Handle + 'static, data: IoData) -> Self {
    Self::new(from, Command::Output(data))
  }

  /// Creates a connect-command envelope.
  ///
  /// The payload must contain a handle to a local process task; anything
  /// else is a protocol violation that terminates the port.
  #[inline]
  pub fn connect(from: impl Handle + 'static, to: Term) -> Self {
    Self::new(from, Command::Connect(to))
  }

  /// Creates a close-command envelope.
  #[inline]
  pub fn close(from: impl Handle + 'static) -> Self {
    Self::new(from, Command::Close)
  }

  /// Creates an envelope from an already-boxed sender handle.
  #[inline]
  pub(crate) fn from_parts(from: DynHandle, command: Command) -> Self {
    Self { from, command }
  }

  /// Returns the sender handle.
  #[inline]
  pub fn from(&self) -> &DynHandle {
    &self.from
  }

  /// Returns the carried command.
  #[inline]
  pub fn command(&self) -> &Command {
    &self.command
  }

  /// Splits the envelope into sender and command.
  #[inline]
  pub(crate) fn into_parts(self) -> (DynHandle, Command) {
    (self.from, self.command)
  }
}

// -----------------------------------------------------------------------------
// Command
// -----------------------------------------------------------------------------

/// The command carried inside an [`Envelope`].
#[derive(Clone, Debug)]
pub enum Command {
  /// Write data to the driver.
  Output(IoData),
  /// Reassign port ownership to the contained process handle.
  Connect(Term),
  /// Shut the port down gracefully.
  Close,
  /// Unmatched arm: any other command is a protocol violation.
  Unknown(Term),
}

// -----------------------------------------------------------------------------
// Connected
// -----------------------------------------------------------------------------

/// Acknowledgement sent to the previous owner after a successful connect.
#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct Connected {
  port: PortHandle,
}

impl Connected {
  /// Creates a new acknowledgement.
  #[inline]
  pub(crate) fn new(port: PortHandle) -> Self {
    Self { port }
  }

  /// Returns the port whose ownership was reassigned.
  #[inline]
  pub fn port(&self) -> &PortHandle {
    &self.port
  }
}

// -----------------------------------------------------------------------------
// Bad Signal
// -----------------------------------------------------------------------------

/// Exit-reason payload produced when a port receives an unrecognized
/// message, carrying the offending value.
#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct BadSignal {
  detail: Term,
}

impl BadSignal {
  /// Creates a new bad-signal descriptor.
  #[inline]
  pub(crate) fn new(detail: Term) -> Self {
    Self { detail }
  }

  /// Returns the offending value.
  #[inline]
  pub fn detail(&self) -> &Term {
    &self.detail
  }
}

impl Display for BadSignal {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Display::fmt(&Atom::BADSIG, f)
  }
}

// -----------------------------------------------------------------------------
// Port Message
// -----------------------------------------------------------------------------

/// What a port's control loop consumes from its mailbox.
///
/// This is a closed union with exhaustive matching at the dispatch site;
/// the `Unknown` variant is the unmatched arm and terminates the loop with
/// a [`BadSignal`] reason.
#[derive(Debug)]
pub(crate) enum PortMessage {
  /// An addressed application command.
  Envelope(Envelope),
  /// An incoming exit signal from a linked task.
  Exit(ExitSignal),
  /// A deferred driver action posted by an out-of-context caller.
  Action(DeferredAction),
  /// Unmatched arm: a message of no recognized shape.
  Unknown(Term),
}

impl PortMessage {
  /// Decodes a transported term into a port message.
  pub(crate) fn decode(term: Term) -> Self {
    if term.is::<Envelope>() {
      // SAFETY: The type was verified on the line above.
      return Self::Envelope(*unsafe { term.downcast_unchecked::<Envelope>() });
    }

    Self::Unknown(term)
  }
}

// -----------------------------------------------------------------------------
// Deferred Action
// -----------------------------------------------------------------------------

/// A driver operation posted to the mailbox to force execution on the
/// control loop's own context.
///
/// Actions originating from the I/O-readiness subsystem travel on the
/// priority lane; flushes posted by `command` travel on the normal lane
/// with the rest of the application traffic.
#[derive(Debug)]
pub(crate) enum DeferredAction {
  /// Dispatch buffered output through the empty/single/vectored path.
  Flush(Vec<Buffer>),
  /// Fan a readiness bitmask out to the matching driver callbacks.
  Ready(ChannelId, Readiness),
  /// Tell the driver a channel was deregistered.
  Released(ChannelId),
  /// Report an I/O-subsystem fault observed on a channel.
  Fault(ChannelId, String),
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::core::Term;
  use crate::port::Command;
  use crate::port::Envelope;
  use crate::port::IoData;
  use crate::port::PortMessage;
  use crate::task::ProcHandle;
  use crate::task::ProcTask;

  #[test]
  fn test_decode_envelope() {
    let (handle, _task): (ProcHandle, ProcTask) = ProcTask::create();
    let term: Term = Term::new(Envelope::output(handle, IoData::from(&b"hi"[..])));

    match PortMessage::decode(term) {
      PortMessage::Envelope(envelope) => {
        assert!(matches!(envelope.command(), Command::Output(_)));
      }
      other => panic!("expected an envelope, got {other:?}"),
    }
  }

  #[test]
  fn test_decode_unknown_preserves_term() {
    let term: Term = Term::new(42_u32);

    match PortMessage::decode(term) {
      PortMessage::Unknown(term) => {
        assert_eq!(term.downcast_ref::<u32>(), Some(&42));
      }
      other => panic!("expected an unknown message, got {other:?}"),
    }
  }
}
