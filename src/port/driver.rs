use bitflags::bitflags;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::core::Exception;
use crate::core::Exit;
use crate::core::Term;
use crate::port::Buffer;

// -----------------------------------------------------------------------------
// Readiness
// -----------------------------------------------------------------------------

bitflags! {
  /// Bitmask describing which I/O operations a channel is ready for.
  ///
  /// Any subset may be asserted together in one notification; every matching
  /// driver callback fires.
  #[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
  pub struct Readiness: u32 {
    const READ    = 1 << 0;
    const WRITE   = 1 << 1;
    const CONNECT = 1 << 2;
    const ACCEPT  = 1 << 3;
  }
}

// -----------------------------------------------------------------------------
// Channel Id
// -----------------------------------------------------------------------------

/// Identity of a selectable I/O channel registered by a driver.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ChannelId(pub u64);

impl Display for ChannelId {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "ch{}", self.0)
  }
}

// -----------------------------------------------------------------------------
// Control Reply
// -----------------------------------------------------------------------------

/// Reply returned from a port `control` operation.
///
/// The payload shape follows the port's binary-payload flag: drivers reply
/// with raw bytes and the port maps them to a binary or to character data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlReply {
  /// Reply delivered as a binary.
  Binary(Buffer),
  /// Reply delivered as character data (a byte per character).
  Text(Buffer),
}

impl ControlReply {
  /// Returns the reply payload bytes.
  #[inline]
  pub fn bytes(&self) -> &[u8] {
    match self {
      Self::Binary(buffer) => buffer,
      Self::Text(buffer) => buffer,
    }
  }
}

// -----------------------------------------------------------------------------
// Driver
// -----------------------------------------------------------------------------

/// The concrete external-resource implementation driven by a port task.
///
/// A driver instance is owned 1:1 by its port task: output and readiness
/// callbacks are invoked only from the port's control-loop context, in
/// mailbox order. `control` and `call` are the deliberate exception - they
/// execute on the calling task's context and are serialized against the
/// control loop by the port, not by the driver.
///
/// # Failure
///
/// Output and readiness callbacks report application-level failures as
/// [`Exit`] reasons; a failure terminates the port and the reason is
/// propagated verbatim to every linked handle. `control` and `call` report
/// failures as [`Exception`]s surfaced synchronously to the caller.
pub trait Driver: Send {
  /// Writes a single buffer to the resource.
  ///
  /// An empty buffer is the canonical "empty output" and is delivered when
  /// a command's data flattens to zero buffers.
  fn output(&mut self, data: Buffer) -> Result<(), Exit>;

  /// Writes an ordered sequence of buffers to the resource.
  fn outputv(&mut self, data: Vec<Buffer>) -> Result<(), Exit>;

  /// Performs a synchronous control operation.
  ///
  /// Returns the reply payload, or [`None`] when the operation produces no
  /// reply.
  fn control(&mut self, op: u32, data: Buffer) -> Result<Option<Buffer>, Exception>;

  /// Performs a synchronous call operation; the result is returned to the
  /// caller unchanged.
  fn call(&mut self, op: u32, data: Term) -> Result<Term, Exception>;

  /// The channel became ready for reading.
  fn ready_input(&mut self, channel: ChannelId) -> Result<(), Exit> {
    let _ = channel;

    Ok(())
  }

  /// The channel became ready for writing.
  fn ready_output(&mut self, channel: ChannelId) -> Result<(), Exit> {
    let _ = channel;

    Ok(())
  }

  /// The channel completed an outbound connection.
  fn ready_connect(&mut self, channel: ChannelId) -> Result<(), Exit> {
    let _ = channel;

    Ok(())
  }

  /// The channel has an inbound connection to accept.
  fn ready_accept(&mut self, channel: ChannelId) -> Result<(), Exit> {
    let _ = channel;

    Ok(())
  }

  /// The channel was deregistered from the I/O-readiness subsystem.
  fn stop_select(&mut self, channel: ChannelId) {
    let _ = channel;
  }

  /// Releases the resource.
  ///
  /// Invoked exactly once, after the exit reason has been delivered to
  /// every linked handle.
  fn stop(&mut self);
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
