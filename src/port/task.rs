use hashbrown::HashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;
use std::mem;
use std::panic;
use std::panic::AssertUnwindSafe;
use triomphe::Arc;

use crate::core::Exception;
use crate::core::ExceptionGroup;
use crate::core::Exit;
use crate::core::Fault;
use crate::core::Term;
use crate::port::BadSignal;
use crate::port::Buffer;
use crate::port::ChannelId;
use crate::port::Command;
use crate::port::Connected;
use crate::port::ControlReply;
use crate::port::DeferredAction;
use crate::port::Driver;
use crate::port::Envelope;
use crate::port::PortMessage;
use crate::port::PortMode;
use crate::port::PortOptions;
use crate::port::Readiness;
use crate::port::Setting;
use crate::port::flatten;
use crate::task::DynHandle;
use crate::task::Handle;
use crate::task::HandleId;
use crate::task::Mailbox;
use crate::task::MailboxSend;
use crate::task::ProcHandle;
use crate::task::RunState;
use crate::task::Signal;
use crate::task::StateCell;
use crate::task::Task;
use crate::task::channel;
use crate::utils::CatchUnwind;

// -----------------------------------------------------------------------------
// Port Shared
// -----------------------------------------------------------------------------

/// State shared between a port task and its handles.
pub(crate) struct PortShared {
  id: HandleId,
  send: MailboxSend<PortMessage>,
  state: StateCell,
  links: Mutex<HashMap<HandleId, DynHandle>>,
  driver: Mutex<Box<dyn Driver>>,
  options: PortOptions,
}

impl Task for PortShared {
  /// Enqueues a signal on the normal lane.
  ///
  /// Incoming exit signals travel with the application traffic so the loop
  /// observes them in total arrival order.
  fn deliver(&self, signal: Signal) {
    match signal {
      Signal::Message(term) => self.send.send(PortMessage::decode(term)),
      Signal::Exit(exit) => self.send.send(PortMessage::Exit(exit)),
    }
  }

  fn run_state(&self) -> RunState {
    self.state.load()
  }

  fn link(&self, other: DynHandle) {
    self.links.lock().insert(other.id(), other);
  }
}

impl Debug for PortShared {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "PortShared({})", self.id)
  }
}

// -----------------------------------------------------------------------------
// Port Handle
// -----------------------------------------------------------------------------

/// Handle addressing a port task.
///
/// Messages go through [`Handle::send`]; the synchronous administrative
/// surface ([`control`], [`call`], [`command`]) and the I/O-readiness entry
/// points ([`ready`], [`released`], [`exit_exception`]) are direct methods.
///
/// [`control`]: Self::control
/// [`call`]: Self::call
/// [`command`]: Self::command
/// [`ready`]: Self::ready
/// [`released`]: Self::released
/// [`exit_exception`]: Self::exit_exception
#[derive(Clone)]
#[repr(transparent)]
pub struct PortHandle {
  shared: Arc<PortShared>,
}

impl PortHandle {
  /// Returns the identity of the port.
  #[inline]
  pub fn id(&self) -> HandleId {
    self.shared.id
  }

  /// Returns the parsed option set of the port.
  #[inline]
  pub fn options(&self) -> &PortOptions {
    &self.shared.options
  }

  /// Performs a synchronous control operation on the driver.
  ///
  /// The buffers are concatenated and forwarded to the driver's control
  /// operation. An empty or absent reply maps to an empty binary or empty
  /// character data depending on the port's binary-payload flag; a
  /// non-empty reply is returned under the same mapping.
  ///
  /// This call executes on the caller's context, not serialized through
  /// the mailbox; the driver instance is locked for the duration.
  ///
  /// # Errors
  ///
  /// Fails with `BadArg` unless the port is running.
  pub fn control(&self, op: u32, buffers: Vec<Buffer>) -> Result<ControlReply, Exception> {
    if self.shared.state.load() != RunState::Running {
      return Err(Exception::badarg("port is not running"));
    }

    let data: Buffer = flatten(buffers);
    let reply: Option<Buffer> = self.shared.driver.lock().control(op, data)?;
    let binary: bool = self.shared.options.binary();

    match reply {
      Some(buffer) if !buffer.is_empty() => {
        if binary {
          Ok(ControlReply::Binary(buffer))
        } else {
          Ok(ControlReply::Text(buffer))
        }
      }
      Some(_) | None => {
        if binary {
          Ok(ControlReply::Binary(Buffer::new()))
        } else {
          Ok(ControlReply::Text(Buffer::new()))
        }
      }
    }
  }

  /// Performs a synchronous call operation on the driver.
  ///
  /// The payload is forwarded opaquely and the driver's result is returned
  /// unchanged. Executes on the caller's context, like [`control`].
  ///
  /// # Errors
  ///
  /// Fails with `BadArg` unless the port is running.
  ///
  /// [`control`]: Self::control
  pub fn call(&self, op: u32, data: Term) -> Result<Term, Exception> {
    if self.shared.state.load() != RunState::Running {
      return Err(Exception::badarg("port is not running"));
    }

    self.shared.driver.lock().call(op, data)
  }

  /// Posts buffered output for execution on the control-loop context.
  ///
  /// The posted action performs the same empty/single/vectored output
  /// dispatch as an output command envelope. It travels on the normal lane
  /// and keeps its order relative to other application traffic.
  ///
  /// # Errors
  ///
  /// Fails with `NotImpl` unless the port is in stream mode: non-stream
  /// modes require length or line framing not supported by this path.
  pub fn command(&self, buffers: Vec<Buffer>) -> Result<(), Exception> {
    if self.shared.options.mode() != PortMode::Stream {
      return Err(Exception::new(ExceptionGroup::NotImpl, "framed command output"));
    }

    self.shared.send.send(PortMessage::Action(DeferredAction::Flush(buffers)));

    Ok(())
  }

  /// Requests a graceful shutdown of the port on behalf of `from`.
  ///
  /// This is shorthand for sending a close-command envelope.
  pub fn close(&self, from: &(dyn Handle + 'static)) -> Result<(), Exception> {
    let envelope: Envelope = Envelope::from_parts(dyn_clone::clone_box(from), Command::Close);

    self.send(Term::new(envelope))
  }

  // ---------------------------------------------------------------------------
  // I/O-Readiness Entry Points
  // ---------------------------------------------------------------------------

  /// Reports that `channel` is ready for the operations in `ops`.
  ///
  /// Posts a priority deferred action that fans the bitmask out to the
  /// matching driver callbacks from the control-loop context. Priority
  /// delivery may overtake application messages already queued.
  pub fn ready(&self, channel: ChannelId, ops: Readiness) {
    self
      .shared
      .send
      .send_priority(PortMessage::Action(DeferredAction::Ready(channel, ops)));
  }

  /// Reports that `channel` was deregistered from the readiness subsystem.
  pub fn released(&self, channel: ChannelId) {
    self
      .shared
      .send
      .send_priority(PortMessage::Action(DeferredAction::Released(channel)));
  }

  /// Reports an I/O-subsystem fault observed on `channel`.
  ///
  /// The fault is delivered into the same deferred mechanism as readiness
  /// notifications and logged from the loop context; it is not wired to
  /// driver logic.
  pub fn exit_exception(&self, channel: ChannelId, error: io::Error) {
    self.shared.send.send_priority(PortMessage::Action(DeferredAction::Fault(
      channel,
      error.to_string(),
    )));
  }
}

impl Handle for PortHandle {
  fn id(&self) -> HandleId {
    self.shared.id
  }

  fn task(&self) -> Result<&dyn Task, Exception> {
    Ok(&*self.shared)
  }
}

impl Debug for PortHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "PortHandle({})", self.shared.id)
  }
}

// -----------------------------------------------------------------------------
// Loop Exit
// -----------------------------------------------------------------------------

/// How the control loop ended; computed once and consumed by the
/// notification step.
enum LoopExit {
  /// Graceful shutdown: a close command or an incoming exit signal.
  Closed,
  /// Application-level failure with the causing reason.
  Failure(Exit),
}

// -----------------------------------------------------------------------------
// Port Task
// -----------------------------------------------------------------------------

/// The control loop owning one driver instance.
///
/// A port task consumes its mailbox one message at a time and translates
/// every message into a driver action or a state transition. Loop exit is
/// converted into an exit reason delivered to every linked handle before
/// the driver is released.
pub struct PortTask {
  shared: Arc<PortShared>,
  mailbox: Mailbox<PortMessage>,
  owner: ProcHandle,
}

impl PortTask {
  /// Opens a port: parses `settings`, links the port to `owner`, and
  /// starts the control loop.
  ///
  /// The port and its owner are linked both ways, so the owner observes
  /// the port's exit reason and the port is closed when the owner dies.
  /// The returned handle addresses the running port.
  ///
  /// Must be called from within a tokio runtime.
  ///
  /// # Errors
  ///
  /// Fails with `BadArg` if the settings list does not parse.
  pub fn spawn(
    owner: ProcHandle,
    driver: Box<dyn Driver>,
    command: &str,
    settings: &[Setting],
  ) -> Result<PortHandle, Exception> {
    let options: PortOptions = PortOptions::parse(command, settings)?;
    let (send, mailbox): (MailboxSend<PortMessage>, Mailbox<PortMessage>) = channel();

    let shared: Arc<PortShared> = Arc::new(PortShared {
      id: HandleId::next(),
      send,
      state: StateCell::new(),
      links: Mutex::new(HashMap::new()),
      driver: Mutex::new(driver),
      options,
    });

    let handle: PortHandle = PortHandle {
      shared: Arc::clone(&shared),
    };

    handle.link_oneway(Box::new(owner.clone()))?;
    owner.link_oneway(Box::new(handle.clone()))?;

    // The port accepts control/call as soon as spawn returns.
    shared.state.advance(RunState::Running);

    tracing::debug!(port = %shared.id, owner = %owner.id(), %command, "Port Spawn");

    let task: Self = Self {
      shared,
      mailbox,
      owner,
    };

    tokio::spawn(task.run());

    Ok(handle)
  }

  /// Runs the loop to completion, then performs the termination protocol:
  /// compute the exit reason, deliver it to every linked handle, and stop
  /// the driver.
  ///
  /// An abort of the backing task is never intercepted; it drops the loop
  /// at an await point without running any of the termination steps.
  async fn run(mut self) {
    let exit: Exit = {
      let looped: _ = CatchUnwind::new(AssertUnwindSafe(self.main_loop()));

      tokio::pin!(looped);

      match looped.await {
        Ok(LoopExit::Closed) => Exit::NORMAL,
        Ok(LoopExit::Failure(exit)) => exit,
        Err(panic) => Exit::Term(Term::new(Fault::new(
          describe_panic(&*panic),
          Backtrace::force_capture().to_string(),
        ))),
      }
    };

    self.shared.state.advance(RunState::Done);

    let id: HandleId = self.shared.id;

    let links: Vec<DynHandle> = self
      .shared
      .links
      .lock()
      .drain()
      .map(|(_, handle)| handle)
      .collect();

    // Last line of defense: a failure while notifying or stopping must not
    // take the runtime down with it.
    let finish: Result<(), _> = panic::catch_unwind(AssertUnwindSafe(|| {
      for handle in links {
        if let Err(error) = handle.exit_signal(id, exit.clone()) {
          tracing::warn!(port = %id, %error, "undeliverable exit signal");
        }
      }

      self.shared.driver.lock().stop();
    }));

    if let Err(panic) = finish {
      tracing::error!(port = %id, error = %describe_panic(&*panic), "port cleanup failure");
    }

    tracing::debug!(port = %id, %exit, "Port Exit");
  }

  /// Consumes the mailbox until a message ends the loop.
  async fn main_loop(&mut self) -> LoopExit {
    loop {
      let Some(message) = self.mailbox.next().await else {
        return LoopExit::Closed;
      };

      match message {
        PortMessage::Envelope(envelope) => match envelope.into_parts() {
          (_, Command::Output(data)) => {
            tracing::trace!(port = %self.shared.id, signal = "command");

            if let Err(exit) = self.flush(data.collect()) {
              return LoopExit::Failure(exit);
            }
          }
          (_, Command::Connect(payload)) => {
            let Some(new_owner) = payload.downcast_ref::<ProcHandle>().cloned() else {
              tracing::trace!(port = %self.shared.id, signal = "connect", result = "badsig");
              return LoopExit::Failure(badsig(payload));
            };

            let previous: ProcHandle = mem::replace(&mut self.owner, new_owner);
            let ack: Term = Term::new(Connected::new(PortHandle {
              shared: Arc::clone(&self.shared),
            }));

            if let Err(error) = previous.send(ack) {
              tracing::warn!(port = %self.shared.id, %error, "undeliverable connect ack");
            }

            tracing::trace!(port = %self.shared.id, signal = "connect", result = "handled");
          }
          (_, Command::Close) => {
            tracing::trace!(port = %self.shared.id, signal = "close", result = "closing");
            return LoopExit::Closed;
          }
          (_, Command::Unknown(term)) => {
            tracing::trace!(port = %self.shared.id, signal = "unknown", result = "badsig");
            return LoopExit::Failure(badsig(term));
          }
        },
        PortMessage::Exit(signal) => {
          // The signal payload is discarded; only the act of closing matters.
          tracing::trace!(port = %self.shared.id, signal = "exit", from = %signal.from(), result = "closing");
          return LoopExit::Closed;
        }
        PortMessage::Action(action) => {
          if let Err(exit) = self.execute(action) {
            return LoopExit::Failure(exit);
          }
        }
        PortMessage::Unknown(term) => {
          tracing::trace!(port = %self.shared.id, signal = "unknown", result = "badsig");
          return LoopExit::Failure(badsig(term));
        }
      }
    }
  }

  /// Dispatches buffered output through the empty/single/vectored path.
  fn flush(&self, mut buffers: Vec<Buffer>) -> Result<(), Exit> {
    let mut driver: _ = self.shared.driver.lock();

    match buffers.len() {
      0 => driver.output(Buffer::new()),
      1 => driver.output(buffers.swap_remove(0)),
      _ => driver.outputv(buffers),
    }
  }

  /// Executes a deferred action on the control-loop context.
  fn execute(&self, action: DeferredAction) -> Result<(), Exit> {
    match action {
      DeferredAction::Flush(buffers) => self.flush(buffers),
      DeferredAction::Ready(channel, ops) => {
        let mut driver: _ = self.shared.driver.lock();

        if ops.contains(Readiness::READ) {
          driver.ready_input(channel)?;
        }

        if ops.contains(Readiness::WRITE) {
          driver.ready_output(channel)?;
        }

        if ops.contains(Readiness::CONNECT) {
          driver.ready_connect(channel)?;
        }

        if ops.contains(Readiness::ACCEPT) {
          driver.ready_accept(channel)?;
        }

        Ok(())
      }
      DeferredAction::Released(channel) => {
        self.shared.driver.lock().stop_select(channel);

        Ok(())
      }
      DeferredAction::Fault(channel, error) => {
        tracing::warn!(port = %self.shared.id, %channel, %error, "selector fault");

        Ok(())
      }
    }
  }
}

// -----------------------------------------------------------------------------
// Misc. Utilities
// -----------------------------------------------------------------------------

/// Builds the exit reason for a protocol violation, carrying the offending
/// value.
fn badsig(detail: Term) -> Exit {
  Exit::Term(Term::new(BadSignal::new(detail)))
}

/// Renders a panic payload as text.
fn describe_panic(panic: &(dyn Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    return (*message).to_owned();
  }

  if let Some(message) = panic.downcast_ref::<String>() {
    return message.clone();
  }

  String::from("unknown panic")
}
