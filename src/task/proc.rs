use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use triomphe::Arc;

use crate::core::Exception;
use crate::core::Exit;
use crate::task::DynHandle;
use crate::task::Handle;
use crate::task::HandleId;
use crate::task::Mailbox;
use crate::task::MailboxSend;
use crate::task::RunState;
use crate::task::Signal;
use crate::task::StateCell;
use crate::task::Task;
use crate::task::channel;

// -----------------------------------------------------------------------------
// Proc Shared
// -----------------------------------------------------------------------------

/// State shared between a process task and its handles.
struct ProcShared {
  id: HandleId,
  send: MailboxSend<Signal>,
  state: StateCell,
  links: Mutex<HashMap<HandleId, DynHandle>>,
}

impl Task for ProcShared {
  fn deliver(&self, signal: Signal) {
    self.send.send(signal);
  }

  fn run_state(&self) -> RunState {
    self.state.load()
  }

  fn link(&self, other: DynHandle) {
    self.links.lock().insert(other.id(), other);
  }
}

impl Debug for ProcShared {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "ProcShared({})", self.id)
  }
}

// -----------------------------------------------------------------------------
// Proc Task
// -----------------------------------------------------------------------------

/// A minimal local process task: a mailbox, a run-state, and a linked set.
///
/// This is the concrete stand-in for the generic task substrate a full
/// runtime would provide. It exists so ports have an owner to be linked to:
/// the owner receives connect acknowledgements and observes port exits
/// through [`ProcTask::receive`].
#[derive(Debug)]
pub struct ProcTask {
  shared: Arc<ProcShared>,
  mailbox: Mailbox<Signal>,
}

impl ProcTask {
  /// Creates a new process task and its primary handle.
  pub fn create() -> (ProcHandle, Self) {
    let (send, mailbox): (MailboxSend<Signal>, Mailbox<Signal>) = channel();

    let shared: Arc<ProcShared> = Arc::new(ProcShared {
      id: HandleId::next(),
      send,
      state: StateCell::new(),
      links: Mutex::new(HashMap::new()),
    });

    shared.state.advance(RunState::Running);

    let handle: ProcHandle = ProcHandle {
      shared: Arc::clone(&shared),
    };

    (handle, Self { shared, mailbox })
  }

  /// Returns a handle to this task.
  pub fn handle(&self) -> ProcHandle {
    ProcHandle {
      shared: Arc::clone(&self.shared),
    }
  }

  /// Blocks until the next signal arrives in the mailbox.
  pub async fn receive(&mut self) -> Option<Signal> {
    self.mailbox.next().await
  }

  /// Terminates the task with the given `reason`.
  ///
  /// Every linked handle is notified with an exit signal before the task
  /// state is released.
  pub fn exit(self, reason: Exit) {
    self.shared.state.advance(RunState::Done);

    let links: Vec<DynHandle> = self
      .shared
      .links
      .lock()
      .drain()
      .map(|(_, handle)| handle)
      .collect();

    for handle in links {
      if let Err(error) = handle.exit_signal(self.shared.id, reason.clone()) {
        tracing::warn!(from = %self.shared.id, %error, "undeliverable exit signal");
      }
    }
  }
}

// -----------------------------------------------------------------------------
// Proc Handle
// -----------------------------------------------------------------------------

/// Handle addressing a local [`ProcTask`].
#[derive(Clone)]
#[repr(transparent)]
pub struct ProcHandle {
  shared: Arc<ProcShared>,
}

impl Handle for ProcHandle {
  fn id(&self) -> HandleId {
    self.shared.id
  }

  fn task(&self) -> Result<&dyn Task, Exception> {
    Ok(&*self.shared)
  }
}

impl Debug for ProcHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "ProcHandle({})", self.shared.id)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::core::Exit;
  use crate::core::Term;
  use crate::task::Handle;
  use crate::task::ProcHandle;
  use crate::task::ProcTask;
  use crate::task::RunState;
  use crate::task::Signal;

  #[tokio::test]
  async fn test_send_delivers_message() {
    let (handle, mut task): (ProcHandle, ProcTask) = ProcTask::create();

    handle.send(Term::new("ping")).unwrap();

    let signal: Signal = task.receive().await.unwrap();

    match signal {
      Signal::Message(term) => assert_eq!(term.downcast_ref::<&str>(), Some(&"ping")),
      Signal::Exit(_) => panic!("expected a message"),
    }
  }

  #[tokio::test]
  async fn test_exit_signal_delivers_exit() {
    let (handle, mut task): (ProcHandle, ProcTask) = ProcTask::create();
    let from: _ = handle.id();

    handle.exit_signal(from, Exit::NORMAL).unwrap();

    let signal: Signal = task.receive().await.unwrap();

    assert!(signal.is_exit());
  }

  #[tokio::test]
  async fn test_exit_notifies_linked_handles() {
    let (observer, mut observer_task): (ProcHandle, ProcTask) = ProcTask::create();
    let (_handle, task): (ProcHandle, ProcTask) = ProcTask::create();

    // One-way link: observer is notified when `task` exits.
    task.handle().link_oneway(Box::new(observer)).unwrap();
    task.exit(Exit::NORMAL);

    let signal: Signal = observer_task.receive().await.unwrap();

    match signal {
      Signal::Exit(exit) => assert!(exit.reason().is_normal()),
      Signal::Message(_) => panic!("expected an exit signal"),
    }
  }

  #[test]
  fn test_run_state_running_after_create() {
    let (handle, _task): (ProcHandle, ProcTask) = ProcTask::create();

    assert_eq!(handle.task().unwrap().run_state(), RunState::Running);
  }
}
