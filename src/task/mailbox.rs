use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use triomphe::Arc;

use crate::consts::CAP_MAILBOX_PRIORITY;

/// Creates a connected mailbox sender/receiver pair.
#[inline]
pub(crate) fn channel<T>() -> (MailboxSend<T>, Mailbox<T>) {
  let (send, recv): _ = mpsc::unbounded_channel();

  let lane: Arc<PriorityLane<T>> = Arc::new(PriorityLane {
    queue: Mutex::new(VecDeque::with_capacity(CAP_MAILBOX_PRIORITY)),
    notify: Notify::new(),
  });

  let mailbox_send: MailboxSend<T> = MailboxSend {
    inner: send,
    lane: Arc::clone(&lane),
  };

  let mailbox: Mailbox<T> = Mailbox {
    external: recv,
    lane,
  };

  (mailbox_send, mailbox)
}

// -----------------------------------------------------------------------------
// Priority Lane
// -----------------------------------------------------------------------------

/// Overtaking lane for infrastructure events.
///
/// Messages inserted here are drained strictly before the normal lane at
/// each receive, letting I/O readiness notifications overtake queued
/// application traffic. No ordering guarantee stronger than "may overtake
/// already-queued normal messages" is made relative to an in-flight dequeue.
struct PriorityLane<T> {
  queue: Mutex<VecDeque<T>>,
  notify: Notify,
}

impl<T> PriorityLane<T> {
  #[inline]
  fn pop(&self) -> Option<T> {
    self.queue.lock().pop_front()
  }

  #[inline]
  fn push(&self, message: T) {
    self.queue.lock().push_back(message);
    self.notify.notify_one();
  }
}

// -----------------------------------------------------------------------------
// Mailbox Send
// -----------------------------------------------------------------------------

/// Sending side of a task mailbox.
pub(crate) struct MailboxSend<T> {
  inner: UnboundedSender<T>,
  lane: Arc<PriorityLane<T>>,
}

impl<T> MailboxSend<T> {
  /// Enqueues a message on the normal lane.
  ///
  /// Delivery to a task whose loop has exited is a no-op.
  #[inline]
  pub(crate) fn send(&self, message: T) {
    let _ = self.inner.send(message);
  }

  /// Enqueues a message on the priority lane.
  ///
  /// Priority messages may overtake messages already queued on the normal
  /// lane.
  #[inline]
  pub(crate) fn send_priority(&self, message: T) {
    self.lane.push(message);
  }
}

impl<T> Clone for MailboxSend<T> {
  #[inline]
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      lane: Arc::clone(&self.lane),
    }
  }
}

impl<T> Debug for MailboxSend<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str("MailboxSend(..)")
  }
}

// -----------------------------------------------------------------------------
// Mailbox
// -----------------------------------------------------------------------------

/// Receiving side of a task mailbox; owned by exactly one control loop.
pub(crate) struct Mailbox<T> {
  external: UnboundedReceiver<T>,
  lane: Arc<PriorityLane<T>>,
}

impl<T> Mailbox<T> {
  /// Blocks until the next message arrives.
  ///
  /// The priority lane is drained before the normal lane. Returns [`None`]
  /// once every sender has been dropped and both lanes are empty.
  pub(crate) async fn next(&mut self) -> Option<T> {
    loop {
      let notified: _ = self.lane.notify.notified();

      if let Some(message) = self.lane.pop() {
        return Some(message);
      }

      tokio::select! {
        biased;
        _ = notified => continue,
        message = self.external.recv() => match message {
          Some(message) => return Some(message),
          None => return self.lane.pop(),
        },
      }
    }
  }
}

impl<T> Debug for Mailbox<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str("Mailbox(..)")
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
