//! Addressable-task substrate: handles, mailboxes, and run-states.
//!
//! This module provides the narrow interface the port layer composes with:
//! a [`Handle`] is the capability to send messages and exit signals to a
//! [`Task`], and to record one-way links for failure propagation.

mod handle;
mod mailbox;
mod proc;
mod signal;
mod state;

pub(crate) use self::mailbox::Mailbox;
pub(crate) use self::mailbox::MailboxSend;
pub(crate) use self::mailbox::channel;

pub use self::handle::DynHandle;
pub use self::handle::Handle;
pub use self::handle::HandleId;
pub use self::handle::Task;
pub use self::proc::ProcHandle;
pub use self::proc::ProcTask;
pub use self::signal::ExitSignal;
pub use self::signal::Signal;
pub use self::state::RunState;
pub(crate) use self::state::StateCell;
