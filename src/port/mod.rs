//! The port layer: a port task owns one driver instance and bridges it to
//! the task substrate.
//!
//! A port is opened with [`PortTask::spawn`], which parses the open-time
//! settings, links the port to its owner, and starts the control loop. The
//! returned [`PortHandle`] is the addressable surface: application messages
//! go through [`Handle::send`], administrative operations through
//! [`PortHandle::control`] and [`PortHandle::call`], and the I/O-readiness
//! subsystem reports through [`PortHandle::ready`] and
//! [`PortHandle::released`].
//!
//! [`Handle::send`]: crate::task::Handle::send

mod driver;
mod iodata;
mod message;
mod options;
mod task;

pub(crate) use self::message::DeferredAction;
pub(crate) use self::message::PortMessage;

pub use self::driver::ChannelId;
pub use self::driver::ControlReply;
pub use self::driver::Driver;
pub use self::driver::Readiness;
pub use self::iodata::Buffer;
pub use self::iodata::IoData;
pub use self::iodata::flatten;
pub use self::message::BadSignal;
pub use self::message::Command;
pub use self::message::Connected;
pub use self::message::Envelope;
pub use self::options::EnvEntry;
pub use self::options::PortFds;
pub use self::options::PortMode;
pub use self::options::PortOptions;
pub use self::options::Setting;
pub use self::task::PortHandle;
pub use self::task::PortTask;
