//! Portage - a port/driver bridge for a BEAM-style process runtime.
//!
//! Portage connects lightweight addressable tasks to stateful external
//! resources ("ports"). A port task owns exactly one driver instance and
//! turns three independent event sources - application messages, OS I/O
//! readiness notifications, and exit signals from linked tasks - into a
//! single, strictly ordered control loop.
//!
//! # Quick Start
//!
//! ```no_run
//! use portage::core::Term;
//! use portage::port::Envelope;
//! use portage::port::IoData;
//! use portage::port::PortTask;
//! use portage::task::Handle;
//! use portage::task::ProcTask;
//!
//! # async fn demo(driver: Box<dyn portage::port::Driver>) {
//! let (owner, _task) = ProcTask::create();
//! let port = PortTask::spawn(owner.clone(), driver, "cat", &[]).unwrap();
//!
//! port
//!   .send(Term::new(Envelope::output(
//!     owner.clone(),
//!     IoData::from(&b"hi"[..]),
//!   )))
//!   .unwrap();
//!
//! port.close(&owner).unwrap();
//! # }
//! ```
//!
//! # Core Modules
//!
//! - [`core`]: Leaf value types (atoms, terms, exit reasons, exceptions)
//! - [`task`]: Addressable handles, mailboxes, and the minimal task substrate
//! - [`port`]: The port task control loop and driver contract
//! - [`consts`]: Capacity and default constants

mod utils;

pub mod consts;
pub mod core;
pub mod port;
pub mod task;
