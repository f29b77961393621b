//! End-to-end behavior of the port control loop, driven through a scripted
//! recording driver.
//!
//! All tests run on a current-thread runtime: the port loop only makes
//! progress at await points, which makes mailbox backlogs (and the priority
//! overtake they enable) deterministic.

use parking_lot::Mutex;
use triomphe::Arc;

use portage::core::Exception;
use portage::core::ExceptionGroup;
use portage::core::Exit;
use portage::core::Fault;
use portage::core::Term;
use portage::port::BadSignal;
use portage::port::Buffer;
use portage::port::ChannelId;
use portage::port::Command;
use portage::port::Connected;
use portage::port::ControlReply;
use portage::port::Driver;
use portage::port::Envelope;
use portage::port::IoData;
use portage::port::PortHandle;
use portage::port::PortMode;
use portage::port::PortTask;
use portage::port::Readiness;
use portage::port::Setting;
use portage::task::Handle;
use portage::task::ProcHandle;
use portage::task::ProcTask;
use portage::task::Signal;

// -----------------------------------------------------------------------------
// Recording Driver
// -----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
  Output(Vec<u8>),
  OutputV(Vec<Vec<u8>>),
  Control(u32, Vec<u8>),
  Call(u32),
  ReadyInput(ChannelId),
  ReadyOutput(ChannelId),
  ReadyConnect(ChannelId),
  ReadyAccept(ChannelId),
  StopSelect(ChannelId),
  Stop,
}

type EventLog = Arc<Mutex<Vec<Event>>>;

/// Scripted driver that records every callback it receives.
struct RecordingDriver {
  log: EventLog,
  control_reply: Option<Buffer>,
  output_error: Option<&'static str>,
  output_panics: bool,
}

impl RecordingDriver {
  fn create() -> (EventLog, Box<Self>) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));

    let driver: Self = Self {
      log: Arc::clone(&log),
      control_reply: None,
      output_error: None,
      output_panics: false,
    };

    (log, Box::new(driver))
  }

  fn with_control_reply(mut self: Box<Self>, reply: Option<Buffer>) -> Box<Self> {
    self.control_reply = reply;
    self
  }

  fn with_output_error(mut self: Box<Self>, reason: &'static str) -> Box<Self> {
    self.output_error = Some(reason);
    self
  }

  fn with_output_panic(mut self: Box<Self>) -> Box<Self> {
    self.output_panics = true;
    self
  }
}

impl Driver for RecordingDriver {
  fn output(&mut self, data: Buffer) -> Result<(), Exit> {
    if self.output_panics {
      panic!("driver bug");
    }

    if let Some(reason) = self.output_error {
      return Err(Exit::Term(Term::new(reason)));
    }

    self.log.lock().push(Event::Output(data));

    Ok(())
  }

  fn outputv(&mut self, data: Vec<Buffer>) -> Result<(), Exit> {
    self.log.lock().push(Event::OutputV(data));

    Ok(())
  }

  fn control(&mut self, op: u32, data: Buffer) -> Result<Option<Buffer>, Exception> {
    self.log.lock().push(Event::Control(op, data));

    Ok(self.control_reply.clone())
  }

  fn call(&mut self, op: u32, _data: Term) -> Result<Term, Exception> {
    self.log.lock().push(Event::Call(op));

    Ok(Term::new(99_u64))
  }

  fn ready_input(&mut self, channel: ChannelId) -> Result<(), Exit> {
    self.log.lock().push(Event::ReadyInput(channel));

    Ok(())
  }

  fn ready_output(&mut self, channel: ChannelId) -> Result<(), Exit> {
    self.log.lock().push(Event::ReadyOutput(channel));

    Ok(())
  }

  fn ready_connect(&mut self, channel: ChannelId) -> Result<(), Exit> {
    self.log.lock().push(Event::ReadyConnect(channel));

    Ok(())
  }

  fn ready_accept(&mut self, channel: ChannelId) -> Result<(), Exit> {
    self.log.lock().push(Event::ReadyAccept(channel));

    Ok(())
  }

  fn stop_select(&mut self, channel: ChannelId) {
    self.log.lock().push(Event::StopSelect(channel));
  }

  fn stop(&mut self) {
    self.log.lock().push(Event::Stop);
  }
}

// -----------------------------------------------------------------------------
// Misc. Utilities
// -----------------------------------------------------------------------------

/// Receives the next signal, asserting it is an exit from `port`, and
/// returns the exit reason.
async fn expect_exit(task: &mut ProcTask, port: &PortHandle) -> Exit {
  match task.receive().await.expect("owner mailbox closed") {
    Signal::Exit(signal) => {
      assert_eq!(signal.from(), port.id());
      signal.reason().clone()
    }
    Signal::Message(term) => panic!("expected an exit signal, got {term:?}"),
  }
}

// -----------------------------------------------------------------------------
// Tests - End to End
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_open_send_close() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let settings: Vec<Setting> = vec![Setting::pair("args", vec![String::from("x")])];
  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &settings).unwrap();

  assert_eq!(port.options().argv(), &[String::from("cmd"), String::from("x")]);
  assert_eq!(port.options().mode(), PortMode::Stream);
  assert_eq!(port.options().fds().input, 1);
  assert_eq!(port.options().fds().output, 2);

  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("hi"))))
    .unwrap();

  port.close(&owner).unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  assert!(exit.is_normal());
  assert_eq!(
    *log.lock(),
    vec![Event::Output(b"hi".to_vec()), Event::Stop],
  );
}

#[tokio::test]
async fn test_empty_output_path() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::output(
      owner.clone(),
      IoData::Bytes(Vec::new()),
    )))
    .unwrap();

  port.close(&owner).unwrap();
  expect_exit(&mut owner_task, &port).await;

  assert_eq!(*log.lock(), vec![Event::Output(Vec::new()), Event::Stop]);
}

#[tokio::test]
async fn test_vectored_output_path() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  let data: IoData = IoData::List(vec![IoData::from("ab"), IoData::from("cd")]);

  port
    .send(Term::new(Envelope::output(owner.clone(), data)))
    .unwrap();

  port.close(&owner).unwrap();
  expect_exit(&mut owner_task, &port).await;

  assert_eq!(
    *log.lock(),
    vec![
      Event::OutputV(vec![b"ab".to_vec(), b"cd".to_vec()]),
      Event::Stop,
    ],
  );
}

// -----------------------------------------------------------------------------
// Tests - Ordering
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_commands_processed_in_arrival_order() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("a"))))
    .unwrap();
  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("b"))))
    .unwrap();

  port.close(&owner).unwrap();
  expect_exit(&mut owner_task, &port).await;

  assert_eq!(
    *log.lock(),
    vec![
      Event::Output(b"a".to_vec()),
      Event::Output(b"b".to_vec()),
      Event::Stop,
    ],
  );
}

#[tokio::test]
async fn test_readiness_overtakes_queued_commands() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();
  let channel: ChannelId = ChannelId(7);

  // The loop has not run yet on this current-thread runtime, so the
  // readiness notification overtakes the already-queued command.
  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("a"))))
    .unwrap();
  port.ready(channel, Readiness::READ);

  port.close(&owner).unwrap();
  expect_exit(&mut owner_task, &port).await;

  assert_eq!(
    *log.lock(),
    vec![
      Event::ReadyInput(channel),
      Event::Output(b"a".to_vec()),
      Event::Stop,
    ],
  );
}

#[tokio::test]
async fn test_command_flush_keeps_application_order() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("a"))))
    .unwrap();
  port.command(vec![b"b".to_vec()]).unwrap();

  port.close(&owner).unwrap();
  expect_exit(&mut owner_task, &port).await;

  assert_eq!(
    *log.lock(),
    vec![
      Event::Output(b"a".to_vec()),
      Event::Output(b"b".to_vec()),
      Event::Stop,
    ],
  );
}

// -----------------------------------------------------------------------------
// Tests - Readiness Dispatch
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_readiness_bitmask_fans_out() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();
  let channel: ChannelId = ChannelId(3);

  port.ready(channel, Readiness::READ | Readiness::WRITE | Readiness::ACCEPT);

  port.close(&owner).unwrap();
  expect_exit(&mut owner_task, &port).await;

  assert_eq!(
    *log.lock(),
    vec![
      Event::ReadyInput(channel),
      Event::ReadyOutput(channel),
      Event::ReadyAccept(channel),
      Event::Stop,
    ],
  );
}

#[tokio::test]
async fn test_released_stops_selecting() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();
  let channel: ChannelId = ChannelId(5);

  port.released(channel);

  port.close(&owner).unwrap();
  expect_exit(&mut owner_task, &port).await;

  assert_eq!(*log.lock(), vec![Event::StopSelect(channel), Event::Stop]);
}

#[tokio::test]
async fn test_exit_exception_is_not_fatal() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port.exit_exception(
    ChannelId(1),
    std::io::Error::new(std::io::ErrorKind::Other, "selector died"),
  );

  port.close(&owner).unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  assert!(exit.is_normal());
  assert_eq!(*log.lock(), vec![Event::Stop]);
}

// -----------------------------------------------------------------------------
// Tests - Control / Call
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_control_concatenates_buffers() {
  let (owner, _owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner, driver, "cmd", &[]).unwrap();

  port.control(9, vec![b"ab".to_vec(), b"cd".to_vec()]).unwrap();

  assert_eq!(*log.lock(), vec![Event::Control(9, b"abcd".to_vec())]);
}

#[tokio::test]
async fn test_control_empty_reply_mapping() {
  let (owner, _owner_task): (ProcHandle, ProcTask) = ProcTask::create();

  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();
  let text_port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();
  let binary_port: PortHandle =
    PortTask::spawn(owner, driver, "cmd", &[Setting::flag("binary")]).unwrap();

  assert_eq!(
    text_port.control(0, Vec::new()).unwrap(),
    ControlReply::Text(Vec::new()),
  );
  assert_eq!(
    binary_port.control(0, Vec::new()).unwrap(),
    ControlReply::Binary(Vec::new()),
  );
}

#[tokio::test]
async fn test_control_reply_mapping_preserves_bytes() {
  let (owner, _owner_task): (ProcHandle, ProcTask) = ProcTask::create();

  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();
  let driver: Box<RecordingDriver> = driver.with_control_reply(Some(b"xyz".to_vec()));
  let text_port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();
  let driver: Box<RecordingDriver> = driver.with_control_reply(Some(b"xyz".to_vec()));
  let binary_port: PortHandle =
    PortTask::spawn(owner, driver, "cmd", &[Setting::flag("binary")]).unwrap();

  assert_eq!(
    text_port.control(0, Vec::new()).unwrap(),
    ControlReply::Text(b"xyz".to_vec()),
  );
  assert_eq!(
    binary_port.control(0, Vec::new()).unwrap(),
    ControlReply::Binary(b"xyz".to_vec()),
  );
}

#[tokio::test]
async fn test_call_passes_result_through() {
  let (owner, _owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner, driver, "cmd", &[]).unwrap();
  let result: Term = port.call(4, Term::new("payload")).unwrap();

  assert_eq!(result.downcast_ref::<u64>(), Some(&99));
  assert_eq!(*log.lock(), vec![Event::Call(4)]);
}

#[tokio::test]
async fn test_command_rejected_outside_stream_mode() {
  let (owner, _owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let settings: Vec<Setting> = vec![Setting::pair("packet", 4_usize)];
  let port: PortHandle = PortTask::spawn(owner, driver, "cmd", &settings).unwrap();

  let error: Exception = port.command(vec![b"x".to_vec()]).unwrap_err();

  assert_eq!(error.group(), ExceptionGroup::NotImpl);
}

// -----------------------------------------------------------------------------
// Tests - Close Finality
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_close_is_final() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port.close(&owner).unwrap();

  // Queued behind the close; must never be dispatched.
  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("late"))))
    .unwrap();

  expect_exit(&mut owner_task, &port).await;

  let error: Exception = port.control(0, Vec::new()).unwrap_err();

  assert_eq!(error.group(), ExceptionGroup::BadArg);
  assert!(port.call(0, Term::new(0_u8)).is_err());
  assert_eq!(*log.lock(), vec![Event::Stop]);
}

// -----------------------------------------------------------------------------
// Tests - Connect
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_reassigns_owner_and_acks() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (other, _other_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::connect(
      owner.clone(),
      Term::new(other.clone()),
    )))
    .unwrap();

  // The previous owner receives the acknowledgement.
  match owner_task.receive().await.unwrap() {
    Signal::Message(term) => {
      let ack: &Connected = term.downcast_ref::<Connected>().unwrap();

      assert_eq!(ack.port().id(), port.id());
    }
    Signal::Exit(_) => panic!("expected a connect ack"),
  }

  // The original owner stays linked and still observes the exit.
  port.close(&other).unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  assert!(exit.is_normal());
}

#[tokio::test]
async fn test_connect_to_non_process_is_badsig() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::connect(owner.clone(), Term::new(5_u32))))
    .unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  let Exit::Term(reason) = exit else {
    panic!("expected a badsig reason");
  };

  let badsig: &BadSignal = reason.downcast_ref::<BadSignal>().unwrap();

  assert_eq!(badsig.detail().downcast_ref::<u32>(), Some(&5));
  assert_eq!(*log.lock(), vec![Event::Stop]);
}

// -----------------------------------------------------------------------------
// Tests - Protocol Violations
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_unrecognized_message_is_badsig() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port.send(Term::new(123_u32)).unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  let Exit::Term(reason) = exit else {
    panic!("expected a badsig reason");
  };

  let badsig: &BadSignal = reason.downcast_ref::<BadSignal>().unwrap();

  assert_eq!(badsig.detail().downcast_ref::<u32>(), Some(&123));
}

#[tokio::test]
async fn test_unrecognized_command_is_badsig() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::new(
      owner.clone(),
      Command::Unknown(Term::new("mystery")),
    )))
    .unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  let Exit::Term(reason) = exit else {
    panic!("expected a badsig reason");
  };

  assert!(reason.downcast_ref::<BadSignal>().is_some());
}

// -----------------------------------------------------------------------------
// Tests - Failure Translation
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_driver_failure_reason_propagates_verbatim() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();
  let driver: Box<RecordingDriver> = driver.with_output_error("disk_full");

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("x"))))
    .unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  let Exit::Term(reason) = exit else {
    panic!("expected an application failure reason");
  };

  assert_eq!(reason.downcast_ref::<&str>(), Some(&"disk_full"));
  assert_eq!(*log.lock(), vec![Event::Stop]);
}

#[tokio::test]
async fn test_driver_panic_becomes_wrapped_fault() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();
  let driver: Box<RecordingDriver> = driver.with_output_panic();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port
    .send(Term::new(Envelope::output(owner.clone(), IoData::from("x"))))
    .unwrap();

  let exit: Exit = expect_exit(&mut owner_task, &port).await;

  let Exit::Term(reason) = exit else {
    panic!("expected a fault reason");
  };

  let fault: &Fault = reason.downcast_ref::<Fault>().unwrap();

  assert_eq!(fault.description(), "driver bug");
  assert_eq!(*log.lock(), vec![Event::Stop]);
}

// -----------------------------------------------------------------------------
// Tests - Links
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_owner_death_closes_port() {
  let (owner, owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (observer, mut observer_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner, driver, "cmd", &[]).unwrap();

  port.link_oneway(Box::new(observer)).unwrap();

  // The owner dies; the incoming exit signal closes the port.
  owner_task.exit(Exit::Term(Term::new("owner crashed")));

  let exit: Exit = expect_exit(&mut observer_task, &port).await;

  // The signal payload is discarded; closing is all that matters.
  assert!(exit.is_normal());
  assert_eq!(*log.lock(), vec![Event::Stop]);
}

#[tokio::test]
async fn test_all_linked_handles_notified() {
  let (owner, mut owner_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (observer, mut observer_task): (ProcHandle, ProcTask) = ProcTask::create();
  let (_log, driver): (EventLog, Box<RecordingDriver>) = RecordingDriver::create();

  let port: PortHandle = PortTask::spawn(owner.clone(), driver, "cmd", &[]).unwrap();

  port.link_oneway(Box::new(observer)).unwrap();
  port.close(&owner).unwrap();

  assert!(expect_exit(&mut owner_task, &port).await.is_normal());
  assert!(expect_exit(&mut observer_task, &port).await.is_normal());
}
