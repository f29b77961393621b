use hashbrown::HashMap;
use std::env;
use std::path::PathBuf;

use crate::consts::PORT_FD_ALT_IN;
use crate::consts::PORT_FD_ALT_OUT;
use crate::consts::PORT_FD_STDIO_IN;
use crate::consts::PORT_FD_STDIO_OUT;
use crate::core::Atom;
use crate::core::Exception;
use crate::core::Item;
use crate::core::Term;

// -----------------------------------------------------------------------------
// Setting
// -----------------------------------------------------------------------------

/// One element of a port open-time settings list.
///
/// Settings are either a keyed value or a bare flag. The recognized key and
/// flag set is closed; anything else fails the parse with `BadArg`.
#[derive(Clone, Debug)]
pub enum Setting {
  /// A `{Key, Value}` setting.
  Pair(Atom, Term),
  /// A bare flag setting.
  Flag(Atom),
}

impl Setting {
  /// Creates a keyed setting.
  #[inline]
  pub fn pair(key: &str, value: impl Item) -> Self {
    Self::Pair(Atom::new(key), Term::new(value))
  }

  /// Creates a bare flag setting.
  #[inline]
  pub fn flag(name: &str) -> Self {
    Self::Flag(Atom::new(name))
  }
}

// -----------------------------------------------------------------------------
// Env Entry
// -----------------------------------------------------------------------------

/// One amendment of the child environment.
///
/// Entries are applied in list order; a later entry for the same name wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvEntry {
  /// Sets the variable to the given value.
  Set(String, String),
  /// Removes the variable.
  Remove(String),
}

// -----------------------------------------------------------------------------
// Port Mode
// -----------------------------------------------------------------------------

/// Framing mode applied to port I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortMode {
  /// Unframed byte stream.
  Stream,
  /// Length-prefixed packets with the given prefix size.
  Packet(usize),
  /// Line-oriented framing with the given maximum line length.
  Line(usize),
}

// -----------------------------------------------------------------------------
// Port Fds
// -----------------------------------------------------------------------------

/// File descriptors assigned to a port child's standard I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct PortFds {
  pub input: u32,
  pub output: u32,
}

// -----------------------------------------------------------------------------
// Port Options
// -----------------------------------------------------------------------------

/// Immutable-after-parse port configuration.
///
/// Built once at port creation from a command string and a settings list by
/// [`PortOptions::parse`]; never mutated afterwards by the control loop.
#[derive(Clone, Debug)]
pub struct PortOptions {
  argv: Vec<String>,
  cwd: PathBuf,
  env: HashMap<String, String>,
  mode: PortMode,
  fds: PortFds,
  hide: bool,
  send_exit_status: bool,
  send_eof: bool,
  input_only: bool,
  output_only: bool,
  binary: bool,
}

impl PortOptions {
  /// Parses a settings list into a populated option set.
  ///
  /// The list is scanned once, left to right, on top of the defaults:
  /// a single-element argv from the command string, the current working
  /// directory, a full copy of the process environment, stream mode, stdio
  /// descriptors, and all flags cleared.
  ///
  /// This parse is performed once per port and is not designed for
  /// high-frequency invocation.
  ///
  /// # Errors
  ///
  /// Fails with `BadArg` on an unrecognized key or flag, or on a setting
  /// value that is not well-formed for its key.
  pub fn parse(command: &str, settings: &[Setting]) -> Result<Self, Exception> {
    let mut options: Self = Self {
      argv: vec![command.to_owned()],
      cwd: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
      env: env::vars().collect(),
      mode: PortMode::Stream,
      fds: PortFds {
        input: PORT_FD_STDIO_IN,
        output: PORT_FD_STDIO_OUT,
      },
      hide: false,
      send_exit_status: false,
      send_eof: false,
      input_only: false,
      output_only: false,
      binary: false,
    };

    for setting in settings {
      match setting {
        Setting::Pair(key, value) => options.apply_pair(*key, value)?,
        Setting::Flag(name) => options.apply_flag(*name)?,
      }
    }

    Ok(options)
  }

  fn apply_pair(&mut self, key: Atom, value: &Term) -> Result<(), Exception> {
    match key.as_str() {
      "args" => {
        let args: Vec<String> = text_list(value)?;

        self.argv.truncate(1);
        self.argv.extend(args);
      }
      "arg0" => {
        let name: String = text(value)?;

        self.argv = vec![self.argv[0].clone(), name];
      }
      "packet" => {
        self.mode = PortMode::Packet(size(value)?);
      }
      "line" => {
        self.mode = PortMode::Line(size(value)?);
      }
      "cd" => {
        self.cwd = PathBuf::from(text(value)?);
      }
      "env" => {
        let entries: &Vec<EnvEntry> = value
          .downcast_ref()
          .ok_or_else(|| Exception::badarg("env: expected an entry list"))?;

        for entry in entries {
          match entry {
            EnvEntry::Set(name, data) => {
              self.env.insert(name.clone(), data.clone());
            }
            EnvEntry::Remove(name) => {
              self.env.remove(name);
            }
          }
        }
      }
      other => {
        return Err(Exception::badarg(format!("unrecognized setting: {other}")));
      }
    }

    Ok(())
  }

  fn apply_flag(&mut self, name: Atom) -> Result<(), Exception> {
    match name.as_str() {
      "stream" => self.mode = PortMode::Stream,
      "use_stdio" => {
        self.fds = PortFds {
          input: PORT_FD_STDIO_IN,
          output: PORT_FD_STDIO_OUT,
        };
      }
      "nouse_stdio" => {
        self.fds = PortFds {
          input: PORT_FD_ALT_IN,
          output: PORT_FD_ALT_OUT,
        };
      }
      "hide" => self.hide = true,
      "exit_status" => self.send_exit_status = true,
      "eof" => self.send_eof = true,
      "in" => self.input_only = true,
      "out" => self.output_only = true,
      "binary" => self.binary = true,
      other => {
        return Err(Exception::badarg(format!("unrecognized flag: {other}")));
      }
    }

    Ok(())
  }

  // ---------------------------------------------------------------------------
  // Accessors
  // ---------------------------------------------------------------------------

  /// Returns the executable path and argument vector.
  #[inline]
  pub fn argv(&self) -> &[String] {
    &self.argv
  }

  /// Returns the working directory for the child.
  #[inline]
  pub fn cwd(&self) -> &PathBuf {
    &self.cwd
  }

  /// Returns the environment mapping for the child.
  #[inline]
  pub fn env(&self) -> &HashMap<String, String> {
    &self.env
  }

  /// Returns the I/O framing mode.
  #[inline]
  pub const fn mode(&self) -> PortMode {
    self.mode
  }

  /// Returns the file descriptors assigned to child stdio.
  #[inline]
  pub const fn fds(&self) -> PortFds {
    self.fds
  }

  /// Returns `true` if the child window should be hidden.
  #[inline]
  pub const fn hide(&self) -> bool {
    self.hide
  }

  /// Returns `true` if the owner should be told the child's exit status.
  #[inline]
  pub const fn send_exit_status(&self) -> bool {
    self.send_exit_status
  }

  /// Returns `true` if the owner should be told about end-of-file.
  #[inline]
  pub const fn send_eof(&self) -> bool {
    self.send_eof
  }

  /// Returns `true` if the port only reads from the resource.
  #[inline]
  pub const fn input_only(&self) -> bool {
    self.input_only
  }

  /// Returns `true` if the port only writes to the resource.
  #[inline]
  pub const fn output_only(&self) -> bool {
    self.output_only
  }

  /// Returns `true` if payloads are delivered as binaries rather than text.
  #[inline]
  pub const fn binary(&self) -> bool {
    self.binary
  }
}

// -----------------------------------------------------------------------------
// Misc. Utilities
// -----------------------------------------------------------------------------

/// Coerces a setting value to text.
fn text(value: &Term) -> Result<String, Exception> {
  if let Some(value) = value.downcast_ref::<String>() {
    return Ok(value.clone());
  }

  if let Some(value) = value.downcast_ref::<&str>() {
    return Ok((*value).to_owned());
  }

  Err(Exception::badarg("expected a text value"))
}

/// Coerces a setting value to a list of text elements.
fn text_list(value: &Term) -> Result<Vec<String>, Exception> {
  if let Some(value) = value.downcast_ref::<Vec<String>>() {
    return Ok(value.clone());
  }

  if let Some(value) = value.downcast_ref::<Vec<&str>>() {
    return Ok(value.iter().map(|item| (*item).to_owned()).collect());
  }

  Err(Exception::badarg("expected a well-formed text list"))
}

/// Coerces a setting value to a size.
fn size(value: &Term) -> Result<usize, Exception> {
  value
    .downcast_ref::<usize>()
    .copied()
    .ok_or_else(|| Exception::badarg("expected a size value"))
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
