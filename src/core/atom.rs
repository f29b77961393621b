use hashbrown::HashMap;
use parking_lot::RwLock;
use parking_lot::RwLockUpgradableReadGuard;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::LazyLock;

use crate::consts::MAX_ATOM_BYTES;
use crate::consts::MAX_ATOM_COUNT;

// -----------------------------------------------------------------------------
// Global Atom Table
// -----------------------------------------------------------------------------

/// Global atom table initialized with well-known runtime atoms.
///
/// This table is lazily initialized on first access and ensures well-known
/// atoms occupy their expected slot indices.
static ATOM_TABLE: LazyLock<AtomTable> = LazyLock::new(|| {
  let table: AtomTable = AtomTable::new();

  for (slot, value) in Atom::WELL_KNOWN.into_iter().enumerate() {
    assert_eq!(table.intern(value), slot as u32, "invalid well-known atom");
  }

  table
});

// -----------------------------------------------------------------------------
// Atom
// -----------------------------------------------------------------------------

/// Interned, immutable identifier representing a runtime-wide static string.
///
/// Atoms are lightweight handles (32-bit slot indices) to globally interned
/// strings. Equality comparisons are performed on slot indices (O(1)), while
/// ordering comparisons delegate to the underlying string values.
///
/// # Examples
///
/// ```
/// use portage::core::Atom;
///
/// let a1 = Atom::new("hello");
/// let a2 = Atom::new("hello");
///
/// assert_eq!(a1, a2);
/// assert_eq!(a1.as_str(), "hello");
/// ```
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Atom {
  slot: u32,
}

impl Atom {
  /// Atom representing the empty string.
  pub const EMPTY: Self = Self::from_slot(0);

  /// Atom representing the value `normal`.
  pub const NORMAL: Self = Self::from_slot(1);

  /// Atom representing the value `killed`.
  pub const KILLED: Self = Self::from_slot(2);

  /// Atom representing the value `badsig`.
  pub const BADSIG: Self = Self::from_slot(3);

  /// Atom representing the value `connected`.
  pub const CONNECTED: Self = Self::from_slot(4);

  /// Atom representing the value `undefined`.
  pub const UNDEFINED: Self = Self::from_slot(5);

  /// Values backing the well-known atoms, in slot order.
  const WELL_KNOWN: [&'static str; 6] =
    ["", "normal", "killed", "badsig", "connected", "undefined"];

  /// Creates (or finds) the atom for the given string value.
  ///
  /// # Panics
  ///
  /// Panics if the value exceeds [`MAX_ATOM_BYTES`] or the table holds
  /// [`MAX_ATOM_COUNT`] distinct atoms.
  #[inline]
  pub fn new(value: &str) -> Self {
    Self::from_slot(ATOM_TABLE.intern(value))
  }

  /// Returns the interned string value of this atom.
  #[inline]
  pub fn as_str(&self) -> &'static str {
    ATOM_TABLE.resolve(self.slot)
  }

  /// Constructs an atom from a raw atom table slot.
  #[inline]
  const fn from_slot(slot: u32) -> Self {
    Self { slot }
  }
}

impl Debug for Atom {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str(self.as_str())
  }
}

impl Display for Atom {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str(self.as_str())
  }
}

impl PartialOrd for Atom {
  #[inline]
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Atom {
  #[inline]
  fn cmp(&self, other: &Self) -> Ordering {
    self.as_str().cmp(other.as_str())
  }
}

impl From<&str> for Atom {
  #[inline]
  fn from(other: &str) -> Self {
    Self::new(other)
  }
}

// -----------------------------------------------------------------------------
// Atom Table
// -----------------------------------------------------------------------------

/// Thread-safe atom interning table with permanent storage.
///
/// Interned strings are never deallocated; most lookups only take the read
/// lock, while first-time interning upgrades to a write lock.
struct AtomTable {
  state: RwLock<AtomTableState>,
}

struct AtomTableState {
  slots: Vec<&'static str>,
  index: HashMap<&'static str, u32>,
}

impl AtomTable {
  fn new() -> Self {
    Self {
      state: RwLock::new(AtomTableState {
        slots: Vec::new(),
        index: HashMap::new(),
      }),
    }
  }

  fn intern(&self, value: &str) -> u32 {
    assert!(value.len() <= MAX_ATOM_BYTES, "atom too large");

    let guard: _ = self.state.upgradable_read();

    if let Some(slot) = guard.index.get(value) {
      return *slot;
    }

    assert!(guard.slots.len() < MAX_ATOM_COUNT, "too many atoms");

    let mut guard: _ = RwLockUpgradableReadGuard::upgrade(guard);

    // Interned values are leaked intentionally; atoms live for the
    // runtime's lifetime.
    let stored: &'static str = Box::leak(value.to_owned().into_boxed_str());
    let slot: u32 = guard.slots.len() as u32;

    guard.slots.push(stored);
    guard.index.insert(stored, slot);

    slot
  }

  fn resolve(&self, slot: u32) -> &'static str {
    self.state.read().slots[slot as usize]
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::core::Atom;

  #[test]
  fn test_well_known_slots() {
    assert_eq!(Atom::new(""), Atom::EMPTY);
    assert_eq!(Atom::new("normal"), Atom::NORMAL);
    assert_eq!(Atom::new("killed"), Atom::KILLED);
    assert_eq!(Atom::new("badsig"), Atom::BADSIG);
    assert_eq!(Atom::new("connected"), Atom::CONNECTED);
    assert_eq!(Atom::new("undefined"), Atom::UNDEFINED);
  }

  #[test]
  fn test_interning_is_stable() {
    let a1: Atom = Atom::new("stream");
    let a2: Atom = Atom::new("stream");

    assert_eq!(a1, a2);
    assert_eq!(a1.as_str(), "stream");
  }

  #[test]
  fn test_distinct_values_distinct_atoms() {
    assert_ne!(Atom::new("in"), Atom::new("out"));
  }

  #[test]
  fn test_display() {
    assert_eq!(format!("{}", Atom::NORMAL), "normal");
    assert_eq!(format!("{:?}", Atom::KILLED), "killed");
  }

  #[test]
  fn test_ordering_by_value() {
    assert!(Atom::new("aaa") < Atom::new("bbb"));
  }
}
