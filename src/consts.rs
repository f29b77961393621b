// -----------------------------------------------------------------------------
// System - Types
// -----------------------------------------------------------------------------

/// Maximum number of bytes in an [`Atom`].
///
/// [`Atom`]: crate::core::Atom
pub const MAX_ATOM_BYTES: usize = 255;

/// Maximum number of [`Atom`]s in the atom table.
///
/// [`Atom`]: crate::core::Atom
pub const MAX_ATOM_COUNT: usize = 1 << 20;

// -----------------------------------------------------------------------------
// System - Port Behavior
// -----------------------------------------------------------------------------

/// Input file descriptor assigned to a port child when stdio is used.
pub const PORT_FD_STDIO_IN: u32 = 1;

/// Output file descriptor assigned to a port child when stdio is used.
pub const PORT_FD_STDIO_OUT: u32 = 2;

/// Input file descriptor assigned to a port child when stdio is bypassed.
pub const PORT_FD_ALT_IN: u32 = 3;

/// Output file descriptor assigned to a port child when stdio is bypassed.
pub const PORT_FD_ALT_OUT: u32 = 4;

// -----------------------------------------------------------------------------
// System - Memory Allocation
// -----------------------------------------------------------------------------

/// Number of pre-allocated slots in a priority mailbox lane.
pub const CAP_MAILBOX_PRIORITY: usize = 8;
