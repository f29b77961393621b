//! Type-erased runtime value container used for inter-task communication.

use dyn_clone::clone_box;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::core::Item;

/// Dynamically typed value that can be sent between tasks.
///
/// [`Term`] wraps a boxed [`Item`] and provides type-safe downcasting APIs
/// for inspecting or extracting the contained value. Cloning a [`Term`]
/// performs a deep clone of the contained value, so each task owns its own
/// copy after message passing.
///
/// # Examples
///
/// ```
/// use portage::core::Term;
///
/// let term = Term::new(vec![1, 2, 3]);
///
/// assert!(term.is::<Vec<i32>>());
/// assert_eq!(term.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
/// assert_eq!(term.downcast_ref::<String>(), None);
/// ```
#[repr(transparent)]
pub struct Term {
  data: Box<dyn Item>,
}

impl Term {
  /// Creates a new term wrapping the given value.
  #[inline]
  pub fn new<T>(data: T) -> Self
  where
    T: Item,
  {
    Self {
      data: Box::new(data),
    }
  }

  /// Returns `true` if the contained value is of type `T`.
  #[inline]
  pub fn is<T>(&self) -> bool
  where
    T: 'static,
  {
    self.data.as_any().is::<T>()
  }

  /// Returns a shared reference to the contained value of type `T`.
  ///
  /// Returns [`None`] if the value has a different concrete type.
  #[inline]
  pub fn downcast_ref<T>(&self) -> Option<&T>
  where
    T: 'static,
  {
    self.data.as_any().downcast_ref()
  }

  /// Returns a mutable reference to the contained value of type `T`.
  ///
  /// Returns [`None`] if the value has a different concrete type.
  #[inline]
  pub fn downcast_mut<T>(&mut self) -> Option<&mut T>
  where
    T: 'static,
  {
    self.data.as_mut_any().downcast_mut()
  }

  /// Converts this term into a boxed value of type `T` without checks.
  ///
  /// # Safety
  ///
  /// The contained value **must** be of type `T`. Use [`is()`] or
  /// [`downcast_ref()`] to verify the type first.
  ///
  /// [`is()`]: Self::is
  /// [`downcast_ref()`]: Self::downcast_ref
  #[inline]
  pub unsafe fn downcast_unchecked<T>(self) -> Box<T>
  where
    T: 'static,
  {
    // SAFETY: This is guaranteed to be safe by the caller.
    unsafe { Box::from_raw(Box::into_raw(self.data).cast::<T>()) }
  }
}

impl Clone for Term {
  #[inline]
  fn clone(&self) -> Self {
    Self {
      data: clone_box(&*self.data),
    }
  }
}

impl Debug for Term {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&*self.data, f)
  }
}

impl Display for Term {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&*self.data, f)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
