//! Trait defining type-erased runtime values usable within [`Term`].
//!
//! [`Term`]: crate::core::Term

use dyn_clone::DynClone;
use std::any::Any;
use std::fmt::Debug;

/// Trait implemented by all values stored inside a [`Term`].
///
/// [`Item`] is automatically implemented for all types that satisfy
/// [`Any`] + [`Debug`] + [`Clone`] + [`Send`] + [`Sync`] + `'static`, so most
/// types can be used in a [`Term`] without an explicit implementation.
///
/// [`Term`]: crate::core::Term
pub trait Item: Any + Debug + DynClone + Send + Sync + 'static {
  /// Returns a shared reference to this value as [`Any`].
  fn as_any(&self) -> &(dyn Any + Send + Sync);

  /// Returns a mutable reference to this value as [`Any`].
  fn as_mut_any(&mut self) -> &mut (dyn Any + Send + Sync);
}

impl<T> Item for T
where
  T: Any + Debug + DynClone + Send + Sync + 'static,
{
  #[inline]
  fn as_any(&self) -> &(dyn Any + Send + Sync) {
    self
  }

  #[inline]
  fn as_mut_any(&mut self) -> &mut (dyn Any + Send + Sync) {
    self
  }
}
