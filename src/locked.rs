//! Serialized access to one allocator from several threads.

use std::ptr::NonNull;

use parking_lot::{Mutex, MutexGuard};

use crate::{
  config::Config,
  error::{AllocError, Corruption, ReleaseError},
  free_list::{FreeListAllocator, HeapStats},
  grow::GrowthProvider,
};

/// A [`FreeListAllocator`] behind a mutex.
///
/// The lock is held for the whole of every call, so no caller ever sees a
/// list in the middle of a split or merge.
pub struct LockedAllocator<P: GrowthProvider> {
  inner: Mutex<FreeListAllocator<P>>,
}

impl<P: GrowthProvider> LockedAllocator<P> {
  pub fn new(provider: P) -> Self {
    Self::with_config(provider, Config::default())
  }

  pub fn with_config(
    provider: P,
    config: Config,
  ) -> Self {
    Self {
      inner: Mutex::new(FreeListAllocator::with_config(provider, config)),
    }
  }

  pub fn allocate(
    &self,
    bytes: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.inner.lock().allocate(bytes)
  }

  /// # Safety
  ///
  /// Same contract as [`FreeListAllocator::release`].
  pub unsafe fn release(
    &self,
    handle: NonNull<u8>,
  ) -> Result<(), ReleaseError> {
    unsafe { self.inner.lock().release(handle) }
  }

  pub fn stats(&self) -> HeapStats {
    self.inner.lock().stats()
  }

  pub fn check(&self) -> Result<(), Corruption> {
    self.inner.lock().check()
  }

  /// Holds the lock across several operations.
  pub fn lock(&self) -> MutexGuard<'_, FreeListAllocator<P>> {
    self.inner.lock()
  }

  pub fn into_inner(self) -> FreeListAllocator<P> {
    self.inner.into_inner()
  }
}
