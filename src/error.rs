//! Error types for growth, allocation, release and list validation.

use thiserror::Error;

/// Failures reported by a [`GrowthProvider`](crate::GrowthProvider).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowError {
  /// A bounded provider has no room left for the request.
  #[error("heap exhausted: requested {requested} units, {available} available")]
  Exhausted { requested: usize, available: usize },

  /// The operating environment refused to move the program break.
  #[error("program break refused to grow (errno {errno})")]
  Refused { errno: i32 },

  /// The request cannot be expressed in bytes on this platform.
  #[error("growth request overflows the address space")]
  Overflow,
}

/// Failures reported by [`FreeListAllocator::allocate`](crate::FreeListAllocator::allocate).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  #[error("out of memory while growing the heap by {units} units")]
  OutOfMemory {
    units: usize,
    #[source]
    source: GrowError,
  },
}

/// Contract violations caught by [`FreeListAllocator::release`](crate::FreeListAllocator::release).
///
/// The list is left untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseError {
  #[error("handle {addr:#x} is not aligned to a block boundary")]
  Misaligned { addr: usize },

  #[error("handle {addr:#x} was not produced by this allocator")]
  ForeignHandle { addr: usize },

  #[error("handle {addr:#x} has already been released")]
  DoubleFree { addr: usize },
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("invalid minimum growth of {value:?} units: {reason}")]
  InvalidMinGrowUnits { value: String, reason: &'static str },
}

/// Free-list invariant violations found by
/// [`FreeListAllocator::check`](crate::FreeListAllocator::check).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
  #[error("free list leaves address order more than once")]
  Unordered,

  #[error("free blocks {low:#x} and {high:#x} are adjacent but not merged")]
  Unmerged { low: usize, high: usize },

  #[error("listed block {addr:#x} is not tagged free")]
  NotFree { addr: usize },

  #[error("listed block {addr:#x} lies outside every heap grant")]
  OutsideHeap { addr: usize },

  #[error("free list does not return to the sentinel")]
  Cycle,
}
