//! # rfalloc - An Explicit Free-List Allocator
//!
//! This crate provides a general-purpose **free-list allocator**: blocks are
//! handed out from, and returned to, a circular list of free blocks kept in
//! address order. Memory comes from a [`GrowthProvider`], normally the
//! program break via `sbrk(2)`, in large increments.
//!
//! ## Overview
//!
//! ```text
//!   Free List Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │   ┌──────────┬─────┬────────────┬─────┬─────┬──────────────────────┐ │
//!   │   │  free    │ A1  │   free     │ A2  │ A3  │        free          │ │
//!   │   └──────────┴─────┴────────────┴─────┴─────┴──────────────────────┘ │
//!   │        │                ▲  │                           ▲  │          │
//!   │        └────────────────┘  └───────────────────────────┘  │          │
//!   │        ▲                                                  │          │
//!   │        └─────────────── sentinel ◄────────────────────────┘          │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Free blocks link to the next higher free block; the highest one wraps
//!   around through a zero-sized sentinel to the lowest.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rfalloc
//!   ├── align      - align! macro and byte/unit conversion
//!   ├── block      - Block header (internal)
//!   ├── config     - Growth configuration
//!   ├── error      - Error types
//!   ├── free_list  - FreeListAllocator implementation
//!   ├── grow       - GrowthProvider trait, Sbrk and FixedArena
//!   └── locked     - LockedAllocator, a mutex around the allocator
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rfalloc::{FixedArena, FreeListAllocator};
//!
//! let mut allocator = FreeListAllocator::new(FixedArena::new(8192).unwrap());
//!
//! let ptr = allocator.allocate(8).unwrap().as_ptr() as *mut u64;
//!
//! unsafe {
//!   *ptr = 42;
//!   assert_eq!(*ptr, 42);
//!
//!   allocator.release(std::ptr::NonNull::new_unchecked(ptr as *mut u8)).unwrap();
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block starts with a header. Sizes are counted in headers, not
//! bytes, so the header after a block is always `block + size`:
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ next: free/null │  │  ┌──────────────────────────┐  │
//!   │  │ size: N units   │  │  │                          │  │
//!   │  │ tag: free/used  │  │  │  (N - 1) units usable    │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │       1 unit          │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Allocation walks the list from a roving cursor and takes the first block
//! that is large enough. An exact fit is unlinked; a larger block gives up
//! its tail. When a full lap finds nothing, the heap grows by at least
//! [`Config::min_grow_units`] and the new region goes through the release
//! path, merging with any free block it touches.
//!
//! Release finds the block's place in address order and merges it with the
//! free block directly above, directly below, or both:
//!
//! ```text
//!   Before:  ┌────────┬────────┬────────┐
//!            │  free  │ freed  │  free  │
//!            └────────┴────────┴────────┘
//!   After:   ┌──────────────────────────┐
//!            │           free           │
//!            └──────────────────────────┘
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded core**: wrap it in a [`LockedAllocator`] to share it
//! - **Never shrinks**: granted memory is kept until the provider is dropped
//! - **First fit**: no size classes
//!
//! ## Safety
//!
//! Releasing a block is `unsafe`: the caller promises not to touch it
//! afterwards. Double releases and handles from elsewhere are detected
//! through a tag in the header and reported as [`ReleaseError`] instead of
//! corrupting the list.

pub mod align;
mod block;
pub mod config;
pub mod error;
mod free_list;
mod grow;
mod locked;

pub use align::{unit_bytes, units_for};
pub use block::UNIT;
pub use config::Config;
pub use error::{AllocError, ConfigError, Corruption, GrowError, ReleaseError};
pub use free_list::{BlockSpan, FreeListAllocator, HeapStats};
pub use grow::{FixedArena, GrowthProvider, Sbrk, program_break};
pub use locked::LockedAllocator;
