use std::{
  alloc::{self, Layout},
  io,
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};
use log::{debug, warn};

use crate::{align, align::unit_bytes, block::Header, error::GrowError};

/// Source of raw heap memory for a [`FreeListAllocator`](crate::FreeListAllocator).
///
/// # Safety
///
/// A successful `extend(units)` must return a pointer aligned for
/// [`Header`] to a region of exactly `units * UNIT` writable bytes that
/// nothing else uses for as long as the provider is alive. A failed call
/// must leave nothing behind.
pub unsafe trait GrowthProvider {
  fn extend(
    &mut self,
    units: usize,
  ) -> Result<NonNull<u8>, GrowError>;
}

/// Current program break, as reported by `sbrk(0)`.
pub fn program_break() -> *mut u8 {
  unsafe { sbrk(0) as *mut u8 }
}

fn last_errno() -> i32 {
  io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Grows the process data segment with `sbrk(2)`.
///
/// Successive grants are contiguous unless something else moves the break
/// in between, in which case the allocator simply never merges across the
/// gap. A break that moves again while a grant is being padded to
/// alignment makes the grant fail; the pad is given back, but the bytes
/// already obtained below it are abandoned since the break no longer ends
/// at them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sbrk;

impl Sbrk {
  fn bump(increment: intptr_t) -> Result<usize, GrowError> {
    let old = unsafe { sbrk(increment) };

    if old == usize::MAX as *mut c_void {
      return Err(GrowError::Refused { errno: last_errno() });
    }

    Ok(old as usize)
  }
}

/// Obtains `bytes` unit-aligned bytes from a break that starts at
/// `current`. `bump` moves the break by its argument and returns the old
/// break. Returns the aligned base of the grant.
fn carve<B>(
  bytes: usize,
  current: usize,
  mut bump: B,
) -> Result<usize, GrowError>
where
  B: FnMut(intptr_t) -> Result<usize, GrowError>,
{
  let pad = align!(current) - current;
  let total = bytes.checked_add(pad).ok_or(GrowError::Overflow)?;
  let increment = intptr_t::try_from(total).map_err(|_| GrowError::Overflow)?;

  let old = bump(increment)?;
  let base = align!(old);
  let end = old + total;

  if base + bytes <= end {
    return Ok(base);
  }

  // The break moved between the probe and the bump; extend by the missing
  // pad, which is only usable if it lands right at `end`.
  let shortfall = (base + bytes - end) as intptr_t;
  match bump(shortfall) {
    Ok(top) if top == end => Ok(base),
    Ok(top) => {
      let _ = bump(-shortfall);
      warn!("program break moved twice during growth, abandoning {} bytes at {:#x}", total, old);
      Err(GrowError::Refused { errno: libc::EAGAIN })
    }
    Err(err) => {
      let _ = bump(-increment);
      Err(err)
    }
  }
}

unsafe impl GrowthProvider for Sbrk {
  fn extend(
    &mut self,
    units: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let bytes = unit_bytes(units).ok_or(GrowError::Overflow)?;
    let base = carve(bytes, program_break() as usize, Sbrk::bump)?;

    debug!("sbrk grant of {} units at {:#x}", units, base);

    NonNull::new(base as *mut u8).ok_or(GrowError::Refused { errno: 0 })
  }
}

/// A fixed-capacity, zero-filled region carved out of the global allocator.
///
/// Grants are handed out front to back and are always contiguous. Once the
/// capacity is used up every further request fails with
/// [`GrowError::Exhausted`].
pub struct FixedArena {
  base: NonNull<Header>,
  layout: Layout,
  capacity: usize,
  used: usize,
}

// The arena exclusively owns its buffer.
unsafe impl Send for FixedArena {}

impl FixedArena {
  pub fn new(capacity: usize) -> Result<Self, GrowError> {
    let layout = Layout::array::<Header>(capacity.max(1)).map_err(|_| GrowError::Overflow)?;
    let raw = unsafe { alloc::alloc_zeroed(layout) } as *mut Header;

    let Some(base) = NonNull::new(raw) else {
      debug!("arena of {} units could not be reserved", capacity);
      return Err(GrowError::Exhausted {
        requested: capacity,
        available: 0,
      });
    };

    Ok(Self {
      base,
      layout,
      capacity,
      used: 0,
    })
  }

  /// Total size in units.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Units not yet granted.
  pub fn remaining(&self) -> usize {
    self.capacity - self.used
  }

  /// First address of the region.
  pub fn start(&self) -> usize {
    self.base.as_ptr() as usize
  }
}

unsafe impl GrowthProvider for FixedArena {
  fn extend(
    &mut self,
    units: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    if units > self.remaining() {
      debug!("arena exhausted: {} units requested, {} left", units, self.remaining());
      return Err(GrowError::Exhausted {
        requested: units,
        available: self.remaining(),
      });
    }

    let grant = unsafe { self.base.add(self.used) };
    self.used += units;

    Ok(grant.cast())
  }
}

impl Drop for FixedArena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr() as *mut u8, self.layout) };
  }
}
