use std::{mem, ops::Range, ptr, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
  UNIT,
  align::units_for,
  block::{Header, Tag},
  config::Config,
  error::{AllocError, Corruption, GrowError, ReleaseError},
  grow::GrowthProvider,
};

/// A free block as seen from outside the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockSpan {
  /// Address of the block header.
  pub addr: usize,
  /// Size in header units, header included.
  pub units: usize,
}

impl BlockSpan {
  pub fn end(&self) -> usize {
    self.addr + self.units * UNIT
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Units obtained from the growth provider so far.
  pub granted_units: usize,
  /// Units currently on the free list.
  pub free_units: usize,
  /// Number of free blocks, sentinel excluded.
  pub free_blocks: usize,
  /// Successful calls to the growth provider.
  pub grow_calls: usize,
}

/// Explicit free-list allocator over memory obtained from a
/// [`GrowthProvider`].
///
/// Free blocks sit on a circular singly-linked list kept in address order,
/// with a zero-sized sentinel so the list is never empty. Searches start at
/// a roving cursor; the first block that fits is used, carving the returned
/// block from its tail. Released blocks are merged with both address
/// neighbours.
pub struct FreeListAllocator<P: GrowthProvider> {
  provider: P,
  config: Config,
  /// Sentinel node, allocated on first use.
  base: *mut Header,
  /// Roving search cursor. Null until the list is initialised.
  freep: *mut Header,
  /// Address ranges granted by the provider, contiguous grants coalesced.
  grants: Vec<Range<usize>>,
  granted_units: usize,
  grow_calls: usize,
}

// The allocator exclusively owns its list and every granted region.
unsafe impl<P: GrowthProvider + Send> Send for FreeListAllocator<P> {}

impl<P: GrowthProvider> FreeListAllocator<P> {
  pub fn new(provider: P) -> Self {
    Self::with_config(provider, Config::default())
  }

  pub fn with_config(
    provider: P,
    config: Config,
  ) -> Self {
    Self {
      provider,
      config,
      base: ptr::null_mut(),
      freep: ptr::null_mut(),
      grants: Vec::new(),
      granted_units: 0,
      grow_calls: 0,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  fn init(&mut self) {
    if !self.freep.is_null() {
      return;
    }

    let base = Box::into_raw(Box::new(Header::new(0, ptr::null_mut())));
    unsafe {
      (*base).next = base;
      Header::mark_free(base);
    }

    self.base = base;
    self.freep = base;
  }

  /// Allocates a block with room for at least `bytes` bytes.
  ///
  /// The returned pointer is aligned for [`Header`], which covers every
  /// primitive type. Zero-byte requests still get a distinct handle.
  pub fn allocate(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let n = units_for(bytes).ok_or(AllocError::OutOfMemory {
      units: usize::MAX,
      source: GrowError::Overflow,
    })?;

    self.init();

    unsafe {
      let mut prevp = self.freep;
      let mut p = (*prevp).next;

      loop {
        if (*p).size >= n {
          if (*p).size == n {
            trace!("exact fit of {} units at {:p}", n, p);
            (*prevp).next = (*p).next;
          } else {
            trace!("splitting {} units off the tail of {:p} ({} units)", n, p, (*p).size);
            (*p).size -= n;
            p = p.add((*p).size);
            (*p).size = n;
          }

          Header::mark_allocated(p);
          (*p).next = ptr::null_mut();
          self.freep = prevp;

          return Ok(NonNull::new_unchecked(Header::payload(p)));
        }

        if p == self.freep {
          p = self.grow(n)?;
        }

        prevp = p;
        p = (*p).next;
      }
    }
  }

  /// Obtains at least `units` more units and threads them onto the free
  /// list. Returns the new cursor.
  fn grow(
    &mut self,
    units: usize,
  ) -> Result<*mut Header, AllocError> {
    let units = units.max(self.config.min_grow_units);

    let grant = self.provider.extend(units).map_err(|source| {
      warn!("growth by {} units failed: {}", units, source);
      AllocError::OutOfMemory { units, source }
    })?;

    let block = grant.as_ptr() as *mut Header;
    let start = block as usize;
    let end = start + units * UNIT;

    match self.grants.last_mut() {
      Some(last) if last.end == start => last.end = end,
      _ => self.grants.push(start..end),
    }
    self.granted_units += units;
    self.grow_calls += 1;

    debug!("heap grew by {} units at {:#x}, {} units granted in total", units, start, self.granted_units);

    unsafe {
      Header::write_allocated(block, units);
      self.insert(block);
    }

    Ok(self.freep)
  }

  /// Returns a block to the free list.
  ///
  /// # Safety
  ///
  /// Nothing may still read or write through `handle`, or through any
  /// pointer derived from it, once this returns `Ok`. Handles that did not
  /// come from this allocator are rejected when detected, but a handle that
  /// points into some other live block is not guaranteed to be.
  pub unsafe fn release(
    &mut self,
    handle: NonNull<u8>,
  ) -> Result<(), ReleaseError> {
    let bp = self.validate(handle)?;

    unsafe { self.insert(bp) };

    Ok(())
  }

  /// Payload capacity in bytes of a live block.
  pub fn usable_size(
    &self,
    handle: NonNull<u8>,
  ) -> Result<usize, ReleaseError> {
    let bp = self.validate(handle)?;
    Ok(unsafe { ((*bp).size - 1) * UNIT })
  }

  fn grant_of(
    &self,
    addr: usize,
  ) -> Option<&Range<usize>> {
    self.grants.iter().find(|grant| grant.contains(&addr))
  }

  fn validate(
    &self,
    handle: NonNull<u8>,
  ) -> Result<*mut Header, ReleaseError> {
    let addr = handle.as_ptr() as usize;

    if addr % mem::align_of::<Header>() != 0 {
      debug!("rejecting misaligned handle {:#x}", addr);
      return Err(ReleaseError::Misaligned { addr });
    }

    let bp = Header::from_payload(handle.as_ptr());
    let Some(grant) = self.grant_of(bp as usize) else {
      debug!("rejecting handle {:#x} outside the heap", addr);
      return Err(ReleaseError::ForeignHandle { addr });
    };

    unsafe {
      match Header::tag(bp) {
        Tag::Allocated => {}
        Tag::Free => {
          debug!("rejecting double release of {:#x}", addr);
          return Err(ReleaseError::DoubleFree { addr });
        }
        Tag::Unknown => {
          debug!("rejecting handle {:#x} without a block header", addr);
          return Err(ReleaseError::ForeignHandle { addr });
        }
      }

      let size = (*bp).size;
      let fits = size
        .checked_mul(UNIT)
        .and_then(|bytes| (bp as usize).checked_add(bytes))
        .is_some_and(|end| end <= grant.end);

      if size == 0 || !fits {
        return Err(ReleaseError::ForeignHandle { addr });
      }
    }

    Ok(bp)
  }

  /// Threads `bp` into the address-ordered list, merging with its
  /// neighbours. Leaves the cursor on the block before it.
  unsafe fn insert(
    &mut self,
    bp: *mut Header,
  ) {
    unsafe {
      Header::mark_free(bp);

      let mut p = self.freep;
      while !(bp > p && bp < (*p).next) {
        if p >= (*p).next && (bp > p || bp < (*p).next) {
          break;
        }
        p = (*p).next;
      }

      let upper = (*p).next;
      if upper != self.base && bp.add((*bp).size) == upper {
        trace!("merging {:p} with upper neighbour {:p}", bp, upper);
        (*bp).size += (*upper).size;
        (*bp).next = (*upper).next;
      } else {
        (*bp).next = upper;
      }

      if p.add((*p).size) == bp {
        trace!("merging {:p} into lower neighbour {:p}", bp, p);
        (*p).size += (*bp).size;
        (*p).next = (*bp).next;
      } else {
        (*p).next = bp;
      }

      self.freep = p;
    }
  }

  /// Visits every listed block except the sentinel, in list order starting
  /// after the sentinel. Stops with `Err` if the walk does not come back
  /// within the number of units granted.
  fn walk<F>(
    &self,
    mut visit: F,
  ) -> Result<(), Corruption>
  where
    F: FnMut(*mut Header) -> Result<(), Corruption>,
  {
    if self.base.is_null() {
      return Ok(());
    }

    let mut budget = self.granted_units + 1;
    unsafe {
      let mut p = (*self.base).next;
      while p != self.base {
        if budget == 0 {
          return Err(Corruption::Cycle);
        }
        budget -= 1;

        visit(p)?;
        p = (*p).next;
      }
    }

    Ok(())
  }

  /// Free blocks sorted by address. On a damaged list this is whatever the
  /// walk saw before giving up; [`check`](Self::check) reports the damage.
  pub fn free_blocks(&self) -> Vec<BlockSpan> {
    let mut blocks = Vec::new();
    let walked = self.walk(|p| {
      blocks.push(BlockSpan {
        addr: p as usize,
        units: unsafe { (*p).size },
      });
      Ok(())
    });

    if let Err(err) = walked {
      warn!("free list walk stopped early after {} blocks: {}", blocks.len(), err);
    }

    blocks.sort();
    blocks
  }

  pub fn stats(&self) -> HeapStats {
    let free = self.free_blocks();

    HeapStats {
      granted_units: self.granted_units,
      free_units: free.iter().map(|block| block.units).sum(),
      free_blocks: free.len(),
      grow_calls: self.grow_calls,
    }
  }

  /// Address ranges obtained from the provider.
  pub fn grants(&self) -> &[Range<usize>] {
    &self.grants
  }

  /// Verifies the free-list invariants: one wrap edge at most, no
  /// unmerged address neighbours, every block tagged free and inside the
  /// heap.
  pub fn check(&self) -> Result<(), Corruption> {
    if self.base.is_null() {
      return Ok(());
    }

    self.walk(|p| {
      let addr = p as usize;

      if self.grant_of(addr).is_none() {
        return Err(Corruption::OutsideHeap { addr });
      }
      if unsafe { Header::tag(p) } != Tag::Free {
        return Err(Corruption::NotFree { addr });
      }
      Ok(())
    })?;

    let mut descents = 0;
    unsafe {
      let mut p = self.base;
      loop {
        let next = (*p).next;

        if p >= next {
          descents += 1;
        }
        if p != self.base && next != self.base && p.add((*p).size) == next {
          return Err(Corruption::Unmerged {
            low: p as usize,
            high: next as usize,
          });
        }

        p = next;
        if p == self.base {
          break;
        }
      }
    }

    if descents != 1 {
      return Err(Corruption::Unordered);
    }

    Ok(())
  }
}

impl<P: GrowthProvider> Drop for FreeListAllocator<P> {
  fn drop(&mut self) {
    if !self.base.is_null() {
      drop(unsafe { Box::from_raw(self.base) });
    }
  }
}
