use std::{mem, ptr};

const FREE_MAGIC: usize = 0x5a5a_f4ee_u32 as usize;
const USED_MAGIC: usize = 0xa110_c8ed_u32 as usize;

/// Block metadata, placed immediately before every payload.
///
/// The header doubles as the allocation unit: block sizes are counted in
/// headers, so `block.add(size)` is the next block's header.
#[repr(C, align(16))]
pub struct Header {
  pub next: *mut Header,
  pub size: usize,
  tag: usize,
}

/// Size in bytes of one header, and therefore of one allocation unit.
pub const UNIT: usize = mem::size_of::<Header>();

/// What a header's tag says about the block it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
  Free,
  Allocated,
  Unknown,
}

impl Header {
  pub fn new(
    size: usize,
    next: *mut Header,
  ) -> Self {
    Self {
      next,
      size,
      tag: 0,
    }
  }

  /// Writes a fresh header at `at` and marks it allocated.
  ///
  /// # Safety
  ///
  /// `at` must be valid for writes of `size` units.
  pub unsafe fn write_allocated(
    at: *mut Header,
    size: usize,
  ) {
    unsafe {
      at.write(Header::new(size, ptr::null_mut()));
      Header::mark_allocated(at);
    }
  }

  /// # Safety
  ///
  /// `header` must point to a readable header.
  pub unsafe fn tag(header: *const Header) -> Tag {
    let raw = unsafe { (*header).tag };
    let addr = header as usize;

    if raw == FREE_MAGIC ^ addr {
      Tag::Free
    } else if raw == USED_MAGIC ^ addr {
      Tag::Allocated
    } else {
      Tag::Unknown
    }
  }

  /// # Safety
  ///
  /// `header` must point to a writable header.
  pub unsafe fn mark_free(header: *mut Header) {
    unsafe { (*header).tag = FREE_MAGIC ^ header as usize };
  }

  /// # Safety
  ///
  /// `header` must point to a writable header.
  pub unsafe fn mark_allocated(header: *mut Header) {
    unsafe { (*header).tag = USED_MAGIC ^ header as usize };
  }

  /// Payload pointer handed to callers.
  pub fn payload(header: *mut Header) -> *mut u8 {
    header.wrapping_add(1) as *mut u8
  }

  /// Header of the block owning `payload`.
  pub fn from_payload(payload: *mut u8) -> *mut Header {
    (payload as *mut Header).wrapping_sub(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unit_matches_alignment() {
    assert_eq!(UNIT % mem::align_of::<Header>(), 0);
    assert_eq!(mem::align_of::<Header>(), 16);
    assert!(UNIT >= 3 * mem::size_of::<usize>());
  }

  #[test]
  fn tags_follow_marks() {
    let mut header = Header::new(4, ptr::null_mut());
    let at = &mut header as *mut Header;

    unsafe {
      assert_eq!(Header::tag(at), Tag::Unknown);

      Header::mark_allocated(at);
      assert_eq!(Header::tag(at), Tag::Allocated);

      Header::mark_free(at);
      assert_eq!(Header::tag(at), Tag::Free);
    }
  }

  #[test]
  fn tags_are_bound_to_address() {
    let mut pair = [Header::new(1, ptr::null_mut()), Header::new(1, ptr::null_mut())];
    let base = pair.as_mut_ptr();

    unsafe {
      Header::mark_allocated(base);
      let tag = (*base).tag;
      (*base.add(1)).tag = tag;

      assert_eq!(Header::tag(base.add(1)), Tag::Unknown);
    }
  }

  #[test]
  fn payload_round_trip() {
    let mut pair = [Header::new(2, ptr::null_mut()), Header::new(0, ptr::null_mut())];
    let base = pair.as_mut_ptr();

    let payload = Header::payload(base);
    assert_eq!(payload as usize, base as usize + UNIT);
    assert_eq!(Header::from_payload(payload), base);
  }
}
