use std::ptr::NonNull;

use rfalloc::{
  AllocError, BlockSpan, Config, FixedArena, FreeListAllocator, GrowError, GrowthProvider, Sbrk, UNIT,
};
use serial_test::serial;

fn allocator(
  capacity: usize,
  min_grow: usize,
) -> FreeListAllocator<FixedArena> {
  let _ = env_logger::builder().is_test(true).try_init();

  let config = Config::default().with_min_grow_units(min_grow).unwrap();
  FreeListAllocator::with_config(FixedArena::new(capacity).unwrap(), config)
}

fn header(handle: NonNull<u8>) -> usize {
  handle.as_ptr() as usize - UNIT
}

#[test]
fn freed_middle_block_is_reused_and_neighbours_stay_apart() {
  let mut heap = allocator(64, 64);

  let a = heap.allocate(16).unwrap();
  let b = heap.allocate(16).unwrap();
  let c = heap.allocate(16).unwrap();

  unsafe { heap.release(b).unwrap() };

  let d = heap.allocate(16).unwrap();
  assert_eq!(d, b);

  unsafe {
    heap.release(a).unwrap();
    heap.release(c).unwrap();
  }

  let start = heap.provider().start();
  let d_span = header(d)..header(d) + 2 * UNIT;

  // Blocks are carved from the top, so C sits lowest and joins the
  // untouched bottom of the grant; D keeps A apart from it.
  assert_eq!(
    heap.free_blocks(),
    vec![
      BlockSpan {
        addr: start,
        units: 60
      },
      BlockSpan {
        addr: header(a),
        units: 2
      },
    ]
  );
  assert!(heap.free_blocks().iter().all(|block| block.end() <= d_span.start || block.addr >= d_span.end));
  heap.check().unwrap();
}

#[test]
fn released_block_is_reused_for_same_size() {
  let mut heap = allocator(256, 256);

  let handles: Vec<_> = (0..6).map(|_| heap.allocate(3 * UNIT).unwrap()).collect();

  unsafe { heap.release(handles[3]).unwrap() };
  let again = heap.allocate(3 * UNIT - 5).unwrap();

  assert_eq!(again, handles[3]);
}

#[test]
fn oversized_request_grows_past_minimum() {
  let mut heap = allocator(1024, 64);

  heap.allocate(1).unwrap();
  let before = heap.stats();

  let big = heap.allocate(100 * UNIT).unwrap();
  let after = heap.stats();

  assert_eq!(after.grow_calls, before.grow_calls + 1);
  assert!(after.granted_units - before.granted_units >= 101);
  assert_eq!(heap.usable_size(big), Ok(100 * UNIT));

  unsafe {
    big.as_ptr().write_bytes(0x5A, 100 * UNIT);
    assert_eq!(*big.as_ptr().add(100 * UNIT - 1), 0x5A);
  }

  heap.check().unwrap();
}

#[test]
fn exhaustion_fails_cleanly_and_small_requests_still_fit() {
  let mut heap = allocator(128, 64);

  heap.allocate(UNIT).unwrap();
  let before = heap.free_blocks();

  let err = heap.allocate(200 * UNIT).unwrap_err();
  assert!(matches!(
    err,
    AllocError::OutOfMemory {
      units: 201,
      source: GrowError::Exhausted { requested: 201, .. }
    }
  ));
  assert_eq!(heap.free_blocks(), before);

  let small = heap.allocate(UNIT).unwrap();
  assert_eq!(heap.usable_size(small), Ok(UNIT));
  assert_eq!(heap.stats().grow_calls, 1);
  heap.check().unwrap();
}

#[test]
fn satisfiable_requests_never_grow() {
  let mut heap = allocator(512, 512);

  let mut live = Vec::new();
  for round in 0..50 {
    live.push(heap.allocate(round % 40).unwrap());
    if round % 3 == 0 {
      let handle = live.swap_remove(live.len() / 2);
      unsafe { heap.release(handle).unwrap() };
    }
  }

  assert_eq!(heap.stats().grow_calls, 1);
  heap.check().unwrap();
}

#[test]
fn releasing_everything_restores_one_block() {
  let mut heap = allocator(4096, 1024);

  let handles: Vec<_> = (1..=40).map(|i| heap.allocate(i * 13).unwrap()).collect();

  for handle in handles.iter().step_by(2).chain(handles.iter().skip(1).step_by(2)) {
    unsafe { heap.release(*handle).unwrap() };
    heap.check().unwrap();
  }

  let stats = heap.stats();
  assert_eq!(stats.free_blocks, 1);
  assert_eq!(stats.free_units, stats.granted_units);
}

/// Arena that leaves one unused unit in front of every grant, so no two
/// grants touch.
struct Gapped(FixedArena);

unsafe impl GrowthProvider for Gapped {
  fn extend(
    &mut self,
    units: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    if units + 1 > self.0.remaining() {
      return Err(GrowError::Exhausted {
        requested: units,
        available: self.0.remaining().saturating_sub(1),
      });
    }

    self.0.extend(1)?;
    self.0.extend(units)
  }
}

#[test]
fn separated_grants_never_merge() {
  let config = Config::default().with_min_grow_units(8).unwrap();
  let mut heap = FreeListAllocator::with_config(Gapped(FixedArena::new(512).unwrap()), config);

  let mut handles = Vec::new();
  for _ in 0..20 {
    handles.push(heap.allocate(5 * UNIT).unwrap());
    heap.check().unwrap();
  }

  let grants = heap.grants().len();
  assert!(grants > 1);
  assert_eq!(grants, heap.stats().grow_calls);

  for handle in handles.iter().step_by(2).chain(handles.iter().skip(1).step_by(2)) {
    unsafe { heap.release(*handle).unwrap() };
    heap.check().unwrap();
  }

  let stats = heap.stats();
  assert_eq!(stats.free_units, stats.granted_units);
  assert_eq!(stats.free_blocks, grants);

  // Every free block is exactly one grant.
  let free: Vec<_> = heap.free_blocks().iter().map(|block| block.addr..block.end()).collect();
  assert_eq!(free, heap.grants());
}

#[test]
#[serial]
fn program_break_backed_heap() {
  let config = Config::default().with_min_grow_units(64).unwrap();
  let mut heap = FreeListAllocator::with_config(Sbrk, config);

  let a = heap.allocate(40).unwrap();
  let b = heap.allocate(400).unwrap();

  unsafe {
    a.as_ptr().write_bytes(1, 40);
    b.as_ptr().write_bytes(2, 400);
    assert_eq!(*a.as_ptr().add(39), 1);

    heap.release(a).unwrap();
    heap.release(b).unwrap();
  }

  heap.check().unwrap();
  let stats = heap.stats();
  assert_eq!(stats.free_units, stats.granted_units);
  assert!(rfalloc::program_break() as usize >= heap.grants()[0].end);
}
