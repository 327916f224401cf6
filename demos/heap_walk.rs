use std::{io::Read, ptr::NonNull};

use rfalloc::{Config, FreeListAllocator, Sbrk, program_break};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    program_break(),
  );
}

fn print_alloc(
  bytes: usize,
  addr: NonNull<u8>,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    bytes,
    addr,
    program_break()
  );
}

fn print_free_list(heap: &FreeListAllocator<Sbrk>) {
  let stats = heap.stats();
  println!(
    "Free list: {} blocks, {} of {} units free, {} growth calls",
    stats.free_blocks, stats.free_units, stats.granted_units, stats.grow_calls
  );
  for block in heap.free_blocks() {
    println!("  {:#x}..{:#x} ({} units)", block.addr, block.end(), block.units);
  }
}

fn main() {
  env_logger::init();

  let config = match Config::from_env() {
    Ok(config) => config,
    Err(err) => {
      eprintln!("{err}");
      std::process::exit(2);
    }
  };
  let mut heap = FreeListAllocator::with_config(Sbrk, config);

  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three small blocks. The first one grows the heap by at least
  //    `min_grow_units`; the rest are carved from the top of that grant.
  // --------------------------------------------------------------------
  let mut blocks = Vec::new();
  for label in ["A", "B", "C"] {
    let handle = match heap.allocate(16) {
      Ok(handle) => handle,
      Err(err) => {
        eprintln!("allocation of {label} failed: {err}");
        return;
      }
    };
    println!("\n[1] Allocate {label}");
    print_alloc(16, handle);
    blocks.push(handle);
  }
  print_free_list(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Release the middle block and ask for the same size again: the
  //    freed block is an exact fit and comes straight back.
  // --------------------------------------------------------------------
  unsafe {
    if let Err(err) = heap.release(blocks[1]) {
      eprintln!("release failed: {err}");
      return;
    }
  }
  println!("\n[2] Released B at {:?}", blocks[1]);
  print_free_list(&heap);

  if let Ok(reused) = heap.allocate(16) {
    println!(
      "[2] New block == B? {}",
      if reused == blocks[1] { "Yes, it reused the freed block" } else { "No, it allocated somewhere else" }
    );
    blocks[1] = reused;
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Releasing the same block twice is reported, not obeyed.
  // --------------------------------------------------------------------
  unsafe {
    let _ = heap.release(blocks[0]);
    match heap.release(blocks[0]) {
      Ok(()) => println!("\n[3] Second release of A went through?!"),
      Err(err) => println!("\n[3] Second release of A rejected: {err}"),
    }
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A large block forces another growth step.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  match heap.allocate(256 * 1024) {
    Ok(big) => {
      println!("\n[4] Allocate large 256 KiB block");
      print_alloc(256 * 1024, big);
    }
    Err(err) => println!("\n[4] Large allocation failed: {err}"),
  }
  print_program_break("after large alloc");
  print_free_list(&heap);

  if let Err(err) = heap.check() {
    eprintln!("free list corrupted: {err}");
  }

  println!("\n[5] End of example. Process will exit and the OS will reclaim all memory.");
}
