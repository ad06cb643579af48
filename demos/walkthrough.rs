use std::{process::ExitCode, ptr::NonNull};

use rfreelist::{FreeList, MappedArena, config::ArenaConfig, logging, self_check};

/// Allocates and prints the outcome, keeping the payload address for later.
fn allocate(
  heap: &mut FreeList<'_>,
  size: usize,
) -> Option<NonNull<u8>> {
  match heap.allocate(size) {
    Ok(ptr) => {
      println!("allocate({size:#x}) = {:?}", ptr.as_ptr());
      Some(ptr)
    }
    Err(err) => {
      println!("allocate({size:#x}) failed: {err}");
      None
    }
  }
}

fn free(
  heap: &mut FreeList<'_>,
  ptr: Option<NonNull<u8>>,
) {
  let address = ptr.map_or(std::ptr::null_mut(), NonNull::as_ptr);
  unsafe { heap.free(address) };
}

fn main() -> ExitCode {
  let config = ArenaConfig::from_env();
  logging::init(config.log_level);

  // The packing helpers must work before anything else is trusted.
  if let Err(failure) = self_check() {
    println!("Self-check returned {}: {failure}", failure.code());
    return ExitCode::FAILURE;
  }

  let mut arena = match MappedArena::new(config.arena_size) {
    Ok(arena) => arena,
    Err(err) => {
      eprintln!("cannot map arena: {err}");
      return ExitCode::FAILURE;
    }
  };
  let mut heap = FreeList::from_arena(&mut arena);

  let a = allocate(&mut heap, 0x100);
  let b = allocate(&mut heap, 0x200);
  let c = allocate(&mut heap, 0x300);
  println!("\nFirst round:");
  print!("{}", heap.dump());

  free(&mut heap, b);
  free(&mut heap, a);
  free(&mut heap, c);
  println!("\nAfter freeing a, b and c:");
  print!("{}", heap.dump());

  let a = allocate(&mut heap, 0x400);
  let c = allocate(&mut heap, 0x300);
  println!("\nSecond round:");
  print!("{}", heap.dump());

  // The second free finds the block already marked free and does nothing.
  let d = allocate(&mut heap, 0x100);
  free(&mut heap, d);
  free(&mut heap, d);
  println!("\nAfter freeing d twice:");
  print!("{}", heap.dump());

  free(&mut heap, a);
  free(&mut heap, c);
  let stats = heap.dump().stats();
  println!(
    "\n{} free bytes in {} blocks, {} bytes in use",
    stats.free_bytes, stats.free_blocks, stats.used_bytes
  );

  ExitCode::SUCCESS
}
