use std::{io::Read, ptr::NonNull};

use brkalloc::{AllocError, BrkAllocator};
use libc::sbrk;

/// Waits until the user presses ENTER when running with `--step`.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `gdb`, or just visually track how the program break moves.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_alloc(
  size: usize,
  address: NonNull<u8>,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    address,
    unsafe { sbrk(0) }
  );
}

fn main() -> Result<(), AllocError> {
  env_logger::Builder::from_default_env()
    .filter_level(log::LevelFilter::Debug)
    .init();
  let step = std::env::args().any(|arg| arg == "--step");

  let mut allocator = BrkAllocator::new()?;
  print_program_break("start");
  pause(step);

  // --------------------------------------------------------------------
  // 1) Two allocations land back to back, header after payload.
  // --------------------------------------------------------------------
  let p0 = allocator.allocate(10)?;
  print_alloc(10, p0);
  let p1 = allocator.allocate(20)?;
  print_alloc(20, p1);
  println!(
    "[1] p1 - p0 = {} (10 + header of {})",
    p1.as_ptr() as usize - p0.as_ptr() as usize,
    allocator.header_size()
  );
  allocator.log_directory();
  pause(step);

  // --------------------------------------------------------------------
  // 2) Free the first block and ask for less: the block is reused whole.
  // --------------------------------------------------------------------
  unsafe { allocator.deallocate(p0) };
  let reused = allocator.allocate(5)?;
  println!(
    "[2] allocate(5) == p0? {}",
    if reused == p0 {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  allocator.log_directory();
  pause(step);

  // --------------------------------------------------------------------
  // 3) Nothing free fits: the region grows by exactly 100 + header.
  // --------------------------------------------------------------------
  let end = allocator.region_end();
  let big = allocator.allocate(100)?;
  print_alloc(100, big);
  println!(
    "[3] region grew by {} bytes",
    allocator.region_end() as usize - end as usize
  );
  pause(step);

  // --------------------------------------------------------------------
  // 4) Zero-size requests and double frees are reported.
  // --------------------------------------------------------------------
  if let Err(err) = allocator.allocate(0) {
    println!("[4] allocate(0): {err}");
  }
  allocator.try_deallocate(big)?;
  if let Err(err) = allocator.try_deallocate(big) {
    println!("[4] second free: {err}");
  }

  println!("\n[5] {:?}", allocator.stats()?);
  print_program_break("end");
  Ok(())
}
