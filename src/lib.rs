//! # brkalloc - A First-Fit Break Allocator
//!
//! This crate provides a minimal **first-fit allocator** that manages a single,
//! monotonically growing region of memory, by default the process heap grown
//! with `sbrk(2)`.
//!
//! ## Overview
//!
//! The region is tiled by blocks. Each block is a fixed-size header followed
//! by its payload, and the header records the total block size, so the next
//! block always starts at `this block + size`:
//!
//! ```text
//!   Managed Region:
//!
//!   region_start                                               region_end
//!   ▼                                                                   ▼
//!   ┌────┬──────────┬────┬────────────────────┬────┬──────┬────┬────────┐
//!   │ H  │  used    │ H  │       free         │ H  │ used │ H  │  used  │
//!   └────┴──────────┴────┴────────────────────┴────┴──────┴────┴────────┘
//!   ├─── size ──────┼──────── size ───────────┼── size ───┼─── size ────┤
//!
//!   H = header { size, signature, free/used }
//! ```
//!
//! `allocate(n)` walks the blocks from `region_start` and takes the first free
//! block of at least `n + HEADER_SIZE` bytes, whole. If there is none, the
//! region grows by exactly `n + HEADER_SIZE` bytes and a new block is
//! installed at the old end. `deallocate` flips the block's flag back to free.
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N + H     │  │  ┌──────────────────────────┐  │
//!   │  │ signature       │  │  │                          │  │
//!   │  │ state: used     │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │   HEADER_SIZE bytes   │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── allocator  - Allocator, the public allocate/deallocate surface
//!   ├── directory  - First-fit scan over the size-linked blocks (internal)
//!   ├── header     - Block header layout (internal)
//!   ├── region     - Region bounds, HeapGrower and the sbrk grower
//!   ├── arena      - FixedArena, a grower over an owned buffer
//!   ├── config     - Construction-time settings
//!   └── error      - AllocError and Misuse
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{Allocator, FixedArena};
//!
//! let mut allocator = Allocator::with_grower(FixedArena::with_capacity(4096));
//!
//! let ptr = allocator.allocate(64).unwrap();
//! unsafe {
//!     ptr.write_bytes(0x2A, 64);
//!     allocator.deallocate(ptr);
//! }
//!
//! // The freed block is handed out again, whole.
//! assert_eq!(allocator.allocate(8).unwrap(), ptr);
//! ```
//!
//! With the process break instead, on unix:
//!
//! ```rust,ignore
//! let mut allocator = brkalloc::BrkAllocator::new()?;
//! let ptr = allocator.allocate(128)?;
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: the allocator is neither `Send` nor `Sync`
//! - **No splitting or coalescing**: a reused block keeps its full size and
//!   neighbouring free blocks are never merged
//! - **No alignment**: payloads follow headers byte for byte
//! - **Never shrinks**: memory is not returned to the OS
//! - **One break owner**: at most one [`Sbrk`] may exist, and nothing else in
//!   the process may move the break while it does
//!
//! ## Logging
//!
//! Growth, reuse and frees are logged through the [`log`] facade at debug
//! level, each scan step at trace level. No logger is installed by this crate.

mod allocator;
mod arena;
mod config;
mod directory;
mod error;
mod header;
mod region;

#[cfg(unix)]
pub use allocator::BrkAllocator;
pub use allocator::{Allocator, BlockInfo, Blocks, Stats};
pub use arena::FixedArena;
pub use config::Config;
pub use error::{AllocError, Misuse};
pub use header::HEADER_SIZE;
#[cfg(unix)]
pub use region::Sbrk;
pub use region::HeapGrower;

#[cfg(test)]
pub(crate) mod test_common {
  pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
  }
}
