use std::{num::NonZeroUsize, ptr::NonNull};

use log::{debug, warn};

#[cfg(unix)]
use crate::Sbrk;
use crate::{
  AllocError, Config, HeapGrower,
  directory::{self, Walk},
  header::HEADER_SIZE,
  region::Region,
};

/// A block as seen from outside the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Start of the block's payload.
  pub address: NonNull<u8>,
  /// Total block size, header included.
  pub size: usize,
  pub is_free: bool,
}

/// Totals over every block in the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
  pub blocks: usize,
  pub free_blocks: usize,
  /// Bytes in used blocks, headers included.
  pub used_bytes: usize,
  /// Bytes in free blocks, headers included.
  pub free_bytes: usize,
  pub region_size: usize,
}

/// Iterator over the blocks of an [`Allocator`], in address order.
///
/// Yields an error and stops if it meets a damaged header.
pub struct Blocks<'a, G> {
  walk: Walk<'a, G>,
  region: &'a Region<G>,
}

impl<G: HeapGrower> Iterator for Blocks<'_, G> {
  type Item = Result<BlockInfo, AllocError>;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.walk.next()?;

    Some(block.map(|block| BlockInfo {
      address: directory::payload_of(self.region, &block),
      size: block.size(),
      is_free: block.is_free(),
    }))
  }
}

/// A first-fit allocator over a single, growing region.
///
/// Blocks are never split, merged, or returned to the grower: a freed block
/// stays in place and is handed out whole to the next request it can hold.
#[derive(Debug)]
pub struct Allocator<G> {
  region: Region<G>,
}

/// An [`Allocator`] over the process break.
#[cfg(unix)]
pub type BrkAllocator = Allocator<Sbrk>;

#[cfg(unix)]
impl Allocator<Sbrk> {
  /// Creates an allocator whose region starts at the current program break.
  ///
  /// Fails with [`AllocError::BreakClaimed`] while another one is alive.
  pub fn new() -> Result<Self, AllocError> {
    Ok(Self::with_grower(Sbrk::claim()?))
  }
}

impl<G: HeapGrower> Allocator<G> {
  pub fn with_grower(grower: G) -> Self {
    Self::with_config(grower, Config::default())
  }

  pub fn with_config(
    grower: G,
    config: Config,
  ) -> Self {
    Self {
      region: Region::new(grower, config),
    }
  }

  /// Allocates a block with room for `size` payload bytes.
  ///
  /// Reuses the first free block large enough, whatever its excess, and only
  /// grows the region when there is none.
  ///
  /// # Errors
  ///
  /// - [`AllocError::InvalidArgument`] if `size` is zero. Nothing is touched.
  /// - [`AllocError::OutOfMemory`] if the region cannot grow by `size +
  ///   HEADER_SIZE` bytes.
  /// - [`AllocError::Discontiguous`] if something else moved the heap top.
  /// - [`AllocError::Corrupted`] if the scan met a damaged header.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total = size
      .checked_add(HEADER_SIZE)
      .filter(|_| size != 0)
      .and_then(NonZeroUsize::new)
      .ok_or(AllocError::InvalidArgument { size })?;

    if let Some(block) = directory::find_first_fit(&self.region, total.get())? {
      let ptr = directory::reuse(&mut self.region, block)?;
      debug!(
        "reused {} byte block at {ptr:?} for {size} bytes",
        block.size()
      );
      return Ok(ptr);
    }

    let extension = self.region.grow(total)?;
    let ptr = directory::install(&mut self.region, extension)?;
    debug!("installed {} byte block at {ptr:?}", total.get());

    Ok(ptr)
  }

  /// Marks the block owning `ptr` free for reuse.
  ///
  /// Nothing is checked; see [`Allocator::try_deallocate`] for a variant that
  /// reports misuse.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`Allocator::allocate`] on this
  /// allocator and not deallocated since.
  pub unsafe fn deallocate(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    unsafe { directory::release_unchecked(ptr) };
    debug!("freed block at {ptr:?}");
  }

  /// Marks the block owning `ptr` free, after checking that `ptr` is the
  /// payload of a used block in this allocator's region.
  ///
  /// Detection relies on the header signature: a payload that happens to
  /// contain a well-formed header just before `ptr` is not told apart from
  /// a real block.
  ///
  /// # Errors
  ///
  /// [`AllocError::Misuse`] for a pointer outside the region, without a
  /// header in front of it, or whose block is already free. Nothing is
  /// modified in that case.
  pub fn try_deallocate(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<(), AllocError> {
    let block = directory::locate(&self.region, ptr).inspect_err(|err| {
      warn!("rejected deallocation of {ptr:?}: {err}");
    })?;

    directory::release(&mut self.region, block)?;
    debug!("freed block at {ptr:?}");
    Ok(())
  }

  /// The blocks in the region, in address order.
  pub fn blocks(&self) -> Blocks<'_, G> {
    Blocks {
      walk: Walk::new(&self.region),
      region: &self.region,
    }
  }

  pub fn stats(&self) -> Result<Stats, AllocError> {
    let mut stats = Stats {
      region_size: self.region.len(),
      ..Stats::default()
    };

    for block in self.blocks() {
      let block = block?;
      stats.blocks += 1;

      if block.is_free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
      } else {
        stats.used_bytes += block.size;
      }
    }

    Ok(stats)
  }

  /// Logs every block and the region bounds at debug level.
  pub fn log_directory(&self) {
    debug!(
      "region [{:?}, {:?}), {} bytes",
      self.region_start(),
      self.region_end(),
      self.region.len()
    );

    for block in self.blocks() {
      match block {
        Ok(block) => debug!(
          "  {:?}: {} bytes, {}",
          block.address,
          block.size,
          if block.is_free { "free" } else { "used" }
        ),
        Err(err) => warn!("  {err}"),
      }
    }
  }
}

impl<G> Allocator<G> {
  pub fn region_start(&self) -> *mut u8 {
    self.region.start()
  }

  /// One past the last installed block.
  pub fn region_end(&self) -> *mut u8 {
    self.region.end()
  }

  pub const fn header_size(&self) -> usize {
    HEADER_SIZE
  }
}
