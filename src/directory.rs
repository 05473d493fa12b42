//! The block directory: the blocks tiling a [`Region`], navigated by size.
//!
//! A block's successor starts at `offset + size`; there is no next pointer.
//! Offsets are relative to the region start and never leave this module.

use std::ptr::NonNull;

use log::trace;

use crate::{
  AllocError, HeapGrower, Misuse,
  header::{HEADER_SIZE, Header},
  region::{Extension, Region},
};

/// A block found in the directory, with the header as it was read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockRef {
  offset: usize,
  header: Header,
}

impl BlockRef {
  pub(crate) fn size(&self) -> usize {
    self.header.size
  }

  pub(crate) fn is_free(&self) -> bool {
    self.header.is_free()
  }
}

fn address_of<G>(
  region: &Region<G>,
  offset: usize,
) -> usize {
  region.start() as usize + offset
}

fn corrupted<G>(
  region: &Region<G>,
  offset: usize,
) -> AllocError {
  AllocError::Corrupted {
    address: address_of(region, offset),
  }
}

/// Pointer to the header at `offset`, if a whole header fits in the region there.
fn header_ptr<G: HeapGrower>(
  region: &Region<G>,
  offset: usize,
) -> Option<*mut Header> {
  let end = offset.checked_add(HEADER_SIZE)?;
  (end <= region.len()).then(|| region.start().wrapping_add(offset) as *mut Header)
}

fn read_header<G: HeapGrower>(
  region: &Region<G>,
  offset: usize,
) -> Result<Header, AllocError> {
  let header = header_ptr(region, offset).ok_or_else(|| corrupted(region, offset))?;
  // SAFETY: the header lies inside the region, whose bytes are all owned and
  // initialized, and `Header` accepts any bit pattern.
  Ok(unsafe { header.read_unaligned() })
}

fn write_header<G: HeapGrower>(
  region: &mut Region<G>,
  offset: usize,
  header: Header,
) -> Result<(), AllocError> {
  let target = header_ptr(region, offset).ok_or_else(|| corrupted(region, offset))?;
  // SAFETY: the header lies inside the region, which only this allocator writes.
  unsafe { target.write_unaligned(header) };
  Ok(())
}

fn set_free<G: HeapGrower>(
  region: &mut Region<G>,
  offset: usize,
  free: bool,
) -> Result<(), AllocError> {
  let header = header_ptr(region, offset).ok_or_else(|| corrupted(region, offset))?;
  let (field, value) = Header::state_field(free);
  // SAFETY: as in `write_header`; the state word is inside the header.
  unsafe {
    header
      .cast::<u8>()
      .add(field)
      .cast::<u32>()
      .write_unaligned(value)
  };
  Ok(())
}

fn payload<G>(
  region: &Region<G>,
  offset: usize,
) -> NonNull<u8> {
  let address = region.start().wrapping_add(offset + HEADER_SIZE);
  // SAFETY: blocks only exist once the region holds memory from the grower,
  // which is never null, and payloads start inside that memory.
  unsafe { NonNull::new_unchecked(address) }
}

/// Offset of the block following one at `offset` with `header`.
///
/// Refuses to step by less than a header or past the end of the region, so a
/// damaged header cannot send a scan into memory the region does not own.
fn advance(
  offset: usize,
  header: &Header,
  end: usize,
) -> Option<usize> {
  if !header.is_valid() {
    return None;
  }

  let next = offset.checked_add(header.size)?;
  (next <= end).then_some(next)
}

/// Walks the directory in address order, from the region start to its end.
///
/// Yields an error and stops at the first header that does not describe a
/// block fitting in the region.
pub(crate) struct Walk<'r, G> {
  region: &'r Region<G>,
  offset: usize,
  stopped: bool,
}

impl<'r, G: HeapGrower> Walk<'r, G> {
  pub(crate) fn new(region: &'r Region<G>) -> Self {
    Self {
      region,
      offset: 0,
      stopped: false,
    }
  }

  fn visit(&mut self) -> Result<BlockRef, AllocError> {
    let header = read_header(self.region, self.offset)?;
    let next = advance(self.offset, &header, self.region.len())
      .ok_or_else(|| corrupted(self.region, self.offset))?;

    let block = BlockRef {
      offset: self.offset,
      header,
    };
    self.offset = next;
    Ok(block)
  }
}

impl<G: HeapGrower> Iterator for Walk<'_, G> {
  type Item = Result<BlockRef, AllocError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.stopped || self.offset >= self.region.len() {
      return None;
    }

    let block = self.visit();
    self.stopped = block.is_err();
    Some(block)
  }
}

/// First block in address order that is free and at least `required` bytes.
pub(crate) fn find_first_fit<G: HeapGrower>(
  region: &Region<G>,
  required: usize,
) -> Result<Option<BlockRef>, AllocError> {
  for block in Walk::new(region) {
    let block = block?;
    trace!(
      "visiting block at {:#x}: size = {}, free = {}",
      address_of(region, block.offset),
      block.size(),
      block.is_free()
    );

    if block.is_free() && block.size() >= required {
      return Ok(Some(block));
    }
  }

  Ok(None)
}

/// Marks a free block used again, whole, and returns its payload.
pub(crate) fn reuse<G: HeapGrower>(
  region: &mut Region<G>,
  block: BlockRef,
) -> Result<NonNull<u8>, AllocError> {
  set_free(region, block.offset, false)?;
  Ok(payload(region, block.offset))
}

/// Installs a used block spanning the whole of a fresh extension.
pub(crate) fn install<G: HeapGrower>(
  region: &mut Region<G>,
  extension: Extension,
) -> Result<NonNull<u8>, AllocError> {
  write_header(region, extension.offset, Header::used(extension.len.get()))?;
  Ok(payload(region, extension.offset))
}

/// Payload pointer of a block found in the directory.
pub(crate) fn payload_of<G>(
  region: &Region<G>,
  block: &BlockRef,
) -> NonNull<u8> {
  payload(region, block.offset)
}

/// Finds the used block whose payload starts at `ptr`.
pub(crate) fn locate<G: HeapGrower>(
  region: &Region<G>,
  ptr: NonNull<u8>,
) -> Result<BlockRef, AllocError> {
  let address = ptr.as_ptr() as usize;

  let offset = address
    .checked_sub(region.start() as usize)
    .and_then(|offset| offset.checked_sub(HEADER_SIZE))
    .filter(|&offset| header_ptr(region, offset).is_some())
    .ok_or(Misuse::ForeignPointer { address })?;

  let header = read_header(region, offset)?;
  if advance(offset, &header, region.len()).is_none() {
    return Err(Misuse::BadSignature { address }.into());
  }
  if header.is_free() {
    return Err(Misuse::DoubleFree { address }.into());
  }

  Ok(BlockRef { offset, header })
}

/// Marks a block found by [`locate`] free.
pub(crate) fn release<G: HeapGrower>(
  region: &mut Region<G>,
  block: BlockRef,
) -> Result<(), AllocError> {
  set_free(region, block.offset, true)
}

/// Marks the block owning `ptr` free without looking at anything else.
///
/// # Safety
///
/// `ptr` must be a payload pointer handed out by this directory's allocator.
pub(crate) unsafe fn release_unchecked(ptr: NonNull<u8>) {
  let (field, value) = Header::state_field(true);
  unsafe {
    ptr
      .as_ptr()
      .sub(HEADER_SIZE)
      .add(field)
      .cast::<u32>()
      .write_unaligned(value)
  };
}

#[cfg(test)]
mod tests {
  use std::num::NonZeroUsize;

  use super::*;
  use crate::{Config, FixedArena, test_common::init_logging};

  fn region_with_blocks(sizes: &[usize]) -> Region<FixedArena> {
    let mut region = Region::new(FixedArena::with_capacity(1024), Config::new());
    for &size in sizes {
      let extension = region.grow(NonZeroUsize::new(size).unwrap()).unwrap();
      install(&mut region, extension).unwrap();
    }
    region
  }

  fn free_block_at(
    region: &mut Region<FixedArena>,
    index: usize,
  ) {
    let block = Walk::new(region).nth(index).unwrap().unwrap();
    release(region, block).unwrap();
  }

  #[test]
  fn test_walk_steps_by_size() {
    init_logging();
    let region = region_with_blocks(&[HEADER_SIZE + 10, HEADER_SIZE + 20, HEADER_SIZE + 1]);

    let offsets: Vec<usize> = Walk::new(&region).map(|block| block.unwrap().offset).collect();

    assert_eq!(
      offsets,
      vec![0, HEADER_SIZE + 10, 2 * HEADER_SIZE + 30]
    );
  }

  #[test]
  fn test_empty_region_has_no_fit() {
    let region = region_with_blocks(&[]);

    assert_eq!(Walk::new(&region).count(), 0);
    assert!(find_first_fit(&region, HEADER_SIZE + 1).unwrap().is_none());
  }

  #[test]
  fn test_first_fit_takes_first_large_enough() {
    init_logging();
    let mut region = region_with_blocks(&[HEADER_SIZE + 8, HEADER_SIZE + 64, HEADER_SIZE + 32]);
    free_block_at(&mut region, 0);
    free_block_at(&mut region, 1);
    free_block_at(&mut region, 2);

    let fit = find_first_fit(&region, HEADER_SIZE + 16).unwrap().unwrap();

    // The 64 byte block wins over the tighter 32 byte one.
    assert_eq!(fit.offset, HEADER_SIZE + 8);
    assert_eq!(fit.size(), HEADER_SIZE + 64);
  }

  #[test]
  fn test_used_blocks_never_fit() {
    let region = region_with_blocks(&[HEADER_SIZE + 64]);

    assert!(find_first_fit(&region, HEADER_SIZE + 1).unwrap().is_none());
  }

  #[test]
  fn test_reuse_keeps_whole_block() {
    let mut region = region_with_blocks(&[HEADER_SIZE + 64]);
    free_block_at(&mut region, 0);

    let fit = find_first_fit(&region, HEADER_SIZE + 1).unwrap().unwrap();
    let ptr = reuse(&mut region, fit).unwrap();

    assert_eq!(ptr.as_ptr(), region.start().wrapping_add(HEADER_SIZE));
    let blocks: Vec<BlockRef> = Walk::new(&region).map(Result::unwrap).collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].size(), HEADER_SIZE + 64);
    assert!(!blocks[0].is_free());
  }

  #[test]
  fn test_walk_stops_on_corrupted_header() {
    init_logging();
    let mut region = region_with_blocks(&[HEADER_SIZE + 8, HEADER_SIZE + 8]);
    // Claim a size running past the end of the region.
    write_header(&mut region, HEADER_SIZE + 8, Header::used(4096)).unwrap();

    let mut walk = Walk::new(&region);
    assert!(walk.next().unwrap().is_ok());
    assert_eq!(
      walk.next().unwrap().unwrap_err(),
      AllocError::Corrupted {
        address: region.start() as usize + HEADER_SIZE + 8,
      }
    );
    assert!(walk.next().is_none());
  }

  #[test]
  fn test_advance_bounds() {
    let end = 100;

    assert_eq!(advance(0, &Header::used(HEADER_SIZE), end), Some(HEADER_SIZE));
    assert_eq!(advance(0, &Header::used(100), end), Some(100));
    assert_eq!(advance(0, &Header::used(101), end), None);
    assert_eq!(advance(0, &Header::used(0), end), None);
    assert_eq!(advance(usize::MAX, &Header::used(HEADER_SIZE), end), None);
  }

  #[test]
  fn test_locate() {
    let mut region = region_with_blocks(&[HEADER_SIZE + 8, HEADER_SIZE + 8]);
    let second = Walk::new(&region).nth(1).unwrap().unwrap();
    let ptr = payload_of(&region, &second);

    let found = locate(&region, ptr).unwrap();
    assert_eq!(found.offset, second.offset);

    release(&mut region, found).unwrap();
    assert_eq!(
      locate(&region, ptr).unwrap_err(),
      AllocError::Misuse(Misuse::DoubleFree {
        address: ptr.as_ptr() as usize,
      })
    );
  }

  #[test]
  fn test_release_unchecked_flips_flag() {
    let region = region_with_blocks(&[HEADER_SIZE + 8]);
    let block = Walk::new(&region).next().unwrap().unwrap();

    unsafe { release_unchecked(payload_of(&region, &block)) };

    assert!(Walk::new(&region).next().unwrap().unwrap().is_free());
  }
}
