use std::{
  marker::PhantomData,
  num::NonZeroUsize,
  ptr::NonNull,
  sync::atomic::{AtomicBool, Ordering},
};

use log::{debug, warn};

use crate::{AllocError, Config};

/// A source of fresh, contiguous memory at the top of a heap.
///
/// # Safety
///
/// Implementors must guarantee that a pointer returned from [`grow_heap`]
/// addresses `increment` bytes that are readable, writable, not used by
/// anything else, and stay valid for as long as the grower is alive.
///
/// [`grow_heap`]: HeapGrower::grow_heap
pub unsafe trait HeapGrower {
  /// Current top of the heap; the address the next extension should start at.
  fn current_break(&mut self) -> *mut u8;

  /// Extends the heap by exactly `increment` bytes and returns the start of
  /// the new extension, or `None` if the heap cannot grow.
  fn grow_heap(
    &mut self,
    increment: NonZeroUsize,
  ) -> Option<NonNull<u8>>;
}

#[cfg(unix)]
static BREAK_CLAIMED: AtomicBool = AtomicBool::new(false);

/// The process break, grown with `sbrk(2)`.
///
/// The break is a process-wide resource, so at most one `Sbrk` exists at a
/// time. Nothing else in the process may move the break while it is alive.
#[cfg(unix)]
#[derive(Debug)]
pub struct Sbrk {
  _not_send: PhantomData<*mut u8>,
}

#[cfg(unix)]
impl Sbrk {
  /// Takes ownership of the process break.
  pub fn claim() -> Result<Self, AllocError> {
    if BREAK_CLAIMED.swap(true, Ordering::AcqRel) {
      return Err(AllocError::BreakClaimed);
    }

    Ok(Self {
      _not_send: PhantomData,
    })
  }
}

#[cfg(unix)]
impl Drop for Sbrk {
  fn drop(&mut self) {
    BREAK_CLAIMED.store(false, Ordering::Release);
  }
}

#[cfg(unix)]
unsafe impl HeapGrower for Sbrk {
  fn current_break(&mut self) -> *mut u8 {
    unsafe { libc::sbrk(0) as *mut u8 }
  }

  fn grow_heap(
    &mut self,
    increment: NonZeroUsize,
  ) -> Option<NonNull<u8>> {
    let increment = libc::intptr_t::try_from(increment.get()).ok()?;
    let address = unsafe { libc::sbrk(increment) };

    if address == usize::MAX as *mut libc::c_void {
      return None;
    }

    NonNull::new(address as *mut u8)
  }
}

/// Span of bytes added to the region by one [`Region::grow`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extension {
  pub(crate) offset: usize,
  pub(crate) len: NonZeroUsize,
}

/// The managed span `[start, start + len)` and the grower that extends it.
///
/// Every byte of the span was handed out by the grower and belongs to the
/// region alone.
#[derive(Debug)]
pub(crate) struct Region<G> {
  grower: G,
  start: *mut u8,
  len: usize,
  limit: Option<NonZeroUsize>,
}

impl<G: HeapGrower> Region<G> {
  pub(crate) fn new(
    mut grower: G,
    config: Config,
  ) -> Self {
    let start = grower.current_break();
    debug!("region starts at {start:?}");

    Self {
      grower,
      start,
      len: 0,
      limit: config.region_limit,
    }
  }

  /// Extends the region by exactly `bytes`.
  ///
  /// While the region is still empty, an extension that does not start at the
  /// recorded break rebases the region onto it.
  pub(crate) fn grow(
    &mut self,
    bytes: NonZeroUsize,
  ) -> Result<Extension, AllocError> {
    let requested = bytes.get();
    let out_of_memory = AllocError::OutOfMemory { requested };

    let new_len = self.len.checked_add(requested).ok_or(out_of_memory)?;
    if self.limit.is_some_and(|limit| new_len > limit.get()) {
      debug!("growing by {requested} bytes would pass the region limit");
      return Err(out_of_memory);
    }

    let address = self.grower.grow_heap(bytes).ok_or(out_of_memory)?.as_ptr();

    if address != self.end() {
      if self.len != 0 {
        warn!(
          "heap grew at {address:?}, expected {:?}; region can no longer grow",
          self.end()
        );
        return Err(AllocError::Discontiguous {
          expected: self.end() as usize,
          found: address as usize,
        });
      }

      debug!("rebasing empty region from {:?} to {address:?}", self.start);
      self.start = address;
    }

    let offset = self.len;
    self.len = new_len;
    debug!("grew region by {requested} bytes, end = {:?}", self.end());

    Ok(Extension { offset, len: bytes })
  }
}

impl<G> Region<G> {
  pub(crate) fn start(&self) -> *mut u8 {
    self.start
  }

  pub(crate) fn end(&self) -> *mut u8 {
    self.start.wrapping_add(self.len)
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  #[cfg(test)]
  pub(crate) fn grower_mut(&mut self) -> &mut G {
    &mut self.grower
  }
}
