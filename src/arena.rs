use std::{num::NonZeroUsize, ptr::NonNull};

use crate::HeapGrower;

/// A fixed-capacity heap that hands out its bytes front to back.
///
/// Useful for running an [`Allocator`](crate::Allocator) inside memory that
/// does not come from the program break, e.g. in tests where addresses must
/// be predictable.
#[derive(Debug)]
pub struct FixedArena {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
}

impl FixedArena {
  pub fn with_capacity(capacity: usize) -> Self {
    let buffer: Box<[u8]> = vec![0u8; capacity].into_boxed_slice();
    let base = NonNull::from(Box::leak(buffer)).cast::<u8>();

    Self {
      base,
      capacity,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.used
  }
}

impl Drop for FixedArena {
  fn drop(&mut self) {
    let slice = NonNull::slice_from_raw_parts(self.base, self.capacity);
    drop(unsafe { Box::from_raw(slice.as_ptr()) });
  }
}

unsafe impl HeapGrower for FixedArena {
  fn current_break(&mut self) -> *mut u8 {
    self.base.as_ptr().wrapping_add(self.used)
  }

  fn grow_heap(
    &mut self,
    increment: NonZeroUsize,
  ) -> Option<NonNull<u8>> {
    let used = self.used.checked_add(increment.get())?;
    if used > self.capacity {
      return None;
    }

    let address = unsafe { self.base.add(self.used) };
    self.used = used;
    Some(address)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hands_out_bytes_in_order() {
    let mut arena = FixedArena::with_capacity(32);
    let start = arena.current_break();

    let a = arena.grow_heap(NonZeroUsize::new(10).unwrap()).unwrap();
    let b = arena.grow_heap(NonZeroUsize::new(22).unwrap()).unwrap();

    assert_eq!(a.as_ptr(), start);
    assert_eq!(b.as_ptr(), start.wrapping_add(10));
    assert_eq!(arena.used(), arena.capacity());
    assert!(arena.grow_heap(NonZeroUsize::MIN).is_none());
  }

  #[test]
  fn test_refuses_oversized_request() {
    let mut arena = FixedArena::with_capacity(16);

    assert!(arena.grow_heap(NonZeroUsize::new(17).unwrap()).is_none());
    assert!(arena.grow_heap(NonZeroUsize::MAX).is_none());
    assert_eq!(arena.used(), 0);
  }
}
