use thiserror::Error;

/// Errors reported by [`Allocator`](crate::Allocator).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The requested payload size is zero, or its footprint does not fit in a `usize`.
  #[error("invalid allocation size {size}")]
  InvalidArgument { size: usize },

  /// The region could not be extended by `requested` bytes.
  #[error("out of memory while growing the region by {requested} bytes")]
  OutOfMemory { requested: usize },

  /// The growth primitive handed out memory that does not continue the region.
  #[error("region end expected at {expected:#x} but the heap grew at {found:#x}")]
  Discontiguous { expected: usize, found: usize },

  /// A header inside the region does not describe a valid block.
  #[error("corrupted block header at {address:#x}")]
  Corrupted { address: usize },

  /// Another allocator already owns the program break.
  #[error("the program break is already managed by another allocator")]
  BreakClaimed,

  #[error("invalid deallocation: {0}")]
  Misuse(#[from] Misuse),
}

/// Deallocation mistakes detected by
/// [`Allocator::try_deallocate`](crate::Allocator::try_deallocate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Misuse {
  #[error("pointer {address:#x} is outside the managed region")]
  ForeignPointer { address: usize },

  #[error("no block header precedes pointer {address:#x}")]
  BadSignature { address: usize },

  #[error("block at {address:#x} is already free")]
  DoubleFree { address: usize },
}
