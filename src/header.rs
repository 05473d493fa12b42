use std::mem;

/// Signature stamped into every header this allocator writes.
pub(crate) const HEADER_MAGIC: u32 = 0xB10C_A110;

const STATE_USED: u32 = 0;
const STATE_FREE: u32 = 1;

/// Size of the metadata in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Metadata at the start of every block.
///
/// Headers live at arbitrary byte offsets, so they are only ever moved in and
/// out of the region with unaligned reads and writes. All fields are plain
/// integers with no padding between them, so any bytes read back form a
/// valid `Header`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct Header {
  /// Total block size, header included.
  pub(crate) size: usize,
  pub(crate) magic: u32,
  state: u32,
}

impl Header {
  pub(crate) fn used(size: usize) -> Self {
    Self {
      size,
      magic: HEADER_MAGIC,
      state: STATE_USED,
    }
  }

  pub(crate) fn is_free(&self) -> bool {
    self.state == STATE_FREE
  }

  /// Whether this looks like a header written by [`Header::used`] and
  /// possibly toggled since.
  pub(crate) fn is_valid(&self) -> bool {
    self.magic == HEADER_MAGIC
      && self.size >= HEADER_SIZE
      && matches!(self.state, STATE_USED | STATE_FREE)
  }

  /// Byte offset of the state word within a header, and the value to store
  /// there for the given state.
  pub(crate) fn state_field(free: bool) -> (usize, u32) {
    let state = if free { STATE_FREE } else { STATE_USED };
    (mem::offset_of!(Header, state), state)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_header_is_used() {
    let header = Header::used(64);

    assert_eq!(header.size, 64);
    assert!(!header.is_free());
    assert!(header.is_valid());
  }

  #[test]
  fn test_rejects_foreign_bytes() {
    let mut header = Header::used(HEADER_SIZE);
    assert!(header.is_valid());

    header.magic = 0;
    assert!(!header.is_valid());

    let mut header = Header::used(HEADER_SIZE - 1);
    assert!(!header.is_valid());

    header.size = HEADER_SIZE;
    header.state = 7;
    assert!(!header.is_valid());
  }

  #[test]
  fn test_state_field_offset() {
    let mut header = Header::used(32);
    let (offset, value) = Header::state_field(true);

    unsafe {
      let base = &mut header as *mut Header as *mut u8;
      base.add(offset).cast::<u32>().write_unaligned(value);
    }

    assert!(header.is_free());
    assert_eq!(header.size, 32);
    assert_eq!(header.magic, HEADER_MAGIC);
  }

  #[test]
  fn test_header_has_no_padding() {
    assert_eq!(
      HEADER_SIZE,
      mem::size_of::<usize>() + 2 * mem::size_of::<u32>()
    );
  }
}
