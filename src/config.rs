use std::num::NonZeroUsize;

/// Construction-time settings for an [`Allocator`](crate::Allocator).
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use brkalloc::Config;
///
/// let config = Config::new().region_limit(NonZeroUsize::new(64 * 1024).unwrap());
/// assert_eq!(config.region_limit.map(NonZeroUsize::get), Some(64 * 1024));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Config {
  /// Largest size, in bytes, the managed region may reach. Growth past it
  /// fails with [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory)
  /// without calling the growth primitive.
  pub region_limit: Option<NonZeroUsize>,
}

impl Config {
  pub const fn new() -> Self {
    Self { region_limit: None }
  }

  pub const fn region_limit(
    mut self,
    bytes: NonZeroUsize,
  ) -> Self {
    self.region_limit = Some(bytes);
    self
  }
}
