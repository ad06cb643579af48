use std::{fmt, mem};

use crate::align::GRANULARITY;

/// Bytes occupied by one [`Header`] in the arena.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const FREE_FLAG_MASK: usize = 0x1;

/// The word stored at the start of every block: the address of the next
/// header, with the free flag packed into bit 0.
///
/// Header addresses are multiples of [`GRANULARITY`], so bit 0 of a real link
/// is always zero and can carry the flag.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Link(usize);

impl Link {
  pub const fn new(
    next: usize,
    is_free: bool,
  ) -> Self {
    Self((next & !FREE_FLAG_MASK) | if is_free { FREE_FLAG_MASK } else { 0 })
  }

  /// Address of the next header, flag masked off.
  pub const fn next(self) -> usize {
    self.0 & !FREE_FLAG_MASK
  }

  pub const fn is_free(self) -> bool {
    self.0 & FREE_FLAG_MASK != 0
  }

  /// Same flag, different successor.
  pub const fn with_next(
    self,
    next: usize,
  ) -> Self {
    Self::new(next, self.is_free())
  }

  /// Same successor, different flag.
  pub const fn with_free(
    self,
    is_free: bool,
  ) -> Self {
    Self::new(self.next(), is_free)
  }

  /// The packed word as it lies in the arena.
  pub const fn raw(self) -> usize {
    self.0
  }
}

impl fmt::Debug for Link {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Link")
      .field("next", &format_args!("{:#x}", self.next()))
      .field("is_free", &self.is_free())
      .finish()
  }
}

/// Block metadata placed in front of every payload.
///
/// The alignment pins the header to one granule on 32-bit targets too, so the
/// payload that follows stays granule aligned.
#[repr(C, align(8))]
#[derive(Debug, Default)]
pub struct Header {
  link: Link,
}

const _: () = assert!(HEADER_SIZE % GRANULARITY == 0);

impl Header {
  pub const fn new(link: Link) -> Self {
    Self { link }
  }

  pub fn link(&self) -> Link {
    self.link
  }

  pub fn set_link(
    &mut self,
    link: Link,
  ) {
    self.link = link;
  }

  pub fn next(&self) -> usize {
    self.link.next()
  }

  pub fn is_free(&self) -> bool {
    self.link.is_free()
  }

  pub fn set_next(
    &mut self,
    next: usize,
  ) {
    self.link = self.link.with_next(next);
  }

  pub fn set_free(
    &mut self,
    is_free: bool,
  ) {
    self.link = self.link.with_free(is_free);
  }

  /// Payload bytes between this header and the next one.
  ///
  /// A successor at or below this header (the sentinel's wrap back to the
  /// start of the chain) yields 0.
  pub fn size(&self) -> usize {
    block_size(self as *const Header as usize, self.next())
  }
}

/// Payload size of a block at `addr` whose successor header sits at `next`.
pub const fn block_size(
  addr: usize,
  next: usize,
) -> usize {
  next.saturating_sub(addr.saturating_add(HEADER_SIZE))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_link_separates_flag_and_next() {
    let link = Link::new(0x1000, true);
    assert_eq!(link.next(), 0x1000);
    assert!(link.is_free());

    let moved = link.with_next(0x2000);
    assert_eq!(moved.next(), 0x2000);
    assert!(moved.is_free());

    let taken = moved.with_free(false);
    assert_eq!(taken.next(), 0x2000);
    assert!(!taken.is_free());
    assert_eq!(taken.raw(), 0x2000);
  }

  #[test]
  fn test_link_masks_stray_low_bit() {
    let link = Link::new(0x1001, false);
    assert_eq!(link.next(), 0x1000);
    assert!(!link.is_free());
  }

  #[test]
  fn test_header_size() {
    assert_eq!(HEADER_SIZE, 8);
    assert_eq!(mem::align_of::<Header>(), GRANULARITY);
  }

  #[test]
  fn test_block_size() {
    assert_eq!(block_size(0x1000, 0x1000 + HEADER_SIZE + 0x100), 0x100);
    assert_eq!(block_size(0x1000, 0x1000 + HEADER_SIZE), 0);
    assert_eq!(block_size(0x2000, 0x1000), 0);
  }

  #[test]
  fn test_header_size_follows_next() {
    let mut header = Header::default();
    let addr = &header as *const Header as usize;

    header.set_next(addr + HEADER_SIZE + 0x40);
    header.set_free(true);

    assert_eq!(header.size(), 0x40);
    assert!(header.is_free());
  }
}
