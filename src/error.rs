use std::{fmt, io};

use thiserror::Error;

/// Failures reported by [`FreeList`](crate::FreeList).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("arena {start:#x}..{end:#x} cannot hold one block and the sentinel")]
  ArenaTooSmall { start: usize, end: usize },

  #[error("out of memory (requested: {requested} bytes)")]
  OutOfMemory { requested: usize },
}

/// Failures while mapping a [`MappedArena`](crate::MappedArena).
#[derive(Debug, Error)]
pub enum ArenaError {
  #[error("cannot map an empty arena")]
  Empty,

  #[error("arena length {len} overflows when rounded to whole pages")]
  TooLarge { len: usize },

  #[error("mmap of {len} bytes failed: {source}")]
  Map {
    len: usize,
    #[source]
    source: io::Error,
  },
}

pub type Result<T> = core::result::Result<T, AllocError>;

/// A bit-packing property of [`Link`](crate::Link) that [`self_check`](crate::inspect::self_check) found broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(u8)]
pub enum PackingProperty {
  #[error("next address damaged by setting the free flag")]
  NextDamagedBySetFree = 1,

  #[error("free flag not set")]
  FlagNotSet = 2,

  #[error("free flag damaged by setting the next address")]
  FlagDamagedBySetNext = 3,

  #[error("free flag not cleared")]
  FlagNotCleared = 4,

  #[error("next address damaged by clearing the free flag")]
  NextDamagedByClear = 5,

  #[error("wrong size for a forward successor")]
  ForwardSize = 6,

  #[error("wrong size for a backward successor")]
  BackwardSize = 7,
}

/// Which of the two probe addresses a self-check failure occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWidth {
  /// Fits in 32 bits.
  Narrow,
  /// Uses the upper half of a 64-bit word.
  Wide,
}

impl fmt::Display for AddressWidth {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AddressWidth::Narrow => f.write_str("narrow"),
      AddressWidth::Wide => f.write_str("wide"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bit-packing self-check failed for the {width} address: {property}")]
pub struct SelfCheckFailure {
  pub property: PackingProperty,
  pub width: AddressWidth,
}

impl SelfCheckFailure {
  /// Numeric failure code: the property number, plus 10 for the wide address.
  pub fn code(&self) -> u8 {
    let offset = match self.width {
      AddressWidth::Narrow => 0,
      AddressWidth::Wide => 10,
    };
    self.property as u8 + offset
  }
}
