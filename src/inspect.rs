//! Read-only views of the block chain and a self-check of the link packing.

use std::fmt;

use crate::{
  block::{HEADER_SIZE, Header, block_size},
  error::{AddressWidth, PackingProperty, SelfCheckFailure},
  freelist::FreeList,
};

/// Probe addresses for [`self_check`]: one that fits in 32 bits and one that
/// needs the upper half of a 64-bit word (truncated on 32-bit targets).
const PROBES: [(AddressWidth, usize); 2] = [
  (AddressWidth::Narrow, 0x1234_BABA),
  (AddressWidth::Wide, 0xFEDC_BA98_1234_BABA_u64 as usize),
];

/// Checks that the free flag and the next address packed into a header link
/// never disturb each other, and that block sizes come out right for forward
/// and backward successors.
pub fn self_check() -> Result<(), SelfCheckFailure> {
  let mut header = Header::default();

  for (i, &(width, probe)) in PROBES.iter().enumerate() {
    let fail = |property| SelfCheckFailure { property, width };

    header.set_next(0);
    header.set_free(false);

    header.set_next(probe);
    header.set_free(true);

    if header.next() != probe {
      return Err(fail(PackingProperty::NextDamagedBySetFree));
    }
    if !header.is_free() {
      return Err(fail(PackingProperty::FlagNotSet));
    }

    header.set_next(0);
    if !header.is_free() {
      return Err(fail(PackingProperty::FlagDamagedBySetNext));
    }

    header.set_next(probe);
    header.set_free(false);

    if header.is_free() {
      return Err(fail(PackingProperty::FlagNotCleared));
    }
    if header.next() != probe {
      return Err(fail(PackingProperty::NextDamagedByClear));
    }

    // Sizes must not depend on the flag.
    header.set_free(i % 2 == 1);

    let addr = &header as *const Header as usize;

    header.set_next(addr + HEADER_SIZE + 0x100);
    if header.size() != 0x100 {
      return Err(fail(PackingProperty::ForwardSize));
    }

    header.set_next((addr + HEADER_SIZE).wrapping_sub(0x100));
    let size = header.size();
    if size != 0 && size < 0x0800_0000_0000_0000_u64 as usize {
      return Err(fail(PackingProperty::BackwardSize));
    }
  }

  Ok(())
}

/// One header as seen by a chain walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub addr: usize,
  pub next: usize,
  pub size: usize,
  pub is_free: bool,
}

/// Why a chain walk stopped before returning to `first`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFault {
  /// A header address outside the arena.
  OutOfRange(usize),
  /// More headers than the arena has room for without getting back to
  /// `first`.
  Unterminated,
}

/// Snapshot of the chain, printable in the classic one-line-per-block form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockDump {
  Uninitialized,
  Chain {
    first: usize,
    current: usize,
    blocks: Vec<BlockInfo>,
    fault: Option<DumpFault>,
  },
}

/// Totals over the blocks of a [`BlockDump`], sentinel excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainStats {
  pub free_bytes: usize,
  pub free_blocks: usize,
  pub largest_free: usize,
  pub used_bytes: usize,
  pub used_blocks: usize,
}

impl BlockDump {
  pub fn blocks(&self) -> &[BlockInfo] {
    match self {
      BlockDump::Uninitialized => &[],
      BlockDump::Chain { blocks, .. } => blocks,
    }
  }

  pub fn fault(&self) -> Option<DumpFault> {
    match self {
      BlockDump::Uninitialized => None,
      BlockDump::Chain { fault, .. } => *fault,
    }
  }

  pub fn stats(&self) -> ChainStats {
    let blocks = self.blocks();
    // The last header of a complete walk is the sentinel.
    let regular = match self.fault() {
      None => &blocks[..blocks.len().saturating_sub(1)],
      Some(_) => blocks,
    };

    regular.iter().fold(ChainStats::default(), |mut stats, block| {
      if block.is_free {
        stats.free_bytes += block.size;
        stats.free_blocks += 1;
        stats.largest_free = stats.largest_free.max(block.size);
      } else {
        stats.used_bytes += block.size;
        stats.used_blocks += 1;
      }
      stats
    })
  }
}

impl fmt::Display for BlockDump {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let BlockDump::Chain {
      first,
      current,
      blocks,
      fault,
    } = self
    else {
      return writeln!(f, "Data structure is not initialized");
    };

    writeln!(f, "first = {first:#010x}, current = {current:#010x}")?;

    for block in blocks {
      writeln!(
        f,
        "Block at {:#010x} next = {:#010x}, free = {}",
        block.addr, block.next, block.is_free as u8
      )?;
    }

    match fault {
      Some(DumpFault::OutOfRange(addr)) => writeln!(f, "Block pointer {addr:#010x} out of range"),
      Some(DumpFault::Unterminated) => writeln!(f, "Block chain does not return to first"),
      None => Ok(()),
    }
  }
}

impl FreeList<'_> {
  /// Walks the chain from `first` without trusting it: every header address
  /// is bounds checked before it is read.
  pub fn dump(&self) -> BlockDump {
    let Some(chain) = self.chain() else {
      return BlockDump::Uninitialized;
    };

    let (start, end) = self.bounds();
    let max_headers = (end - start) / HEADER_SIZE;

    let mut blocks = Vec::new();
    let mut addr = chain.first;

    let fault = loop {
      if blocks.len() >= max_headers {
        break Some(DumpFault::Unterminated);
      }

      let Some(link) = self.read_link(addr) else {
        break Some(DumpFault::OutOfRange(addr));
      };

      blocks.push(BlockInfo {
        addr,
        next: link.next(),
        size: block_size(addr, link.next()),
        is_free: link.is_free(),
      });

      addr = link.next();

      if addr == chain.first {
        break None;
      }
    };

    BlockDump::Chain {
      first: chain.first,
      current: chain.current,
      blocks,
      fault,
    }
  }
}
