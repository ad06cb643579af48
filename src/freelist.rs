use std::{
  marker::PhantomData,
  ptr::{self, NonNull},
};

use tracing::{debug, warn};

use crate::{
  align::{MIN_SIZE, checked_align_up},
  align_down,
  arena::MappedArena,
  block::{HEADER_SIZE, Header, Link, block_size},
  error::{AllocError, Result},
};

/// Smallest aligned span that holds one minimum block plus the sentinel.
pub const MIN_ARENA_SIZE: usize = 2 * HEADER_SIZE + MIN_SIZE;

/// The three distinguished headers of an initialized chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chain {
  pub(crate) first: usize,
  pub(crate) current: usize,
  pub(crate) last: usize,
}

/// A next-fit free-list allocator over one fixed arena.
///
/// Block headers live inside the arena and form a circular list ordered by
/// address. The list is closed by a sentinel header at the top of the arena
/// which is permanently marked allocated. The chain is built lazily by the
/// first call to [`allocate`](FreeList::allocate) or [`init`](FreeList::init).
///
/// The allocator holds raw pointers into the arena and is neither `Send` nor
/// `Sync`.
pub struct FreeList<'a> {
  base: *mut u8,
  memory_start: usize,
  memory_end: usize,
  chain: Option<Chain>,
  _arena: PhantomData<&'a mut [u8]>,
}

impl<'a> FreeList<'a> {
  /// Manages the bytes of `arena`. Nothing is written until the chain is
  /// initialized.
  pub fn from_slice(arena: &'a mut [u8]) -> Self {
    let range = arena.as_mut_ptr_range();

    Self {
      base: range.start,
      memory_start: range.start.addr(),
      memory_end: range.end.addr(),
      chain: None,
      _arena: PhantomData,
    }
  }

  pub fn from_arena(arena: &'a mut MappedArena) -> Self {
    Self::from_slice(arena.as_mut_slice())
  }
}

impl FreeList<'static> {
  /// Manages the address range `[memory_start, memory_end)`.
  ///
  /// # Safety
  ///
  /// The range must be valid for reads and writes, must not be accessed by
  /// anything but this allocator and the holders of its payloads, and must
  /// outlive the allocator.
  pub unsafe fn from_raw_bounds(
    memory_start: usize,
    memory_end: usize,
  ) -> Self {
    Self {
      base: ptr::with_exposed_provenance_mut(memory_start),
      memory_start,
      memory_end,
      chain: None,
      _arena: PhantomData,
    }
  }
}

impl FreeList<'_> {
  /// The raw arena bounds as supplied by the embedder.
  pub fn bounds(&self) -> (usize, usize) {
    (self.memory_start, self.memory_end)
  }

  pub fn is_initialized(&self) -> bool {
    self.chain.is_some()
  }

  /// Header address where the next search starts.
  pub fn current(&self) -> Option<usize> {
    self.chain.map(|chain| chain.current)
  }

  /// Payload bytes of the single free block a fresh chain starts with, or 0
  /// when the arena is too small to hold a chain.
  pub fn capacity(&self) -> usize {
    match self.aligned_bounds() {
      Some((start, end)) => end - start - 2 * HEADER_SIZE,
      None => 0,
    }
  }

  /// Builds the chain if it does not exist yet.
  ///
  /// On a too-small arena the chain stays uninitialized and every later
  /// allocation fails with the same error.
  pub fn init(&mut self) -> Result<()> {
    self.ensure_chain().map(|_| ()).inspect_err(|_| {
      warn!(
        "arena {:#x}..{:#x} is too small for a block chain",
        self.memory_start, self.memory_end
      );
    })
  }

  /// Allocates at least `size` bytes and returns the payload address.
  ///
  /// The request is rounded up to the granularity with a floor of
  /// [`MIN_SIZE`]. The search resumes where the previous allocation ended and
  /// makes at most one lap around the chain, merging each free block it visits
  /// with a free successor before looking at its size.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let mut chain = self.ensure_chain()?;
    let out_of_memory = AllocError::OutOfMemory { requested: size };

    let request = checked_align_up(size).ok_or(out_of_memory)?.max(MIN_SIZE);

    let mut start = chain.current;
    let mut block = start;

    loop {
      let mut final_lap = false;

      if self.link(block).is_free() {
        if self.merge_next(&mut chain, block) == Some(start) {
          start = block;
          final_lap = true;
        }

        if block_size(block, self.link(block).next()) >= request {
          self.take(block, request);
          chain.current = self.link(block).next();
          self.chain = Some(chain);

          return self.payload(block).ok_or(out_of_memory);
        }
      }

      block = self.link(block).next();

      if final_lap || block == start {
        break;
      }
    }

    self.chain = Some(chain);
    Err(out_of_memory)
  }

  /// Returns a block to the free list and merges it with free neighbours.
  ///
  /// Null is ignored, and so is a block that is already marked free.
  ///
  /// # Safety
  ///
  /// `address` must be null or a payload address returned by
  /// [`allocate`](FreeList::allocate) on this allocator.
  pub unsafe fn free(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    let Some(mut chain) = self.chain else {
      return;
    };

    let block = address.addr().wrapping_sub(HEADER_SIZE);
    let link = self.link(block);

    if link.is_free() {
      return;
    }

    self.write_link(block, link.with_free(true));
    self.coalesce(&mut chain, block);
    self.chain = Some(chain);
  }

  pub(crate) fn chain(&self) -> Option<Chain> {
    self.chain
  }

  /// Reads the link at `addr` if a whole header fits there inside the arena.
  pub(crate) fn read_link(
    &self,
    addr: usize,
  ) -> Option<Link> {
    let in_range = addr >= self.memory_start
      && addr.checked_add(HEADER_SIZE).is_some_and(|end| end <= self.memory_end)
      && addr % HEADER_SIZE == 0;

    in_range.then(|| self.link(addr))
  }

  fn aligned_bounds(&self) -> Option<(usize, usize)> {
    let start = checked_align_up(self.memory_start)?;
    let end = align_down!(self.memory_end);

    (end >= start && end - start >= MIN_ARENA_SIZE).then_some((start, end))
  }

  fn ensure_chain(&mut self) -> Result<Chain> {
    if let Some(chain) = self.chain {
      return Ok(chain);
    }

    let Some((start, end)) = self.aligned_bounds() else {
      return Err(AllocError::ArenaTooSmall {
        start: self.memory_start,
        end: self.memory_end,
      });
    };

    let first = start;
    let last = end - HEADER_SIZE;

    self.write_link(first, Link::new(last, true));
    self.write_link(last, Link::new(first, false));

    let chain = Chain {
      first,
      current: first,
      last,
    };
    self.chain = Some(chain);

    debug!(
      "initialized block chain {:#x}..{:#x} with {} free bytes",
      first,
      last,
      block_size(first, last)
    );

    Ok(chain)
  }

  /// Marks `block` allocated, splitting off a free tail when the leftover can
  /// hold a header and a minimum payload.
  fn take(
    &mut self,
    block: usize,
    request: usize,
  ) {
    let link = self.link(block);
    let available = block_size(block, link.next());

    if available - request >= HEADER_SIZE + MIN_SIZE {
      let tail = block + HEADER_SIZE + request;

      self.write_link(tail, Link::new(link.next(), true));
      self.write_link(block, Link::new(tail, false));
    } else {
      self.write_link(block, link.with_free(false));
    }
  }

  /// Merges a free block with both neighbours where they are free.
  fn coalesce(
    &mut self,
    chain: &mut Chain,
    block: usize,
  ) {
    if block == chain.last || !self.link(block).is_free() {
      return;
    }

    self.merge_next(chain, block);

    if let Some(previous) = self.find_predecessor(chain, block) {
      if previous != chain.last && self.link(previous).is_free() {
        self.merge_next(chain, previous);
      }
    }
  }

  /// Splices the successor of `block` out of the chain when it is free and
  /// not the sentinel. Returns the absorbed header.
  fn merge_next(
    &mut self,
    chain: &mut Chain,
    block: usize,
  ) -> Option<usize> {
    let link = self.link(block);
    let next = link.next();

    if next == chain.last || !self.link(next).is_free() {
      return None;
    }

    self.write_link(block, link.with_next(self.link(next).next()));

    if chain.current == next {
      chain.current = block;
    }

    Some(next)
  }

  /// Walks the chain from `first` to the header whose successor is `block`.
  fn find_predecessor(
    &self,
    chain: &Chain,
    block: usize,
  ) -> Option<usize> {
    let mut cursor = chain.first;

    loop {
      let next = self.link(cursor).next();

      if next == block {
        return Some(cursor);
      }

      cursor = next;

      if cursor == chain.first {
        return None;
      }
    }
  }

  fn payload(
    &self,
    block: usize,
  ) -> Option<NonNull<u8>> {
    NonNull::new(self.header(block).cast::<u8>().wrapping_add(HEADER_SIZE))
  }

  fn header(
    &self,
    addr: usize,
  ) -> *mut Header {
    self.base.wrapping_add(addr.wrapping_sub(self.memory_start)).cast()
  }

  fn link(
    &self,
    addr: usize,
  ) -> Link {
    // Safety: every address handed in is a header slot of the chain, which
    // lies inside the arena the caller vouched for at construction.
    unsafe { (*self.header(addr)).link() }
  }

  fn write_link(
    &mut self,
    addr: usize,
    link: Link,
  ) {
    // Safety: see `link`.
    unsafe { (*self.header(addr)).set_link(link) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::inspect::BlockInfo;

  fn blocks(list: &FreeList<'_>) -> Vec<BlockInfo> {
    let dump = list.dump();
    assert!(dump.fault().is_none(), "corrupted chain:\n{dump}");
    dump.blocks().to_vec()
  }

  fn header_of(ptr: NonNull<u8>) -> usize {
    ptr.as_ptr().addr() - HEADER_SIZE
  }

  #[test]
  fn test_init_lays_out_first_and_sentinel() {
    let mut arena = MappedArena::new(0x100).unwrap();
    let (start, end) = arena.bounds();
    let mut list = FreeList::from_arena(&mut arena);

    assert!(!list.is_initialized());
    list.init().unwrap();

    let blocks = blocks(&list);
    assert_eq!(blocks.len(), 2);

    assert_eq!(blocks[0].addr, start);
    assert_eq!(blocks[0].next, end - HEADER_SIZE);
    assert!(blocks[0].is_free);
    assert_eq!(blocks[0].size, 0x100 - 2 * HEADER_SIZE);

    assert_eq!(blocks[1].addr, end - HEADER_SIZE);
    assert_eq!(blocks[1].next, start);
    assert!(!blocks[1].is_free);
    assert_eq!(blocks[1].size, 0);

    assert_eq!(list.current(), Some(start));
    assert_eq!(list.capacity(), 0x100 - 2 * HEADER_SIZE);
  }

  #[test]
  fn test_init_is_idempotent() {
    let mut arena = MappedArena::new(0x100).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let a = list.allocate(0x20).unwrap();
    let before = blocks(&list);

    list.init().unwrap();

    assert_eq!(blocks(&list), before);
    unsafe { list.free(a.as_ptr()) };
  }

  #[test]
  fn test_arena_too_small() {
    let mut arena = MappedArena::new(MIN_ARENA_SIZE - 1).unwrap();
    let (start, end) = arena.bounds();
    let mut list = FreeList::from_arena(&mut arena);

    let expected = AllocError::ArenaTooSmall { start, end };

    assert_eq!(list.init(), Err(expected));
    assert_eq!(list.allocate(1), Err(expected));
    assert_eq!(list.allocate(0), Err(expected));
    assert!(!list.is_initialized());
    assert_eq!(list.capacity(), 0);
  }

  #[test]
  fn test_unaligned_slice_is_trimmed() {
    let mut arena = MappedArena::new(0x100).unwrap();
    let (start, end) = arena.bounds();
    let bytes = arena.as_mut_slice();
    let mut list = FreeList::from_slice(&mut bytes[3..0xFD]);

    list.init().unwrap();

    let blocks = blocks(&list);
    assert_eq!(blocks[0].addr, start + 8);
    assert_eq!(blocks[1].addr, end - 8 - HEADER_SIZE);
  }

  #[test]
  fn test_requests_are_rounded() {
    let mut arena = MappedArena::new(0x200).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    for request in [0usize, 1, 7, 8, 9, 13, 24] {
      let ptr = list.allocate(request).unwrap();
      let block = blocks(&list).into_iter().find(|block| block.addr == header_of(ptr)).unwrap();

      assert!(!block.is_free);
      assert_eq!(block.size, align_up_min(request));
      assert_eq!(ptr.as_ptr().addr() % HEADER_SIZE, 0);
    }
  }

  fn align_up_min(request: usize) -> usize {
    crate::align_up!(request).max(MIN_SIZE)
  }

  #[test]
  fn test_small_leftover_is_not_split() {
    // One block of 0x28 payload bytes: a 0x20 request leaves 8 bytes, too few
    // for a header plus a minimum payload.
    let mut arena = MappedArena::new(0x28 + 2 * HEADER_SIZE).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let ptr = list.allocate(0x20).unwrap();

    let blocks = blocks(&list);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].addr, header_of(ptr));
    assert_eq!(blocks[0].size, 0x28);
    assert!(!blocks[0].is_free);
  }

  #[test]
  fn test_large_leftover_is_split() {
    let mut arena = MappedArena::new(0x30 + 2 * HEADER_SIZE).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let ptr = list.allocate(0x20).unwrap();

    let blocks = blocks(&list);
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].size, 0x20);
    assert!(!blocks[0].is_free);
    assert_eq!(blocks[1].addr, header_of(ptr) + HEADER_SIZE + 0x20);
    assert_eq!(blocks[1].size, MIN_SIZE);
    assert!(blocks[1].is_free);
    assert_eq!(list.current(), Some(blocks[1].addr));
  }

  #[test]
  fn test_exhaustion() {
    let mut arena = MappedArena::new(MIN_ARENA_SIZE).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let first = list.allocate(1).unwrap();

    assert_eq!(list.allocate(1), Err(AllocError::OutOfMemory { requested: 1 }));
    assert_eq!(list.allocate(0x100), Err(AllocError::OutOfMemory { requested: 0x100 }));

    unsafe { list.free(first.as_ptr()) };
    assert!(list.allocate(MIN_SIZE).is_ok());
  }

  #[test]
  fn test_oversized_request_fails() {
    let mut arena = MappedArena::new(0x100).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    assert_eq!(
      list.allocate(usize::MAX),
      Err(AllocError::OutOfMemory { requested: usize::MAX })
    );
    assert_eq!(list.allocate(0x100), Err(AllocError::OutOfMemory { requested: 0x100 }));
    assert!(list.allocate(list.capacity()).is_ok());
  }

  #[test]
  fn test_coalescing_closes_the_loop() {
    for reverse in [false, true] {
      let mut arena = MappedArena::new(0x400).unwrap();
      let mut list = FreeList::from_arena(&mut arena);
      let capacity = list.capacity();

      let a = list.allocate(0x40).unwrap();
      let b = list.allocate(0x80).unwrap();
      assert_eq!(header_of(b), header_of(a) + HEADER_SIZE + 0x40);

      unsafe {
        if reverse {
          list.free(b.as_ptr());
          list.free(a.as_ptr());
        } else {
          list.free(a.as_ptr());
          list.free(b.as_ptr());
        }
      }

      let blocks = blocks(&list);
      assert_eq!(blocks.len(), 2, "reverse = {reverse}");
      assert!(blocks[0].is_free);
      assert_eq!(blocks[0].size, capacity);
    }
  }

  #[test]
  fn test_free_merges_both_neighbours() {
    let mut arena = MappedArena::new(0x200).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let a = list.allocate(0x20).unwrap();
    let b = list.allocate(0x20).unwrap();
    let c = list.allocate(0x20).unwrap();
    let guard = list.allocate(0x20).unwrap();

    unsafe {
      list.free(a.as_ptr());
      list.free(c.as_ptr());
      list.free(b.as_ptr());
    }

    let blocks = blocks(&list);
    assert_eq!(blocks[0].addr, header_of(a));
    assert!(blocks[0].is_free);
    assert_eq!(blocks[0].size, 3 * 0x20 + 2 * HEADER_SIZE);
    assert_eq!(blocks[1].addr, header_of(guard));
    assert!(!blocks[1].is_free);
  }

  #[test]
  fn test_next_fit_reuses_freed_region() {
    // Sized so that A and B use the whole arena and nothing is left after B.
    let len = (HEADER_SIZE + 0x200) + (HEADER_SIZE + 0x100) + HEADER_SIZE;
    let mut arena = MappedArena::new(len).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let a = list.allocate(0x200).unwrap();
    let b = list.allocate(0x100).unwrap();
    unsafe { list.free(a.as_ptr()) };

    let c = list.allocate(0x100).unwrap();

    assert_eq!(c, a);
    assert!(header_of(b) > header_of(c));
  }

  #[test]
  fn test_next_fit_resumes_after_last_allocation() {
    let mut arena = MappedArena::new(0x1000).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let a = list.allocate(0x200).unwrap();
    let b = list.allocate(0x100).unwrap();
    unsafe { list.free(a.as_ptr()) };

    let c = list.allocate(0x100).unwrap();

    assert_eq!(header_of(c), header_of(b) + HEADER_SIZE + 0x100);
  }

  #[test]
  fn test_search_wraps_around() {
    let len = 3 * (HEADER_SIZE + 0x40) + HEADER_SIZE;
    let mut arena = MappedArena::new(len).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let a = list.allocate(0x40).unwrap();
    let b = list.allocate(0x40).unwrap();
    let c = list.allocate(0x40).unwrap();
    assert_eq!(list.allocate(1), Err(AllocError::OutOfMemory { requested: 1 }));

    unsafe { list.free(b.as_ptr()) };
    assert_eq!(list.allocate(0x40).unwrap(), b);

    unsafe {
      list.free(a.as_ptr());
      list.free(c.as_ptr());
    }
    assert_eq!(list.allocate(0x40).unwrap(), c);
    assert_eq!(list.allocate(0x40).unwrap(), a);
  }

  #[test]
  fn test_double_free_is_a_no_op() {
    let mut arena = MappedArena::new(0x200).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let a = list.allocate(0x20).unwrap();
    let b = list.allocate(0x20).unwrap();
    let _c = list.allocate(0x20).unwrap();

    unsafe { list.free(b.as_ptr()) };
    let once = blocks(&list);

    unsafe { list.free(b.as_ptr()) };
    assert_eq!(blocks(&list), once);

    unsafe {
      list.free(a.as_ptr());
      list.free(b.as_ptr());
    }
    assert_eq!(blocks(&list)[0].size, 2 * 0x20 + HEADER_SIZE);
  }

  #[test]
  fn test_free_null_is_a_no_op() {
    let mut arena = MappedArena::new(0x100).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    unsafe { list.free(ptr::null_mut()) };
    assert!(!list.is_initialized());

    list.init().unwrap();
    let before = blocks(&list);
    unsafe { list.free(ptr::null_mut()) };
    assert_eq!(blocks(&list), before);
  }

  #[test]
  fn test_cursor_follows_absorbed_block() {
    let mut arena = MappedArena::new(0x200).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let _a = list.allocate(0x20).unwrap();
    let b = list.allocate(0x20).unwrap();
    let tail = header_of(b) + HEADER_SIZE + 0x20;
    assert_eq!(list.current(), Some(tail));

    unsafe { list.free(b.as_ptr()) };

    assert_eq!(list.current(), Some(header_of(b)));
    assert!(blocks(&list).iter().all(|block| block.addr != tail));
  }

  #[test]
  fn test_payload_writes_keep_chain_intact() {
    let mut arena = MappedArena::new(0x400).unwrap();
    let mut list = FreeList::from_arena(&mut arena);

    let sizes = [0x10usize, 0x38, 0x08, 0x100];
    let ptrs: Vec<_> = sizes.iter().map(|&size| list.allocate(size).unwrap()).collect();

    for (ptr, &size) in ptrs.iter().zip(&sizes) {
      unsafe { ptr::write_bytes(ptr.as_ptr(), 0xFF, size) };
    }

    let blocks = blocks(&list);
    assert_eq!(blocks.len(), sizes.len() + 2);
    for (block, &size) in blocks.iter().zip(&sizes) {
      assert_eq!(block.size, size);
      assert!(!block.is_free);
    }
  }

  #[test]
  fn test_raw_bounds() {
    let mut arena = MappedArena::new(0x100).unwrap();
    let (start, end) = arena.bounds();

    let mut list = unsafe { FreeList::from_raw_bounds(start, end) };
    let ptr = list.allocate(0x10).unwrap();

    assert_eq!(ptr.as_ptr().addr(), start + HEADER_SIZE);
    assert_eq!(list.bounds(), (start, end));
  }
}
