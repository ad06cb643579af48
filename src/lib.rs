//! # rfreelist - A Next-Fit Free-List Allocator
//!
//! This crate manages one fixed byte range (the *arena*) with a circular list
//! of block headers stored inside the arena itself.
//!
//! ## Overview
//!
//! ```text
//!   Arena Layout:
//!
//!   memory_start                                                memory_end
//!   │                                                                    │
//!   ▼                                                                    ▼
//!   ┌────┬──────────┬────┬─────┬────┬─────────────────────────────┬────┐
//!   │ H  │  used    │ H  │used │ H  │            free             │ S  │
//!   └─┬──┴──────────┴─┬──┴─────┴─┬──┴─────────────────────────────┴─┬──┘
//!     │      ▲        │   ▲      │   ▲                              │
//!     └──────┼────────┘   │      └───┼──────────────────────────────┘
//!            │            │          │                              │
//!          first       (next)     current                    sentinel ──► first
//!
//!   H = header: the address of the next header, free flag in bit 0
//!   S = sentinel: permanently allocated, closes the circle
//! ```
//!
//! A block's size is never stored. It is the distance to the next header
//! minus one header.
//!
//! ## Crate Structure
//!
//! ```text
//!   rfreelist
//!   ├── align      - Granularity constants and align_up!/align_down!
//!   ├── block      - Packed header link (Link) and Header
//!   ├── freelist   - FreeList: init, allocate, free, coalescing
//!   ├── inspect    - Chain dump, statistics and the packing self-check
//!   ├── arena      - MappedArena: mmap-backed arena provisioning
//!   ├── list       - Linked-list client storing its nodes in the arena
//!   ├── config     - ArenaConfig read from the environment
//!   ├── logging    - tracing-subscriber setup for binaries
//!   └── error      - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rfreelist::{FreeList, MappedArena};
//!
//! let mut arena = MappedArena::new(4096).unwrap();
//! let mut heap = FreeList::from_arena(&mut arena);
//!
//! let ptr = heap.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0xAB, 64);
//!     heap.free(ptr.as_ptr());
//! }
//!
//! println!("{}", heap.dump());
//! ```
//!
//! ## How It Works
//!
//! - **Allocation** rounds the request up to [`GRANULARITY`], then scans the
//!   chain starting at `current`. Each free block visited is merged with a
//!   free successor first. The first block that is large enough is taken and
//!   split if the rest can hold another header and a minimum payload.
//!   `current` moves to the block after it.
//! - **Freeing** sets the flag and merges the block with a free successor and
//!   a free predecessor. The predecessor is found by walking from `first`.
//! - **Failure** is a return value: [`AllocError::OutOfMemory`] after one
//!   fruitless lap, [`AllocError::ArenaTooSmall`] when the arena cannot hold a
//!   block plus the sentinel.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization, `FreeList` is `!Send`
//! - **Fixed arena**: the allocator never grows
//! - **Fixed alignment**: payloads are aligned to 8 bytes, nothing more
//! - **Trusting free**: passing a foreign pointer to `free` is undefined

pub mod align;
pub mod arena;
mod block;
pub mod config;
pub mod error;
mod freelist;
pub mod inspect;
pub mod list;
pub mod logging;

pub use align::{GRANULARITY, MIN_SIZE};
pub use arena::MappedArena;
pub use block::{HEADER_SIZE, Header, Link};
pub use error::{AllocError, ArenaError, SelfCheckFailure};
pub use freelist::{FreeList, MIN_ARENA_SIZE};
pub use inspect::{BlockDump, BlockInfo, ChainStats, DumpFault, self_check};
pub use list::List;
