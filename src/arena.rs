//! Arena provisioning: anonymous memory straight from the OS.
//!
//! The allocator itself only ever sees two bounds. This module is the usual way
//! to get them: a private `mmap` of whole pages that is unmapped on drop.

use std::{io, ptr, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};
use tracing::{debug, trace};

use crate::error::ArenaError;

/// A zero-filled, page-aligned byte range owned by the process.
pub struct MappedArena {
  base: *mut u8,
  len: usize,
  mapped: usize,
}

impl MappedArena {
  /// Maps at least `len` bytes. Only the first `len` are handed out.
  pub fn new(len: usize) -> Result<Self, ArenaError> {
    if len == 0 {
      return Err(ArenaError::Empty);
    }

    let page = page_size();
    let mapped = len
      .checked_add(page - 1)
      .map(|padded| padded / page * page)
      .ok_or(ArenaError::TooLarge { len })?;

    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        mapped,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(ArenaError::Map {
        len: mapped,
        source: io::Error::last_os_error(),
      });
    }

    debug!("mapped arena of {} bytes at {:?}", mapped, address);

    Ok(Self {
      base: address.cast(),
      len,
      mapped,
    })
  }

  /// `(memory_start, memory_end)` of the usable range.
  ///
  /// The base pointer's provenance is exposed, so the pair can be passed to
  /// [`FreeList::from_raw_bounds`](crate::FreeList::from_raw_bounds).
  pub fn bounds(&self) -> (usize, usize) {
    let start = self.base.expose_provenance();
    (start, start + self.len)
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn as_mut_slice(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base, self.len) }
  }
}

impl Drop for MappedArena {
  fn drop(&mut self) {
    trace!("unmapping arena of {} bytes at {:?}", self.mapped, self.base);

    unsafe {
      libc::munmap(self.base as *mut c_void, self.mapped);
    }
  }
}

fn page_size() -> usize {
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    size if size > 0 => size as usize,
    _ => 4096,
  }
}
