//! A singly-linked list of integers whose nodes live in a [`FreeList`] arena.

use std::{fmt, marker::PhantomData, mem, ptr};

use crate::{error::Result, freelist::FreeList};

#[repr(C)]
struct Node {
  value: i32,
  next: *mut Node,
}

/// Integer list allocating one arena block per node.
///
/// New values go to the head. The list borrows the allocator for its whole
/// life and frees every node it still holds when dropped.
pub struct List<'h, 'a> {
  heap: &'h mut FreeList<'a>,
  head: *mut Node,
  len: usize,
}

impl<'h, 'a> List<'h, 'a> {
  pub fn new(heap: &'h mut FreeList<'a>) -> Self {
    Self {
      heap,
      head: ptr::null_mut(),
      len: 0,
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Inserts `value` at the head.
  pub fn push(
    &mut self,
    value: i32,
  ) -> Result<()> {
    let node = self.heap.allocate(mem::size_of::<Node>())?.cast::<Node>();

    unsafe {
      node.as_ptr().write(Node {
        value,
        next: self.head,
      });
    }

    self.head = node.as_ptr();
    self.len += 1;
    Ok(())
  }

  /// Removes the head node and returns its value.
  pub fn delete(&mut self) -> Option<i32> {
    if self.head.is_null() {
      return None;
    }

    unsafe {
      let Node { value, next } = self.head.read();
      self.heap.free(self.head.cast());
      self.head = next;
      self.len -= 1;
      Some(value)
    }
  }

  /// Reverses the node order in place.
  pub fn reverse(&mut self) {
    let mut previous: *mut Node = ptr::null_mut();
    let mut current = self.head;

    while !current.is_null() {
      unsafe {
        let next = (*current).next;
        (*current).next = previous;
        previous = current;
        current = next;
      }
    }

    self.head = previous;
  }

  /// Frees every node.
  pub fn clear(&mut self) {
    while self.delete().is_some() {}
  }

  pub fn iter(&self) -> Iter<'_> {
    Iter {
      node: self.head,
      _list: PhantomData,
    }
  }
}

impl Drop for List<'_, '_> {
  fn drop(&mut self) {
    self.clear();
  }
}

impl fmt::Display for List<'_, '_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for (i, value) in self.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{value}")?;
    }
    Ok(())
  }
}

pub struct Iter<'l> {
  node: *const Node,
  _list: PhantomData<&'l Node>,
}

impl Iterator for Iter<'_> {
  type Item = i32;

  fn next(&mut self) -> Option<i32> {
    if self.node.is_null() {
      return None;
    }

    unsafe {
      let node = &*self.node;
      self.node = node.next;
      Some(node.value)
    }
  }
}
