/// Size of the allocation unit. Every header address and every block size is a
/// multiple of it, which keeps bit 0 of a header link free for the flag.
pub const GRANULARITY: usize = 8;

/// Smallest payload a block may carry.
pub const MIN_SIZE: usize = GRANULARITY;

/// Rounds a value up to the next multiple of [`GRANULARITY`].
///
/// Overflows like plain `usize` arithmetic; see [`checked_align_up`] for
/// untrusted input.
///
/// # Examples
///
/// ```rust
/// use rfreelist::align_up;
///
/// assert_eq!(align_up!(0), 0);
/// assert_eq!(align_up!(13), 16);
/// assert_eq!(align_up!(16), 16);
/// ```
#[macro_export]
macro_rules! align_up {
  ($value:expr) => {
    ($value + $crate::align::GRANULARITY - 1) & !($crate::align::GRANULARITY - 1)
  };
}

/// Rounds a value down to a multiple of [`GRANULARITY`].
///
/// # Examples
///
/// ```rust
/// use rfreelist::align_down;
///
/// assert_eq!(align_down!(13), 8);
/// assert_eq!(align_down!(7), 0);
/// ```
#[macro_export]
macro_rules! align_down {
  ($value:expr) => {
    $value & !($crate::align::GRANULARITY - 1)
  };
}

/// [`align_up!`] that reports overflow instead of wrapping.
pub const fn checked_align_up(value: usize) -> Option<usize> {
  match value.checked_add(GRANULARITY - 1) {
    Some(padded) => Some(align_down!(padded)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align_up() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (GRANULARITY * i + 1)..=(GRANULARITY * (i + 1));

      let expected_alignment = GRANULARITY * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align_up!(size));
      }
    }
  }

  #[test]
  fn test_align_down() {
    for i in 0..10 {
      for size in (GRANULARITY * i)..(GRANULARITY * (i + 1)) {
        assert_eq!(GRANULARITY * i, align_down!(size));
      }
    }
  }

  #[test]
  fn test_checked_align_up() {
    assert_eq!(checked_align_up(1), Some(GRANULARITY));
    assert_eq!(checked_align_up(usize::MAX - GRANULARITY + 1), Some(usize::MAX - GRANULARITY + 1));
    assert_eq!(checked_align_up(usize::MAX), None);
    assert_eq!(checked_align_up(usize::MAX - 3), None);
  }
}
