// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Ranges over bytes or elements.

/// A `first..first + count` span.  A `count` of `usize::MAX` means "until the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub first: usize,
    pub count: usize,
}

impl Range {
    pub const FULL: Range = Range { first: 0, count: usize::MAX };
    pub const EMPTY: Range = Range { first: 0, count: 0 };

    pub const fn new(first: usize, count: usize) -> Self {
        Range { first, count }
    }

    /// Everything from `first` to the end.
    pub const fn starting_at(first: usize) -> Self {
        Range { first, count: usize::MAX }
    }

    pub fn is_full(&self) -> bool {
        self.count == usize::MAX
    }

    /// Replaces an open-ended count with the remainder of `size`.
    ///
    /// A `first` past `size` produces a zero count; bounds are checked separately.
    pub fn limit(self, size: usize) -> Self {
        if self.is_full() {
            Range { first: self.first, count: size.saturating_sub(self.first) }
        } else {
            self
        }
    }

    /// One past the last index, or `None` on overflow.
    pub fn end(&self) -> Option<usize> {
        self.first.checked_add(self.count)
    }

    /// Whether the range lies within `0..size`.
    pub fn fits(&self, size: usize) -> bool {
        self.first < size && self.end().is_some_and(|end| end <= size)
    }
}

impl Default for Range {
    fn default() -> Self {
        Range::FULL
    }
}

impl From<std::ops::Range<usize>> for Range {
    fn from(value: std::ops::Range<usize>) -> Self {
        Range { first: value.start, count: value.end.saturating_sub(value.start) }
    }
}
