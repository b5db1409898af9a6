//! Fixed-capacity byte buffer with a fill cursor.
//!
//! [`Buffer`] is the only value type that moves between stream filters: a
//! producer appends at the `used` cursor, a consumer reads `[0..used)`.
//! There is no mid-buffer insertion; filters always write into the tail and
//! the consumer advances by draining the front, so `used` fully describes
//! what the buffer holds.

use std::fmt;

/// Owned byte region of capacity `size` with a fill cursor `used`.
///
/// `0 <= used <= size` always holds.
#[derive(Clone, Eq, PartialEq)]
pub struct Buffer {
    data: Vec<u8>,
    used: usize,
}

impl Buffer {
    /// Creates an empty buffer with `size` bytes of capacity.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            used: 0,
        }
    }

    /// Creates a buffer holding a copy of `content`, fully used.
    #[must_use]
    pub fn from_slice(content: &[u8]) -> Self {
        Self {
            data: content.to_vec(),
            used: content.len(),
        }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently held.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Capacity left in the tail.
    #[must_use]
    pub fn remains(&self) -> usize {
        self.data.len() - self.used
    }

    /// True when no capacity is left.
    #[must_use]
    pub fn full(&self) -> bool {
        self.used == self.data.len()
    }

    /// True when no bytes are held.
    #[must_use]
    pub const fn empty(&self) -> bool {
        self.used == 0
    }

    /// View of the held bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// Mutable view of the unfilled tail, `remains()` bytes long.
    pub fn tail_mut(&mut self) -> &mut [u8] {
        let used = self.used;
        &mut self.data[used..]
    }

    /// Moves the fill cursor.
    ///
    /// # Panics
    ///
    /// Panics when `used` exceeds the capacity; that is always a caller bug.
    pub fn set_used(&mut self, used: usize) {
        assert!(used <= self.data.len(), "used {used} exceeds size {}", self.data.len());
        self.used = used;
    }

    /// Marks `count` tail bytes as filled, after writing via [`Self::tail_mut`].
    pub fn add_used(&mut self, count: usize) {
        self.set_used(self.used + count);
    }

    /// Resets the fill cursor without touching capacity.
    pub fn clear_used(&mut self) {
        self.used = 0;
    }

    /// Changes capacity, preserving held bytes up to the new capacity.
    pub fn resize(&mut self, size: usize) {
        self.data.resize(size, 0);

        if self.used > size {
            self.used = size;
        }
    }

    /// Appends `content`, growing capacity when the tail is too small.
    pub fn append(&mut self, content: &[u8]) {
        if content.len() > self.remains() {
            let size = self.used + content.len();
            self.data.resize(size, 0);
        }

        self.data[self.used..self.used + content.len()].copy_from_slice(content);
        self.used += content.len();
    }

    /// Copies as much of `content` as fits into the tail and returns the
    /// number of bytes taken.
    pub fn append_limited(&mut self, content: &[u8]) -> usize {
        let count = content.len().min(self.remains());
        self.data[self.used..self.used + count].copy_from_slice(&content[..count]);
        self.used += count;
        count
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer {{ used: {}, size: {} }}", self.used, self.size())
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}
