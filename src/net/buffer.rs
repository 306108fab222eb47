//! Fixed-capacity character window for the per-connection line protocol.
//!
//! The buffer is an explicit array of `char` plus two indices: `cursor`
//! marks the start of unprocessed data, `valid_len` its end. The invariant
//! `cursor <= valid_len <= capacity` holds at all times; the slice between
//! the two is exactly the unconsumed remainder from the socket. The caller
//! compacts (slides the remainder to the front) before every refill, so the
//! writable space is always the tail.

/// Per-connection line window sized to the configured max line length.
pub struct LineBuffer {
    chars: Box<[char]>,
    cursor: usize,
    valid_len: usize,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chars: vec!['\0'; capacity].into_boxed_slice(),
            cursor: 0,
            valid_len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.chars.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Writable space at the tail. Meaningful after `compact`.
    pub fn free(&self) -> usize {
        self.capacity() - self.valid_len
    }

    /// The unconsumed remainder: everything read but not yet processed.
    pub fn unconsumed(&self) -> &[char] {
        &self.chars[self.cursor..self.valid_len]
    }

    pub fn unconsumed_len(&self) -> usize {
        self.valid_len - self.cursor
    }

    /// Slide the unconsumed remainder to the front, freeing tail capacity.
    pub fn compact(&mut self) {
        if self.cursor > 0 {
            self.chars.copy_within(self.cursor..self.valid_len, 0);
            self.valid_len -= self.cursor;
            self.cursor = 0;
        }
    }

    /// Append one character at the end of the valid region.
    pub fn push(&mut self, c: char) {
        debug_assert!(self.valid_len < self.capacity());
        if self.valid_len < self.capacity() {
            self.chars[self.valid_len] = c;
            self.valid_len += 1;
        }
    }

    /// Index of the next newline within `unconsumed()`, if any.
    pub fn find_newline(&self) -> Option<usize> {
        self.unconsumed().iter().position(|&c| c == '\n')
    }

    /// Advance the cursor past `n` consumed characters.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.unconsumed_len());
        self.cursor = (self.cursor + n).min(self.valid_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_from(buf: &mut LineBuffer, s: &str) {
        for c in s.chars() {
            buf.push(c);
        }
    }

    #[test]
    fn test_push_and_find_newline() {
        let mut buf = LineBuffer::new(16);
        fill_from(&mut buf, "hello\nworld\n");
        assert_eq!(buf.unconsumed_len(), 12);
        assert_eq!(buf.find_newline(), Some(5));

        let line: String = buf.unconsumed()[..5].iter().collect();
        assert_eq!(line, "hello");
        buf.consume(6);
        assert_eq!(buf.find_newline(), Some(5));
        let line: String = buf.unconsumed()[..5].iter().collect();
        assert_eq!(line, "world");
        buf.consume(6);

        assert_eq!(buf.unconsumed_len(), 0);
        assert_eq!(buf.cursor(), buf.valid_len());
        assert_eq!(buf.find_newline(), None);
    }

    #[test]
    fn test_compact_preserves_remainder() {
        let mut buf = LineBuffer::new(8);
        fill_from(&mut buf, "ab\ncdef");
        buf.consume(3); // past "ab\n"
        assert_eq!(buf.free(), 1);

        buf.compact();
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.valid_len(), 4);
        assert_eq!(buf.free(), 4);
        let rest: String = buf.unconsumed().iter().collect();
        assert_eq!(rest, "cdef");
    }

    #[test]
    fn test_compact_when_already_at_front_is_noop() {
        let mut buf = LineBuffer::new(4);
        fill_from(&mut buf, "ab");
        buf.compact();
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.valid_len(), 2);
    }

    #[test]
    fn test_full_buffer_has_no_free_space() {
        let mut buf = LineBuffer::new(4);
        fill_from(&mut buf, "abcd");
        assert_eq!(buf.free(), 0);
        assert_eq!(buf.unconsumed_len(), buf.capacity());
        buf.compact();
        assert_eq!(buf.free(), 0);
    }

    #[test]
    fn test_invariant_cursor_never_passes_valid_len() {
        let mut buf = LineBuffer::new(4);
        fill_from(&mut buf, "ab");
        buf.consume(2);
        assert!(buf.cursor() <= buf.valid_len());
        assert!(buf.valid_len() <= buf.capacity());
        assert_eq!(buf.unconsumed_len(), 0);
    }
}
