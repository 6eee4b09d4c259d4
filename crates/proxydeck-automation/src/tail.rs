//! Bounded tail of recent terminal output used for text heuristics.

/// Keeps the last `capacity` bytes of output as text.
///
/// Invalid UTF-8 is replaced, so a multibyte character split across two
/// chunks may show up as replacement characters. Matching only looks for
/// ASCII banners, so that loss is harmless.
#[derive(Debug, Clone)]
pub struct OutputTail {
    buf: String,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        if self.buf.len() > self.capacity {
            let mut cut = self.buf.len() - self.capacity;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        !needle.is_empty() && self.buf.contains(needle)
    }

    /// True if any of `needles` occurs in the tail.
    pub fn contains_any<S: AsRef<str>>(&self, needles: &[S]) -> bool {
        needles.iter().any(|n| self.contains(n.as_ref()))
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
