//! In-memory byte source.

use bytewire_core::source::ByteSource;

/// A growable byte buffer usable as a stream source or sink.
///
/// Writes append to the end; reads consume from the front.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unread bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Returns every byte ever written, read or not.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl From<&[u8]> for MemorySource {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl ByteSource for MemorySource {
    fn good(&self) -> bool {
        true
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.data.extend_from_slice(data);
        data.len()
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = self.peek(dst);
        self.pos += n;
        n
    }

    fn peek(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.available());
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        n
    }

    fn skip(&mut self, count: usize) {
        self.pos += count.min(self.available());
    }

    fn available(&self) -> usize {
        self.data.len() - self.pos
    }
}
