//! Byte source abstraction for pluggable I/O.

/// A readable and writable byte channel a binary stream is layered on.
///
/// Implementations report I/O failures as short transfers rather than errors;
/// the stream trusts the source and surfaces whatever count it returns. Sources
/// that cannot support an operation (peeking a socket writer, writing a file reader)
/// return 0 from it.
pub trait ByteSource {
    /// Returns true while the source can still transfer data.
    fn good(&self) -> bool;

    /// Writes `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Reads up to `dst.len()` bytes, returning the number read (0 if none).
    fn read(&mut self, dst: &mut [u8]) -> usize;

    /// Copies up to `dst.len()` upcoming bytes without consuming them.
    fn peek(&mut self, dst: &mut [u8]) -> usize {
        let _ = dst;
        0
    }

    /// Discards up to `count` upcoming bytes.
    fn skip(&mut self, count: usize);

    /// Pushes buffered output to its destination.
    fn flush(&mut self) {}

    /// Number of bytes that can be read without blocking.
    fn available(&self) -> usize;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn good(&self) -> bool {
        (**self).good()
    }
    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }
    fn read(&mut self, dst: &mut [u8]) -> usize {
        (**self).read(dst)
    }
    fn peek(&mut self, dst: &mut [u8]) -> usize {
        (**self).peek(dst)
    }
    fn skip(&mut self, count: usize) {
        (**self).skip(count)
    }
    fn flush(&mut self) {
        (**self).flush()
    }
    fn available(&self) -> usize {
        (**self).available()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn good(&self) -> bool {
        (**self).good()
    }
    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }
    fn read(&mut self, dst: &mut [u8]) -> usize {
        (**self).read(dst)
    }
    fn peek(&mut self, dst: &mut [u8]) -> usize {
        (**self).peek(dst)
    }
    fn skip(&mut self, count: usize) {
        (**self).skip(count)
    }
    fn flush(&mut self) {
        (**self).flush()
    }
    fn available(&self) -> usize {
        (**self).available()
    }
}
