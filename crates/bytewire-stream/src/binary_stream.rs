//! Buffered little-endian binary stream.
//!
//! [`BinaryStream`] starts with a 512-byte inline buffer and moves to the heap only when
//! a write outgrows it. The buffer is selected on every access rather than through a
//! stored pointer, so the stream can be moved freely.
//!
//! Without a source the stream is an in-memory codec: writes append, reads consume.
//! With a [`ByteSource`] attached:
//! - writes collect in the buffer until [`flush`](BinaryStream::flush) (or drop)
//! - reads refill the buffer from the source, or bypass it when the request is larger
//!   than two thirds of the capacity
//! - peeks either return the full request or nothing

use std::{fmt, io};

use bytewire_core::{
    config::Config,
    constants::{DIRECT_READ_DENOMINATOR, DIRECT_READ_NUMERATOR, SBO_SIZE},
    source::ByteSource,
};
use tracing::trace;

use crate::codec::{Decode, Encode, Primitive};

/// Upper bound on one allocation step in [`BinaryStream::read_vec`].
const READ_VEC_CHUNK: usize = 64 * 1024;

/// Buffered binary codec over an optional byte source.
///
/// The readable region is `[read_head, end)`. `write_head` equals `end` except after a
/// [`rewind`](BinaryStream::rewind), where subsequent writes overwrite from the rewound
/// position.
pub struct BinaryStream<'a> {
    inline: [u8; SBO_SIZE],
    heap: Vec<u8>,
    cap: usize,
    read_head: usize,
    write_head: usize,
    end: usize,
    /// Buffer holds written bytes the source has not seen yet
    dirty: bool,
    source: Option<&'a mut dyn ByteSource>,
}

impl Default for BinaryStream<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BinaryStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryStream")
            .field("capacity", &self.cap)
            .field("read_head", &self.read_head)
            .field("write_head", &self.write_head)
            .field("end", &self.end)
            .field("inline", &self.is_inline())
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl Drop for BinaryStream<'_> {
    fn drop(&mut self) {
        if self.dirty && self.source.is_some() {
            self.flush();
        }
    }
}

macro_rules! typed_accessors {
    ($($ty:ty: $write:ident, $read:ident, $peek:ident;)*) => {
        $(
            #[doc = concat!("Writes a little-endian `", stringify!($ty), "`.")]
            #[inline]
            pub fn $write(&mut self, value: $ty) -> &mut Self {
                value.encode(self);
                self
            }

            #[doc = concat!("Reads a little-endian `", stringify!($ty), "`.")]
            #[inline]
            pub fn $read(&mut self) -> io::Result<$ty> {
                <$ty as Decode>::decode(self)
            }

            #[doc = concat!("Peeks a little-endian `", stringify!($ty), "` without consuming it.")]
            #[inline]
            pub fn $peek(&mut self) -> Option<$ty> {
                self.peek_value::<$ty>()
            }
        )*
    };
}

impl<'a> BinaryStream<'a> {
    /// Creates an empty stream on the inline buffer.
    pub fn new() -> Self {
        Self {
            inline: [0; SBO_SIZE],
            heap: Vec::new(),
            cap: SBO_SIZE,
            read_head: 0,
            write_head: 0,
            end: 0,
            dirty: false,
            source: None,
        }
    }

    /// Creates a stream with at least `capacity` bytes of buffer. 0 disables buffering.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut stream = Self::new();
        stream.reserve(capacity);
        stream
    }

    /// Creates a stream sized by `config.stream_buffer_size`.
    pub fn with_config(config: &Config) -> Self {
        Self::with_capacity(config.stream_buffer_size)
    }

    /// Creates a stream layered on `source`.
    pub fn with_source(source: &'a mut dyn ByteSource) -> Self {
        let mut stream = Self::new();
        stream.source = Some(source);
        stream
    }

    /// Replaces the byte source, flushing pending output to the old one first.
    pub fn set_source(&mut self, source: Option<&'a mut dyn ByteSource>) {
        self.flush_write_buffer();
        self.source = source;
    }

    /// The attached byte source.
    pub fn source(&mut self) -> Option<&mut (dyn ByteSource + 'a)> {
        self.source.as_deref_mut()
    }

    /// Flushes and switches to unbuffered mode: writes go straight to the source.
    pub fn disable_buffering(&mut self) {
        self.flush();
        self.reserve(0);
    }

    /// Sets the buffer capacity.
    ///
    /// Above 512 bytes the buffer lives on the heap; at or below it reverts to the
    /// inline buffer. 0 clears the stream and disables buffering. Data beyond the new
    /// capacity is dropped.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity == 0 {
            self.heap = Vec::new();
            self.clear();
            self.cap = 0;
            return;
        }
        if capacity > SBO_SIZE {
            if self.is_inline() {
                let mut heap = vec![0u8; capacity];
                heap[..self.end].copy_from_slice(&self.inline[..self.end]);
                self.heap = heap;
                trace!("Promoted stream buffer to {} bytes", capacity);
            } else {
                self.heap.resize(capacity, 0);
            }
            self.cap = capacity;
        } else {
            if !self.is_inline() {
                let keep = self.end.min(SBO_SIZE);
                self.inline[..keep].copy_from_slice(&self.heap[..keep]);
                self.heap = Vec::new();
            }
            self.cap = SBO_SIZE;
        }
        self.end = self.end.min(self.cap);
        self.write_head = self.write_head.min(self.end);
        self.read_head = self.read_head.min(self.end);
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Unread bytes in the buffer.
    pub fn size(&self) -> usize {
        self.end - self.read_head
    }

    /// True while the inline buffer is in use.
    pub fn is_inline(&self) -> bool {
        self.cap <= SBO_SIZE
    }

    /// All valid bytes in the buffer, including ones already read.
    pub fn data(&self) -> &[u8] {
        &self.buf()[..self.end]
    }

    /// Bytes readable from the buffer plus whatever the source reports.
    pub fn available(&self) -> usize {
        self.size() + self.source.as_ref().map_or(0, |s| s.available())
    }

    /// With a source: whether the source is usable. Without: whether unread bytes remain.
    pub fn good(&self) -> bool {
        match &self.source {
            Some(source) => source.good(),
            None => self.size() > 0,
        }
    }

    /// Resets all heads to zero. Keeps the allocation.
    pub fn clear(&mut self) {
        self.read_head = 0;
        self.write_head = 0;
        self.end = 0;
        self.dirty = false;
    }

    /// Moves both heads to `pos`, clamped to the valid data.
    ///
    /// Only affects buffered data; bytes already flushed to a source stay sent.
    pub fn rewind(&mut self, pos: usize) {
        let pos = pos.min(self.end);
        self.read_head = pos;
        self.write_head = pos;
    }

    /// Moves the read head back by up to `count` bytes.
    pub fn undo(&mut self, count: usize) {
        self.read_head -= count.min(self.read_head);
    }

    /// Pushes buffered output to the source, then flushes the source.
    pub fn flush(&mut self) {
        if self.source.is_none() {
            return;
        }
        self.flush_write_buffer();
        if let Some(source) = self.source.as_deref_mut() {
            source.flush();
        }
    }

    fn flush_write_buffer(&mut self) {
        if !self.dirty {
            return;
        }
        let end = self.end;
        let (buf, source) = self.parts();
        if let Some(source) = source {
            let written = source.write(&buf[..end]);
            if written < end {
                trace!("Source accepted {} of {} buffered bytes", written, end);
            }
            self.clear();
        }
    }

    // ------------------------------------------------------------------ raw bytes

    /// Appends raw bytes, growing the buffer as needed.
    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        if data.is_empty() {
            return self;
        }
        if self.cap == 0 {
            if let Some(source) = self.source.as_deref_mut() {
                source.write(data);
                return self;
            }
        }
        self.ensure_space(data.len());
        let start = self.write_head;
        self.buf_mut()[start..start + data.len()].copy_from_slice(data);
        self.write_head += data.len();
        self.end = self.end.max(self.write_head);
        self.dirty = true;
        self
    }

    /// Reads up to `dst.len()` bytes, returning how many were read.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len();
        if self.size() >= count {
            let start = self.read_head;
            dst.copy_from_slice(&self.buf()[start..start + count]);
            self.read_head += count;
            return count;
        }
        self.fragmented_read(dst)
    }

    /// Reads exactly `dst.len()` bytes or fails with `UnexpectedEof`.
    pub fn read_exact_bytes(&mut self, dst: &mut [u8]) -> io::Result<()> {
        let got = self.read_bytes(dst);
        if got < dst.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("needed {} bytes, got {}", dst.len(), got),
            ));
        }
        Ok(())
    }

    /// Copies the next `dst.len()` bytes without consuming them.
    ///
    /// Returns `dst.len()`, or 0 if the buffer and source together cannot supply them.
    pub fn peek_bytes(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len();
        if self.cap == 0 && self.size() == 0 {
            let peeked = self.source.as_deref_mut().map_or(0, |s| s.peek(dst));
            return if peeked == count { count } else { 0 };
        }
        if !self.fill_for_peek(count) {
            return 0;
        }
        let start = self.read_head;
        dst.copy_from_slice(&self.buf()[start..start + count]);
        count
    }

    /// Discards `count` bytes, from the buffer first and then from the source.
    pub fn skip(&mut self, count: usize) {
        let buffered = count.min(self.size());
        self.read_head += buffered;
        if buffered < count {
            if let Some(source) = self.source.as_deref_mut() {
                source.skip(count - buffered);
            }
        }
    }

    /// Drains the buffer, then reads the rest through a refill or directly from the source.
    fn fragmented_read(&mut self, dst: &mut [u8]) -> usize {
        let mut total = self.size();
        let start = self.read_head;
        dst[..total].copy_from_slice(&self.buf()[start..start + total]);
        self.clear();
        if self.source.is_none() {
            return total;
        }

        let remaining = dst.len() - total;
        if remaining < self.cap * DIRECT_READ_NUMERATOR / DIRECT_READ_DENOMINATOR {
            while total < dst.len() {
                let filled = self.refill();
                if filled == 0 {
                    break;
                }
                let take = filled.min(dst.len() - total);
                dst[total..total + take].copy_from_slice(&self.buf()[..take]);
                self.read_head = take;
                total += take;
            }
            return total;
        }

        if let Some(source) = self.source.as_deref_mut() {
            while total < dst.len() {
                let got = source.read(&mut dst[total..]);
                if got == 0 {
                    break;
                }
                total += got;
            }
        }
        total
    }

    /// Replaces the buffer contents with one source read of up to `capacity` bytes.
    fn refill(&mut self) -> usize {
        let (buf, source) = self.parts();
        let got = source.map_or(0, |s| s.read(buf));
        self.read_head = 0;
        self.end = got;
        self.write_head = got;
        self.dirty = false;
        got
    }

    /// Makes `count` unread bytes available in the buffer if the source allows.
    fn fill_for_peek(&mut self, count: usize) -> bool {
        if self.size() >= count {
            return true;
        }
        if self.source.is_none() {
            return false;
        }
        if self.read_head > 0 {
            let (start, end) = (self.read_head, self.end);
            self.buf_mut().copy_within(start..end, 0);
            self.end -= start;
            self.write_head = self.end;
            self.read_head = 0;
        }
        if count > self.cap {
            self.ensure_space(count - self.end);
        }
        while self.end < count {
            let end = self.end;
            let (buf, source) = self.parts();
            let got = source.map_or(0, |s| s.read(&mut buf[end..]));
            if got == 0 {
                break;
            }
            self.end += got;
            self.write_head = self.end;
        }
        self.end >= count
    }

    fn ensure_space(&mut self, count: usize) {
        let needed = self.write_head + count;
        if needed <= self.cap {
            return;
        }
        let align = self.cap.max(SBO_SIZE);
        let mut capacity = needed + align;
        let rem = capacity % align;
        if rem != 0 {
            capacity += align - rem;
        }
        self.reserve(capacity);
    }

    fn buf(&self) -> &[u8] {
        if self.is_inline() {
            &self.inline[..self.cap]
        } else {
            &self.heap[..self.cap]
        }
    }

    fn buf_mut(&mut self) -> &mut [u8] {
        if self.is_inline() {
            &mut self.inline[..self.cap]
        } else {
            &mut self.heap[..self.cap]
        }
    }

    /// Splits the borrow into the active buffer and the source.
    fn parts(&mut self) -> (&mut [u8], Option<&mut (dyn ByteSource + 'a)>) {
        let buf = if self.cap <= SBO_SIZE {
            &mut self.inline[..self.cap]
        } else {
            &mut self.heap[..self.cap]
        };
        (buf, self.source.as_deref_mut())
    }

    // ------------------------------------------------------------------ typed values

    /// Writes any encodable value.
    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self);
        self
    }

    /// Reads any decodable value.
    pub fn decode<T: Decode>(&mut self) -> io::Result<T> {
        T::decode(self)
    }

    /// Peeks a fixed-size value without consuming it.
    pub fn peek_value<T: Primitive>(&mut self) -> Option<T> {
        let mut bytes = [0u8; 8];
        let bytes = &mut bytes[..T::SIZE];
        if self.peek_bytes(bytes) == T::SIZE {
            Some(T::from_le_bytes(bytes))
        } else {
            None
        }
    }

    typed_accessors! {
        u8: write_u8, read_u8, peek_u8;
        i8: write_i8, read_i8, peek_i8;
        bool: write_bool, read_bool, peek_bool;
        u16: write_u16, read_u16, peek_u16;
        i16: write_i16, read_i16, peek_i16;
        u32: write_u32, read_u32, peek_u32;
        i32: write_i32, read_i32, peek_i32;
        u64: write_u64, read_u64, peek_u64;
        i64: write_i64, read_i64, peek_i64;
        f32: write_f32, read_f32, peek_f32;
        f64: write_f64, read_f64, peek_f64;
    }

    // ------------------------------------------------------------------ strings

    /// Writes a UTF-8 string with a `u16` byte-length prefix.
    ///
    /// Strings longer than 65535 bytes are cut at the last character boundary that fits.
    pub fn write_str(&mut self, text: &str) -> &mut Self {
        let mut len = text.len().min(u16::MAX as usize);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        self.write_u16(len as u16);
        self.write_bytes(&text.as_bytes()[..len])
    }

    /// Reads a `u16` length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_u16()? as usize;
        self.read_nstr(len)
    }

    /// Reads exactly `len` bytes of UTF-8 with no length prefix.
    pub fn read_nstr(&mut self, len: usize) -> io::Result<String> {
        let mut bytes = vec![0u8; len];
        self.read_exact_bytes(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Peeks a length-prefixed string as a view into the buffer.
    ///
    /// Returns None unless the whole string is available and valid UTF-8. The view is
    /// invalidated by the next mutation of the stream.
    pub fn peek_strview(&mut self) -> Option<&str> {
        let len = self.peek_u16()? as usize;
        if !self.fill_for_peek(2 + len) {
            return None;
        }
        // consume the prefix, then restore it
        self.read_u16().ok()?;
        let start = self.read_head;
        self.undo(2);
        std::str::from_utf8(&self.buf()[start..start + len]).ok()
    }

    /// Peeks a length-prefixed string without consuming it.
    pub fn peek_string(&mut self) -> Option<String> {
        self.peek_strview().map(str::to_owned)
    }

    /// Writes a string as UTF-16 code units with a `u16` unit-count prefix.
    pub fn write_wstr(&mut self, text: &str) -> &mut Self {
        let units: Vec<u16> = text.encode_utf16().take(u16::MAX as usize).collect();
        self.write_u16(units.len() as u16);
        for unit in units {
            self.write_u16(unit);
        }
        self
    }

    /// Reads a string written by [`write_wstr`](Self::write_wstr).
    pub fn read_wstring(&mut self) -> io::Result<String> {
        let len = self.read_u16()? as usize;
        let mut units = Vec::with_capacity(len);
        for _ in 0..len {
            units.push(self.read_u16()?);
        }
        String::from_utf16(&units).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    // ------------------------------------------------------------------ sequences

    /// Writes fixed-size values with an `i32` count prefix.
    pub fn write_slice<T: Primitive>(&mut self, items: &[T]) -> &mut Self {
        self.write_i32(items.len() as i32);
        for item in items {
            item.encode(self);
        }
        self
    }

    /// Reads fixed-size values written by [`write_slice`](Self::write_slice) in one read.
    pub fn read_vec<T: Primitive>(&mut self) -> io::Result<Vec<T>> {
        let len = self.read_len()?;
        let total = len.checked_mul(T::SIZE).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("sequence length {} overflows", len))
        })?;
        // the count is untrusted, so grow only as bytes actually arrive
        let mut bytes = Vec::with_capacity(total.min(READ_VEC_CHUNK));
        while bytes.len() < total {
            let start = bytes.len();
            let step = (total - start).min(READ_VEC_CHUNK);
            bytes.resize(start + step, 0);
            self.read_exact_bytes(&mut bytes[start..])?;
        }
        Ok(bytes.chunks_exact(T::SIZE).map(T::from_le_bytes).collect())
    }

    /// Writes encodable items with an `i32` count prefix.
    pub fn write_items<T: Encode>(&mut self, items: &[T]) -> &mut Self {
        self.write_items_with(items, |stream, item| {
            item.encode(stream);
        })
    }

    /// Writes items with an `i32` count prefix through a custom writer.
    pub fn write_items_with<T, F>(&mut self, items: &[T], mut write: F) -> &mut Self
    where
        F: FnMut(&mut Self, &T),
    {
        self.write_i32(items.len() as i32);
        for item in items {
            write(self, item);
        }
        self
    }

    /// Reads items written by [`write_items`](Self::write_items).
    pub fn read_items<T: Decode>(&mut self) -> io::Result<Vec<T>> {
        self.read_items_with(|stream| T::decode(stream))
    }

    /// Reads an `i32` count, then that many items through a custom reader.
    pub fn read_items_with<T, F>(&mut self, mut read: F) -> io::Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> io::Result<T>,
    {
        let len = self.read_len()?;
        // the count is untrusted until the items actually arrive
        let mut items = Vec::with_capacity(len.min(SBO_SIZE));
        for _ in 0..len {
            items.push(read(self)?);
        }
        Ok(items)
    }

    fn read_len(&mut self) -> io::Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("negative sequence length {}", len))
        })
    }
}

impl io::Read for BinaryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf))
    }
}

impl io::Write for BinaryStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        BinaryStream::flush(self);
        Ok(())
    }
}
