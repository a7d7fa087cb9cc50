//! File byte sources.
//!
//! Both adapters own their [`File`]. The writer flushes when dropped.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use bytewire_core::{error::Result, source::ByteSource};
use tracing::warn;

/// Reads a file through a binary stream.
#[derive(Debug)]
pub struct FileReader {
    file: Option<File>,
}

impl FileReader {
    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::open(path)?))
    }

    /// Wraps an open file.
    pub fn new(file: File) -> Self {
        Self { file: Some(file) }
    }

    /// Closes the file. Further reads return 0.
    pub fn close(&mut self) {
        self.file = None;
    }

    fn position(file: &mut File) -> Option<u64> {
        file.stream_position().ok()
    }
}

impl ByteSource for FileReader {
    fn good(&self) -> bool {
        self.file.is_some()
    }

    fn write(&mut self, _data: &[u8]) -> usize {
        0
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        let Some(file) = self.file.as_mut() else { return 0 };
        match file.read(dst) {
            Ok(n) => n,
            Err(e) => {
                warn!("File read failed: {}", e);
                0
            }
        }
    }

    fn peek(&mut self, dst: &mut [u8]) -> usize {
        let Some(file) = self.file.as_mut() else { return 0 };
        let Some(start) = Self::position(file) else { return 0 };
        let mut total = 0;
        while total < dst.len() {
            match file.read(&mut dst[total..]) {
                Ok(0) | Err(_) => break,
                Ok(n) => total += n,
            }
        }
        if let Err(e) = file.seek(SeekFrom::Start(start)) {
            warn!("File seek failed after peek: {}", e);
        }
        total
    }

    fn skip(&mut self, count: usize) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.seek(SeekFrom::Current(count as i64));
        }
    }

    fn available(&self) -> usize {
        let Some(file) = self.file.as_ref() else { return 0 };
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        // `&File` implements Seek, so the position can be read without `&mut self`
        let mut handle = file;
        let pos = handle.stream_position().unwrap_or(len);
        len.saturating_sub(pos) as usize
    }
}

/// Writes a file through a binary stream. Flushes when dropped.
#[derive(Debug)]
pub struct FileWriter {
    file: Option<File>,
}

impl FileWriter {
    /// Creates or truncates `path` for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }

    /// Wraps an open file.
    pub fn new(file: File) -> Self {
        Self { file: Some(file) }
    }

    /// Flushes and closes the file.
    pub fn close(&mut self) {
        ByteSource::flush(self);
        self.file = None;
    }
}

impl ByteSource for FileWriter {
    fn good(&self) -> bool {
        self.file.is_some()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let Some(file) = self.file.as_mut() else { return 0 };
        match file.write_all(data) {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("File write of {} bytes failed: {}", data.len(), e);
                0
            }
        }
    }

    fn read(&mut self, _dst: &mut [u8]) -> usize {
        0
    }

    fn skip(&mut self, _count: usize) {}

    fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush() {
                warn!("File flush failed: {}", e);
            }
        }
    }

    fn available(&self) -> usize {
        0
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        ByteSource::flush(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_peek_and_skip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let mut reader = FileReader::open(tmp.path()).unwrap();
        assert_eq!(reader.available(), 10);
        let mut buf = [0u8; 3];
        assert_eq!(reader.peek(&mut buf), 3);
        assert_eq!(&buf, b"012");
        reader.skip(5);
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(&buf, b"567");
        assert_eq!(reader.available(), 2);
        assert_eq!(reader.write(b"x"), 0);
    }

    #[test]
    fn test_writer_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = FileWriter::create(&path).unwrap();
        assert_eq!(writer.write(b"abc"), 3);
        writer.close();
        assert!(!writer.good());
        assert_eq!(writer.write(b"d"), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileReader::open(dir.path().join("missing")).is_err());
    }
}
