#![warn(missing_docs)]

//! bytewire-stream: a small-buffer-optimized, little-endian binary stream and the
//! byte sources it reads from and writes to.
//!
//! ```
//! use bytewire_stream::BinaryStream;
//!
//! let mut stream = BinaryStream::new();
//! stream.write_u32(0x01020304).write_str("abc").write_slice(&[1u16, 2, 3]);
//! assert_eq!(stream.read_u32().unwrap(), 0x01020304);
//! assert_eq!(stream.read_string().unwrap(), "abc");
//! assert_eq!(stream.read_vec::<u16>().unwrap(), vec![1, 2, 3]);
//! ```

/// The buffered stream.
pub mod binary_stream;
/// Wire encoding traits.
pub mod codec;
/// File byte sources.
pub mod file;
/// In-memory byte source.
pub mod memory;

pub use binary_stream::BinaryStream;
pub use codec::{Decode, Encode, Primitive};
pub use file::{FileReader, FileWriter};
pub use memory::MemorySource;
