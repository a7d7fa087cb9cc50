//! Wire encoding traits.
//!
//! All integers and floats are little-endian and unaligned. Floats keep their IEEE-754
//! bit layout. Strings carry a `u16` length prefix; sequences carry an `i32` count.
//!
//! Implement [`Encode`] and [`Decode`] for your own types to store them in
//! length-prefixed sequences with [`BinaryStream::write_items`] and
//! [`BinaryStream::read_items`].

use std::io;

use byteorder::{ByteOrder, LittleEndian};

use crate::binary_stream::BinaryStream;

/// A value that can be written to a [`BinaryStream`].
pub trait Encode {
    /// Appends the wire form of `self` to `out`.
    fn encode(&self, out: &mut BinaryStream<'_>);
}

/// A value that can be read back from a [`BinaryStream`].
pub trait Decode: Sized {
    /// Reads one value, failing with `UnexpectedEof` on short input.
    fn decode(input: &mut BinaryStream<'_>) -> io::Result<Self>;
}

/// Fixed-size values with a flat little-endian layout.
pub trait Primitive: Encode + Decode + Copy {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decodes from exactly [`SIZE`](Self::SIZE) bytes.
    fn from_le_bytes(bytes: &[u8]) -> Self;
}

macro_rules! primitive {
    ($($ty:ty, $size:expr, |$b:ident| $from:expr, |$v:ident, $o:ident| $to:expr;)*) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = $size;

                #[inline]
                fn from_le_bytes($b: &[u8]) -> Self {
                    $from
                }
            }

            impl Encode for $ty {
                #[inline]
                fn encode(&self, out: &mut BinaryStream<'_>) {
                    let $v = *self;
                    let mut bytes = [0u8; $size];
                    let $o = &mut bytes[..];
                    $to;
                    out.write_bytes(&bytes);
                }
            }

            impl Decode for $ty {
                #[inline]
                fn decode(input: &mut BinaryStream<'_>) -> io::Result<Self> {
                    let mut bytes = [0u8; $size];
                    input.read_exact_bytes(&mut bytes)?;
                    Ok(<$ty as Primitive>::from_le_bytes(&bytes))
                }
            }
        )*
    };
}

primitive! {
    u8, 1, |b| b[0], |v, o| o[0] = v;
    i8, 1, |b| b[0] as i8, |v, o| o[0] = v as u8;
    bool, 1, |b| b[0] != 0, |v, o| o[0] = v as u8;
    u16, 2, |b| LittleEndian::read_u16(b), |v, o| LittleEndian::write_u16(o, v);
    i16, 2, |b| LittleEndian::read_i16(b), |v, o| LittleEndian::write_i16(o, v);
    u32, 4, |b| LittleEndian::read_u32(b), |v, o| LittleEndian::write_u32(o, v);
    i32, 4, |b| LittleEndian::read_i32(b), |v, o| LittleEndian::write_i32(o, v);
    u64, 8, |b| LittleEndian::read_u64(b), |v, o| LittleEndian::write_u64(o, v);
    i64, 8, |b| LittleEndian::read_i64(b), |v, o| LittleEndian::write_i64(o, v);
    f32, 4, |b| LittleEndian::read_f32(b), |v, o| LittleEndian::write_f32(o, v);
    f64, 8, |b| LittleEndian::read_f64(b), |v, o| LittleEndian::write_f64(o, v);
}

impl Encode for str {
    fn encode(&self, out: &mut BinaryStream<'_>) {
        out.write_str(self);
    }
}

impl Encode for String {
    fn encode(&self, out: &mut BinaryStream<'_>) {
        out.write_str(self);
    }
}

impl Decode for String {
    fn decode(input: &mut BinaryStream<'_>) -> io::Result<Self> {
        input.read_string()
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, out: &mut BinaryStream<'_>) {
        out.write_items(self);
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, out: &mut BinaryStream<'_>) {
        out.write_items(self);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut BinaryStream<'_>) -> io::Result<Self> {
        input.read_items()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, out: &mut BinaryStream<'_>) {
        (**self).encode(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(<u8 as Primitive>::SIZE, 1);
        assert_eq!(<u16 as Primitive>::SIZE, 2);
        assert_eq!(<f32 as Primitive>::SIZE, 4);
        assert_eq!(<i64 as Primitive>::SIZE, 8);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut stream = BinaryStream::new();
        stream.encode(&0x0102u16).encode(&-2i32).encode(&1.0f32);
        assert_eq!(stream.data(), &[0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80, 0x3F]);
    }

    #[test]
    fn test_nested_vectors() {
        let mut stream = BinaryStream::new();
        let nested = vec![vec![1u8, 2], vec![3]];
        stream.encode(&nested);
        assert_eq!(stream.data(), &[2, 0, 0, 0, 2, 0, 0, 0, 1, 2, 1, 0, 0, 0, 3]);
        let back: Vec<Vec<u8>> = stream.decode().unwrap();
        assert_eq!(back, nested);
    }

    #[test]
    fn test_decode_short_input() {
        let mut stream = BinaryStream::new();
        stream.write_bytes(&[1, 2]);
        let err = stream.decode::<u32>().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
