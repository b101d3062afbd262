//! Cursor over a byte buffer with typed little-endian reads.

use byteorder::{ByteOrder, LittleEndian};
use half::f16;

use super::format::LONG_STRING_MARKER;
use crate::util::{Error, Result, UdmPod};

/// Movable read cursor. Every read is bounds-checked; a failed read leaves
/// the cursor where it was.
#[derive(Clone, Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_fixed {
    ($($name:ident => $ty:ty, $size:expr, $conv:expr;)*) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> Result<$ty> {
                let bytes = self.read_bytes($size)?;
                Ok($conv(bytes))
            }
        )*
    };
}

impl<'a> BinaryReader<'a> {
    /// Start reading at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start reading at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        let mut reader = Self::new(data);
        reader.seek(pos)?;
        Ok(reader)
    }

    /// Current offset.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Total buffer size.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the cursor.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn out_of_bounds(&self, len: usize) -> Error {
        Error::OutOfBounds {
            pos: self.pos as u64,
            len: len as u64,
            size: self.data.len() as u64,
        }
    }

    /// Move the cursor to an absolute offset (the end is a valid position).
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::OutOfBounds {
                pos: pos as u64,
                len: 0,
                size: self.data.len() as u64,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance by `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(self.out_of_bounds(len));
        }
        self.pos += len;
        Ok(())
    }

    /// Pad forward to the next multiple of `align_to`.
    pub fn align(&mut self, align_to: usize) -> Result<()> {
        if align_to <= 1 {
            return Ok(());
        }
        let padding = (align_to - self.pos % align_to) % align_to;
        self.skip(padding)
    }

    /// Run `f` and restore the cursor afterwards, whatever `f` returned.
    pub fn with_saved_pos<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let entry = self.pos;
        let out = f(self);
        self.pos = entry;
        out
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.out_of_bounds(len));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    read_fixed! {
        read_u8 => u8, 1, |b: &[u8]| b[0];
        read_i8 => i8, 1, |b: &[u8]| b[0] as i8;
        read_u16 => u16, 2, LittleEndian::read_u16;
        read_i16 => i16, 2, LittleEndian::read_i16;
        read_u32 => u32, 4, LittleEndian::read_u32;
        read_i32 => i32, 4, LittleEndian::read_i32;
        read_u64 => u64, 8, LittleEndian::read_u64;
        read_i64 => i64, 8, LittleEndian::read_i64;
        read_f32 => f32, 4, LittleEndian::read_f32;
        read_f64 => f64, 8, LittleEndian::read_f64;
        read_f16 => f16, 2, |b: &[u8]| f16::from_bits(LittleEndian::read_u16(b));
    }

    /// Read one packed value.
    pub fn read_pod<T: UdmPod>(&mut self) -> Result<T> {
        let bytes = self.read_bytes(T::SIZE)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Read a `u64` length and check it fits in the remaining buffer.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u64()?;
        if len > self.remaining() as u64 {
            let err = Error::OutOfBounds {
                pos: self.pos as u64,
                len,
                size: self.data.len() as u64,
            };
            self.pos -= 8;
            return Err(err);
        }
        Ok(len as usize)
    }

    /// Length-prefixed latin-1 string: `u8` length, or `0xFF` then `u32`.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let result = (|| {
            let mut len = self.read_u8()? as usize;
            if len == LONG_STRING_MARKER as usize {
                len = self.read_u32()? as usize;
            }
            Ok(decode_latin1(self.read_bytes(len)?))
        })();
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    /// `u32` length-prefixed UTF-8 string; invalid sequences are replaced.
    pub fn read_utf8_string(&mut self) -> Result<String> {
        let start = self.pos;
        let result = (|| {
            let len = self.read_u32()? as usize;
            Ok(String::from_utf8_lossy(self.read_bytes(len)?).into_owned())
        })();
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    /// NUL-terminated latin-1 string. The terminator is consumed.
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.out_of_bounds(rest.len() + 1))?;
        let s = decode_latin1(&rest[..end]);
        self.pos += end + 1;
        Ok(s)
    }

    /// Fixed-width latin-1 string with NUL padding stripped.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(decode_latin1(&bytes[..end]))
    }

    /// Four-character code.
    pub fn read_fourcc(&mut self) -> Result<String> {
        self.read_fixed_string(4)
    }
}

/// Latin-1 never fails: every byte maps to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`decode_latin1`]. `None` if any character is above U+00FF.
pub fn encode_latin1(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

/// Whether every character of `s` has a latin-1 encoding.
#[inline]
pub fn is_latin1(s: &str) -> bool {
    s.chars().all(|c| u32::from(c) <= 0xFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_reads() {
        let mut data = Vec::new();
        data.extend_from_slice(&42i32.to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_i32().unwrap(), 42);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_fails_and_keeps_cursor() {
        let data = [1u8, 2, 3];
        let mut r = BinaryReader::new(&data);
        r.skip(2).unwrap();
        assert!(matches!(r.read_u32(), Err(Error::OutOfBounds { pos: 2, len: 4, size: 3 })));
        assert_eq!(r.pos(), 2);
        assert_eq!(r.read_u8().unwrap(), 3);
        assert!(r.read_u8().is_err());
    }

    #[test]
    fn test_strings() {
        let mut data = vec![3u8, b'a', b'b', 0xE9];
        data.extend_from_slice(b"hi\0rest");
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_string().unwrap(), "ab\u{e9}");
        assert_eq!(r.read_cstring().unwrap(), "hi");
        assert_eq!(r.read_fourcc().unwrap(), "rest");
    }

    #[test]
    fn test_long_string_and_truncation() {
        let mut data = vec![LONG_STRING_MARKER];
        data.extend_from_slice(&300u32.to_le_bytes());
        data.extend(std::iter::repeat(b'x').take(300));
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_string().unwrap().len(), 300);

        let short = [10u8, b'a'];
        let mut r = BinaryReader::new(&short);
        assert!(r.read_string().is_err());
        assert_eq!(r.pos(), 0);
    }

    #[test]
    fn test_utf8_lossy() {
        let mut data = 3u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[b'o', 0xFF, b'k']);
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_utf8_string().unwrap(), "o\u{FFFD}k");
    }

    #[test]
    fn test_align_and_saved_pos() {
        let data = [0u8; 16];
        let mut r = BinaryReader::new(&data);
        r.skip(3).unwrap();
        r.align(4).unwrap();
        assert_eq!(r.pos(), 4);
        r.align(4).unwrap();
        assert_eq!(r.pos(), 4);
        let inner = r.with_saved_pos(|r| {
            r.skip(10).unwrap();
            r.pos()
        });
        assert_eq!(inner, 14);
        assert_eq!(r.pos(), 4);
        r.seek(15).unwrap();
        assert!(r.align(8).is_err());
    }

    #[test]
    fn test_latin1_roundtrip() {
        let s = "caf\u{e9}";
        assert_eq!(decode_latin1(&encode_latin1(s).unwrap()), s);
        assert!(is_latin1(s));
        assert_eq!(encode_latin1("\u{263A}"), None);
        assert!(!is_latin1("\u{3a9}mega"));
    }
}
