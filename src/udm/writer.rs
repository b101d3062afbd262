//! Binary document writer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::array::Array;
use super::compression;
use super::format::*;
use super::property::{Element, Property};
use super::reader::{encode_latin1, is_latin1};
use super::value::{StructLayout, Value};
use crate::util::{Error, Result, Type};

/// Growable little-endian output buffer.
#[derive(Default)]
pub struct OStream {
    buf: Vec<u8>,
}

impl OStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.buf.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.buf.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_tag(&mut self, tag: Type) {
        self.write_u8(tag.as_u8());
    }

    /// `u8` length (or `0xFF` + `u32`) followed by latin-1 bytes.
    ///
    /// Fails on characters above U+00FF instead of substituting them.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        let bytes = encode_latin1(s)
            .ok_or_else(|| Error::invalid(format!("'{s}' has characters outside latin-1")))?;
        if bytes.len() < LONG_STRING_MARKER as usize {
            self.write_u8(bytes.len() as u8);
        } else {
            self.write_u8(LONG_STRING_MARKER);
            self.write_u32(checked_u32(bytes.len())?)?;
        }
        self.write_bytes(&bytes);
        Ok(())
    }

    /// `u32` length followed by UTF-8 bytes.
    pub fn write_utf8_string(&mut self, s: &str) -> Result<()> {
        self.write_u32(checked_u32(s.len())?)?;
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    /// `u64` length followed by the bytes.
    pub fn write_sized(&mut self, data: &[u8]) -> Result<()> {
        self.write_u64(data.len() as u64)?;
        self.write_bytes(data);
        Ok(())
    }

    /// Run `body`, then patch a `u64` size in front of what it wrote.
    fn sized_section(&mut self, body: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let size_pos = self.pos();
        self.write_u64(0)?;
        body(self)?;
        let size = (self.pos() - size_pos - 8) as u64;
        self.buf[size_pos..size_pos + 8].copy_from_slice(&size.to_le_bytes());
        Ok(())
    }
}

fn checked_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::invalid(format!("{n} exceeds the 32-bit length limit")))
}

/// Encode a complete binary document.
pub fn encode_document(root: &Element, compress: bool) -> Result<Vec<u8>> {
    let mut payload = OStream::new();
    payload.write_tag(Type::Element);
    write_element(&mut payload, root)?;
    let payload = payload.into_inner();

    let flags = if compress { FLAG_COMPRESSED } else { 0 };
    let mut out = OStream::new();
    out.write_bytes(BINARY_MAGIC);
    out.write_u32(CURRENT_VERSION)?;
    out.write_u32(flags)?;
    if compress {
        out.write_bytes(&compression::compress(&payload, 6)?);
    } else {
        out.write_bytes(&payload);
    }
    Ok(out.into_inner())
}

/// Encode and write to `path`.
pub fn write_document(path: impl AsRef<Path>, root: &Element, compress: bool) -> Result<()> {
    let bytes = encode_document(root, compress)?;
    let file: File = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

fn write_element(out: &mut OStream, element: &Element) -> Result<()> {
    out.sized_section(|out| {
        out.write_u32(checked_u32(element.len())?)?;
        for (key, child) in element.iter() {
            out.write_string(key)?;
            write_property(out, child)?;
        }
        Ok(())
    })
}

fn write_property(out: &mut OStream, property: &Property) -> Result<()> {
    match property {
        Property::Element(e) => {
            out.write_tag(Type::Element);
            write_element(out, e)
        }
        Property::Array(a) => write_array(out, a),
        // Plain strings that latin-1 cannot hold are stored as UTF-8.
        Property::Scalar(Value::String(s)) if !is_latin1(s) => {
            out.write_tag(Type::Utf8String);
            out.write_utf8_string(s)
        }
        Property::Scalar(v) => {
            out.write_tag(v.value_type());
            write_value(out, v)
        }
    }
}

fn write_layout(out: &mut OStream, layout: &StructLayout) -> Result<()> {
    let count = u8::try_from(layout.members().len())
        .map_err(|_| Error::invalid("struct layouts are limited to 255 members"))?;
    out.write_u8(count);
    for m in layout.members() {
        out.write_tag(m.ty);
        out.write_string(&m.name)?;
    }
    Ok(())
}

fn write_value(out: &mut OStream, value: &Value) -> Result<()> {
    match value {
        Value::Nil => {}
        Value::String(s) | Value::Reference(s) => out.write_string(s)?,
        Value::Utf8(s) => out.write_utf8_string(s)?,
        Value::Blob(b) | Value::BlobLz4(b) => out.write_sized(b)?,
        Value::Struct(s) => {
            write_layout(out, &s.layout)?;
            out.write_bytes(&s.bytes);
        }
        other => {
            let bytes = other
                .packed_bytes()
                .ok_or_else(|| Error::invalid(format!("cannot encode {}", other.value_type())))?;
            out.write_bytes(&bytes);
        }
    }
    Ok(())
}

fn write_array(out: &mut OStream, array: &Array) -> Result<()> {
    let value_type = match array.value_type() {
        Type::String if !array.strings()?.iter().all(|s| is_latin1(s)) => Type::Utf8String,
        ty => ty,
    };
    out.write_tag(if array.is_compressed() { Type::ArrayLz4 } else { Type::Array });
    out.write_tag(value_type);
    if let Some(layout) = array.layout() {
        write_layout(out, layout)?;
    }
    out.write_u32(checked_u32(array.len())?)?;

    let mut items = OStream::new();
    match value_type {
        Type::Element => {
            for item in array.elements()? {
                write_element(&mut items, item.as_element()?)?;
            }
        }
        Type::String | Type::Utf8String => {
            for s in array.strings()? {
                if value_type == Type::Utf8String {
                    items.write_utf8_string(s)?;
                } else {
                    items.write_string(s)?;
                }
            }
        }
        _ => items.write_bytes(array.array_value()?.as_bytes()),
    }

    let items = items.into_inner();
    if array.is_compressed() {
        out.write_sized(&compression::lz4_compress(&items))
    } else {
        out.write_sized(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_layout() {
        let root = Element::new().with("x", 42i32).unwrap();
        let bytes = encode_document(&root, false).unwrap();
        assert_eq!(&bytes[..4], BINARY_MAGIC);
        assert_eq!(&bytes[4..8], &CURRENT_VERSION.to_le_bytes());
        assert_eq!(&bytes[8..12], &0u32.to_le_bytes());
        assert_eq!(bytes[12], Type::Element.as_u8());
        // count + key + tag + i32
        let body = 4 + 2 + 1 + 4u64;
        assert_eq!(&bytes[13..21], &body.to_le_bytes());
        assert_eq!(&bytes[21..25], &1u32.to_le_bytes());
        assert_eq!(&bytes[25..27], &[1, b'x']);
        assert_eq!(bytes[27], Type::Int32.as_u8());
        assert_eq!(&bytes[28..32], &42i32.to_le_bytes());
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn test_long_string() {
        let mut out = OStream::new();
        out.write_string(&"a".repeat(300)).unwrap();
        let bytes = out.into_inner();
        assert_eq!(bytes[0], LONG_STRING_MARKER);
        assert_eq!(&bytes[1..5], &300u32.to_le_bytes());
        assert_eq!(bytes.len(), 305);
    }

    #[test]
    fn test_non_latin1_strings_are_stored_as_utf8() {
        let root = Element::new()
            .with("name", "\u{3a9}mega")
            .unwrap()
            .with("title", "caf\u{e9}")
            .unwrap()
            .with("names", Array::from_strings(["left", "\u{65e5}\u{672c}"]))
            .unwrap();
        let bytes = encode_document(&root, false).unwrap();
        let doc = crate::udm::Document::from_bytes(bytes).unwrap();
        let back = doc.root().unwrap();

        let name = back.get("name").unwrap();
        assert_eq!(name.kind(), Type::Utf8String);
        assert_eq!(name.as_str().unwrap(), "\u{3a9}mega");
        assert_eq!(back.get("title").unwrap().kind(), Type::String);
        let names = back.get("names").unwrap().as_array().unwrap();
        assert_eq!(names.value_type(), Type::Utf8String);
        assert_eq!(names.strings().unwrap(), ["left", "\u{65e5}\u{672c}"]);
    }

    #[test]
    fn test_non_latin1_keys_are_rejected() {
        let root = Element::new().with("\u{3a9}", 1i32).unwrap();
        assert!(matches!(encode_document(&root, false), Err(Error::InvalidStructure(_))));

        let mut out = OStream::new();
        assert!(out.write_string("\u{263A}").is_err());
        assert_eq!(out.pos(), 0);
    }

    #[test]
    fn test_write_document_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.udm_b");
        let root = Element::new().with("name", "hip").unwrap();
        write_document(&path, &root, true).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], BINARY_MAGIC);
        assert_eq!(&bytes[8..12], &FLAG_COMPRESSED.to_le_bytes());
    }
}
