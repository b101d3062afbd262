//! Binary document parsing.
//!
//! The tree is built in one recursive descent driven by the type tag read in
//! front of every node. Numeric and struct array payloads are not copied; the
//! arrays keep their offset into the shared [`IStreams`].

use std::sync::Arc;

use tracing::trace;

use super::array::Array;
use super::compression;
use super::format::*;
use super::property::{Element, Property};
use super::reader::BinaryReader;
use super::streams::IStreams;
use super::value::{StructLayout, StructValue, Value};
use crate::util::{Error, Result, Type};

/// Nesting limit guarding against malicious or corrupt inputs.
pub(super) const MAX_DEPTH: usize = 256;

/// Parsed binary header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub flags: u32,
}

impl Header {
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }
}

/// Check whether bytes start like a binary document.
#[inline]
pub fn is_binary(data: &[u8]) -> bool {
    data.starts_with(BINARY_MAGIC)
}

/// Validate magic, version and flags.
pub fn parse_header(data: &[u8]) -> Result<Header> {
    if !is_binary(data) {
        return Err(Error::BadMagic(data[..data.len().min(BINARY_MAGIC.len())].to_vec()));
    }
    let mut r = BinaryReader::at(data, VERSION_OFFSET)?;
    let version = r.read_u32()?;
    if !is_supported_version(version) {
        return Err(Error::UnsupportedVersion(version));
    }
    let flags = r.read_u32()?;
    if flags & !KNOWN_FLAGS != 0 {
        return Err(Error::invalid(format!("unknown header flags {flags:#x}")));
    }
    Ok(Header { version, flags })
}

/// Parse a whole binary document held by `streams`.
///
/// Returns the header and the root element. When the payload is compressed,
/// lazy arrays point into the inflated copy instead of `streams`.
pub fn read_document(streams: Arc<IStreams>) -> Result<(Header, Element)> {
    let header = parse_header(streams.as_slice())?;

    let (payload, start) = if header.is_compressed() {
        let inflated = compression::decompress(&streams.as_slice()[HEADER_SIZE..])?;
        trace!(size = inflated.len(), "inflated document payload");
        (Arc::new(IStreams::from_bytes(inflated)), 0)
    } else {
        (streams, HEADER_SIZE)
    };

    let mut tree = TreeReader::new(&payload, start)?;
    let tag = tree.read_tag()?;
    if tag != Type::Element {
        return Err(Error::invalid(format!("root property is {tag}, expected element")));
    }
    let root = tree.read_element()?;
    Ok((header, root))
}

struct TreeReader<'a> {
    r: BinaryReader<'a>,
    streams: &'a Arc<IStreams>,
    depth: usize,
}

impl<'a> TreeReader<'a> {
    fn new(streams: &'a Arc<IStreams>, start: usize) -> Result<Self> {
        Ok(Self {
            r: BinaryReader::at(streams.as_slice(), start)?,
            streams,
            depth: 0,
        })
    }

    fn read_tag(&mut self) -> Result<Type> {
        let byte = self.r.read_u8()?;
        Type::from_u8(byte).ok_or(Error::UnknownTag(byte))
    }

    fn read_property(&mut self, tag: Type) -> Result<Property> {
        Ok(match tag {
            Type::Element => Property::Element(self.read_element()?),
            Type::Array => Property::Array(self.read_array(false)?),
            Type::ArrayLz4 => Property::Array(self.read_array(true)?),
            _ => Property::Scalar(self.read_value(tag)?),
        })
    }

    fn read_value(&mut self, tag: Type) -> Result<Value> {
        Ok(match tag {
            Type::Nil => Value::Nil,
            Type::String => Value::String(self.r.read_string()?),
            Type::Utf8String => Value::Utf8(self.r.read_utf8_string()?),
            Type::Reference => Value::Reference(self.r.read_string()?),
            Type::Blob => {
                let len = self.r.read_len()?;
                Value::Blob(self.r.read_bytes(len)?.to_vec())
            }
            Type::BlobLz4 => {
                let len = self.r.read_len()?;
                Value::BlobLz4(self.r.read_bytes(len)?.to_vec())
            }
            Type::Struct => {
                let layout = self.read_layout()?;
                let bytes = self.r.read_bytes(layout.size())?.to_vec();
                Value::Struct(StructValue::new(layout, bytes)?)
            }
            _ => Value::read_packed(tag, &mut self.r)?,
        })
    }

    fn read_layout(&mut self) -> Result<StructLayout> {
        let count = self.r.read_u8()?;
        let mut layout = StructLayout::new();
        for _ in 0..count {
            let tag = self.read_tag()?;
            let name = self.r.read_string()?;
            layout.push(tag, name)?;
        }
        Ok(layout)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::invalid(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        Ok(())
    }

    fn read_element(&mut self) -> Result<Element> {
        self.enter()?;
        let size = self.r.read_len()?;
        let body_start = self.r.pos();
        let count = self.r.read_u32()? as usize;

        let mut element = Element::with_capacity(count.min(self.r.remaining()));
        for _ in 0..count {
            let key = self.r.read_string()?;
            let tag = self.read_tag()?;
            let child = self.read_property(tag)?;
            element.insert(key, child)?;
        }

        let consumed = self.r.pos() - body_start;
        if consumed != size {
            return Err(Error::invalid(format!(
                "element body declared {size} bytes, children used {consumed}"
            )));
        }
        self.depth -= 1;
        Ok(element)
    }

    fn read_array(&mut self, compressed: bool) -> Result<Array> {
        let value_type = self.read_tag()?;
        if !value_type.is_array_value_type() {
            return Err(Error::invalid(format!("{value_type} cannot be an array item type")));
        }
        let layout = match value_type {
            Type::Struct => Some(self.read_layout()?),
            _ => None,
        };
        let count = self.r.read_u32()? as usize;
        let size = self.r.read_len()?;
        let payload_pos = self.r.pos();

        if value_type.is_trivial() || value_type == Type::Struct {
            self.r.skip(size)?;
            return Array::lazy(
                value_type,
                layout,
                count,
                self.streams.clone(),
                payload_pos as u64,
                size,
                compressed,
            );
        }

        // Strings and elements are built eagerly.
        let array = if compressed {
            let raw = self.r.read_bytes(size)?;
            let inflated = Arc::new(IStreams::from_bytes(compression::lz4_decompress(raw)?));
            let mut inner = TreeReader::new(&inflated, 0)?;
            inner.depth = self.depth;
            let array = inner.read_items(value_type, count)?;
            if inner.r.remaining() != 0 {
                return Err(Error::invalid("trailing bytes in compressed array payload"));
            }
            array
        } else {
            let array = self.read_items(value_type, count)?;
            let consumed = self.r.pos() - payload_pos;
            if consumed != size {
                return Err(Error::invalid(format!(
                    "array payload declared {size} bytes, items used {consumed}"
                )));
            }
            array
        };
        Ok(array.compressed(compressed))
    }

    fn read_items(&mut self, value_type: Type, count: usize) -> Result<Array> {
        let capacity = count.min(self.r.remaining());
        match value_type {
            Type::Element => {
                let mut items = Vec::with_capacity(capacity);
                for _ in 0..count {
                    items.push(self.read_element()?);
                }
                Ok(Array::from_elements(items))
            }
            Type::String | Type::Utf8String => {
                let mut items = Vec::with_capacity(capacity);
                for _ in 0..count {
                    items.push(match value_type {
                        Type::Utf8String => self.r.read_utf8_string()?,
                        _ => self.r.read_string()?,
                    });
                }
                Ok(Array::from_strings_typed(value_type, items))
            }
            other => Err(Error::invalid(format!("{other} arrays are packed"))),
        }
    }
}
