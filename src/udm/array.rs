//! Array properties.
//!
//! Numeric and struct arrays loaded from a binary document stay as views into
//! the backing [`IStreams`] until [`Array::array_value`] is called; the dense
//! buffer is then cached for the life of the array. String and element arrays
//! are built eagerly with the tree.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value as Json;

use super::compression::lz4_decompress;
use super::property::{Element, Property};
use super::reader::BinaryReader;
use super::streams::IStreams;
use super::value::{FromValue, StructLayout, StructValue, Value};
use crate::util::{Error, Result, Type, UdmPod};

/// Dense, materialized payload of a numeric or struct array.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayBuffer {
    value_type: Type,
    count: usize,
    layout: Option<StructLayout>,
    bytes: Vec<u8>,
}

impl ArrayBuffer {
    fn new(value_type: Type, count: usize, layout: Option<StructLayout>, bytes: Vec<u8>) -> Result<Self> {
        let stride = stride_of(value_type, layout.as_ref())?;
        if count.checked_mul(stride) != Some(bytes.len()) {
            return Err(Error::invalid(format!(
                "array of {count} x {value_type} needs {} bytes, payload has {}",
                count.saturating_mul(stride),
                bytes.len()
            )));
        }
        Ok(Self {
            value_type,
            count,
            layout,
            bytes,
        })
    }

    #[inline]
    pub fn value_type(&self) -> Type {
        self.value_type
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes per item.
    #[inline]
    pub fn stride(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            self.bytes.len() / self.count
        }
    }

    pub fn layout(&self) -> Option<&StructLayout> {
        self.layout.as_ref()
    }

    /// Raw little-endian payload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy out as a typed vector. The element type must match exactly.
    pub fn to_vec<T: UdmPod>(&self) -> Result<Vec<T>> {
        if self.value_type != T::TYPE {
            return Err(Error::mismatch(T::TYPE, self.value_type));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.bytes))
    }

    /// Convert every item with the scalar conversion rules (`u16` indices
    /// read as `u32`, ints as floats, ...).
    pub fn convert<T: FromValue>(&self) -> Result<Vec<T>> {
        (0..self.count).map(|i| T::convert(&self.get(i)?)).collect()
    }

    /// One member of every record of a struct array.
    pub fn field<T: UdmPod>(&self, name: &str) -> Result<Vec<T>> {
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| Error::mismatch(Type::Struct, self.value_type))?;
        let (offset, ty) = layout
            .member(name)
            .ok_or_else(|| Error::not_found(format!("struct member '{name}'")))?;
        if ty != T::TYPE {
            return Err(Error::mismatch(T::TYPE, ty));
        }
        let stride = layout.size();
        Ok((0..self.count)
            .map(|i| {
                let start = i * stride + offset;
                bytemuck::pod_read_unaligned(&self.bytes[start..start + T::SIZE])
            })
            .collect())
    }

    /// Decode item `index`.
    pub fn get(&self, index: usize) -> Result<Value> {
        if index >= self.count {
            return Err(Error::not_found(format!("index {index} of {} items", self.count)));
        }
        let stride = self.stride();
        let item = &self.bytes[index * stride..(index + 1) * stride];
        match &self.layout {
            Some(layout) => Ok(Value::Struct(StructValue::new(layout.clone(), item.to_vec())?)),
            None => Value::read_packed(self.value_type, &mut BinaryReader::new(item)),
        }
    }

    /// Decode every item.
    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.count).map(|i| self.get(i)).collect()
    }
}

fn stride_of(value_type: Type, layout: Option<&StructLayout>) -> Result<usize> {
    match (value_type, layout) {
        (Type::Struct, Some(layout)) => Ok(layout.size()),
        (Type::Struct, None) => Err(Error::invalid("struct array without layout")),
        (ty, _) => ty
            .size()
            .ok_or_else(|| Error::invalid(format!("{ty} cannot be stored packed"))),
    }
}

/// Where a lazy payload lives in the backing buffer.
#[derive(Clone, Debug)]
struct LazySource {
    streams: Arc<IStreams>,
    pos: u64,
    len: usize,
}

#[derive(Clone, Debug)]
struct PackedArray {
    value_type: Type,
    count: usize,
    layout: Option<StructLayout>,
    source: Option<LazySource>,
    cache: OnceCell<ArrayBuffer>,
}

#[derive(Clone, Debug)]
enum Storage {
    Elements(Vec<Property>),
    Strings(Type, Vec<String>),
    Packed(PackedArray),
}

/// Ordered, homogeneously typed sequence.
#[derive(Clone, Debug)]
pub struct Array {
    storage: Storage,
    /// Written as `ArrayLz4`.
    compressed: bool,
}

impl Array {
    /// Numeric array from a slice of packed values.
    pub fn from_values<T: UdmPod>(values: &[T]) -> Self {
        let bytes = bytemuck::cast_slice::<T, u8>(values).to_vec();
        Self::packed(ArrayBuffer {
            value_type: T::TYPE,
            count: values.len(),
            layout: None,
            bytes,
        })
    }

    /// Array from loose values; all values must share one type.
    pub fn from_value_list(values: Vec<Value>) -> Result<Self> {
        let Some(first) = values.first() else {
            return Ok(Self::from_values::<i32>(&[]));
        };
        let ty = first.value_type();
        if let Some(bad) = values.iter().find(|v| v.value_type() != ty) {
            return Err(Error::invalid(format!(
                "heterogeneous array: {ty} followed by {}",
                bad.value_type()
            )));
        }
        if ty.is_string() {
            let strings = values
                .iter()
                .map(<String as FromValue>::convert)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::from_strings_typed(ty, strings));
        }
        if let Value::Struct(s) = first {
            let layout = s.layout.clone();
            let mut bytes = Vec::with_capacity(layout.size() * values.len());
            for v in &values {
                match v {
                    Value::Struct(s) if s.layout == layout => bytes.extend_from_slice(&s.bytes),
                    _ => return Err(Error::invalid("struct array with differing layouts")),
                }
            }
            return Self::from_structs(layout, values.len(), bytes);
        }
        let mut bytes = Vec::new();
        for v in &values {
            let packed = v
                .packed_bytes()
                .ok_or_else(|| Error::invalid(format!("{ty} cannot be stored in an array")))?;
            bytes.extend_from_slice(&packed);
        }
        Self::from_packed(ty, values.len(), bytes)
    }

    /// Latin-1 string array.
    pub fn from_strings<S: Into<String>>(strings: impl IntoIterator<Item = S>) -> Self {
        Self::from_strings_typed(Type::String, strings.into_iter().map(Into::into).collect())
    }

    pub(crate) fn from_strings_typed(ty: Type, strings: Vec<String>) -> Self {
        Self {
            storage: Storage::Strings(ty, strings),
            compressed: false,
        }
    }

    /// Element array.
    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        Self {
            storage: Storage::Elements(elements.into_iter().map(Property::Element).collect()),
            compressed: false,
        }
    }

    /// Struct array from `count` packed records.
    pub fn from_structs(layout: StructLayout, count: usize, bytes: Vec<u8>) -> Result<Self> {
        Ok(Self::packed(ArrayBuffer::new(Type::Struct, count, Some(layout), bytes)?))
    }

    /// Numeric array from raw packed bytes.
    pub fn from_packed(value_type: Type, count: usize, bytes: Vec<u8>) -> Result<Self> {
        Ok(Self::packed(ArrayBuffer::new(value_type, count, None, bytes)?))
    }

    fn packed(buffer: ArrayBuffer) -> Self {
        Self {
            storage: Storage::Packed(PackedArray {
                value_type: buffer.value_type,
                count: buffer.count,
                layout: buffer.layout.clone(),
                source: None,
                cache: OnceCell::with_value(buffer),
            }),
            compressed: false,
        }
    }

    /// View over a payload in `streams`, read on first access.
    pub(crate) fn lazy(
        value_type: Type,
        layout: Option<StructLayout>,
        count: usize,
        streams: Arc<IStreams>,
        pos: u64,
        len: usize,
        compressed: bool,
    ) -> Result<Self> {
        let stride = stride_of(value_type, layout.as_ref())?;
        if !compressed && count.checked_mul(stride) != Some(len) {
            return Err(Error::invalid(format!(
                "array of {count} x {value_type} has a {len} byte payload"
            )));
        }
        Ok(Self {
            storage: Storage::Packed(PackedArray {
                value_type,
                count,
                layout,
                source: Some(LazySource { streams, pos, len }),
                cache: OnceCell::new(),
            }),
            compressed,
        })
    }

    /// Builder: store this array LZ4-compressed when written.
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Type of the items.
    pub fn value_type(&self) -> Type {
        match &self.storage {
            Storage::Elements(_) => Type::Element,
            Storage::Strings(ty, _) => *ty,
            Storage::Packed(p) => p.value_type,
        }
    }

    /// Struct layout of a struct array.
    pub fn layout(&self) -> Option<&StructLayout> {
        match &self.storage {
            Storage::Packed(p) => p.layout.as_ref(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Elements(e) => e.len(),
            Storage::Strings(_, s) => s.len(),
            Storage::Packed(p) => p.count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the packed payload has been read.
    pub fn is_materialized(&self) -> bool {
        match &self.storage {
            Storage::Packed(p) => p.cache.get().is_some(),
            _ => true,
        }
    }

    /// Dense buffer of a numeric or struct array. The first call reads the
    /// backing stream; later calls return the cached buffer.
    pub fn array_value(&self) -> Result<&ArrayBuffer> {
        let Storage::Packed(p) = &self.storage else {
            return Err(Error::mismatch("numeric array", self.value_type()));
        };
        p.cache.get_or_try_init(|| {
            let src = p
                .source
                .as_ref()
                .ok_or_else(|| Error::invalid("array has neither payload nor source"))?;
            let raw = src.streams.slice(src.pos, src.len)?;
            let bytes = if self.compressed {
                lz4_decompress(raw)?
            } else {
                raw.to_vec()
            };
            ArrayBuffer::new(p.value_type, p.count, p.layout.clone(), bytes)
        })
    }

    /// Shortcut for `array_value()?.to_vec()`.
    pub fn to_vec<T: UdmPod>(&self) -> Result<Vec<T>> {
        self.array_value()?.to_vec()
    }

    /// Items converted with the scalar rules; works for every array kind
    /// except element arrays.
    pub fn convert<T: FromValue>(&self) -> Result<Vec<T>> {
        match &self.storage {
            Storage::Strings(ty, s) => s
                .iter()
                .map(|s| T::convert(&string_value(*ty, s)))
                .collect(),
            Storage::Packed(_) => self.array_value()?.convert(),
            Storage::Elements(_) => Err(Error::mismatch(T::EXPECTED, Type::Element)),
        }
    }

    /// Items of an element array.
    pub fn elements(&self) -> Result<&[Property]> {
        match &self.storage {
            Storage::Elements(e) => Ok(e),
            _ => Err(Error::mismatch(Type::Element, self.value_type())),
        }
    }

    /// Mutable items of an element array.
    pub fn elements_mut(&mut self) -> Result<&mut Vec<Property>> {
        let ty = self.value_type();
        match &mut self.storage {
            Storage::Elements(e) => Ok(e),
            _ => Err(Error::mismatch(Type::Element, ty)),
        }
    }

    /// Items of a string array.
    pub fn strings(&self) -> Result<&[String]> {
        match &self.storage {
            Storage::Strings(_, s) => Ok(s),
            _ => Err(Error::mismatch(Type::String, self.value_type())),
        }
    }

    /// Element item by index.
    pub fn element_at(&self, index: usize) -> Option<&Property> {
        match &self.storage {
            Storage::Elements(e) => e.get(index),
            _ => None,
        }
    }

    /// Scalar item by index.
    pub fn value_at(&self, index: usize) -> Result<Value> {
        match &self.storage {
            Storage::Strings(ty, s) => s
                .get(index)
                .map(|s| string_value(*ty, s))
                .ok_or_else(|| Error::not_found(format!("index {index} of {} items", s.len()))),
            Storage::Packed(_) => self.array_value()?.get(index),
            Storage::Elements(_) => Err(Error::mismatch("scalar", Type::Element)),
        }
    }

    /// Generic JSON form (materializes packed payloads).
    pub fn to_json(&self) -> Result<Json> {
        Ok(Json::Array(match &self.storage {
            Storage::Elements(e) => e.iter().map(Property::to_json).collect::<Result<_>>()?,
            Storage::Strings(_, s) => s.iter().cloned().map(Json::String).collect(),
            Storage::Packed(_) => self
                .array_value()?
                .values()?
                .iter()
                .map(Value::to_json)
                .collect(),
        }))
    }
}

fn string_value(ty: Type, s: &str) -> Value {
    if ty == Type::Utf8String {
        Value::Utf8(s.to_string())
    } else {
        Value::String(s.to_string())
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        if self.value_type() != other.value_type() || self.len() != other.len() {
            return false;
        }
        match (&self.storage, &other.storage) {
            (Storage::Elements(a), Storage::Elements(b)) => a == b,
            (Storage::Strings(_, a), Storage::Strings(_, b)) => a == b,
            (Storage::Packed(_), Storage::Packed(_)) => {
                match (self.array_value(), other.array_value()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}
