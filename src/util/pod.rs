//! UDM type tags and the plain-old-data types stored in array payloads.

use bytemuck::{Pod, Zeroable};
use half::f16;
use std::fmt;

use super::math::{EulerAngles, HdrColor, Mat3x4, ScaledTransform, Srgba, Transform};

/// Type tag written in front of every property payload.
///
/// The numeric values are part of the binary format and must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Type {
    #[default]
    Nil = 0,
    String = 1,
    Utf8String = 2,
    Int8 = 3,
    UInt8 = 4,
    Int16 = 5,
    UInt16 = 6,
    Int32 = 7,
    UInt32 = 8,
    Int64 = 9,
    UInt64 = 10,
    Float = 11,
    Double = 12,
    Boolean = 13,
    Vector2 = 14,
    Vector3 = 15,
    Vector4 = 16,
    Quaternion = 17,
    EulerAngles = 18,
    Srgba = 19,
    HdrColor = 20,
    Transform = 21,
    ScaledTransform = 22,
    Mat4 = 23,
    Mat3x4 = 24,
    Blob = 25,
    BlobLz4 = 26,
    Element = 27,
    Array = 28,
    Reference = 29,
    ArrayLz4 = 30,
    Struct = 31,
    Half = 32,
    Vector2i = 33,
    Vector3i = 34,
    Vector4i = 35,
}

impl Type {
    /// Number of tags in the table.
    pub const COUNT: usize = 36;

    /// Convert from the on-disk tag byte.
    pub const fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Nil,
            1 => Self::String,
            2 => Self::Utf8String,
            3 => Self::Int8,
            4 => Self::UInt8,
            5 => Self::Int16,
            6 => Self::UInt16,
            7 => Self::Int32,
            8 => Self::UInt32,
            9 => Self::Int64,
            10 => Self::UInt64,
            11 => Self::Float,
            12 => Self::Double,
            13 => Self::Boolean,
            14 => Self::Vector2,
            15 => Self::Vector3,
            16 => Self::Vector4,
            17 => Self::Quaternion,
            18 => Self::EulerAngles,
            19 => Self::Srgba,
            20 => Self::HdrColor,
            21 => Self::Transform,
            22 => Self::ScaledTransform,
            23 => Self::Mat4,
            24 => Self::Mat3x4,
            25 => Self::Blob,
            26 => Self::BlobLz4,
            27 => Self::Element,
            28 => Self::Array,
            29 => Self::Reference,
            30 => Self::ArrayLz4,
            31 => Self::Struct,
            32 => Self::Half,
            33 => Self::Vector2i,
            34 => Self::Vector3i,
            35 => Self::Vector4i,
            _ => return None,
        })
    }

    /// Tag byte written to disk.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Name used by the text format (`$vec3`, `$uint32`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::String => "string",
            Self::Utf8String => "utf8",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "bool",
            Self::Vector2 => "vec2",
            Self::Vector3 => "vec3",
            Self::Vector4 => "vec4",
            Self::Quaternion => "quat",
            Self::EulerAngles => "ang",
            Self::Srgba => "srgba",
            Self::HdrColor => "hdr",
            Self::Transform => "transform",
            Self::ScaledTransform => "stransform",
            Self::Mat4 => "mat4",
            Self::Mat3x4 => "mat3x4",
            Self::Blob => "blob",
            Self::BlobLz4 => "blobLz4",
            Self::Element => "element",
            Self::Array => "array",
            Self::Reference => "ref",
            Self::ArrayLz4 => "arrayLz4",
            Self::Struct => "struct",
            Self::Half => "half",
            Self::Vector2i => "vec2i",
            Self::Vector3i => "vec3i",
            Self::Vector4i => "vec4i",
        }
    }

    /// Parse a text-format type name.
    pub fn from_name(name: &str) -> Option<Self> {
        (0..Self::COUNT as u8)
            .filter_map(Self::from_u8)
            .find(|t| t.name() == name)
    }

    /// Size in bytes of one packed value, for fixed-size types.
    pub const fn size(self) -> Option<usize> {
        Some(match self {
            Self::Int8 | Self::UInt8 | Self::Boolean => 1,
            Self::Int16 | Self::UInt16 | Self::Half => 2,
            Self::Int32 | Self::UInt32 | Self::Float | Self::Srgba => 4,
            Self::Int64 | Self::UInt64 | Self::Double => 8,
            Self::HdrColor => 6,
            Self::Vector2 | Self::Vector2i => 8,
            Self::Vector3 | Self::Vector3i | Self::EulerAngles => 12,
            Self::Vector4 | Self::Vector4i | Self::Quaternion => 16,
            Self::Transform => 28,
            Self::ScaledTransform => 40,
            Self::Mat4 => 64,
            Self::Mat3x4 => 48,
            _ => return None,
        })
    }

    /// True if values of this type have a fixed packed size.
    #[inline]
    pub const fn is_trivial(self) -> bool {
        self.size().is_some()
    }

    /// Returns true if this is an integer type.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
        )
    }

    /// Returns true if this is a floating point type.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Half | Self::Float | Self::Double)
    }

    /// Returns true if this is a numeric type (int or float).
    #[inline]
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Returns true for the two string flavours.
    #[inline]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::String | Self::Utf8String)
    }

    /// Array container tags.
    #[inline]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::Array | Self::ArrayLz4)
    }

    /// Types that may appear as the value type of an array.
    #[inline]
    pub const fn is_array_value_type(self) -> bool {
        self.is_trivial()
            || matches!(self, Self::String | Self::Utf8String | Self::Element | Self::Struct)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// === POD Trait for type-safe conversions ===

/// Types that can be read straight out of a packed array payload.
pub trait UdmPod: Pod + Zeroable + Copy + Default {
    /// The corresponding tag.
    const TYPE: Type;

    /// Size of this type in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();
}

macro_rules! impl_udm_pod {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl UdmPod for $ty {
            const TYPE: Type = Type::$tag;
        })*
    };
}

impl_udm_pod! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    f16 => Half,
    Bool => Boolean,
    glam::Vec2 => Vector2,
    glam::Vec3 => Vector3,
    glam::Vec4 => Vector4,
    glam::Quat => Quaternion,
    glam::IVec2 => Vector2i,
    glam::IVec3 => Vector3i,
    glam::IVec4 => Vector4i,
    glam::Mat4 => Mat4,
    EulerAngles => EulerAngles,
    Srgba => Srgba,
    HdrColor => HdrColor,
    Transform => Transform,
    ScaledTransform => ScaledTransform,
    Mat3x4 => Mat3x4,
}

/// Boolean type with guaranteed 1-byte storage.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Bool(u8);

impl Bool {
    pub const TRUE: Self = Self(1);
    pub const FALSE: Self = Self(0);

    #[inline]
    pub const fn new(v: bool) -> Self {
        Self(v as u8)
    }

    #[inline]
    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bool {
    #[inline]
    fn from(v: bool) -> Self {
        Self::new(v)
    }
}

impl From<Bool> for bool {
    #[inline]
    fn from(v: Bool) -> Self {
        v.get()
    }
}

impl fmt::Debug for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_table_is_dense() {
        for i in 0..Type::COUNT as u8 {
            let t = Type::from_u8(i).expect("tag in table");
            assert_eq!(t.as_u8(), i);
            assert_eq!(Type::from_name(t.name()), Some(t));
        }
        assert_eq!(Type::from_u8(Type::COUNT as u8), None);
    }

    #[test]
    fn test_fixed_tags() {
        assert_eq!(Type::Int32.as_u8(), 7);
        assert_eq!(Type::Element.as_u8(), 27);
        assert_eq!(Type::Array.as_u8(), 28);
        assert_eq!(Type::ArrayLz4.as_u8(), 30);
    }

    #[test]
    fn test_sizes_match_rust_types() {
        assert_eq!(Type::Vector3.size(), Some(<glam::Vec3 as UdmPod>::SIZE));
        assert_eq!(Type::Quaternion.size(), Some(<glam::Quat as UdmPod>::SIZE));
        assert_eq!(Type::Transform.size(), Some(<Transform as UdmPod>::SIZE));
        assert_eq!(Type::ScaledTransform.size(), Some(<ScaledTransform as UdmPod>::SIZE));
        assert_eq!(Type::HdrColor.size(), Some(<HdrColor as UdmPod>::SIZE));
        assert_eq!(Type::Mat3x4.size(), Some(<Mat3x4 as UdmPod>::SIZE));
        assert_eq!(Type::Half.size(), Some(2));
        assert_eq!(Type::String.size(), None);
        assert_eq!(Type::Element.size(), None);
    }

    #[test]
    fn test_bool_type() {
        assert!(Bool::new(true).get());
        assert!(!Bool::new(false).get());
        assert_eq!(std::mem::size_of::<Bool>(), 1);
    }
}
