//! Scalar values and typed conversion out of them.

use half::f16;
use serde_json::{json, Value as Json};
use smallvec::SmallVec;

use super::reader::BinaryReader;
use crate::util::{
    Bool, Error, EulerAngles, HdrColor, IVec2, IVec3, IVec4, Mat3x4, Mat4, Quat, Result,
    ScaledTransform, Srgba, Transform, Type, UdmPod, Vec2, Vec3, Vec4,
};

/// One member of a struct layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructMember {
    pub ty: Type,
    pub name: String,
}

/// Described layout of a packed record. Members are trivial types laid out
/// back to back without padding. Uses SmallVec for the common case of a
/// few members.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructLayout {
    members: SmallVec<[StructMember; 4]>,
}

impl StructLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member. Only fixed-size types can be packed.
    pub fn with(mut self, ty: Type, name: impl Into<String>) -> Result<Self> {
        self.push(ty, name)?;
        Ok(self)
    }

    pub fn push(&mut self, ty: Type, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !ty.is_trivial() {
            return Err(Error::invalid(format!("struct member '{name}' has non-packed type {ty}")));
        }
        if self.members.iter().any(|m| m.name == name) {
            return Err(Error::invalid(format!("duplicate struct member '{name}'")));
        }
        self.members.push(StructMember { ty, name });
        Ok(())
    }

    pub fn members(&self) -> &[StructMember] {
        &self.members
    }

    /// Bytes per record.
    pub fn size(&self) -> usize {
        self.members.iter().filter_map(|m| m.ty.size()).sum()
    }

    /// Byte offset and type of a member.
    pub fn member(&self, name: &str) -> Option<(usize, Type)> {
        let mut offset = 0;
        for m in &self.members {
            if m.name == name {
                return Some((offset, m.ty));
            }
            offset += m.ty.size().unwrap_or(0);
        }
        None
    }

    /// Decode one record into `(name, value)` pairs.
    pub fn decode(&self, record: &[u8]) -> Result<Vec<(String, Value)>> {
        let mut r = BinaryReader::new(record);
        self.members
            .iter()
            .map(|m| Ok((m.name.clone(), Value::read_packed(m.ty, &mut r)?)))
            .collect()
    }
}

/// A packed record together with its layout.
#[derive(Clone, Debug, PartialEq)]
pub struct StructValue {
    pub layout: StructLayout,
    pub bytes: Vec<u8>,
}

impl StructValue {
    pub fn new(layout: StructLayout, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != layout.size() {
            return Err(Error::invalid(format!(
                "struct payload is {} bytes, layout needs {}",
                bytes.len(),
                layout.size()
            )));
        }
        Ok(Self { layout, bytes })
    }

    /// Read one member.
    pub fn field<T: UdmPod>(&self, name: &str) -> Result<T> {
        let (offset, ty) = self
            .layout
            .member(name)
            .ok_or_else(|| Error::not_found(format!("struct member '{name}'")))?;
        if ty != T::TYPE {
            return Err(Error::mismatch(T::TYPE, ty));
        }
        Ok(bytemuck::pod_read_unaligned(&self.bytes[offset..offset + T::SIZE]))
    }
}

/// A single typed value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    String(String),
    Utf8(String),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Half(f16),
    Float(f32),
    Double(f64),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Vec2i(IVec2),
    Vec3i(IVec3),
    Vec4i(IVec4),
    Quat(Quat),
    Euler(EulerAngles),
    Srgba(Srgba),
    Hdr(HdrColor),
    Transform(Transform),
    ScaledTransform(ScaledTransform),
    Mat4(Mat4),
    Mat3x4(Mat3x4),
    Blob(Vec<u8>),
    /// LZ4 block as stored; [`Value::blob_bytes`] inflates it.
    BlobLz4(Vec<u8>),
    Reference(String),
    Struct(StructValue),
}

impl Value {
    /// The tag this value is written with.
    pub fn value_type(&self) -> Type {
        match self {
            Self::Nil => Type::Nil,
            Self::String(_) => Type::String,
            Self::Utf8(_) => Type::Utf8String,
            Self::Int8(_) => Type::Int8,
            Self::UInt8(_) => Type::UInt8,
            Self::Int16(_) => Type::Int16,
            Self::UInt16(_) => Type::UInt16,
            Self::Int32(_) => Type::Int32,
            Self::UInt32(_) => Type::UInt32,
            Self::Int64(_) => Type::Int64,
            Self::UInt64(_) => Type::UInt64,
            Self::Half(_) => Type::Half,
            Self::Float(_) => Type::Float,
            Self::Double(_) => Type::Double,
            Self::Bool(_) => Type::Boolean,
            Self::Vec2(_) => Type::Vector2,
            Self::Vec3(_) => Type::Vector3,
            Self::Vec4(_) => Type::Vector4,
            Self::Vec2i(_) => Type::Vector2i,
            Self::Vec3i(_) => Type::Vector3i,
            Self::Vec4i(_) => Type::Vector4i,
            Self::Quat(_) => Type::Quaternion,
            Self::Euler(_) => Type::EulerAngles,
            Self::Srgba(_) => Type::Srgba,
            Self::Hdr(_) => Type::HdrColor,
            Self::Transform(_) => Type::Transform,
            Self::ScaledTransform(_) => Type::ScaledTransform,
            Self::Mat4(_) => Type::Mat4,
            Self::Mat3x4(_) => Type::Mat3x4,
            Self::Blob(_) => Type::Blob,
            Self::BlobLz4(_) => Type::BlobLz4,
            Self::Reference(_) => Type::Reference,
            Self::Struct(_) => Type::Struct,
        }
    }

    /// Read one fixed-size value of type `ty`.
    pub fn read_packed(ty: Type, r: &mut BinaryReader<'_>) -> Result<Self> {
        Ok(match ty {
            Type::Int8 => Self::Int8(r.read_i8()?),
            Type::UInt8 => Self::UInt8(r.read_u8()?),
            Type::Int16 => Self::Int16(r.read_i16()?),
            Type::UInt16 => Self::UInt16(r.read_u16()?),
            Type::Int32 => Self::Int32(r.read_i32()?),
            Type::UInt32 => Self::UInt32(r.read_u32()?),
            Type::Int64 => Self::Int64(r.read_i64()?),
            Type::UInt64 => Self::UInt64(r.read_u64()?),
            Type::Half => Self::Half(r.read_f16()?),
            Type::Float => Self::Float(r.read_f32()?),
            Type::Double => Self::Double(r.read_f64()?),
            Type::Boolean => Self::Bool(r.read_u8()? != 0),
            Type::Vector2 => Self::Vec2(r.read_pod()?),
            Type::Vector3 => Self::Vec3(r.read_pod()?),
            Type::Vector4 => Self::Vec4(r.read_pod()?),
            Type::Vector2i => Self::Vec2i(r.read_pod()?),
            Type::Vector3i => Self::Vec3i(r.read_pod()?),
            Type::Vector4i => Self::Vec4i(r.read_pod()?),
            Type::Quaternion => Self::Quat(r.read_pod()?),
            Type::EulerAngles => Self::Euler(r.read_pod()?),
            Type::Srgba => Self::Srgba(r.read_pod()?),
            Type::HdrColor => Self::Hdr(r.read_pod()?),
            Type::Transform => Self::Transform(r.read_pod()?),
            Type::ScaledTransform => Self::ScaledTransform(r.read_pod()?),
            Type::Mat4 => Self::Mat4(r.read_pod()?),
            Type::Mat3x4 => Self::Mat3x4(r.read_pod()?),
            other => return Err(Error::invalid(format!("{other} is not a packed type"))),
        })
    }

    /// Packed little-endian bytes of a fixed-size value.
    pub fn packed_bytes(&self) -> Option<Vec<u8>> {
        fn raw<T: UdmPod>(v: &T) -> Option<Vec<u8>> {
            Some(bytemuck::bytes_of(v).to_vec())
        }
        match self {
            Self::Int8(v) => raw(v),
            Self::UInt8(v) => raw(v),
            Self::Int16(v) => raw(v),
            Self::UInt16(v) => raw(v),
            Self::Int32(v) => raw(v),
            Self::UInt32(v) => raw(v),
            Self::Int64(v) => raw(v),
            Self::UInt64(v) => raw(v),
            Self::Half(v) => raw(v),
            Self::Float(v) => raw(v),
            Self::Double(v) => raw(v),
            Self::Bool(v) => raw(&Bool::new(*v)),
            Self::Vec2(v) => raw(v),
            Self::Vec3(v) => raw(v),
            Self::Vec4(v) => raw(v),
            Self::Vec2i(v) => raw(v),
            Self::Vec3i(v) => raw(v),
            Self::Vec4i(v) => raw(v),
            Self::Quat(v) => raw(v),
            Self::Euler(v) => raw(v),
            Self::Srgba(v) => raw(v),
            Self::Hdr(v) => raw(v),
            Self::Transform(v) => raw(v),
            Self::ScaledTransform(v) => raw(v),
            Self::Mat4(v) => raw(v),
            Self::Mat3x4(v) => raw(v),
            _ => None,
        }
    }

    /// Integer payload widened losslessly, if this is an integer.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::Int8(v) => v.into(),
            Self::UInt8(v) => v.into(),
            Self::Int16(v) => v.into(),
            Self::UInt16(v) => v.into(),
            Self::Int32(v) => v.into(),
            Self::UInt32(v) => v.into(),
            Self::Int64(v) => v.into(),
            Self::UInt64(v) => v.into(),
            _ => return None,
        })
    }

    /// Numeric payload as `f64` (integers widen).
    pub fn as_f64_lossy(&self) -> Option<f64> {
        match *self {
            Self::Half(v) => Some(v.to_f64()),
            Self::Float(v) => Some(v.into()),
            Self::Double(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    /// Blob contents, inflating LZ4 blobs.
    pub fn blob_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Blob(b) => Ok(b.clone()),
            Self::BlobLz4(b) => super::compression::lz4_decompress(b),
            other => Err(Error::mismatch(Type::Blob, other.value_type())),
        }
    }

    /// Generic JSON form.
    pub fn to_json(&self) -> Json {
        fn num(v: f64) -> Json {
            serde_json::Number::from_f64(v).map_or(Json::Null, Json::Number)
        }
        fn floats(v: &[f32]) -> Json {
            Json::Array(v.iter().map(|&f| num(f.into())).collect())
        }
        match self {
            Self::Nil => Json::Null,
            Self::String(s) | Self::Utf8(s) | Self::Reference(s) => Json::String(s.clone()),
            Self::Bool(b) => Json::Bool(*b),
            Self::Half(_) | Self::Float(_) | Self::Double(_) => {
                num(self.as_f64_lossy().unwrap_or(f64::NAN))
            }
            Self::Int64(v) => json!(v),
            Self::UInt64(v) => json!(v),
            Self::Int8(_) | Self::UInt8(_) | Self::Int16(_) | Self::UInt16(_) | Self::Int32(_) | Self::UInt32(_) => {
                json!(self.as_i128().unwrap_or_default() as i64)
            }
            Self::Vec2(v) => floats(&v.to_array()),
            Self::Vec3(v) => floats(&v.to_array()),
            Self::Vec4(v) => floats(&v.to_array()),
            Self::Quat(v) => floats(&v.to_array()),
            Self::Vec2i(v) => json!(v.to_array()),
            Self::Vec3i(v) => json!(v.to_array()),
            Self::Vec4i(v) => json!(v.to_array()),
            Self::Euler(e) => floats(&[e.pitch, e.yaw, e.roll]),
            Self::Srgba(c) => json!(c.0),
            Self::Hdr(c) => json!(c.0),
            Self::Transform(t) => json!({
                "translation": floats(&t.translation),
                "rotation": floats(&t.rotation),
            }),
            Self::ScaledTransform(t) => json!({
                "translation": floats(&t.translation),
                "rotation": floats(&t.rotation),
                "scale": floats(&t.scale),
            }),
            Self::Mat4(m) => floats(&m.to_cols_array()),
            Self::Mat3x4(m) => floats(&m.0),
            Self::Blob(b) => json!({ "blob": b.len() }),
            Self::BlobLz4(b) => json!({ "blobLz4": b.len() }),
            Self::Struct(s) => match s.layout.decode(&s.bytes) {
                Ok(fields) => Json::Object(fields.into_iter().map(|(k, v)| (k, v.to_json())).collect()),
                Err(_) => Json::Null,
            },
        }
    }
}

/// Conversion out of a [`Value`], used by the typed accessors.
///
/// Integers convert by value: widening always works, narrowing works only
/// when the stored value fits. Integers convert into floats; floats never
/// convert into integers.
pub trait FromValue: Sized {
    /// Type name reported in mismatch errors.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;

    /// Convert or fail with [`Error::TypeMismatch`].
    fn convert(value: &Value) -> Result<Self> {
        Self::from_value(value).ok_or_else(|| Error::mismatch(Self::EXPECTED, value.value_type()))
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            const EXPECTED: &'static str = stringify!($ty);
            fn from_value(value: &Value) -> Option<Self> {
                value.as_i128().and_then(|v| <$ty>::try_from(v).ok())
            }
        })*
    };
}

impl_from_value_int!(i8, u8, i16, u16, i32, u32, i64, u64, usize);

impl FromValue for f64 {
    const EXPECTED: &'static str = "f64";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64_lossy()
    }
}

impl FromValue for f32 {
    const EXPECTED: &'static str = "f32";
    fn from_value(value: &Value) -> Option<Self> {
        match *value {
            Value::Half(v) => Some(v.to_f32()),
            Value::Float(v) => Some(v),
            Value::Double(v) if !v.is_finite() || v.abs() <= f32::MAX as f64 => Some(v as f32),
            Value::Double(_) => None,
            _ => value.as_i128().map(|v| v as f32),
        }
    }
}

impl FromValue for f16 {
    const EXPECTED: &'static str = "f16";
    fn from_value(value: &Value) -> Option<Self> {
        match *value {
            Value::Half(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";
    fn from_value(value: &Value) -> Option<Self> {
        match *value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) | Value::Utf8(s) | Value::Reference(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for Value {
    const EXPECTED: &'static str = "value";
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for ScaledTransform {
    const EXPECTED: &'static str = "stransform";
    fn from_value(value: &Value) -> Option<Self> {
        match *value {
            Value::ScaledTransform(t) => Some(t),
            Value::Transform(t) => Some(t.into()),
            _ => None,
        }
    }
}

impl FromValue for Mat4 {
    const EXPECTED: &'static str = "mat4";
    fn from_value(value: &Value) -> Option<Self> {
        match *value {
            Value::Mat4(m) => Some(m),
            Value::Mat3x4(m) => Some(m.to_mat4()),
            _ => None,
        }
    }
}

impl FromValue for StructValue {
    const EXPECTED: &'static str = "struct";
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Struct(s) => Some(s.clone()),
            _ => None,
        }
    }
}

macro_rules! impl_from_value_exact {
    ($($ty:ty => $variant:ident, $name:literal);* $(;)?) => {
        $(impl FromValue for $ty {
            const EXPECTED: &'static str = $name;
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        })*
    };
}

impl_from_value_exact! {
    Vec2 => Vec2, "vec2";
    Vec3 => Vec3, "vec3";
    Vec4 => Vec4, "vec4";
    IVec2 => Vec2i, "vec2i";
    IVec3 => Vec3i, "vec3i";
    IVec4 => Vec4i, "vec4i";
    Quat => Quat, "quat";
    EulerAngles => Euler, "ang";
    Srgba => Srgba, "srgba";
    HdrColor => Hdr, "hdr";
    Transform => Transform, "transform";
    Mat3x4 => Mat3x4, "mat3x4";
}

macro_rules! impl_into_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        })*
    };
}

impl_into_value! {
    i8 => Int8, u8 => UInt8, i16 => Int16, u16 => UInt16,
    i32 => Int32, u32 => UInt32, i64 => Int64, u64 => UInt64,
    f16 => Half, f32 => Float, f64 => Double, bool => Bool,
    String => String, Vec2 => Vec2, Vec3 => Vec3, Vec4 => Vec4,
    IVec2 => Vec2i, IVec3 => Vec3i, IVec4 => Vec4i, Quat => Quat,
    EulerAngles => Euler, Srgba => Srgba, HdrColor => Hdr,
    Transform => Transform, ScaledTransform => ScaledTransform,
    Mat4 => Mat4, Mat3x4 => Mat3x4, StructValue => Struct,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening_and_narrowing() {
        let big = Value::Int64(1 << 40);
        assert_eq!(i64::convert(&big).unwrap(), 1 << 40);
        assert!(matches!(i32::convert(&big), Err(Error::TypeMismatch { .. })));

        let small = Value::UInt8(200);
        assert_eq!(i32::convert(&small).unwrap(), 200);
        assert!(i8::convert(&small).is_err());
        assert!(u32::convert(&Value::Int32(-1)).is_err());
    }

    #[test]
    fn test_float_rules() {
        assert_eq!(f32::convert(&Value::Int32(3)).unwrap(), 3.0);
        assert_eq!(f64::convert(&Value::Float(0.5)).unwrap(), 0.5);
        assert!(i32::convert(&Value::Float(1.0)).is_err());
        assert!(f32::convert(&Value::Double(1e300)).is_err());
        assert!(f32::convert(&Value::String("1".into())).is_err());
    }

    #[test]
    fn test_mismatch_names_types() {
        let err = Vec3::convert(&Value::from("hello")).unwrap_err();
        match err {
            Error::TypeMismatch { expected, actual } => {
                assert_eq!(expected, "vec3");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_packed_roundtrip() {
        let values = [
            Value::Int16(-3),
            Value::Vec3(Vec3::new(1.0, 2.0, 3.0)),
            Value::Bool(true),
            Value::Transform(Transform::IDENTITY),
        ];
        for v in values {
            let bytes = v.packed_bytes().unwrap();
            assert_eq!(Some(bytes.len()), v.value_type().size());
            let back = Value::read_packed(v.value_type(), &mut BinaryReader::new(&bytes)).unwrap();
            assert_eq!(back, v);
        }
        assert!(Value::from("x").packed_bytes().is_none());
    }

    #[test]
    fn test_struct_layout() {
        let layout = StructLayout::new()
            .with(Type::Vector3, "pos")
            .unwrap()
            .with(Type::Vector2, "uv")
            .unwrap();
        assert_eq!(layout.size(), 20);
        assert_eq!(layout.member("uv"), Some((12, Type::Vector2)));
        assert!(layout.clone().with(Type::String, "name").is_err());
        assert!(layout.clone().with(Type::Float, "pos").is_err());

        let mut bytes = bytemuck::bytes_of(&Vec3::new(1.0, 2.0, 3.0)).to_vec();
        bytes.extend_from_slice(bytemuck::bytes_of(&Vec2::new(0.5, 0.25)));
        let s = StructValue::new(layout, bytes).unwrap();
        assert_eq!(s.field::<Vec2>("uv").unwrap(), Vec2::new(0.5, 0.25));
        assert!(s.field::<Vec3>("uv").is_err());
        assert!(s.field::<Vec3>("n").unwrap_err().is_not_found());
        assert_eq!(Value::Struct(s).to_json()["pos"], json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_json() {
        assert_eq!(Value::Int32(42).to_json(), json!(42));
        assert_eq!(Value::Float(f32::NAN).to_json(), Json::Null);
        assert_eq!(Value::Srgba(Srgba([1, 2, 3, 4])).to_json(), json!([1, 2, 3, 4]));
    }
}
