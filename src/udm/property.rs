//! The property tree: scalars, arrays and elements.

use std::borrow::Cow;

use half::f16;
use indexmap::IndexMap;
use serde_json::Value as Json;

use super::array::{Array, ArrayBuffer};
use super::format::PATH_SEPARATOR;
use super::value::{FromValue, StructValue, Value};
use crate::util::{
    Error, EulerAngles, HdrColor, IVec2, IVec3, IVec4, Mat3x4, Mat4, Quat, Result, ScaledTransform,
    Srgba, Transform, Type, UdmPod, Vec2, Vec3, Vec4,
};

/// Ordered mapping of unique child names to properties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    children: IndexMap<String, Property>,
}

impl Element {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            children: IndexMap::with_capacity(n),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Add a child; names must be unique.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Property>) -> Result<&mut Property> {
        let name = name.into();
        if name.is_empty() || name.contains(PATH_SEPARATOR) {
            return Err(Error::invalid(format!("invalid child name '{name}'")));
        }
        match self.children.entry(name) {
            indexmap::map::Entry::Occupied(e) => {
                Err(Error::invalid(format!("duplicate child '{}'", e.key())))
            }
            indexmap::map::Entry::Vacant(e) => Ok(e.insert(value.into())),
        }
    }

    /// Builder form of [`Element::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Property>) -> Result<Self> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// Add or replace a child, keeping its position when it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.children.insert(name.into(), value.into());
    }

    /// Remove a child, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.children.shift_remove(name)
    }

    /// Direct child by name.
    pub fn child(&self, name: &str) -> Option<&Property> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.children.get_mut(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// Children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> + '_ {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.children.keys().map(String::as_str)
    }
}

/// A node of the tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Scalar(Value),
    Array(Array),
    Element(Element),
}

impl Default for Property {
    fn default() -> Self {
        Self::Element(Element::new())
    }
}

impl Property {
    /// Tag describing this node.
    pub fn kind(&self) -> Type {
        match self {
            Self::Scalar(v) => v.value_type(),
            Self::Array(a) if a.is_compressed() => Type::ArrayLz4,
            Self::Array(_) => Type::Array,
            Self::Element(_) => Type::Element,
        }
    }

    /// Node at a name or `/`-separated path. Numeric segments index element
    /// arrays.
    pub fn get(&self, path: &str) -> Result<&Property> {
        let mut node = self;
        let mut walked = 0;
        for segment in path.split(PATH_SEPARATOR) {
            walked += segment.len() + 1;
            if segment.is_empty() {
                continue;
            }
            node = node.step(segment).ok_or_else(|| {
                Error::not_found(path[..walked.min(path.len())].trim_end_matches(PATH_SEPARATOR))
            })?;
        }
        Ok(node)
    }

    fn step(&self, segment: &str) -> Option<&Property> {
        match self {
            Self::Element(e) => e.child(segment),
            Self::Array(a) => segment.parse::<usize>().ok().and_then(|i| a.element_at(i)),
            Self::Scalar(_) => None,
        }
    }

    /// Mutable node at a path of element names.
    pub fn get_mut(&mut self, path: &str) -> Result<&mut Property> {
        let mut node = self;
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            node = match node {
                Self::Element(e) => e.child_mut(segment),
                Self::Array(a) => match segment.parse::<usize>() {
                    Ok(i) => a.elements_mut().ok().and_then(|e| e.get_mut(i)),
                    Err(_) => None,
                },
                Self::Scalar(_) => None,
            }
            .ok_or_else(|| Error::not_found(path))?;
        }
        Ok(node)
    }

    /// Like [`Property::get`] but `None` when absent.
    pub fn try_get(&self, path: &str) -> Option<&Property> {
        self.get(path).ok()
    }

    /// True if `path` resolves. Never fails.
    pub fn contains(&self, path: &str) -> bool {
        self.try_get(path).is_some()
    }

    /// Typed value at `path`, or `default` when the path is absent. A present
    /// node of the wrong type still fails.
    pub fn get_or<T: FromValue>(&self, path: &str, default: T) -> Result<T> {
        match self.try_get(path) {
            Some(p) => p.as_type(),
            None => Ok(default),
        }
    }

    /// Children of an element in insertion order.
    pub fn children(&self) -> Result<impl Iterator<Item = (&str, &Property)> + '_> {
        Ok(self.as_element()?.iter())
    }

    /// Entries of an element (by name) or of an element array (by index).
    pub fn items(&self) -> Result<Vec<(Cow<'_, str>, &Property)>> {
        match self {
            Self::Element(e) => Ok(e.iter().map(|(k, v)| (Cow::Borrowed(k), v)).collect()),
            Self::Array(a) => Ok(a
                .elements()?
                .iter()
                .enumerate()
                .map(|(i, v)| (Cow::Owned(i.to_string()), v))
                .collect()),
            Self::Scalar(v) => Err(Error::mismatch(Type::Element, v.value_type())),
        }
    }

    /// Number of children or items; 0 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 0,
            Self::Array(a) => a.len(),
            Self::Element(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_element(&self) -> Result<&Element> {
        match self {
            Self::Element(e) => Ok(e),
            other => Err(Error::mismatch(Type::Element, other.kind())),
        }
    }

    pub fn as_element_mut(&mut self) -> Result<&mut Element> {
        match self {
            Self::Element(e) => Ok(e),
            other => Err(Error::mismatch(Type::Element, other.kind())),
        }
    }

    pub fn as_array(&self) -> Result<&Array> {
        match self {
            Self::Array(a) => Ok(a),
            other => Err(Error::mismatch(Type::Array, other.kind())),
        }
    }

    pub fn as_value(&self) -> Result<&Value> {
        match self {
            Self::Scalar(v) => Ok(v),
            other => Err(Error::mismatch("scalar", other.kind())),
        }
    }

    /// Typed accessor for scalars.
    pub fn as_type<T: FromValue>(&self) -> Result<T> {
        match self {
            Self::Scalar(v) => T::convert(v),
            other => Err(Error::mismatch(T::EXPECTED, other.kind())),
        }
    }

    /// Materialized payload of a numeric or struct array.
    pub fn array_value(&self) -> Result<&ArrayBuffer> {
        self.as_array()?.array_value()
    }

    /// Typed copy of a numeric array.
    pub fn to_vec<T: UdmPod>(&self) -> Result<Vec<T>> {
        self.as_array()?.to_vec()
    }

    pub fn as_int(&self) -> Result<i64> {
        self.as_type()
    }

    pub fn as_i32(&self) -> Result<i32> {
        self.as_type()
    }

    pub fn as_u32(&self) -> Result<u32> {
        self.as_type()
    }

    pub fn as_usize(&self) -> Result<usize> {
        self.as_type()
    }

    pub fn as_f32(&self) -> Result<f32> {
        self.as_type()
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.as_type()
    }

    pub fn as_bool(&self) -> Result<bool> {
        self.as_type()
    }

    /// Borrowed string of a string or reference node.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::Scalar(Value::String(s) | Value::Utf8(s) | Value::Reference(s)) => Ok(s),
            other => Err(Error::mismatch(Type::String, other.kind())),
        }
    }

    pub fn as_vec2(&self) -> Result<Vec2> {
        self.as_type()
    }

    pub fn as_vec3(&self) -> Result<Vec3> {
        self.as_type()
    }

    pub fn as_vec4(&self) -> Result<Vec4> {
        self.as_type()
    }

    pub fn as_quat(&self) -> Result<Quat> {
        self.as_type()
    }

    pub fn as_mat4(&self) -> Result<Mat4> {
        self.as_type()
    }

    pub fn as_transform(&self) -> Result<Transform> {
        self.as_type()
    }

    /// Scaled transform; plain transforms get unit scale.
    pub fn as_scaled_transform(&self) -> Result<ScaledTransform> {
        self.as_type()
    }

    pub fn as_srgba(&self) -> Result<Srgba> {
        self.as_type()
    }

    /// Blob contents, inflated when stored compressed.
    pub fn as_blob(&self) -> Result<Vec<u8>> {
        self.as_value()?.blob_bytes()
    }

    /// Recursive JSON form of the subtree.
    pub fn to_json(&self) -> Result<Json> {
        match self {
            Self::Scalar(v) => Ok(v.to_json()),
            Self::Array(a) => a.to_json(),
            Self::Element(e) => Ok(Json::Object(
                e.iter()
                    .map(|(k, v)| Ok((k.to_string(), v.to_json()?)))
                    .collect::<Result<_>>()?,
            )),
        }
    }
}

impl From<Value> for Property {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

impl From<Array> for Property {
    fn from(a: Array) -> Self {
        Self::Array(a)
    }
}

impl From<Element> for Property {
    fn from(e: Element) -> Self {
        Self::Element(e)
    }
}

macro_rules! impl_scalar_property {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Property {
            fn from(v: $ty) -> Self {
                Self::Scalar(Value::from(v))
            }
        })*
    };
}

impl_scalar_property!(
    i8, u8, i16, u16, i32, u32, i64, u64, f16, f32, f64, bool, String, &str, Vec2, Vec3, Vec4,
    IVec2, IVec3, IVec4, Quat, EulerAngles, Srgba, HdrColor, Transform, ScaledTransform, Mat4,
    Mat3x4, StructValue,
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Property {
        let mut bone = Element::new();
        bone.insert("index", 0i32).unwrap();
        let mut data = Element::new();
        data.insert("name", "hip").unwrap();
        data.insert("big", 1i64 << 40).unwrap();
        data.insert("bones", Array::from_elements([bone])).unwrap();
        data.insert("weights", Array::from_values(&[0.5f32, 0.25])).unwrap();
        let mut root = Element::new();
        root.insert("assetType", "PSKEL").unwrap();
        root.insert("assetData", data).unwrap();
        Property::Element(root)
    }

    #[test]
    fn test_path_resolution() {
        let root = sample();
        assert_eq!(root.get("assetData/name").unwrap().as_str().unwrap(), "hip");
        assert_eq!(root.get("/assetData//name/").unwrap().as_str().unwrap(), "hip");
        assert_eq!(root.get("assetData/bones/0/index").unwrap().as_int().unwrap(), 0);
        assert_eq!(root.get("").unwrap().kind(), Type::Element);

        let err = root.get("assetData/missing/deeper").unwrap_err();
        match err {
            Error::NotFound(at) => assert_eq!(at, "assetData/missing"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(root.get("assetData/bones/1").unwrap_err().is_not_found());
        assert!(root.get("assetData/name/x").is_err());
        assert!(root.contains("assetData/weights"));
        assert!(!root.contains("assetData/nope"));
    }

    #[test]
    fn test_typed_accessors() {
        let root = sample();
        let big = root.get("assetData/big").unwrap();
        assert_eq!(big.as_int().unwrap(), 1 << 40);
        assert!(matches!(big.as_i32(), Err(Error::TypeMismatch { .. })));
        assert!(root.get("assetData/name").unwrap().as_vec3().is_err());
        assert!(root.get("assetData").unwrap().as_f32().is_err());
        assert!(root.get("assetData/name").unwrap().children().is_err());
    }

    #[test]
    fn test_get_or() {
        let root = sample();
        assert_eq!(root.get_or("assetData/scale", 1.0f32).unwrap(), 1.0);
        assert_eq!(root.get_or("assetData/bones/0/index", 7i32).unwrap(), 0);
        assert!(root.get_or("assetData/name", 0i32).is_err());
    }

    #[test]
    fn test_children_order_and_restart() {
        let root = sample();
        let names: Vec<_> = root.get("assetData").unwrap().children().unwrap().map(|(k, _)| k).collect();
        assert_eq!(names, ["name", "big", "bones", "weights"]);
        let again = root.get("assetData").unwrap().children().unwrap().count();
        assert_eq!(again, 4);
    }

    #[test]
    fn test_items_over_element_arrays() {
        let root = sample();
        let items = root.get("assetData/bones").unwrap().items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, "0");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut e = Element::new();
        e.insert("a", 1i32).unwrap();
        assert!(e.insert("a", 2i32).is_err());
        assert!(e.insert("a/b", 2i32).is_err());
        e.set("a", 3i32);
        assert_eq!(e.len(), 1);
        assert_eq!(Property::Element(e).get("a").unwrap().as_int().unwrap(), 3);
    }

    #[test]
    fn test_to_json() {
        let json = sample().to_json().unwrap();
        assert_eq!(json["assetType"], json!("PSKEL"));
        assert_eq!(json["assetData"]["weights"], json!([0.5, 0.25]));
        assert_eq!(json["assetData"]["bones"][0]["index"], json!(0));
    }

    #[test]
    fn test_get_mut() {
        let mut root = sample();
        root.get_mut("assetData").unwrap().as_element_mut().unwrap().set("name", "spine");
        assert_eq!(root.get("assetData/name").unwrap().as_str().unwrap(), "spine");
        *root.get_mut("assetData/bones/0/index").unwrap() = Property::from(5i32);
        assert_eq!(root.get("assetData/bones/0/index").unwrap().as_int().unwrap(), 5);
    }
}
