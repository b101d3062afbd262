//! Material (`.pmat`) decoding.
//!
//! The root names a single shader element (`pbr`, `pbr_blend` or `unlit`)
//! holding `textures` (slot -> logical texture name) and `properties`.
//! Texture names stay logical here; the import layer resolves them under
//! `materials/` with `.dds` before `.vtf`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::asset_body;
use crate::udm::{Property, Value};
use crate::util::{Error, Result, Type, Vec4};

/// Material asset type identifier.
pub const MATERIAL_ASSET_TYPE: &str = "PMAT";

/// Texture extensions in the order they are tried.
pub const TEXTURE_EXTENSIONS: [&str; 2] = ["dds", "vtf"];

pub const DEFAULT_ALPHA_CUTOFF: f32 = 0.5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderKind {
    #[default]
    Pbr,
    /// Two albedo layers mixed by vertex alpha.
    PbrBlend,
    Unlit,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 3] = [ShaderKind::Pbr, ShaderKind::PbrBlend, ShaderKind::Unlit];

    /// Element name in the document.
    pub fn key(self) -> &'static str {
        match self {
            Self::Pbr => "pbr",
            Self::PbrBlend => "pbr_blend",
            Self::Unlit => "unlit",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl AlphaMode {
    fn from_property(prop: &Property) -> Result<Self> {
        if let Ok(name) = prop.as_str() {
            return match name {
                "Opaque" => Ok(Self::Opaque),
                "Mask" => Ok(Self::Mask),
                "Blend" => Ok(Self::Blend),
                other => Err(Error::invalid(format!("unknown alpha mode '{other}'"))),
            };
        }
        match prop.as_int()? {
            0 => Ok(Self::Opaque),
            1 => Ok(Self::Mask),
            2 => Ok(Self::Blend),
            other => Err(Error::invalid(format!("unknown alpha mode {other}"))),
        }
    }

    /// True when albedo alpha drives transparency.
    pub fn uses_alpha(self) -> bool {
        self != Self::Opaque
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub shader: ShaderKind,
    /// Slot (`albedo_map`, `normal_map`, `rma_map`, ...) to logical texture.
    pub textures: IndexMap<String, String>,
    /// RGBA multiplier; three-component factors get alpha 1.
    pub color_factor: Option<Vec4>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub roughness_factor: Option<f32>,
    pub metalness_factor: Option<f32>,
    pub emission_factor: f32,
}

impl MaterialData {
    pub fn texture(&self, slot: &str) -> Option<&str> {
        self.textures.get(slot).map(String::as_str)
    }
}

/// Decode a material document root into a material named `name`.
pub fn decode_material(name: &str, root: &Property) -> Result<MaterialData> {
    let body = asset_body(root, MATERIAL_ASSET_TYPE)?;
    let Some((shader, node)) = ShaderKind::ALL
        .into_iter()
        .find_map(|kind| body.try_get(kind.key()).map(|node| (kind, node)))
    else {
        let first = body.children()?.next().map(|(k, _)| k.to_string());
        return Err(Error::unknown_schema(format!(
            "unsupported shader {}",
            first.as_deref().unwrap_or("<empty>")
        )));
    };

    let mut textures = IndexMap::new();
    if let Some(slots) = node.try_get("textures") {
        for (slot, texture) in slots.children()? {
            textures.insert(slot.to_string(), texture.as_str()?.to_string());
        }
    }

    let mut material = MaterialData {
        name: name.to_string(),
        shader,
        textures,
        color_factor: None,
        alpha_mode: AlphaMode::Opaque,
        alpha_cutoff: DEFAULT_ALPHA_CUTOFF,
        roughness_factor: None,
        metalness_factor: None,
        emission_factor: 1.0,
    };

    let Some(props) = node.try_get("properties") else {
        return Ok(material);
    };
    if let Some(color) = props.try_get("color_factor") {
        material.color_factor = Some(read_color(color)?);
    }
    if let Some(mode) = props.try_get("alpha_mode") {
        material.alpha_mode = AlphaMode::from_property(mode)?;
    }
    material.alpha_cutoff = props.get_or("alpha_cutoff", DEFAULT_ALPHA_CUTOFF)?;
    material.roughness_factor = match props.try_get("roughness_factor") {
        Some(r) => Some(r.as_f32()?),
        None => props
            .try_get("specular_factor")
            .map(|s| s.as_f32().map(|s| 1.0 - s))
            .transpose()?,
    };
    if let Some(metalness) = props.try_get("metalness_factor") {
        material.metalness_factor = Some(metalness.as_f32()?);
    }
    material.emission_factor = props.get_or("emission_factor", 1.0)?;
    Ok(material)
}

fn read_color(prop: &Property) -> Result<Vec4> {
    match prop.as_value()? {
        Value::Vec3(c) => Ok(c.extend(1.0)),
        Value::Vec4(c) => Ok(*c),
        Value::Srgba(c) => Ok(Vec4::from_array(c.0.map(|v| f32::from(v) / 255.0))),
        other => Err(Error::mismatch(Type::Vector3, other.value_type())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::udm::Element;
    use crate::util::Vec3;

    pub(crate) fn sample_material(shader: &str) -> Element {
        let textures = Element::new()
            .with("albedo_map", "characters/hero/skin_albedo")
            .unwrap()
            .with("normal_map", "characters/hero/skin_normal")
            .unwrap();
        let properties = Element::new()
            .with("color_factor", Vec3::new(1.0, 0.5, 0.25))
            .unwrap()
            .with("alpha_mode", "Mask")
            .unwrap()
            .with("specular_factor", 0.25f32)
            .unwrap();
        Element::new()
            .with(
                shader,
                Element::new()
                    .with("textures", textures)
                    .unwrap()
                    .with("properties", properties)
                    .unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_decode_pbr() {
        let material = decode_material("skin", &Property::Element(sample_material("pbr"))).unwrap();
        assert_eq!(material.shader, ShaderKind::Pbr);
        assert_eq!(material.texture("albedo_map"), Some("characters/hero/skin_albedo"));
        assert_eq!(material.textures.keys().collect::<Vec<_>>(), ["albedo_map", "normal_map"]);
        assert_eq!(material.color_factor, Some(Vec4::new(1.0, 0.5, 0.25, 1.0)));
        assert_eq!(material.alpha_mode, AlphaMode::Mask);
        assert_eq!(material.alpha_cutoff, DEFAULT_ALPHA_CUTOFF);
        assert_eq!(material.roughness_factor, Some(0.75));
        assert_eq!(material.metalness_factor, None);
        assert_eq!(material.emission_factor, 1.0);
    }

    #[test]
    fn test_shader_kinds() {
        let blend = decode_material("m", &Property::Element(sample_material("pbr_blend"))).unwrap();
        assert_eq!(blend.shader, ShaderKind::PbrBlend);
        let unlit = decode_material("m", &Property::Element(sample_material("unlit"))).unwrap();
        assert_eq!(unlit.shader, ShaderKind::Unlit);
    }

    #[test]
    fn test_unknown_shader() {
        let err = decode_material("m", &Property::Element(sample_material("toon"))).unwrap_err();
        assert!(matches!(err, Error::UnknownSchema(ref msg) if msg.contains("toon")));
    }

    #[test]
    fn test_integer_alpha_mode() {
        let props = Element::new().with("alpha_mode", 2i32).unwrap().with("alpha_cutoff", 0.1f32).unwrap();
        let root = Element::new()
            .with("unlit", Element::new().with("properties", props).unwrap())
            .unwrap();
        let material = decode_material("m", &Property::Element(root)).unwrap();
        assert_eq!(material.alpha_mode, AlphaMode::Blend);
        assert!(material.alpha_mode.uses_alpha());
        assert_eq!(material.alpha_cutoff, 0.1);
        assert!(material.textures.is_empty());
    }
}
