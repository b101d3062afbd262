//! Engine asset schemas layered on UDM documents.
//!
//! Each decoder turns a property tree into plain data the import layer hands
//! to a scene host:
//! - [`skeleton`] - `PSKEL` bone hierarchies
//! - [`mesh`] - `PMESH` triangle meshes with weights and shape keys
//! - [`model`] - `.pmdl` models (skeleton, mesh groups, body groups, flexes)
//! - [`material`] - `.pmat` materials
//! - [`map`] - `.pmap` entity lists
//! - [`animation`] - `PANIM` channel animations
//! - [`project`] - `.pfmp` film-maker sessions
//!
//! Assets embedded in another document are wrapped in an envelope
//! (`assetType`, `assetVersion`, `assetData`); see [`expect_asset`].

use half::f16;
use serde::{Deserialize, Serialize};

use crate::udm::format::{KEY_ASSET_DATA, KEY_ASSET_TYPE};
use crate::udm::Property;
use crate::util::{Error, Result, ScaledTransform, Transform, Type, Vec3};

pub mod skeleton;
pub mod mesh;
pub mod model;
pub mod material;
pub mod map;
pub mod animation;
pub mod project;

pub use skeleton::{BindPoseMode, Bone, Skeleton, SKELETON_ASSET_TYPE};
pub use mesh::{MeshData, ShapeKey, WeightGroup, MESH_ASSET_TYPE};
pub use model::{BodyGroup, CollectionLayout, MeshGroup, Model, ModelMesh, MODEL_ASSET_TYPE};
pub use material::{AlphaMode, MaterialData, ShaderKind, MATERIAL_ASSET_TYPE};
pub use map::{MapData, MapEntity, MAP_ASSET_TYPE};
pub use animation::{AnimationData, BoneChannel, BoneTrack, ANIMATION_ASSET_TYPE};
pub use project::{
    ActorData, ActorKind, CameraData, LightData, ProjectAnimation, ProjectData,
    PROJECT_ASSET_TYPE,
};

/// Longest name the host accepts for bones and objects.
pub const MAX_NAME_LEN: usize = 63;

/// Settings shared by every decoder.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Uniform scale applied to positions and translations.
    pub scale: f32,
    pub bind_pose: BindPoseMode,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            bind_pose: BindPoseMode::Direct,
        }
    }
}

impl DecodeOptions {
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_bind_pose(mut self, bind_pose: BindPoseMode) -> Self {
        self.bind_pose = bind_pose;
        self
    }
}

/// Body of an embedded asset after checking its `assetType`.
pub fn expect_asset<'a>(asset: &'a Property, asset_type: &str) -> Result<&'a Property> {
    let actual = asset.get(KEY_ASSET_TYPE)?.as_str()?;
    if actual != asset_type {
        return Err(Error::unknown_schema(format!(
            "expected {asset_type} asset, found {actual}"
        )));
    }
    asset.get(KEY_ASSET_DATA)
}

/// Body of a document root. Roots may carry the envelope or be bare.
pub fn asset_body<'a>(root: &'a Property, asset_type: &str) -> Result<&'a Property> {
    if root.contains(KEY_ASSET_TYPE) {
        expect_asset(root, asset_type)
    } else {
        Ok(root)
    }
}

/// Keep the last [`MAX_NAME_LEN`] characters.
pub fn host_name(name: &str) -> String {
    let count = name.chars().count();
    name.chars().skip(count.saturating_sub(MAX_NAME_LEN)).collect()
}

/// Index buffer stored as `u16`, `u32` or any integer array.
pub fn read_indices(prop: &Property) -> Result<Vec<u32>> {
    let array = prop.as_array()?;
    match array.value_type() {
        Type::UInt32 => array.to_vec::<u32>(),
        Type::UInt16 => Ok(array.to_vec::<u16>()?.into_iter().map(u32::from).collect()),
        _ => array.convert::<u32>(),
    }
}

/// Float buffer; integer and half arrays widen.
pub fn read_floats(prop: &Property) -> Result<Vec<f32>> {
    let array = prop.as_array()?;
    match array.value_type() {
        Type::Float => array.to_vec::<f32>(),
        _ => array.convert::<f32>(),
    }
}

/// Half-float buffer. Arrays of another 2-byte type are reinterpreted.
pub fn read_halfs(prop: &Property) -> Result<Vec<f16>> {
    let buffer = prop.array_value()?;
    match buffer.value_type() {
        Type::Half => buffer.to_vec::<f16>(),
        Type::UInt16 | Type::Int16 | Type::UInt8 | Type::Int8 => {
            let bytes = buffer.as_bytes();
            if bytes.len() % 2 != 0 {
                return Err(Error::invalid("odd byte count in half-float buffer"));
            }
            Ok(bytemuck::pod_collect_to_vec(bytes))
        }
        other => Err(Error::mismatch(Type::Half, other)),
    }
}

/// `vec3` array or flat float array.
pub fn read_vec3s(prop: &Property) -> Result<Vec<Vec3>> {
    let array = prop.as_array()?;
    if array.value_type() == Type::Vector3 {
        return array.to_vec::<Vec3>();
    }
    let floats = read_floats(prop)?;
    if floats.len() % 3 != 0 {
        return Err(Error::invalid(format!("{} floats do not form vec3s", floats.len())));
    }
    Ok(floats.chunks_exact(3).map(Vec3::from_slice).collect())
}

/// Pose stored as a (scaled) transform value or as 7/10 floats
/// (`x y z qx qy qz qw [sx sy sz]`).
pub fn read_pose(prop: &Property) -> Result<ScaledTransform> {
    match prop {
        Property::Array(_) => {
            let f = read_floats(prop)?;
            match f.len() {
                7 => Ok(Transform {
                    translation: [f[0], f[1], f[2]],
                    rotation: [f[3], f[4], f[5], f[6]],
                }
                .into()),
                10 => Ok(ScaledTransform {
                    translation: [f[0], f[1], f[2]],
                    rotation: [f[3], f[4], f[5], f[6]],
                    scale: [f[7], f[8], f[9]],
                }),
                n => Err(Error::invalid(format!("pose with {n} components"))),
            }
        }
        _ => prop.as_scaled_transform(),
    }
}
