//! Sub-mesh (`PMESH`) decoding.
//!
//! Vertices are a struct array `{vec3 pos, vec3 n, vec2 uv}`, weights a
//! struct array `{vec4i id, vec4 w}` with four bone slots per vertex.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::{expect_asset, read_indices};
use crate::udm::Property;
use crate::util::{convert_vec3, Error, IVec4, Result, Vec2, Vec3, Vec4};

/// Mesh asset type identifier.
pub const MESH_ASSET_TYPE: &str = "PMESH";

/// The only geometry type the decoder accepts.
pub const GEOMETRY_TRIANGLES: &str = "Triangles";

/// Vertices influenced by one bone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightGroup {
    pub bone: String,
    pub vertices: Vec<u32>,
    pub weights: Vec<f32>,
}

impl WeightGroup {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Full vertex positions of one morph target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapeKey {
    pub name: String,
    pub positions: Vec<Vec3>,
}

/// Triangle mesh in host axes, ready for the host to build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    /// Material slot name.
    pub material: String,
    pub material_index: u32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Per-vertex UVs with V flipped.
    pub uvs: Vec<Vec2>,
    /// Triangle list.
    pub indices: Vec<u32>,
    /// One group per skeleton bone, in bone index order.
    pub weight_groups: Vec<WeightGroup>,
    /// Empty, or `base` followed by each morph target.
    pub shape_keys: Vec<ShapeKey>,
}

impl MeshData {
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    pub fn weight_group(&self, bone: &str) -> Option<&WeightGroup> {
        self.weight_groups.iter().find(|g| g.bone == bone)
    }

    pub fn shape_key(&self, name: &str) -> Option<&ShapeKey> {
        self.shape_keys.iter().find(|k| k.name == name)
    }
}

/// Decode a `PMESH` envelope named `{name_prefix}_{material}`.
///
/// `materials` is the owning model's material list, indexed by
/// `skinMaterialIndex`; `bone_names` maps engine bone indices to names.
pub fn decode_mesh(
    name_prefix: &str,
    asset: &Property,
    materials: &[String],
    bone_names: &BTreeMap<u32, String>,
    scale: f32,
) -> Result<MeshData> {
    let data = expect_asset(asset, MESH_ASSET_TYPE)?;

    let geometry = data.get("geometryType")?.as_str()?;
    if geometry != GEOMETRY_TRIANGLES {
        return Err(Error::unknown_schema(format!("geometry type {geometry}")));
    }

    let material_index = data.get("skinMaterialIndex")?.as_u32()?;
    let material = materials
        .get(material_index as usize)
        .cloned()
        .ok_or_else(|| {
            Error::invalid(format!(
                "skin material {material_index} out of {} materials",
                materials.len()
            ))
        })?;

    let mut mesh = MeshData {
        name: format!("{name_prefix}_{material}"),
        material,
        material_index,
        ..Default::default()
    };

    if let Some(vertices) = data.try_get("vertices") {
        let buffer = vertices.array_value()?;
        mesh.positions = buffer
            .field::<Vec3>("pos")?
            .into_iter()
            .map(|p| convert_vec3(p) * scale)
            .collect();
        mesh.normals = buffer.field::<Vec3>("n")?.into_iter().map(convert_vec3).collect();
        mesh.uvs = buffer
            .field::<Vec2>("uv")?
            .into_iter()
            .map(|uv| Vec2::new(uv.x, 1.0 - uv.y))
            .collect();
    }

    if let Some(indices) = data.try_get("indices") {
        mesh.indices = read_indices(indices)?;
    }
    if mesh.indices.len() % 3 != 0 {
        return Err(Error::invalid(format!(
            "{} indices do not form triangles",
            mesh.indices.len()
        )));
    }
    let count = mesh.positions.len();
    if let Some(bad) = mesh.indices.iter().find(|&&i| i as usize >= count) {
        return Err(Error::invalid(format!("index {bad} out of {count} vertices")));
    }

    mesh.weight_groups = match data.try_get("vertexWeights") {
        Some(weights) => decode_weights(weights, bone_names, count)?,
        None => empty_groups(bone_names),
    };
    Ok(mesh)
}

fn empty_groups(bone_names: &BTreeMap<u32, String>) -> Vec<WeightGroup> {
    bone_names
        .values()
        .map(|bone| WeightGroup {
            bone: bone.clone(),
            ..Default::default()
        })
        .collect()
}

fn decode_weights(
    weights: &Property,
    bone_names: &BTreeMap<u32, String>,
    vertex_count: usize,
) -> Result<Vec<WeightGroup>> {
    let buffer = weights.array_value()?;
    let ids = buffer.field::<IVec4>("id")?;
    let values = buffer.field::<Vec4>("w")?;

    let mut groups = empty_groups(bone_names);
    let slot: HashMap<u32, usize> = bone_names.keys().enumerate().map(|(i, &b)| (b, i)).collect();

    for (vertex, (id, w)) in ids.iter().zip(&values).enumerate().take(vertex_count) {
        for (bone, weight) in id.to_array().into_iter().zip(w.to_array()) {
            if weight < 0.0 || bone < 0 {
                continue;
            }
            match slot.get(&(bone as u32)) {
                Some(&g) => {
                    groups[g].vertices.push(vertex as u32);
                    groups[g].weights.push(weight);
                }
                None => warn!("vertex {vertex} references unknown bone {bone}"),
            }
        }
    }
    Ok(groups)
}
