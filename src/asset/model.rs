//! Model (`.pmdl`) decoding.
//!
//! A model document holds:
//! - `skeleton` - embedded `PSKEL` (absent on static props)
//! - `meshGroups` - named groups, each with an `index` and `meshes`, every
//!   mesh holding a `subMeshes` array of embedded `PMESH` assets
//! - `bodyGroups` - named selections of mesh group indices (`meshGroups`)
//! - `baseMeshGroups` - mesh group indices always shown
//! - `materials` / `materialPaths` - material names and search folders
//! - `morphTargetAnimations` - embedded `PMORPHANI` flexes

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use tracing::{debug, warn};

use super::mesh::{decode_mesh, MeshData, ShapeKey};
use super::skeleton::{decode_skeleton, Skeleton};
use super::{asset_body, expect_asset, read_halfs, read_indices, DecodeOptions};
use crate::udm::Property;
use crate::util::{convert_vec3, Error, Result, Vec3};

/// Model asset type identifier.
pub const MODEL_ASSET_TYPE: &str = "PMDL";

/// Morph target animation asset type identifier.
pub const MORPH_ASSET_TYPE: &str = "PMORPHANI";

/// Name of the shape key holding undeformed positions.
pub const BASE_SHAPE_KEY: &str = "base";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshGroup {
    pub name: String,
    pub index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyGroup {
    pub name: String,
    pub mesh_groups: Vec<u32>,
}

/// A decoded sub-mesh and where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelMesh {
    pub mesh_group: u32,
    pub mesh: usize,
    pub sub_mesh: usize,
    pub data: MeshData,
}

/// A collection to create and the meshes (positions in [`Model::meshes`])
/// linked into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionLayout {
    pub name: String,
    pub meshes: Vec<usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub name: String,
    pub skeleton: Option<Skeleton>,
    pub mesh_groups: Vec<MeshGroup>,
    pub body_groups: Vec<BodyGroup>,
    pub base_mesh_groups: Vec<u32>,
    pub materials: Vec<String>,
    pub material_paths: Vec<String>,
    pub meshes: Vec<ModelMesh>,
}

impl Model {
    /// True for models without bones.
    pub fn is_static_prop(&self) -> bool {
        self.skeleton.as_ref().map_or(true, Skeleton::is_empty)
    }

    /// Positions in [`Model::meshes`] of the meshes of mesh group `index`.
    pub fn meshes_in_group(&self, index: u32) -> impl Iterator<Item = usize> + '_ {
        self.meshes
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.mesh_group == index)
            .map(|(i, _)| i)
    }

    /// Logical `.pmat` paths to try for `material`, one per material folder.
    pub fn material_candidates(&self, material: &str) -> Vec<PathBuf> {
        self.material_paths
            .iter()
            .map(|folder| {
                let mut path = PathBuf::from("materials");
                path.extend(folder.split(['/', '\\']).filter(|s| !s.is_empty()));
                path.push(material);
                path
            })
            .collect()
    }

    /// Collections for the host. The first entry is the model's master
    /// collection, the rest are its children. With `single_collection`
    /// everything lands in the master.
    ///
    /// Meshes of body groups go into one collection per body group, base mesh
    /// groups into the master, and anything left unplaced into the master.
    pub fn collection_layout(&self, single_collection: bool) -> Vec<CollectionLayout> {
        let mut master = CollectionLayout {
            name: format!("{}_model", self.name),
            meshes: Vec::new(),
        };
        let mut children = Vec::new();
        let mut placed = BTreeSet::new();

        for body_group in &self.body_groups {
            let meshes: Vec<usize> = body_group
                .mesh_groups
                .iter()
                .flat_map(|&g| self.meshes_in_group(g))
                .collect();
            placed.extend(meshes.iter().copied());
            if single_collection {
                master.meshes.extend(meshes);
            } else {
                children.push(CollectionLayout {
                    name: body_group.name.clone(),
                    meshes,
                });
            }
        }
        for &g in &self.base_mesh_groups {
            for mesh in self.meshes_in_group(g) {
                placed.insert(mesh);
                master.meshes.push(mesh);
            }
        }
        master
            .meshes
            .extend((0..self.meshes.len()).filter(|m| !placed.contains(m)));

        master.meshes.sort_unstable();
        master.meshes.dedup();
        std::iter::once(master).chain(children).collect()
    }
}

/// Decode a model document root.
pub fn decode_model(name: &str, root: &Property, options: &DecodeOptions) -> Result<Model> {
    let body = asset_body(root, MODEL_ASSET_TYPE)?;
    let mut model = Model {
        name: name.to_string(),
        ..Default::default()
    };

    if let Some(skeleton) = body.try_get("skeleton") {
        model.skeleton = Some(decode_skeleton(skeleton, options.scale, options.bind_pose)?);
    }
    if let Some(materials) = body.try_get("materials") {
        model.materials = materials.as_array()?.strings()?.to_vec();
    }
    if let Some(paths) = body.try_get("materialPaths") {
        model.material_paths = paths.as_array()?.strings()?.to_vec();
    }
    if let Some(base) = body.try_get("baseMeshGroups") {
        model.base_mesh_groups = read_indices(base)?;
    }

    let mut groups: HashMap<u32, &Property> = HashMap::new();
    if let Some(mesh_groups) = body.try_get("meshGroups") {
        for (position, (group_name, group)) in mesh_groups.items()?.into_iter().enumerate() {
            let index = group.get_or("index", position as u32)?;
            model.mesh_groups.push(MeshGroup {
                name: group_name.into_owned(),
                index,
            });
            groups.insert(index, group);
        }
    }
    if let Some(body_groups) = body.try_get("bodyGroups") {
        for (group_name, group) in body_groups.items()? {
            let mesh_groups = match group.try_get("meshGroups") {
                Some(ids) => read_indices(ids)?,
                None => Vec::new(),
            };
            model.body_groups.push(BodyGroup {
                name: group_name.into_owned(),
                mesh_groups,
            });
        }
    }

    // Body groups select which mesh groups load; without any, all do.
    let selected: Vec<u32> = if model.body_groups.is_empty() {
        model.mesh_groups.iter().map(|g| g.index).collect()
    } else {
        let mut seen = BTreeSet::new();
        model
            .body_groups
            .iter()
            .flat_map(|b| b.mesh_groups.iter().copied())
            .filter(|g| seen.insert(*g))
            .collect()
    };

    let flexes = collect_flexes(body)?;
    let bone_names = model
        .skeleton
        .as_ref()
        .map(Skeleton::bone_names)
        .unwrap_or_default();

    for group_index in selected {
        let Some(group) = groups.get(&group_index) else {
            warn!("{name}: body group references missing mesh group {group_index}");
            continue;
        };
        let group_name = model
            .mesh_groups
            .iter()
            .find(|g| g.index == group_index)
            .map(|g| g.name.clone())
            .unwrap_or_default();
        let Some(meshes) = group.try_get("meshes") else {
            continue;
        };
        for (mesh_id, (_, mesh)) in meshes.items()?.into_iter().enumerate() {
            let Some(sub_meshes) = mesh.try_get("subMeshes") else {
                continue;
            };
            for (sub_mesh_id, (_, sub_mesh)) in sub_meshes.items()?.into_iter().enumerate() {
                let prefix = format!("{group_name}_{mesh_id}");
                let mut data = match decode_mesh(&prefix, sub_mesh, &model.materials, &bone_names, options.scale) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("{name}: skipping sub-mesh {prefix}/{sub_mesh_id}: {e}");
                        continue;
                    }
                };
                let matching: Vec<&Flex<'_>> = flexes
                    .iter()
                    .filter(|f| f.mesh_group == group_index && f.mesh == mesh_id && f.sub_mesh == sub_mesh_id)
                    .collect();
                if !matching.is_empty() {
                    apply_flexes(&mut data, &matching, options.scale)?;
                }
                model.meshes.push(ModelMesh {
                    mesh_group: group_index,
                    mesh: mesh_id,
                    sub_mesh: sub_mesh_id,
                    data,
                });
            }
        }
    }

    debug!(
        meshes = model.meshes.len(),
        materials = model.materials.len(),
        static_prop = model.is_static_prop(),
        "decoded model {name}"
    );
    Ok(model)
}

/// One mesh animation of a morph target.
struct Flex<'a> {
    name: String,
    mesh_group: u32,
    mesh: usize,
    sub_mesh: usize,
    animation: &'a Property,
}

fn collect_flexes(body: &Property) -> Result<Vec<Flex<'_>>> {
    let Some(targets) = body.try_get("morphTargetAnimations") else {
        return Ok(Vec::new());
    };
    let mut flexes = Vec::new();
    for (_, target) in targets.items()? {
        let data = match expect_asset(target, MORPH_ASSET_TYPE) {
            Ok(data) => data,
            Err(e) => {
                warn!("skipping morph target: {e}");
                continue;
            }
        };
        let name = data.get("name")?.as_str()?.replace("flex_", "");
        let Some(animations) = data.try_get("meshAnimations") else {
            continue;
        };
        for (_, animation) in animations.items()? {
            flexes.push(Flex {
                name: name.clone(),
                mesh_group: animation.get("meshGroup")?.as_u32()?,
                mesh: animation.get("mesh")?.as_usize()?,
                sub_mesh: animation.get("subMesh")?.as_usize()?,
                animation,
            });
        }
    }
    Ok(flexes)
}

/// Add a `base` key plus one key per flex frame. Frame keys are suffixed
/// with `[frame]` when a flex has more than one frame.
fn apply_flexes(mesh: &mut MeshData, flexes: &[&Flex<'_>], scale: f32) -> Result<()> {
    let base = mesh.positions.clone();
    mesh.shape_keys.push(ShapeKey {
        name: BASE_SHAPE_KEY.to_string(),
        positions: base.clone(),
    });

    for flex in flexes {
        let Some(frames) = flex.animation.try_get("frames") else {
            continue;
        };
        let frames = frames.items()?;
        let multi_frame = frames.len() > 1;
        for (frame_num, (_, frame)) in frames.into_iter().enumerate() {
            let key_name = if multi_frame {
                format!("{}[{frame_num}]", flex.name)
            } else {
                flex.name.clone()
            };

            let mut deltas = None;
            if let Some(attributes) = frame.try_get("attributes") {
                for (_, attribute) in attributes.items()? {
                    if attribute.get("property")?.as_str()? == "position" {
                        deltas = Some(read_halfs(attribute.get("values")?)?);
                    }
                }
            }
            let Some(deltas) = deltas else {
                warn!("flex {key_name} has no position attribute");
                continue;
            };
            let indices = read_indices(frame.get("vertexIndices")?)?;
            if deltas.len() < indices.len() * 4 {
                return Err(Error::invalid(format!(
                    "flex {key_name}: {} deltas for {} vertices",
                    deltas.len() / 4,
                    indices.len()
                )));
            }

            let mut positions = base.clone();
            for (&vertex, delta) in indices.iter().zip(deltas.chunks_exact(4)) {
                let target = positions.get_mut(vertex as usize).ok_or_else(|| {
                    Error::invalid(format!("flex {key_name}: vertex {vertex} out of range"))
                })?;
                let delta = Vec3::new(delta[0].to_f32(), delta[1].to_f32(), delta[2].to_f32());
                *target += convert_vec3(delta) * scale;
            }

            match mesh.shape_keys.iter_mut().find(|k| k.name == key_name) {
                Some(existing) => existing.positions = positions,
                None => mesh.shape_keys.push(ShapeKey {
                    name: key_name,
                    positions,
                }),
            }
        }
    }
    Ok(())
}
