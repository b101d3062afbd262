//! A [`SceneHost`] that records what it is asked to build.
//!
//! Used by the `udm import` command to report a dry run and by tests to
//! check importer output.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{json, Value as Json};

use super::host::{HostId, NodeDesc, SceneHost};
use crate::asset::{ActorKind, AnimationData, MaterialData, MeshData, ShaderKind, Skeleton};
use crate::util::{Error, Mat4, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedKind {
    Armature {
        bones: Vec<String>,
    },
    Mesh {
        vertices: usize,
        triangles: usize,
        material: String,
        shape_keys: Vec<String>,
        weight_groups: usize,
        armature: Option<HostId>,
    },
    Node(ActorKind),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedObject {
    pub id: HostId,
    pub name: String,
    pub kind: RecordedKind,
    pub matrix: Mat4,
    pub visible: bool,
    pub metadata: Json,
    pub parent: Option<HostId>,
    pub collections: Vec<HostId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCollection {
    pub id: HostId,
    pub name: String,
    pub parent: Option<HostId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedMaterial {
    pub id: HostId,
    pub name: String,
    pub shader: ShaderKind,
    pub textures: IndexMap<String, PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedAnimation {
    pub target: HostId,
    pub name: String,
    pub tracks: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RecordingHost {
    next_id: u64,
    pub objects: Vec<RecordedObject>,
    pub collections: Vec<RecordedCollection>,
    pub materials: Vec<RecordedMaterial>,
    pub animations: Vec<RecordedAnimation>,
    pub world: Option<(String, PathBuf)>,
}

/// `name`, or `name_N` where N counts existing names containing `name`.
pub fn unique_name<'a>(existing: impl Iterator<Item = &'a str>, name: &str) -> String {
    match existing.filter(|e| e.contains(name)).count() {
        0 => name.to_string(),
        n => format!("{name}_{n}"),
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> HostId {
        self.next_id += 1;
        HostId(self.next_id)
    }

    pub fn object(&self, id: HostId) -> Option<&RecordedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_by_name(&self, name: &str) -> Option<&RecordedObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn collection(&self, id: HostId) -> Option<&RecordedCollection> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn collection_by_name(&self, name: &str) -> Option<&RecordedCollection> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Objects linked into collection `id`.
    pub fn collection_objects(&self, id: HostId) -> impl Iterator<Item = &RecordedObject> + '_ {
        self.objects.iter().filter(move |o| o.collections.contains(&id))
    }

    pub fn children_of(&self, id: HostId) -> impl Iterator<Item = &RecordedObject> + '_ {
        self.objects.iter().filter(move |o| o.parent == Some(id))
    }

    pub fn meshes(&self) -> impl Iterator<Item = &RecordedObject> + '_ {
        self.objects
            .iter()
            .filter(|o| matches!(o.kind, RecordedKind::Mesh { .. }))
    }

    fn object_mut(&mut self, id: HostId) -> Result<&mut RecordedObject> {
        self.objects
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| Error::not_found(format!("host object {id}")))
    }

    fn push_object(&mut self, name: &str, kind: RecordedKind, matrix: Mat4) -> HostId {
        let id = self.next();
        self.objects.push(RecordedObject {
            id,
            name: name.to_string(),
            kind,
            matrix,
            visible: true,
            metadata: Json::Null,
            parent: None,
            collections: Vec::new(),
        });
        id
    }

    /// Summary of everything recorded.
    pub fn summary(&self) -> Json {
        let collections: Vec<Json> = self
            .collections
            .iter()
            .map(|c| {
                let objects: Vec<&str> = self.collection_objects(c.id).map(|o| o.name.as_str()).collect();
                json!({
                    "name": c.name,
                    "parent": c.parent.and_then(|p| self.collection(p)).map(|p| p.name.clone()),
                    "objects": objects,
                })
            })
            .collect();
        let objects: Vec<Json> = self
            .objects
            .iter()
            .map(|o| {
                let kind = match &o.kind {
                    RecordedKind::Armature { bones } => json!({ "armature": bones.len() }),
                    RecordedKind::Mesh {
                        vertices,
                        triangles,
                        material,
                        shape_keys,
                        ..
                    } => json!({
                        "mesh": {
                            "vertices": vertices,
                            "triangles": triangles,
                            "material": material,
                            "shapeKeys": shape_keys,
                        }
                    }),
                    RecordedKind::Node(ActorKind::Empty) => json!("empty"),
                    RecordedKind::Node(ActorKind::Camera(_)) => json!("camera"),
                    RecordedKind::Node(ActorKind::Light(_)) => json!("light"),
                };
                json!({
                    "name": o.name,
                    "kind": kind,
                    "parent": o.parent.and_then(|p| self.object(p)).map(|p| p.name.clone()),
                    "visible": o.visible,
                })
            })
            .collect();
        let materials: Vec<Json> = self
            .materials
            .iter()
            .map(|m| {
                let textures: serde_json::Map<String, Json> = m
                    .textures
                    .iter()
                    .map(|(slot, path)| (slot.clone(), Json::from(path.display().to_string())))
                    .collect();
                json!({ "name": m.name, "shader": format!("{:?}", m.shader), "textures": textures })
            })
            .collect();
        let animations: Vec<Json> = self
            .animations
            .iter()
            .map(|a| json!({ "name": a.name, "tracks": a.tracks }))
            .collect();
        json!({
            "collections": collections,
            "objects": objects,
            "materials": materials,
            "animations": animations,
            "world": self.world.as_ref().map(|(name, path)| json!({ "name": name, "sky": path.display().to_string() })),
        })
    }
}

impl SceneHost for RecordingHost {
    fn create_collection(&mut self, name: &str, parent: Option<HostId>) -> Result<HostId> {
        let name = unique_name(self.collections.iter().map(|c| c.name.as_str()), name);
        let id = self.next();
        self.collections.push(RecordedCollection { id, name, parent });
        Ok(id)
    }

    fn create_armature(&mut self, name: &str, skeleton: &Skeleton) -> Result<HostId> {
        let bones = skeleton.bones.iter().map(|b| b.name.clone()).collect();
        Ok(self.push_object(name, RecordedKind::Armature { bones }, Mat4::IDENTITY))
    }

    fn create_mesh(&mut self, mesh: &MeshData, armature: Option<HostId>) -> Result<HostId> {
        let kind = RecordedKind::Mesh {
            vertices: mesh.num_vertices(),
            triangles: mesh.num_triangles(),
            material: mesh.material.clone(),
            shape_keys: mesh.shape_keys.iter().map(|k| k.name.clone()).collect(),
            weight_groups: mesh.weight_groups.len(),
            armature,
        };
        Ok(self.push_object(&mesh.name, kind, Mat4::IDENTITY))
    }

    fn find_material(&self, name: &str) -> Option<HostId> {
        self.materials.iter().find(|m| m.name == name).map(|m| m.id)
    }

    fn create_material(&mut self, material: &MaterialData, textures: &IndexMap<String, PathBuf>) -> Result<HostId> {
        let id = self.next();
        self.materials.push(RecordedMaterial {
            id,
            name: material.name.clone(),
            shader: material.shader,
            textures: textures.clone(),
        });
        Ok(id)
    }

    fn create_node(&mut self, node: &NodeDesc) -> Result<HostId> {
        let id = self.push_object(&node.name, RecordedKind::Node(node.kind.clone()), node.matrix);
        let object = self.object_mut(id)?;
        object.visible = node.visible;
        object.metadata = node.metadata.clone();
        Ok(id)
    }

    fn set_parent(&mut self, child: HostId, parent: HostId) -> Result<()> {
        if self.object(parent).is_none() {
            return Err(Error::not_found(format!("host object {parent}")));
        }
        self.object_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn link_to_collection(&mut self, object: HostId, collection: HostId) -> Result<()> {
        if self.collection(collection).is_none() {
            return Err(Error::not_found(format!("collection {collection}")));
        }
        let object = self.object_mut(object)?;
        if !object.collections.contains(&collection) {
            object.collections.push(collection);
        }
        Ok(())
    }

    fn add_animation(&mut self, target: HostId, animation: &AnimationData) -> Result<()> {
        self.object_mut(target)?;
        self.animations.push(RecordedAnimation {
            target,
            name: animation.name.clone(),
            tracks: animation.tracks.len(),
        });
        Ok(())
    }

    fn set_world(&mut self, name: &str, sky_texture: &Path) -> Result<()> {
        self.world = Some((name.to_string(), sky_texture.to_path_buf()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_collection_names() {
        let mut host = RecordingHost::new();
        let a = host.create_collection("crate_model", None).unwrap();
        let b = host.create_collection("crate_model", None).unwrap();
        assert_ne!(a, b);
        assert_eq!(host.collection(b).unwrap().name, "crate_model_1");
    }

    #[test]
    fn test_links_and_parents() {
        let mut host = RecordingHost::new();
        let col = host.create_collection("scene", None).unwrap();
        let root = host.create_node(&NodeDesc::empty("root", Mat4::IDENTITY)).unwrap();
        let child = host
            .create_node(&NodeDesc::empty("child", Mat4::IDENTITY).with_visible(false))
            .unwrap();
        host.set_parent(child, root).unwrap();
        host.link_to_collection(child, col).unwrap();
        host.link_to_collection(child, col).unwrap();

        assert_eq!(host.children_of(root).count(), 1);
        assert_eq!(host.object(child).unwrap().collections, vec![col]);
        assert!(!host.object_by_name("child").unwrap().visible);
        assert!(host.link_to_collection(child, HostId(99)).unwrap_err().is_not_found());
        assert_eq!(host.summary()["collections"][0]["objects"][0], "child");
    }
}
