//! The scene host collaborator.
//!
//! Importers never touch an editor API directly; they hand decoded plain data
//! to a [`SceneHost`] and get back opaque [`HostId`]s to wire up hierarchy and
//! collections.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::asset::{ActorKind, AnimationData, MaterialData, MeshData, Skeleton};
use crate::util::{Mat4, Result};

/// Handle to an object, collection or material created by a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A hierarchy node (empty, camera or light).
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDesc {
    pub name: String,
    /// Local matrix relative to the parent set with [`SceneHost::set_parent`].
    pub matrix: Mat4,
    pub kind: ActorKind,
    pub visible: bool,
    /// Free-form data attached to the node (map entity key values).
    pub metadata: Json,
}

impl NodeDesc {
    pub fn empty(name: impl Into<String>, matrix: Mat4) -> Self {
        Self {
            name: name.into(),
            matrix,
            kind: ActorKind::Empty,
            visible: true,
            metadata: Json::Null,
        }
    }

    pub fn with_kind(mut self, kind: ActorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_metadata(mut self, metadata: Json) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Scene-building operations an editor exposes to the importers.
pub trait SceneHost {
    /// Create a collection, under `parent` or the scene's top level.
    /// Hosts make the name unique if needed.
    fn create_collection(&mut self, name: &str, parent: Option<HostId>) -> Result<HostId>;

    /// Create an armature object named `name` from armature-space bone
    /// matrices.
    fn create_armature(&mut self, name: &str, skeleton: &Skeleton) -> Result<HostId>;

    /// Create a mesh object. Material slots are bound by
    /// [`MeshData::material`]; with an armature the mesh is deformed by it.
    fn create_mesh(&mut self, mesh: &MeshData, armature: Option<HostId>) -> Result<HostId>;

    /// A material previously created under `name`.
    fn find_material(&self, name: &str) -> Option<HostId>;

    /// Create a material; `textures` maps slots to resolved image files.
    fn create_material(&mut self, material: &MaterialData, textures: &IndexMap<String, PathBuf>) -> Result<HostId>;

    fn create_node(&mut self, node: &NodeDesc) -> Result<HostId>;

    fn set_parent(&mut self, child: HostId, parent: HostId) -> Result<()>;

    /// Link an object into a collection. Objects may be linked into several.
    fn link_to_collection(&mut self, object: HostId, collection: HostId) -> Result<()>;

    /// Create an action on `target` from decoded keyframe tracks.
    fn add_animation(&mut self, target: HostId, animation: &AnimationData) -> Result<()>;

    /// Use an environment texture as the scene's world background.
    fn set_world(&mut self, name: &str, sky_texture: &Path) -> Result<()>;
}
