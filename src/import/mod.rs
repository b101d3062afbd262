//! Import pipeline: load documents, decode them and build them through a
//! [`SceneHost`].
//!
//! References between assets are resolved through the [`ContentManager`]:
//! - models: `models/<name>.pmdl`
//! - materials: `materials/<materialPath>/<name>.pmat`
//! - textures: `materials/<name>.dds`, then `.vtf`
//! - maps: `maps/<name>.pmap`
//!
//! A reference that does not resolve is logged and recorded in
//! [`ImportReport::missing`]; the rest of the asset still imports.

pub mod host;
pub mod recorder;

pub use host::{HostId, NodeDesc, SceneHost};
pub use recorder::{
    unique_name, RecordedAnimation, RecordedCollection, RecordedKind, RecordedMaterial, RecordedObject,
    RecordingHost,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::asset::map::decode_map;
use crate::asset::material::{decode_material, TEXTURE_EXTENSIONS};
use crate::asset::model::decode_model;
use crate::asset::project::decode_project;
use crate::asset::{BindPoseMode, DecodeOptions, MaterialData, Model};
use crate::content::ContentManager;
use crate::udm::format::BINARY_EXTENSION_SUFFIX;
use crate::udm::Document;
use crate::util::{Error, Result};

/// Top-level asset kinds, by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Model,
    Material,
    Map,
    Project,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [Self::Model, Self::Material, Self::Map, Self::Project];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Model => "pmdl",
            Self::Material => "pmat",
            Self::Map => "pmap",
            Self::Project => "pfmp",
        }
    }

    /// Content folder referenced assets of this kind live in.
    pub fn folder(self) -> &'static str {
        match self {
            Self::Model => "models",
            Self::Material => "materials",
            Self::Map => "maps",
            Self::Project => "projects",
        }
    }

    /// Kind of `path` from its extension; `_b` variants count too.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let ext = ext.strip_suffix(BINARY_EXTENSION_SUFFIX).unwrap_or(&ext);
        Self::ALL.into_iter().find(|k| k.extension() == ext)
    }
}

/// Import settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub scale: f32,
    pub bind_pose: BindPoseMode,
    /// Resolve and build model materials.
    pub import_materials: bool,
    /// Put all meshes of a model into its master collection.
    pub single_collection: bool,
    pub use_mmap: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            bind_pose: BindPoseMode::Direct,
            import_materials: true,
            single_collection: false,
            use_mmap: cfg!(feature = "mmap"),
        }
    }
}

impl ImportOptions {
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::default()
            .with_scale(self.scale)
            .with_bind_pose(self.bind_pose)
    }
}

/// What one import created.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportReport {
    pub path: PathBuf,
    pub kind: AssetKind,
    /// Top collection the asset was linked into.
    pub collection: Option<HostId>,
    pub armature: Option<HostId>,
    /// Objects created directly by this asset (not by nested imports).
    pub objects: Vec<HostId>,
    pub materials: Vec<HostId>,
    /// References that did not resolve or failed to import.
    pub missing: Vec<String>,
}

impl ImportReport {
    fn new(path: &Path, kind: AssetKind) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            collection: None,
            armature: None,
            objects: Vec::new(),
            materials: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Objects to parent under something else: the armature if there is
    /// one, otherwise every object.
    pub fn roots(&self) -> Vec<HostId> {
        match self.armature {
            Some(armature) => vec![armature],
            None => self.objects.clone(),
        }
    }

    fn miss(&mut self, what: String) {
        warn!("{}: {what}", self.path.display());
        self.missing.push(what);
    }
}

/// File name without the (possibly `_b`) extension.
fn asset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Imports assets found through a content manager.
#[derive(Debug)]
pub struct Importer<'a> {
    content: &'a ContentManager,
    options: ImportOptions,
}

impl<'a> Importer<'a> {
    pub fn new(content: &'a ContentManager, options: ImportOptions) -> Self {
        Self { content, options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn content(&self) -> &ContentManager {
        self.content
    }

    pub fn load(&self, path: &Path) -> Result<Document> {
        Document::open_opts(path, self.options.use_mmap)
    }

    /// Import one file, dispatching on its extension.
    pub fn import_path(&self, host: &mut dyn SceneHost, path: &Path) -> Result<ImportReport> {
        let doc = self.load(path)?;
        self.import_document(host, path, &doc)
    }

    /// Import an already loaded document.
    pub fn import_document(&self, host: &mut dyn SceneHost, path: &Path, doc: &Document) -> Result<ImportReport> {
        let kind = AssetKind::from_path(path)
            .ok_or_else(|| Error::unknown_schema(format!("unsupported file type: {}", path.display())))?;
        info!("Importing {:?} {}", kind, path.display());
        match kind {
            AssetKind::Model => self.build_model(host, path, doc, None, true),
            AssetKind::Material => self.build_material_file(host, path, doc),
            AssetKind::Map => self.build_map(host, path, doc),
            AssetKind::Project => self.build_project(host, path, doc),
        }
    }

    /// Import many files. Documents load in parallel; building is sequential.
    /// Each file succeeds or fails on its own.
    pub fn import_files(&self, host: &mut dyn SceneHost, paths: &[PathBuf]) -> Vec<(PathBuf, Result<ImportReport>)> {
        let loaded: Vec<Result<Document>> = paths.par_iter().map(|p| self.load(p)).collect();
        paths
            .iter()
            .zip(loaded)
            .map(|(path, doc)| {
                let result = doc.and_then(|doc| self.import_document(&mut *host, path, &doc));
                if let Err(e) = &result {
                    warn!("Failed to import {}: {e}", path.display());
                }
                (path.clone(), result)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Import a model. With `own_collection` false and a `parent`, the model
    /// links straight into `parent` without collections of its own.
    pub fn import_model(
        &self,
        host: &mut dyn SceneHost,
        path: &Path,
        parent: Option<HostId>,
        own_collection: bool,
    ) -> Result<ImportReport> {
        let doc = self.load(path)?;
        self.build_model(host, path, &doc, parent, own_collection)
    }

    fn build_model(
        &self,
        host: &mut dyn SceneHost,
        path: &Path,
        doc: &Document,
        parent: Option<HostId>,
        own_collection: bool,
    ) -> Result<ImportReport> {
        let name = asset_name(path);
        let model = decode_model(&name, doc.root()?, &self.options.decode_options())?;
        let mut report = ImportReport::new(path, AssetKind::Model);

        let nested = !own_collection && parent.is_some();
        let layout = model.collection_layout(self.options.single_collection || nested);
        let master = match parent.filter(|_| nested) {
            Some(parent) => parent,
            None => host.create_collection(&layout[0].name, parent)?,
        };
        let mut collections = vec![master];
        for child in &layout[1..] {
            collections.push(host.create_collection(&child.name, Some(master))?);
        }
        report.collection = Some(master);

        if let Some(skeleton) = model.skeleton.as_ref().filter(|s| !s.is_empty()) {
            let armature = host.create_armature(&format!("{name}_ARM"), skeleton)?;
            host.link_to_collection(armature, master)?;
            report.armature = Some(armature);
        }

        let mut mesh_ids = Vec::with_capacity(model.meshes.len());
        for mesh in &model.meshes {
            let id = host.create_mesh(&mesh.data, report.armature)?;
            if let Some(armature) = report.armature {
                host.set_parent(id, armature)?;
            }
            mesh_ids.push(id);
        }
        for (collection, entry) in collections.iter().zip(&layout) {
            for &mesh in &entry.meshes {
                host.link_to_collection(mesh_ids[mesh], *collection)?;
            }
        }
        report.objects = mesh_ids;

        if self.options.import_materials {
            self.import_model_materials(host, &model, &mut report)?;
        }
        debug!(
            meshes = report.objects.len(),
            materials = report.materials.len(),
            "built model {name}"
        );
        Ok(report)
    }

    fn import_model_materials(&self, host: &mut dyn SceneHost, model: &Model, report: &mut ImportReport) -> Result<()> {
        for material in &model.materials {
            if let Some(existing) = host.find_material(material) {
                debug!("material {material} already loaded");
                report.materials.push(existing);
                continue;
            }
            let found = model.material_candidates(material).into_iter().find_map(|candidate| {
                self.content
                    .find_path(&candidate, None, Some(AssetKind::Material.extension()))
            });
            let Some(path) = found else {
                report.miss(format!("material {material}"));
                continue;
            };
            match self.load(&path).and_then(|doc| self.build_material(host, material, &doc)) {
                Ok(id) => report.materials.push(id),
                Err(e) => report.miss(format!("material {material}: {e}")),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Materials
    // ------------------------------------------------------------------

    /// Import a standalone material file named after the file.
    pub fn import_material(&self, host: &mut dyn SceneHost, path: &Path) -> Result<ImportReport> {
        let doc = self.load(path)?;
        self.build_material_file(host, path, &doc)
    }

    fn build_material_file(&self, host: &mut dyn SceneHost, path: &Path, doc: &Document) -> Result<ImportReport> {
        let mut report = ImportReport::new(path, AssetKind::Material);
        let name = asset_name(path);
        let id = match host.find_material(&name) {
            Some(id) => id,
            None => self.build_material(host, &name, doc)?,
        };
        report.materials.push(id);
        Ok(report)
    }

    fn build_material(&self, host: &mut dyn SceneHost, name: &str, doc: &Document) -> Result<HostId> {
        let material = decode_material(name, doc.root()?)?;
        let textures = self.resolve_textures(&material);
        host.create_material(&material, &textures)
    }

    /// Concrete image files for each texture slot. Unresolved slots are
    /// logged and left out.
    pub fn resolve_textures(&self, material: &MaterialData) -> IndexMap<String, PathBuf> {
        let mut resolved = IndexMap::new();
        for (slot, texture) in &material.textures {
            let path = TEXTURE_EXTENSIONS.into_iter().find_map(|ext| {
                self.content
                    .find_path(texture, Some(AssetKind::Material.folder()), Some(ext))
            });
            match path {
                Some(path) => {
                    resolved.insert(slot.clone(), path);
                }
                None => warn!("{}: texture {texture} for {slot} not found", material.name),
            }
        }
        resolved
    }

    // ------------------------------------------------------------------
    // Maps
    // ------------------------------------------------------------------

    pub fn import_map(&self, host: &mut dyn SceneHost, path: &Path) -> Result<ImportReport> {
        let doc = self.load(path)?;
        self.build_map(host, path, &doc)
    }

    fn build_map(&self, host: &mut dyn SceneHost, path: &Path, doc: &Document) -> Result<ImportReport> {
        let name = asset_name(path);
        let map = decode_map(&name, doc.root()?, self.options.scale)?;
        let mut report = ImportReport::new(path, AssetKind::Map);
        let collection = host.create_collection(&format!("{name}_map"), None)?;
        report.collection = Some(collection);

        for entity in &map.entities {
            let node = NodeDesc::empty(&entity.name, entity.matrix).with_metadata(entity.key_values.clone());
            let id = host.create_node(&node)?;
            host.link_to_collection(id, collection)?;
            report.objects.push(id);

            let Some(model) = &entity.model else {
                continue;
            };
            if let Some(model) = self.import_referenced_model(host, model, collection, &mut report)? {
                for root in model.roots() {
                    host.set_parent(root, id)?;
                }
            }
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Film-maker projects
    // ------------------------------------------------------------------

    pub fn import_project(&self, host: &mut dyn SceneHost, path: &Path) -> Result<ImportReport> {
        let doc = self.load(path)?;
        self.build_project(host, path, &doc)
    }

    fn build_project(&self, host: &mut dyn SceneHost, path: &Path, doc: &Document) -> Result<ImportReport> {
        let project = decode_project(doc.root()?, self.options.scale)?;
        let mut report = ImportReport::new(path, AssetKind::Project);

        let session = host.create_collection(&project.session_collection(), None)?;
        let props = host.create_collection(&project.props_collection(), Some(session))?;
        report.collection = Some(session);

        let scene_root = host.create_node(&NodeDesc::empty(project.scene_root_name(), project.scene_transform))?;
        host.link_to_collection(scene_root, session)?;
        report.objects.push(scene_root);

        if let Some(map) = &project.map_name {
            match self.content.find_path(
                map,
                Some(AssetKind::Map.folder()),
                Some(AssetKind::Map.extension()),
            ) {
                Some(map_path) => match self.import_map(host, &map_path) {
                    Ok(map) => report.missing.extend(map.missing),
                    Err(e) => report.miss(format!("map {map}: {e}")),
                },
                None => report.miss(format!("map {map}")),
            }
        }

        // Unique id -> (actor node, animation target).
        let mut actors: HashMap<&str, (HostId, HostId)> = HashMap::new();
        for actor in &project.actors {
            let node = NodeDesc::empty(&actor.name, actor.matrix)
                .with_kind(actor.kind.clone())
                .with_visible(actor.visible);
            let id = host.create_node(&node)?;
            host.set_parent(id, scene_root)?;
            host.link_to_collection(id, session)?;
            report.objects.push(id);

            let mut target = id;
            if let Some(model) = &actor.model {
                let model_report = self.import_referenced_model(host, model, props, &mut report)?;
                if let Some(model_report) = model_report {
                    target = model_report.armature.unwrap_or(id);
                    for root in model_report.roots() {
                        host.set_parent(root, id)?;
                    }
                }
            }
            actors.insert(actor.unique_id.as_str(), (id, target));
        }

        if let Some(texture) = project.sky_texture() {
            match self.content.find_path(texture, Some(AssetKind::Material.folder()), None) {
                Some(sky) => host.set_world(&format!("{}_SKY", project.session_name), &sky)?,
                None => report.miss(format!("sky texture {texture}")),
            }
        }

        for animation in &project.animations {
            let Some(&(_, target)) = actors.get(animation.actor.as_str()) else {
                report.miss(format!("animated actor {}", animation.actor));
                continue;
            };
            if !animation.data.skipped.is_empty() {
                debug!(
                    "{}: skipped channels {:?}",
                    animation.name, animation.data.skipped
                );
            }
            host.add_animation(target, &animation.data)?;
        }
        Ok(report)
    }

    /// Import `models/<logical>.pmdl` into `collection`. Missing or broken
    /// models are recorded in `report` and yield `None`.
    fn import_referenced_model(
        &self,
        host: &mut dyn SceneHost,
        logical: &str,
        collection: HostId,
        report: &mut ImportReport,
    ) -> Result<Option<ImportReport>> {
        let Some(path) = self.content.find_path(
            logical,
            Some(AssetKind::Model.folder()),
            Some(AssetKind::Model.extension()),
        ) else {
            report.miss(format!("model {logical}"));
            return Ok(None);
        };
        match self.import_model(host, &path, Some(collection), false) {
            Ok(model) => {
                report.materials.extend(model.materials.iter().copied());
                report.missing.extend(model.missing.iter().cloned());
                Ok(Some(model))
            }
            Err(e) => {
                report.miss(format!("model {logical}: {e}"));
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_kind_from_path() {
        assert_eq!(AssetKind::from_path(Path::new("a/hero.pmdl")), Some(AssetKind::Model));
        assert_eq!(AssetKind::from_path(Path::new("a/hero.pmdl_b")), Some(AssetKind::Model));
        assert_eq!(AssetKind::from_path(Path::new("skin.PMAT")), Some(AssetKind::Material));
        assert_eq!(AssetKind::from_path(Path::new("demo.pfmp_b")), Some(AssetKind::Project));
        assert_eq!(AssetKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(AssetKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_asset_name_strips_binary_extension() {
        assert_eq!(asset_name(Path::new("models/hero.pmdl_b")), "hero");
    }

    #[test]
    fn test_unsupported_extension() {
        let content = ContentManager::new();
        let importer = Importer::new(&content, ImportOptions::default());
        let mut host = RecordingHost::new();
        let doc = Document::new();
        let err = importer
            .import_document(&mut host, Path::new("x.txt"), &doc)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSchema(_)));
    }
}
