//! End-to-end imports from a temporary game directory into a recording host.

use std::fs;
use std::path::{Path, PathBuf};

use udm_io::asset::{MAP_ASSET_TYPE, MATERIAL_ASSET_TYPE, MESH_ASSET_TYPE, MODEL_ASSET_TYPE};
use udm_io::content::ContentManager;
use udm_io::import::{AssetKind, ImportOptions, Importer, RecordedKind, RecordingHost};
use udm_io::udm::format::{KEY_ASSET_DATA, KEY_ASSET_TYPE};
use udm_io::udm::{Array, Document, Element, SaveOptions, StructLayout};
use udm_io::util::{Quat, ScaledTransform, Type, Vec3};

fn envelope(asset_type: &str, data: Element) -> Element {
    Element::new()
        .with(KEY_ASSET_TYPE, asset_type)
        .unwrap()
        .with(KEY_ASSET_DATA, data)
        .unwrap()
}

fn save(root: &Path, rel: &str, tree: Element, options: SaveOptions) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    Document::with_root(tree).save(&path, options).unwrap();
    path
}

/// A quad made of two triangles.
fn quad_mesh() -> Element {
    let layout = StructLayout::new()
        .with(Type::Vector3, "pos")
        .unwrap()
        .with(Type::Vector3, "n")
        .unwrap()
        .with(Type::Vector2, "uv")
        .unwrap();
    let mut vertices = Vec::new();
    for (x, z) in [(0.0f32, 0.0f32), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
        for f in [x, 0.0, z, 0.0, 1.0, 0.0, x, z] {
            vertices.extend(f.to_le_bytes());
        }
    }
    let data = Element::new()
        .with("geometryType", "Triangles")
        .unwrap()
        .with("skinMaterialIndex", 0u32)
        .unwrap()
        .with("vertices", Array::from_structs(layout, 4, vertices).unwrap())
        .unwrap()
        .with("indices", Array::from_values(&[0u16, 1, 2, 0, 2, 3]))
        .unwrap();
    envelope(MESH_ASSET_TYPE, data)
}

fn crate_model() -> Element {
    let mesh = Element::new()
        .with("subMeshes", Array::from_elements([quad_mesh()]))
        .unwrap();
    let group = Element::new()
        .with("index", 0u32)
        .unwrap()
        .with("meshes", Array::from_elements([mesh]))
        .unwrap();
    let data = Element::new()
        .with("materials", Array::from_strings(["wood"]))
        .unwrap()
        .with("materialPaths", Array::from_strings(["missing/", "props/"]))
        .unwrap()
        .with("meshGroups", Element::new().with("body", group).unwrap())
        .unwrap();
    envelope(MODEL_ASSET_TYPE, data)
}

fn wood_material() -> Element {
    let textures = Element::new()
        .with("albedo_map", "props/wood_albedo")
        .unwrap()
        .with("normal_map", "props/wood_normal")
        .unwrap();
    let pbr = Element::new()
        .with("textures", textures)
        .unwrap()
        .with("properties", Element::new().with("metalness_factor", 0.0f32).unwrap())
        .unwrap();
    envelope(MATERIAL_ASSET_TYPE, Element::new().with("pbr", pbr).unwrap())
}

fn arena_map() -> Element {
    let prop = Element::new()
        .with("name", "crate_01")
        .unwrap()
        .with("className", "prop_physics")
        .unwrap()
        .with("model", "props/crate")
        .unwrap()
        .with("pose", ScaledTransform::new(Vec3::new(0.0, 0.0, 4.0), Quat::IDENTITY, Vec3::ONE))
        .unwrap();
    let ghost = Element::new()
        .with("className", "prop_dynamic")
        .unwrap()
        .with("model", "props/ghost")
        .unwrap();
    let data = Element::new()
        .with("entities", Array::from_elements([prop, ghost]))
        .unwrap();
    envelope(MAP_ASSET_TYPE, data)
}

/// `<root>/models/props/crate.pmdl_b`, its material as text and one of its
/// two textures.
fn game_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(root, "models/props/crate.pmdl_b", crate_model(), SaveOptions::binary());
    save(root, "materials/props/wood.pmat", wood_material(), SaveOptions::text());
    fs::write(root.join("materials/props/wood_albedo.vtf"), b"").unwrap();
    save(root, "maps/arena.pmap_b", arena_map(), SaveOptions::binary().compressed(true));
    dir
}

#[test]
fn test_import_model_with_material() {
    let dir = game_root();
    let content = ContentManager::with_root(dir.path()).unwrap();
    let importer = Importer::new(&content, ImportOptions::default());
    let mut host = RecordingHost::new();

    let path = content.find_path("props/crate", Some("models"), Some("pmdl")).unwrap();
    let report = importer.import_path(&mut host, &path).unwrap();

    assert_eq!(report.kind, AssetKind::Model);
    assert_eq!(report.armature, None);
    assert_eq!(report.objects.len(), 1);
    assert_eq!(host.collection(report.collection.unwrap()).unwrap().name, "crate_model");

    let mesh = host.object(report.objects[0]).unwrap();
    assert_eq!(mesh.name, "body_0_wood");
    match &mesh.kind {
        RecordedKind::Mesh { vertices, triangles, material, .. } => {
            assert_eq!(*vertices, 4);
            assert_eq!(*triangles, 2);
            assert_eq!(material, "wood");
        }
        other => panic!("expected a mesh, got {other:?}"),
    }

    assert_eq!(host.materials.len(), 1);
    let material = &host.materials[0];
    assert_eq!(material.name, "wood");
    assert!(material.textures["albedo_map"].ends_with("materials/props/wood_albedo.vtf"));
    assert!(!material.textures.contains_key("normal_map"));
}

#[test]
fn test_materials_are_not_duplicated() {
    let dir = game_root();
    let content = ContentManager::with_root(dir.path()).unwrap();
    let importer = Importer::new(&content, ImportOptions::default());
    let mut host = RecordingHost::new();

    let path = content.find_path("models/props/crate.pmdl", None, None).unwrap();
    let first = importer.import_path(&mut host, &path).unwrap();
    let second = importer.import_path(&mut host, &path).unwrap();

    assert_eq!(host.materials.len(), 1);
    assert_eq!(first.materials, second.materials);
    assert_eq!(host.collection(second.collection.unwrap()).unwrap().name, "crate_model_1");
}

#[test]
fn test_skip_materials_option() {
    let dir = game_root();
    let content = ContentManager::with_root(dir.path()).unwrap();
    let options = ImportOptions {
        import_materials: false,
        ..Default::default()
    };
    let importer = Importer::new(&content, options);
    let mut host = RecordingHost::new();

    let path = content.find_path("models/props/crate.pmdl", None, None).unwrap();
    let report = importer.import_path(&mut host, &path).unwrap();
    assert!(report.materials.is_empty());
    assert!(host.materials.is_empty());
}

#[test]
fn test_import_map_with_missing_model() {
    let dir = game_root();
    let content = ContentManager::with_root(dir.path()).unwrap();
    let options = ImportOptions {
        scale: 0.5,
        ..Default::default()
    };
    let importer = Importer::new(&content, options);
    let mut host = RecordingHost::new();

    let path = content.find_path("maps/arena.pmap", None, None).unwrap();
    let report = importer.import_path(&mut host, &path).unwrap();

    assert_eq!(report.kind, AssetKind::Map);
    assert_eq!(report.objects.len(), 2);
    assert_eq!(report.missing, vec!["model props/ghost".to_string()]);

    let node = host.object_by_name("crate_01").unwrap();
    // Engine +Z lands on host -Y, scaled.
    assert_eq!(node.matrix.w_axis.truncate(), Vec3::new(0.0, -2.0, 0.0));
    let children: Vec<&str> = host.children_of(node.id).map(|o| o.name.as_str()).collect();
    assert_eq!(children, ["body_0_wood"]);
    assert!(host.object_by_name("prop_dynamic_1").is_some());

    let map = host.collection(report.collection.unwrap()).unwrap();
    assert_eq!(map.name, "arena_map");
    let summary = host.summary();
    assert_eq!(summary["materials"][0]["name"], "wood");
}

#[test]
fn test_batch_import_isolates_failures() {
    let dir = game_root();
    let root = dir.path();
    fs::write(root.join("models/broken.pmdl_b"), b"not a document").unwrap();
    fs::write(root.join("notes.txt"), b"udm_version 1\n").unwrap();

    let content = ContentManager::with_root(root).unwrap();
    let importer = Importer::new(&content, ImportOptions::default());
    let mut host = RecordingHost::new();
    let paths = vec![
        root.join("models/broken.pmdl_b"),
        root.join("models/props/crate.pmdl_b"),
        root.join("notes.txt"),
        root.join("materials/props/wood.pmat"),
    ];

    let results = importer.import_files(&mut host, &paths);
    assert_eq!(results.len(), 4);
    assert!(results[0].1.is_err());
    assert!(results[1].1.is_ok());
    assert!(results[2].1.is_err());
    let material = results[3].1.as_ref().unwrap();
    assert_eq!(material.kind, AssetKind::Material);

    // The material was already created by the model import.
    assert_eq!(host.materials.len(), 1);
    assert_eq!(host.meshes().count(), 1);
}
