//! Integration tests for loading and writing UDM documents on disk.

use udm_io::udm::{Array, Document, DocumentFormat, Element, Property, SaveOptions};
use udm_io::util::{Error, Quat, ScaledTransform, Type, Vec3};

fn sample_tree() -> Element {
    let bone = Element::new()
        .with("index", 3i32)
        .unwrap()
        .with(
            "pose",
            ScaledTransform::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::ONE),
        )
        .unwrap();
    let nested = Element::new()
        .with("name", "crate")
        .unwrap()
        .with("bone", bone)
        .unwrap();
    Element::new()
        .with("x", 42i32)
        .unwrap()
        .with("big", 1i64 << 40)
        .unwrap()
        .with("scale", 0.5f32)
        .unwrap()
        .with("a", Element::new().with("b", nested).unwrap())
        .unwrap()
        .with("indices", Array::from_values(&[0u16, 1, 2, 2, 1, 3]))
        .unwrap()
        .with("names", Array::from_strings(["left", "right"]))
        .unwrap()
}

#[test]
fn test_binary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.udm_b");
    let original = Document::with_root(sample_tree());
    original.save(&path, SaveOptions::binary()).unwrap();

    let doc = Document::open(&path).unwrap();
    assert_eq!(doc.format(), Some(DocumentFormat::Binary));
    assert!(!doc.is_compressed());

    let keys: Vec<&str> = doc.root().unwrap().children().unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys, ["x", "big", "scale", "a", "indices", "names"]);
    assert_eq!(doc.root().unwrap().to_json().unwrap(), original.root().unwrap().to_json().unwrap());
    assert_eq!(doc.get("x").unwrap().kind(), Type::Int32);
    assert_eq!(doc.get("indices").unwrap().to_vec::<u16>().unwrap(), vec![0, 1, 2, 2, 1, 3]);
}

#[test]
fn test_compressed_and_text_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let original = Document::with_root(sample_tree());
    let expected = original.root().unwrap().to_json().unwrap();

    let compressed = dir.path().join("sample_z.udm_b");
    original.save(&compressed, SaveOptions::binary().compressed(true)).unwrap();
    let doc = Document::open(&compressed).unwrap();
    assert!(doc.is_compressed());
    assert_eq!(doc.root().unwrap().to_json().unwrap(), expected);

    let text = dir.path().join("sample.udm");
    original.save(&text, SaveOptions::text()).unwrap();
    let doc = Document::open(&text).unwrap();
    assert_eq!(doc.format(), Some(DocumentFormat::Text));
    assert_eq!(doc.root().unwrap().to_json().unwrap(), expected);
}

#[test]
fn test_minimal_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.udm_b");
    Document::with_root(Element::new().with("x", 42i32).unwrap())
        .save(&path, SaveOptions::binary())
        .unwrap();

    let doc = Document::open(&path).unwrap();
    assert_eq!(doc.root().unwrap().get("x").unwrap().as_int().unwrap(), 42);
}

#[test]
fn test_bad_magic_leaves_document_unloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.udm_b");
    std::fs::write(&path, b"XXXX\x01\0\0\0\0\0\0\0\x0b").unwrap();

    let mut doc = Document::new();
    let err = doc.load(&path).unwrap_err();
    assert!(matches!(err.root_cause(), Error::BadMagic(_)));
    assert!(!doc.is_loaded());
    assert!(doc.root().unwrap_err().is_not_found());
}

#[test]
fn test_path_resolution() {
    let doc = Document::with_root(sample_tree());
    let root = doc.root().unwrap();
    let direct = root.get("a/b/bone/index").unwrap();
    let stepped = root.get("a/b").unwrap().get("bone").unwrap().get("index").unwrap();
    assert_eq!(direct, stepped);
    assert_eq!(direct.as_i32().unwrap(), 3);

    assert!(root.try_get("a/missing/index").is_none());
    assert!(!root.contains("a/b/bone/missing"));
    assert_eq!(root.get_or("a/b/bone/parent", -1i32).unwrap(), -1);
    assert!(root.get("a/b/nothing").unwrap_err().is_not_found());
}

#[test]
fn test_typed_accessors() {
    let doc = Document::with_root(sample_tree());
    let root = doc.root().unwrap();

    let name = root.get("a/b/name").unwrap();
    assert!(matches!(name.as_vec3(), Err(Error::TypeMismatch { .. })));

    // Widening succeeds, narrowing that loses bits fails.
    assert_eq!(root.get("x").unwrap().as_int().unwrap(), 42);
    let big = root.get("big").unwrap();
    assert_eq!(big.as_int().unwrap(), 1 << 40);
    assert!(big.as_i32().is_err());
    assert!(root.get("x").unwrap().as_str().is_err());

    let pose = root.get("a/b/bone/pose").unwrap().as_scaled_transform().unwrap();
    assert_eq!(pose.translation(), Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn test_array_value_reads_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lazy.udm_b");
    let values: Vec<f32> = (0..256).map(|i| i as f32).collect();
    Document::with_root(Element::new().with("values", Array::from_values(&values)).unwrap())
        .save(&path, SaveOptions::binary())
        .unwrap();

    let doc = Document::open(&path).unwrap();
    let streams = doc.streams().unwrap().clone();
    let before = streams.read_count();

    let prop: &Property = doc.get("values").unwrap();
    let first = prop.array_value().unwrap().as_bytes().to_vec();
    assert_eq!(streams.read_count(), before + 1);
    let second = prop.array_value().unwrap().as_bytes().to_vec();
    assert_eq!(streams.read_count(), before + 1);
    assert_eq!(first, second);
    assert_eq!(prop.to_vec::<f32>().unwrap(), values);
}

#[test]
fn test_deeply_nested_text_fails_cleanly() {
    let text = format!("udm_version 1\n{}", "a{".repeat(200_000));
    let err = Document::from_bytes(text.into_bytes()).unwrap_err();
    assert!(matches!(err.root_cause(), Error::InvalidStructure(_)), "{err:?}");
}

#[test]
fn test_non_latin1_text_survives_binary_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let text = "udm_version 1\n$string title \"\u{65e5}\u{672c}\"\n$string plain \"caf\u{e9}\"\n";
    let doc = Document::from_bytes(text.as_bytes().to_vec()).unwrap();

    let path = dir.path().join("title.udm_b");
    doc.save(&path, SaveOptions::binary()).unwrap();
    let back = Document::open(&path).unwrap();
    assert_eq!(back.get("title").unwrap().as_str().unwrap(), "\u{65e5}\u{672c}");
    assert_eq!(back.get("plain").unwrap().as_str().unwrap(), "caf\u{e9}");

    let keyed = Document::with_root(Element::new().with("\u{3a9}mega", 1i32).unwrap());
    assert!(keyed.save(dir.path().join("keyed.udm_b"), SaveOptions::binary()).is_err());
}
