//! Document: owns a loaded tree and its backing buffer.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::binary;
use super::format::*;
use super::property::{Element, Property};
use super::streams::IStreams;
use super::text;
use super::writer;
use crate::util::{Error, Result};

/// On-disk flavour of a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DocumentFormat {
    #[default]
    Binary,
    Text,
}

/// How [`Document::save`] writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub format: DocumentFormat,
    /// zlib-compress the whole binary payload.
    pub compress: bool,
    /// Store every packed array as LZ4.
    pub compress_arrays: bool,
}

impl SaveOptions {
    pub fn binary() -> Self {
        Self::default()
    }

    pub fn text() -> Self {
        Self {
            format: DocumentFormat::Text,
            ..Self::default()
        }
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_compressed_arrays(mut self, compress_arrays: bool) -> Self {
        self.compress_arrays = compress_arrays;
        self
    }
}

#[derive(Debug)]
struct Loaded {
    root: Property,
    version: u32,
    compressed: bool,
    format: DocumentFormat,
    streams: Option<Arc<IStreams>>,
    path: Option<PathBuf>,
}

/// A UDM document: created empty, loaded from a file or bytes, or built in
/// memory. Accessors fail with [`Error::NotFound`] while nothing is loaded.
#[derive(Debug, Default)]
pub struct Document {
    loaded: Option<Loaded>,
}

impl Document {
    /// Empty, unloaded document.
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory document around `root`.
    pub fn with_root(root: Element) -> Self {
        Self {
            loaded: Some(Loaded {
                root: Property::Element(root),
                version: CURRENT_VERSION,
                compressed: false,
                format: DocumentFormat::Binary,
                streams: None,
                path: None,
            }),
        }
    }

    /// Open and parse a file (memory-mapped when the `mmap` feature is on).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut doc = Self::new();
        doc.load(path)?;
        Ok(doc)
    }

    /// Open with an explicit choice of memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let mut doc = Self::new();
        doc.load_opts(path, use_mmap)?;
        Ok(doc)
    }

    /// Parse a document held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let loaded = Self::parse(Arc::new(IStreams::from_bytes(bytes)), None)?;
        Ok(Self { loaded: Some(loaded) })
    }

    /// Read everything from `reader` and parse it.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes)
    }

    /// Load `path`, replacing any previous contents. On failure the document
    /// is left unloaded.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.load_opts(path, cfg!(feature = "mmap"))
    }

    pub fn load_opts(&mut self, path: impl AsRef<Path>, use_mmap: bool) -> Result<()> {
        let path = path.as_ref();
        self.destroy();
        info!("Loading {}", path.display());

        let loaded = IStreams::open_opts(path, use_mmap)
            .and_then(|streams| Self::parse(Arc::new(streams), Some(path.to_path_buf())))
            .map_err(|e| e.with_path(path))?;
        debug!(
            version = loaded.version,
            compressed = loaded.compressed,
            format = ?loaded.format,
            "Loaded {}",
            path.display()
        );
        self.loaded = Some(loaded);
        Ok(())
    }

    fn parse(streams: Arc<IStreams>, path: Option<PathBuf>) -> Result<Loaded> {
        let data = streams.as_slice();
        if binary::is_binary(data) {
            let (header, root) = binary::read_document(streams.clone())?;
            Ok(Loaded {
                root: Property::Element(root),
                version: header.version,
                compressed: header.is_compressed(),
                format: DocumentFormat::Binary,
                streams: Some(streams),
                path,
            })
        } else if text::is_text(data) {
            let (version, root) = text::parse_text(&String::from_utf8_lossy(data))?;
            Ok(Loaded {
                root: Property::Element(root),
                version,
                compressed: false,
                format: DocumentFormat::Text,
                streams: None,
                path,
            })
        } else {
            Err(Error::BadMagic(data[..data.len().min(BINARY_MAGIC.len())].to_vec()))
        }
    }

    /// Release the tree and backing buffers. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            if let Some(path) = &loaded.path {
                debug!("Releasing {}", path.display());
            }
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn loaded(&self) -> Result<&Loaded> {
        self.loaded
            .as_ref()
            .ok_or_else(|| Error::not_found("document root (nothing loaded)"))
    }

    /// The top-level element.
    pub fn root(&self) -> Result<&Property> {
        Ok(&self.loaded()?.root)
    }

    pub fn root_mut(&mut self) -> Result<&mut Property> {
        self.loaded
            .as_mut()
            .map(|l| &mut l.root)
            .ok_or_else(|| Error::not_found("document root (nothing loaded)"))
    }

    /// Shortcut for `root()?.get(path)`.
    pub fn get(&self, path: &str) -> Result<&Property> {
        self.root()?.get(path)
    }

    pub fn version(&self) -> Option<u32> {
        self.loaded.as_ref().map(|l| l.version)
    }

    /// True if the loaded payload was zlib-compressed.
    pub fn is_compressed(&self) -> bool {
        self.loaded.as_ref().is_some_and(|l| l.compressed)
    }

    pub fn format(&self) -> Option<DocumentFormat> {
        self.loaded.as_ref().map(|l| l.format)
    }

    /// File the document was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.loaded.as_ref().and_then(|l| l.path.as_deref())
    }

    /// Backing buffer of a binary document.
    pub fn streams(&self) -> Option<&Arc<IStreams>> {
        self.loaded.as_ref().and_then(|l| l.streams.as_ref())
    }

    /// `assetType` of the engine envelope.
    pub fn asset_type(&self) -> Result<&str> {
        self.get(KEY_ASSET_TYPE)?.as_str()
    }

    /// `assetVersion` of the engine envelope.
    pub fn asset_version(&self) -> Result<u32> {
        self.get(KEY_ASSET_VERSION)?.as_u32()
    }

    /// `assetData` of the engine envelope.
    pub fn asset_data(&self) -> Result<&Property> {
        self.get(KEY_ASSET_DATA)
    }

    /// Encode as a binary document.
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>> {
        writer::encode_document(self.root()?.as_element()?, compress)
    }

    /// Render as a text document.
    pub fn to_text(&self) -> Result<String> {
        text::write_text(self.root()?.as_element()?)
    }

    /// Write to `path`.
    pub fn save(&self, path: impl AsRef<Path>, options: SaveOptions) -> Result<()> {
        let path = path.as_ref();
        let mut arrays_compressed;
        let mut root = self.root()?;
        if options.compress_arrays {
            arrays_compressed = root.clone();
            mark_arrays_compressed(&mut arrays_compressed);
            root = &arrays_compressed;
        }
        let root = root.as_element()?;

        info!("Saving {} ({:?})", path.display(), options.format);
        match options.format {
            DocumentFormat::Binary => writer::write_document(path, root, options.compress),
            DocumentFormat::Text => {
                std::fs::write(path, text::write_text(root)?)?;
                Ok(())
            }
        }
        .map_err(|e| e.with_path(path))
    }
}

fn mark_arrays_compressed(property: &mut Property) {
    match property {
        Property::Array(a) => {
            if a.value_type().is_trivial() || a.layout().is_some() {
                a.set_compressed(true);
            }
            if let Ok(items) = a.elements_mut() {
                items.iter_mut().for_each(mark_arrays_compressed);
            }
        }
        Property::Element(e) => {
            let keys: Vec<String> = e.keys().map(str::to_string).collect();
            for key in keys {
                if let Some(child) = e.child_mut(&key) {
                    mark_arrays_compressed(child);
                }
            }
        }
        Property::Scalar(_) => {}
    }
}
