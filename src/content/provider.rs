//! Content providers: searchable roots that turn a logical asset path into a
//! file on disk.

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use globset::GlobBuilder;
use parking_lot::Mutex;
use tracing::trace;
use walkdir::WalkDir;

use super::cache::StreamCache;
use crate::util::{Error, Result};

/// An opened asset. The bytes are shared with the provider's stream cache,
/// so every stream handed out starts at position 0.
pub type ContentStream = Cursor<Arc<[u8]>>;

/// Lazily evaluated glob matches.
pub type GlobIter = Box<dyn Iterator<Item = PathBuf> + Send>;

/// What a provider stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// The game root directory.
    RootDirectory,
    /// An overlay directory under `<root>/addons`.
    Addon,
    /// Anything registered by the caller.
    Custom,
}

/// A searchable root.
///
/// Only [`name`](ContentProvider::name) and [`root`](ContentProvider::root)
/// are required. The remaining methods default to plain lookups under the root.
pub trait ContentProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    /// Directory that logical paths are resolved against.
    fn root(&self) -> &Path;

    /// Concrete path of `logical` if this provider has it.
    fn find_path(&self, logical: &Path) -> Option<PathBuf> {
        find_under(self.root(), logical)
    }

    /// Open `logical` if this provider has it.
    fn find_file(&self, logical: &Path) -> Result<Option<ContentStream>> {
        match self.find_path(logical) {
            Some(path) => Ok(Some(Cursor::new(read_shared(&path)?))),
            None => Ok(None),
        }
    }

    /// Every entry below the root whose relative path ends with `pattern`.
    fn glob(&self, pattern: &str) -> Result<GlobIter> {
        glob_under(self.root(), pattern)
    }

    /// Drop cached streams.
    fn flush_cache(&self) {}
}

/// Keep only the normal components of a logical path so that lookups cannot
/// leave the provider root.
pub fn sanitize(logical: &Path) -> PathBuf {
    logical
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// `root/logical` if it names an existing file.
pub fn find_under(root: &Path, logical: &Path) -> Option<PathBuf> {
    let relative = sanitize(logical);
    if relative.as_os_str().is_empty() {
        return None;
    }
    let candidate = root.join(relative);
    candidate.is_file().then_some(candidate)
}

/// Recursive glob below `root`, equivalent to matching `**/<pattern>`
/// against each entry's path relative to `root`.
pub fn glob_under(root: &Path, pattern: &str) -> Result<GlobIter> {
    let pattern = pattern.trim_start_matches(['/', '\\']).replace('\\', "/");
    let matcher = GlobBuilder::new(&format!("**/{pattern}"))
        .literal_separator(true)
        .build()
        .map_err(|e| Error::invalid(format!("bad glob pattern {pattern:?}: {e}")))?
        .compile_matcher();

    let root = root.to_path_buf();
    let walk_root = root.clone();
    Ok(Box::new(
        WalkDir::new(walk_root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(move |entry| {
                entry
                    .path()
                    .strip_prefix(&root)
                    .is_ok_and(|relative| matcher.is_match(relative))
            })
            .map(|entry| entry.into_path()),
    ))
}

fn read_shared(path: &Path) -> Result<Arc<[u8]>> {
    let bytes = fs::read(path).map_err(|e| Error::from(e).with_path(path))?;
    Ok(Arc::from(bytes))
}

/// A provider backed by a directory: the game root or an addon overlay.
pub struct DirectoryProvider {
    name: String,
    kind: ProviderKind,
    root: PathBuf,
    cache: Mutex<StreamCache<Arc<[u8]>>>,
}

impl DirectoryProvider {
    /// Provider rooted at `path`, or at its parent if `path` is a file.
    pub fn new(name: impl Into<String>, kind: ProviderKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let root = match path.parent() {
            Some(parent) if path.is_file() => parent.to_path_buf(),
            _ => path,
        };
        Self {
            name: name.into(),
            kind,
            root,
            cache: Mutex::new(StreamCache::default()),
        }
    }

    /// The game root provider.
    pub fn root_directory(path: impl Into<PathBuf>) -> Self {
        Self::new("root", ProviderKind::RootDirectory, path)
    }

    /// An addon overlay named after its full directory name.
    pub fn addon(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(name, ProviderKind::Addon, path)
    }

    /// Number of streams currently cached.
    pub fn cached_streams(&self) -> usize {
        self.cache.lock().len()
    }
}

impl fmt::Debug for DirectoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("root", &self.root)
            .finish()
    }
}

impl ContentProvider for DirectoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn find_file(&self, logical: &Path) -> Result<Option<ContentStream>> {
        let Some(path) = self.find_path(logical) else {
            return Ok(None);
        };
        if let Some(bytes) = self.cache.lock().get(&path) {
            trace!(provider = %self.name, "stream cache hit for {}", path.display());
            return Ok(Some(Cursor::new(bytes.clone())));
        }
        let bytes = read_shared(&path)?;
        self.cache.lock().insert(path, bytes.clone());
        Ok(Some(Cursor::new(bytes)))
    }

    fn flush_cache(&self) {
        self.cache.lock().clear();
    }
}
