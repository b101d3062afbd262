//! Layered content resolution: addon overlays first, then the game root.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::provider::{ContentProvider, ContentStream, DirectoryProvider, GlobIter};
use crate::udm::format::BINARY_EXTENSION_SUFFIX;
use crate::util::{Error, Result};

/// State of a logical path in the manager's path cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PathLookup {
    /// Never asked for.
    #[default]
    Unresolved,
    /// Resolved to a file.
    Found(PathBuf),
    /// Asked for and not found anywhere.
    NotFound,
}

impl PathLookup {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    /// The concrete path of a positive entry.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Found(path) => Some(path),
            _ => None,
        }
    }
}

impl From<Option<PathBuf>> for PathLookup {
    fn from(found: Option<PathBuf>) -> Self {
        found.map_or(Self::NotFound, Self::Found)
    }
}

/// Ordered chain of named providers plus one root provider.
///
/// Lookups walk the named providers in registration order and fall back to
/// the root. The manager is a plain value handed to decoders; share it behind
/// an `Arc` when several threads resolve at once.
#[derive(Default)]
pub struct ContentManager {
    providers: IndexMap<String, Arc<dyn ContentProvider>>,
    root_provider: Option<Arc<dyn ContentProvider>>,
    root_path: Option<PathBuf>,
    /// Every request ever resolved, hits and misses alike. Not bounded:
    /// long-running hosts that resolve open-ended path sets should call
    /// [`flush_cache`](Self::flush_cache) between batches.
    path_cache: Mutex<HashMap<PathBuf, PathLookup>>,
}

impl fmt::Debug for ContentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentManager")
            .field("root", &self.root_path)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("cached_paths", &self.path_cache.lock().len())
            .finish()
    }
}

impl ContentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager rooted at `root`; see [`set_root`](Self::set_root).
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self> {
        let mut manager = Self::new();
        manager.set_root(root)?;
        Ok(manager)
    }

    /// Point the manager at a game root.
    ///
    /// Drops every registration, installs the root provider and registers
    /// each directory under `<root>/addons` as an overlay named after it, in
    /// directory iteration order.
    pub fn set_root(&mut self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::not_found(format!("game root {}", root.display())));
        }
        self.clean();
        self.root_path = Some(root.to_path_buf());
        self.root_provider = Some(Arc::new(DirectoryProvider::root_directory(root)));

        let addons = root.join("addons");
        match fs::read_dir(&addons) {
            Ok(entries) => {
                for entry in entries.filter_map(|e| e.ok()) {
                    let path = entry.path();
                    if path.is_dir() {
                        let provider = DirectoryProvider::addon(path);
                        self.register_content_provider(provider.name().to_string(), Arc::new(provider));
                    }
                }
            }
            Err(e) => debug!("No addons under {}: {e}", addons.display()),
        }
        Ok(())
    }

    /// Register an overlay. The first registration of a name wins; later
    /// ones are ignored and `false` is returned.
    pub fn register_content_provider(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn ContentProvider>,
    ) -> bool {
        let name = name.into();
        if self.providers.contains_key(&name) {
            warn!(
                "Provider \"{name}\" already registered, ignoring {}",
                provider.root().display()
            );
            return false;
        }
        info!("Registered \"{name}\" provider for {}", provider.root().display());
        self.providers.insert(name, provider);
        self.path_cache.lock().clear();
        true
    }

    /// Unregister an overlay, keeping the order of the rest.
    pub fn remove_content_provider(&mut self, name: &str) -> Option<Arc<dyn ContentProvider>> {
        let removed = self.providers.shift_remove(name);
        if removed.is_some() {
            info!("Removed \"{name}\" provider");
            self.path_cache.lock().clear();
        }
        removed
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.root_path.as_deref()
    }

    pub fn root_provider(&self) -> Option<&Arc<dyn ContentProvider>> {
        self.root_provider.as_ref()
    }

    pub fn provider(&self, name: &str) -> Option<&Arc<dyn ContentProvider>> {
        self.providers.get(name)
    }

    /// Named providers in lookup order.
    pub fn providers(&self) -> impl Iterator<Item = (&str, &Arc<dyn ContentProvider>)> {
        self.providers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Named providers followed by the root provider.
    fn search_order(&self) -> impl Iterator<Item = (&str, &Arc<dyn ContentProvider>)> {
        self.providers().chain(self.root_provider.iter().map(|p| ("root", p)))
    }

    /// Open the first match for `logical`.
    ///
    /// `additional_dir` is prepended and `extension` replaces the file
    /// extension. Every provider is tried with the path as given, then with
    /// `_b` appended to the extension. A provider that fails to open its
    /// match is logged and skipped, as if it did not have the file.
    pub fn find_file(
        &self,
        logical: impl AsRef<Path>,
        additional_dir: Option<&str>,
        extension: Option<&str>,
    ) -> Result<Option<ContentStream>> {
        let request = normalize(logical.as_ref(), additional_dir, extension);
        info!("Requesting {} file", request.display());
        let binary = binary_variant(&request);

        for (name, provider) in self.search_order() {
            for candidate in std::iter::once(&request).chain(binary.as_ref()) {
                match provider.find_file(candidate) {
                    Ok(Some(stream)) => {
                        debug!("Found in {name}!");
                        return Ok(Some(stream));
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Provider \"{name}\" failed to open {}: {e}", candidate.display()),
                }
            }
        }
        Ok(None)
    }

    /// Resolve `logical` to a concrete file path.
    ///
    /// Same search as [`find_file`](Self::find_file). Hits and misses are both
    /// cached until the provider set changes or [`flush_cache`](Self::flush_cache).
    pub fn find_path(
        &self,
        logical: impl AsRef<Path>,
        additional_dir: Option<&str>,
        extension: Option<&str>,
    ) -> Option<PathBuf> {
        let request = normalize(logical.as_ref(), additional_dir, extension);
        info!("Requesting {} file", request.display());

        match self.cached_lookup(&request) {
            PathLookup::Found(path) => return Some(path),
            PathLookup::NotFound => return None,
            PathLookup::Unresolved => {}
        }

        let binary = binary_variant(&request);
        let found = self.search_order().find_map(|(name, provider)| {
            let path = provider
                .find_path(&request)
                .or_else(|| binary.as_ref().and_then(|b| provider.find_path(b)))?;
            debug!("Found in {name}!");
            Some(path)
        });
        self.path_cache
            .lock()
            .insert(request, PathLookup::from(found.clone()));
        found
    }

    /// Cache state of an already normalized request.
    pub fn cached_lookup(&self, request: &Path) -> PathLookup {
        self.path_cache.lock().get(request).cloned().unwrap_or_default()
    }

    /// Entries matching `pattern` in every provider, overlays first.
    /// Results are not de-duplicated.
    pub fn glob(&self, pattern: &str) -> Result<GlobIter> {
        let mut iters = Vec::new();
        for (_, provider) in self.search_order() {
            iters.push(provider.glob(pattern)?);
        }
        Ok(Box::new(iters.into_iter().flatten()))
    }

    /// Map a concrete path back to its logical form.
    ///
    /// An absolute path under a provider root is made relative to it; a
    /// relative path is returned unchanged if some provider has it.
    pub fn relative_path(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        let path = path.as_ref();
        self.search_order().find_map(|(_, provider)| {
            if path.is_absolute() {
                path.strip_prefix(provider.root()).ok().map(Path::to_path_buf)
            } else {
                provider.find_path(path).map(|_| path.to_path_buf())
            }
        })
    }

    /// Drop provider stream caches and the path cache.
    pub fn flush_cache(&self) {
        for (_, provider) in self.search_order() {
            provider.flush_cache();
        }
        self.path_cache.lock().clear();
    }

    /// Forget every provider, including the root.
    pub fn clean(&mut self) {
        self.providers.clear();
        self.root_provider = None;
        self.root_path = None;
        self.path_cache.lock().clear();
    }
}

/// Strip surrounding separators, prepend `additional_dir` and swap the
/// extension.
fn normalize(logical: &Path, additional_dir: Option<&str>, extension: Option<&str>) -> PathBuf {
    let raw = logical.to_string_lossy().replace('\\', "/");
    let mut path = PathBuf::from(raw.trim_matches('/'));
    if let Some(dir) = additional_dir.filter(|d| !d.is_empty()) {
        path = Path::new(dir.trim_matches(['/', '\\'])).join(path);
    }
    if let Some(ext) = extension.filter(|e| !e.is_empty()) {
        path.set_extension(ext.trim_start_matches('.'));
    }
    path
}

/// `foo.pmdl` -> `foo.pmdl_b`. Paths without an extension have no variant.
fn binary_variant(path: &Path) -> Option<PathBuf> {
    let ext = path.extension()?.to_string_lossy();
    Some(path.with_extension(format!("{ext}{BINARY_EXTENSION_SUFFIX}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ProviderKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingProvider {
        root: PathBuf,
        calls: AtomicUsize,
    }

    impl ContentProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn root(&self) -> &Path {
            &self.root
        }

        fn find_path(&self, _logical: &Path) -> Option<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/props/crate\\"), Some("models"), Some(".pmdl")),
            PathBuf::from("models/props/crate.pmdl")
        );
        assert_eq!(
            normalize(Path::new("a\\b.pmat"), None, None),
            PathBuf::from("a/b.pmat")
        );
        assert_eq!(
            normalize(Path::new("brick"), Some("materials"), Some("pmat")),
            PathBuf::from("materials/brick.pmat")
        );
    }

    #[test]
    fn test_binary_variant() {
        assert_eq!(
            binary_variant(Path::new("models/a.pmdl")),
            Some(PathBuf::from("models/a.pmdl_b"))
        );
        assert_eq!(binary_variant(Path::new("models/a")), None);
    }

    #[test]
    fn test_negative_results_are_cached() {
        let provider = Arc::new(CountingProvider {
            root: PathBuf::from("/nonexistent"),
            calls: AtomicUsize::new(0),
        });
        let mut manager = ContentManager::new();
        manager.register_content_provider("stub", provider.clone());

        assert_eq!(manager.find_path("models/missing.pmdl", None, None), None);
        // The path and its `_b` variant.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            manager.cached_lookup(Path::new("models/missing.pmdl")),
            PathLookup::NotFound
        );

        assert_eq!(manager.find_path("models/missing.pmdl", None, None), None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        manager.flush_cache();
        assert_eq!(manager.find_path("models/missing.pmdl", None, None), None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_first_registration_wins() {
        let mut manager = ContentManager::new();
        let a: Arc<dyn ContentProvider> = Arc::new(DirectoryProvider::new("a", ProviderKind::Custom, "/a"));
        let b: Arc<dyn ContentProvider> = Arc::new(DirectoryProvider::new("b", ProviderKind::Custom, "/b"));
        assert!(manager.register_content_provider("mod", a));
        assert!(!manager.register_content_provider("mod", b));
        assert_eq!(manager.provider("mod").unwrap().root(), Path::new("/a"));
        assert!(manager.remove_content_provider("mod").is_some());
        assert!(manager.remove_content_provider("mod").is_none());
    }

    #[test]
    fn test_lookup_state() {
        assert!(!PathLookup::Unresolved.is_resolved());
        assert!(PathLookup::NotFound.is_resolved());
        let found = PathLookup::from(Some(PathBuf::from("/x")));
        assert_eq!(found.path(), Some(Path::new("/x")));
        assert_eq!(PathLookup::from(None), PathLookup::NotFound);
    }
}
