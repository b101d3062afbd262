//! # udm-io
//!
//! Reader and importer for UDM asset documents: models, materials, maps and
//! film projects stored as typed property trees in binary (`*_b`) or text
//! form.
//!
//! ## Modules
//!
//! - [`util`] - Tag table, packed value types, errors, math records
//! - [`udm`] - Document parser, property tree and writer
//! - [`content`] - Logical path resolution over a game root and addons
//! - [`asset`] - Decoders turning documents into plain asset data
//! - [`import`] - Import pipeline driving a [`SceneHost`](import::SceneHost)
//! - [`settings`] - Persistent user settings
//!
//! ## Example
//!
//! ```ignore
//! use udm_io::prelude::*;
//!
//! let content = ContentManager::with_root("/games/engine")?;
//! let importer = Importer::new(&content, ImportOptions::default());
//! let mut host = RecordingHost::new();
//!
//! let path = content.find_path("models/props/crate.pmdl", None, None).unwrap();
//! let report = importer.import_path(&mut host, &path)?;
//! println!("{} objects", report.objects.len());
//! ```

pub mod util;
pub mod udm;
pub mod content;
pub mod asset;
pub mod import;
pub mod settings;

// Re-export commonly used types
pub use util::{Error, Result};
pub use udm::{Document, Property};
pub use content::ContentManager;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, Type};
    pub use crate::udm::{Array, Document, Element, Property, SaveOptions, Value};
    pub use crate::content::{ContentManager, ContentProvider, DirectoryProvider};
    pub use crate::asset::*;
    pub use crate::import::{ImportOptions, ImportReport, Importer, RecordingHost, SceneHost};
    pub use crate::settings::Settings;
}
