//! Content resolution.
//!
//! A [`ContentManager`] turns logical asset paths such as
//! `models/props/crate.pmdl` into files by probing an ordered chain of
//! [`ContentProvider`]s:
//!
//! ```text
//! <root>/addons/<a>/...   overlays, in registration order
//! <root>/addons/<b>/...
//! <root>/...              root provider, consulted last
//! ```
//!
//! Each provider is asked for the path as given and then for its binary
//! `_b` variant (`crate.pmdl_b`).

mod cache;
mod provider;
mod manager;

pub use cache::{StreamCache, STREAM_CACHE_CAPACITY};
pub use provider::{
    find_under, glob_under, sanitize, ContentProvider, ContentStream, DirectoryProvider, GlobIter,
    ProviderKind,
};
pub use manager::{ContentManager, PathLookup};
