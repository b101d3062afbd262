//! UDM document format.
//!
//! A UDM document is a tree of typed properties: scalars, arrays and named
//! elements. Files come in two flavours:
//!
//! ```text
//! Binary:
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (12 bytes)                                            │
//! │   - Magic: "UDMB" (4 bytes)                                  │
//! │   - Version: u32                                             │
//! │   - Flags: u32 (bit 0: payload is zlib-compressed)           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (optionally u64 size + zlib stream)                  │
//! │   - Root tag: u8 (always Element)                            │
//! │   - Element: u64 body size, u32 count, (key, tag, value)*    │
//! │   - Array: item tag, [layout], u32 count, u64 size, payload  │
//! └──────────────────────────────────────────────────────────────┘
//!
//! Text:
//!   udm_version 1
//!   $string assetType "PMDL"
//!   assetData { ... }
//! ```
//!
//! Numeric arrays of a binary document are not copied at load time; see
//! [`Array::array_value`].

pub mod format;
mod streams;
mod reader;
mod value;
mod array;
mod property;
mod compression;
mod binary;
mod writer;
mod text;
mod document;

pub use streams::IStreams;
pub use reader::{decode_latin1, encode_latin1, is_latin1, BinaryReader};
pub use value::{FromValue, StructLayout, StructMember, StructValue, Value};
pub use array::{Array, ArrayBuffer};
pub use property::{Element, Property};
pub use compression::{compress, decompress, lz4_compress, lz4_decompress};
pub use binary::{parse_header, Header};
pub use writer::{encode_document, write_document, OStream};
pub use text::{parse_text, write_text};
pub use document::{Document, DocumentFormat, SaveOptions};
