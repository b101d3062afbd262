//! UDM format constants.

/// Magic bytes at the start of a binary document.
pub const BINARY_MAGIC: &[u8; 4] = b"UDMB";

/// Keyword opening a text document (`udm_version <n>`).
pub const TEXT_MAGIC: &str = "udm_version";

/// Size of the binary header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 4;

/// Offset of the flags word in the header.
pub const FLAGS_OFFSET: usize = 8;

/// Current format version.
pub const CURRENT_VERSION: u32 = 1;

/// Oldest version this reader accepts.
pub const MIN_VERSION: u32 = 1;

/// Header flag: payload is zlib-compressed.
pub const FLAG_COMPRESSED: u32 = 1 << 0;

/// All flags this reader understands.
pub const KNOWN_FLAGS: u32 = FLAG_COMPRESSED;

/// Length byte announcing a `u32` string length.
pub const LONG_STRING_MARKER: u8 = 0xFF;

/// Engine envelope keys.
pub const KEY_ASSET_TYPE: &str = "assetType";
pub const KEY_ASSET_VERSION: &str = "assetVersion";
pub const KEY_ASSET_DATA: &str = "assetData";

/// Path separator for property addressing.
pub const PATH_SEPARATOR: char = '/';

/// Suffix marking the binary twin of a text asset extension (`.pmat_b`).
pub const BINARY_EXTENSION_SUFFIX: &str = "_b";

/// True if `version` can be read.
#[inline]
pub const fn is_supported_version(version: u32) -> bool {
    version >= MIN_VERSION && version <= CURRENT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic() {
        assert_eq!(BINARY_MAGIC, b"UDMB");
        assert_eq!(HEADER_SIZE, BINARY_MAGIC.len() + 8);
    }

    #[test]
    fn test_versions() {
        assert!(is_supported_version(CURRENT_VERSION));
        assert!(!is_supported_version(0));
        assert!(!is_supported_version(CURRENT_VERSION + 1));
    }
}
