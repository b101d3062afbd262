//! Persistent settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::asset::BindPoseMode;
use crate::import::ImportOptions;
use crate::util::Result;

/// Environment variable that overrides [`Settings::game_root`].
pub const GAME_ROOT_ENV: &str = "UDM_GAME_ROOT";

const MAX_RECENT_FILES: usize = 10;

/// Settings that persist between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Content
    pub game_root: Option<PathBuf>,

    // Import
    pub scale: f32,
    pub bind_pose: BindPoseMode,
    pub import_materials: bool,
    pub single_collection: bool,

    // Loading
    pub use_mmap: bool,

    // Recent files (most recent first, max 10)
    pub recent_files: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let import = ImportOptions::default();
        Self {
            game_root: None,
            scale: import.scale,
            bind_pose: import.bind_pose,
            import_materials: import.import_materials,
            single_collection: import.single_collection,
            use_mmap: import.use_mmap,
            recent_files: Vec::new(),
        }
    }
}

impl Settings {
    /// Settings file path
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("udm-io");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from the config dir, falling back to defaults.
    pub fn load() -> Self {
        let mut settings = Self::path()
            .and_then(|p| Self::load_from(&p).ok())
            .unwrap_or_default();
        settings.apply_env();
        settings
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&text)?;
        if !settings.scale.is_finite() || settings.scale <= 0.0 {
            settings.scale = 1.0;
        }
        Ok(settings)
    }

    /// Save settings to the config dir
    pub fn save(&self) -> Result<()> {
        match Self::path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Let `UDM_GAME_ROOT` override the stored root.
    pub fn apply_env(&mut self) {
        if let Some(root) = std::env::var_os(GAME_ROOT_ENV).filter(|r| !r.is_empty()) {
            self.game_root = Some(PathBuf::from(root));
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            scale: self.scale,
            bind_pose: self.bind_pose,
            import_materials: self.import_materials,
            single_collection: self.single_collection,
            use_mmap: self.use_mmap,
        }
    }

    /// Add file to recent files list (moves to top if already present)
    pub fn add_recent(&mut self, path: PathBuf) {
        self.recent_files.retain(|p| p != &path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(MAX_RECENT_FILES);
    }

    /// Recent files that still exist
    pub fn recent_files(&self) -> Vec<&PathBuf> {
        self.recent_files.iter().filter(|p| p.exists()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            game_root: Some(PathBuf::from("/games/engine")),
            scale: 0.025,
            bind_pose: BindPoseMode::AxisSnapped,
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "scale": -3.0, "import_materials": false }"#).unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.scale, 1.0);
        assert!(!settings.import_materials);
        assert_eq!(settings.bind_pose, BindPoseMode::Direct);
        assert!(!settings.import_options().import_materials);
    }

    #[test]
    fn test_recent_files() {
        let mut settings = Settings::default();
        for i in 0..12 {
            settings.add_recent(PathBuf::from(format!("{i}.pmdl")));
        }
        settings.add_recent(PathBuf::from("5.pmdl"));
        assert_eq!(settings.recent_files.len(), MAX_RECENT_FILES);
        assert_eq!(settings.recent_files[0], PathBuf::from("5.pmdl"));
        assert_eq!(settings.recent_files.iter().filter(|p| p.ends_with("5.pmdl")).count(), 1);
    }
}
