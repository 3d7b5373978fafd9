use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::component::Component;
use crate::error::{FfError, Result};

/// Default bound for strings read back from library memory.
pub const DEFAULT_MAX_STRING_LEN: usize = 64 * 1024;

/// Where to find each FFmpeg library and how strictly to check it.
///
/// ```toml
/// search_dir = "/opt/ffmpeg/lib"
/// verify_version = true
///
/// [libraries]
/// avutil = "/opt/ffmpeg/lib/libavutil.so.56"
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Directory joined with [`Component::default_file_name`] for components
    /// without an explicit path.
    pub search_dir: Option<PathBuf>,

    /// Compare each library's major version with the mirrored ABI on load.
    pub verify_version: bool,

    /// Upper bound on NUL scans over library-owned strings, terminator
    /// included. Must be at least 1.
    pub max_string_len: usize,

    /// Explicit per-component paths.
    pub libraries: BTreeMap<Component, PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            search_dir: None,
            verify_version: true,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            libraries: BTreeMap::new(),
        }
    }
}

impl LibraryConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no registry could work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_string_len == 0 {
            return Err(FfError::InvalidConfig(
                "max_string_len must be at least 1 to fit the NUL terminator".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FfError::MissingConfig(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Overrides the library path of one component.
    pub fn set_path(&mut self, component: Component, path: impl Into<PathBuf>) {
        self.libraries.insert(component, path.into());
    }

    /// Builder form of [`set_path`](Self::set_path).
    pub fn with_path(mut self, component: Component, path: impl Into<PathBuf>) -> Self {
        self.set_path(component, path);
        self
    }

    /// Sets the directory searched for components without explicit paths.
    pub fn set_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dir = Some(dir.into());
    }

    /// Path handed to the loader for `component`.
    pub fn path_for(&self, component: Component) -> PathBuf {
        if let Some(path) = self.libraries.get(&component) {
            return path.clone();
        }
        let file = component.default_file_name();
        match &self.search_dir {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_verify_and_use_platform_names() {
        let config = LibraryConfig::default();
        assert!(config.verify_version);
        assert_eq!(config.max_string_len, DEFAULT_MAX_STRING_LEN);
        assert_eq!(
            config.path_for(Component::AvFilter),
            PathBuf::from(Component::AvFilter.default_file_name())
        );
    }

    #[test]
    fn explicit_path_beats_search_dir() {
        let config = LibraryConfig::from_toml_str(
            r#"
            search_dir = "/opt/ffmpeg/lib"
            verify_version = false

            [libraries]
            avutil = "/tmp/libavutil-custom.so"
            "#,
        )
        .unwrap();

        assert!(!config.verify_version);
        assert_eq!(
            config.path_for(Component::AvUtil),
            PathBuf::from("/tmp/libavutil-custom.so")
        );
        assert_eq!(
            config.path_for(Component::SwScale),
            Path::new("/opt/ffmpeg/lib").join(Component::SwScale.default_file_name())
        );
    }

    #[test]
    fn rejects_unknown_component() {
        let err = LibraryConfig::from_toml_str("[libraries]\navframe = \"x\"\n").unwrap_err();
        assert!(matches!(err, FfError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffdyn.toml");
        std::fs::write(&path, "max_string_len = 256\n[libraries]\nswresample = \"libswr.so\"\n").unwrap();

        let config = LibraryConfig::load(&path).unwrap();
        assert_eq!(config.max_string_len, 256);
        assert_eq!(config.path_for(Component::SwResample), PathBuf::from("libswr.so"));

        let missing = dir.path().join("absent.toml");
        assert!(matches!(LibraryConfig::load(&missing), Err(FfError::MissingConfig(_))));
    }

    #[test]
    fn zero_string_bound_is_rejected() {
        let err = LibraryConfig::from_toml_str("max_string_len = 0\n").unwrap_err();
        assert!(matches!(err, FfError::InvalidConfig(_)), "{err}");
        assert!(LibraryConfig::from_toml_str("max_string_len = 1\n").is_ok());
    }

    #[test]
    fn setter_overrides_loaded_value() {
        let mut config = LibraryConfig::default().with_path(Component::AvUtil, "a.so");
        config.set_path(Component::AvUtil, "b.so");
        assert_eq!(config.path_for(Component::AvUtil), PathBuf::from("b.so"));
    }
}
