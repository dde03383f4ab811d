//! Configuration types for Verso.
//!
//! [`Config`] stores where artifacts live on disk and how this process
//! introduces itself to peers. It is persisted as TOML, typically at
//! `~/.config/verso/config.toml` on Unix systems.
//!
//! # Key Configuration Fields
//!
//! - `data_dir`: Directory holding one `<id>.automerge` file per document
//! - `peer_name`: Stable peer id prefix (a random id is used otherwise)
//! - `ephemeral`: Announce this peer as ephemeral (no durable storage)
//! - `target_schema_version`: Schema version `verso doc show` upgrades documents to
//!
//! # Example
//!
//! ```ignore
//! use verso_core::config::Config;
//!
//! let config = Config::load()?;
//! let repo = Repo::new(Arc::new(FileStorage::open(&config.data_dir)?), config.repo_config());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VersoError};
use crate::repo::RepoConfig;
use crate::transport::{PeerId, PeerMetadata};

/// The parts of Verso the user can configure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for artifact storage
    pub data_dir: PathBuf,

    /// Prefix for this process's peer id.
    /// A random suffix is always appended so two windows never collide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_name: Option<String>,

    /// Announce this peer as ephemeral
    #[serde(default)]
    pub ephemeral: bool,

    /// Schema version `verso doc show` upgrades documents to before printing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema_version: Option<u32>,

    /// Storage identity sent in peer metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<String>,
}

impl Config {
    /// Create a new config storing artifacts under `data_dir`
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            peer_name: None,
            ephemeral: false,
            target_schema_version: None,
            storage_id: None,
        }
    }

    /// A fresh peer id, prefixed with `peer_name` when set.
    pub fn peer_id(&self) -> PeerId {
        PeerId::generate(self.peer_name.as_deref().unwrap_or("peer"))
    }

    /// Metadata announced in `join` and `peer` messages.
    pub fn peer_metadata(&self) -> PeerMetadata {
        PeerMetadata {
            storage_id: self.storage_id.clone(),
            is_ephemeral: self.ephemeral,
        }
    }

    /// Identity for a [`Repo`](crate::repo::Repo) built from this config.
    pub fn repo_config(&self) -> RepoConfig {
        RepoConfig {
            peer_id: self.peer_id(),
            metadata: self.peer_metadata(),
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| VersoError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| VersoError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| VersoError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Load config from `path`, or fall back to one rooted at `data_dir`.
    pub fn load_from_or_default(path: &Path, data_dir: PathBuf) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config, {:?} not loaded: {}", path, e);
                Self::new(data_dir)
            }
        }
    }
}

// ============================================================================
// Native-only implementation (not available in WASM)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("verso");
        Self::new(data_dir)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/verso/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("verso").join("config.toml"))
    }

    /// Load config from the default location, or return the default if the
    /// file doesn't exist.
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }
        Ok(Config::default())
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(VersoError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Write a fresh config to the default location and return it.
    pub fn init(data_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }
        config.save()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::new(PathBuf::from("/tmp/verso-data"));
        config.peer_name = Some("desk".to_string());
        config.target_schema_version = Some(3);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: Config = toml::from_str("data_dir = \"/data\"").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert!(!config.ephemeral);
        assert_eq!(config.peer_name, None);
        assert_eq!(config.target_schema_version, None);
    }

    #[test]
    fn test_unset_fields_are_not_written() {
        let text = toml::to_string_pretty(&Config::new(PathBuf::from("/data"))).unwrap();
        assert!(text.contains("data_dir"));
        assert!(!text.contains("peer_name"));
        assert!(!text.contains("storage_id"));
    }

    #[test]
    fn test_load_missing_file_is_file_read_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.toml");
        assert!(matches!(
            Config::load_from(&path),
            Err(VersoError::FileRead { .. })
        ));

        let fallback = Config::load_from_or_default(&path, PathBuf::from("/fallback"));
        assert_eq!(fallback.data_dir, PathBuf::from("/fallback"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "data_dir = [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(VersoError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_repo_identity() {
        let mut config = Config::new(PathBuf::from("/data"));
        config.peer_name = Some("window".to_string());
        config.ephemeral = true;
        config.storage_id = Some("disk-1".to_string());

        let repo_config = config.repo_config();
        assert!(repo_config.peer_id.as_str().starts_with("window"));
        assert_eq!(
            repo_config.metadata,
            PeerMetadata {
                storage_id: Some("disk-1".to_string()),
                is_ephemeral: true,
            }
        );
        assert_ne!(config.peer_id(), config.peer_id());
    }
}
