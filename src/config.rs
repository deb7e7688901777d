use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TransferError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub keywords: KeywordConfig,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Parent of all person keywords.
    #[serde(default = "default_face_root")]
    pub face_root: String,

    /// Parent of all free keywords. Empty places them under the catalog's
    /// keyword root.
    #[serde(default = "default_tag_root")]
    pub tag_root: String,

    /// Rewrite every keyword name to composed Unicode after the transfer.
    #[serde(default = "default_true")]
    pub normalize_names: bool,
}

fn default_face_root() -> String {
    "Faces from Aperture".to_string()
}

fn default_tag_root() -> String {
    "Tags from Aperture".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            face_root: default_face_root(),
            tag_root: default_tag_root(),
            normalize_names: default_true(),
        }
    }
}

/// Locations of the two stores inside an `.aplibrary` bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_library_database")]
    pub database: PathBuf,

    #[serde(default = "default_faces_database")]
    pub faces_database: PathBuf,
}

fn default_library_database() -> PathBuf {
    PathBuf::from("Database").join("Library.apdb")
}

fn default_faces_database() -> PathBuf {
    PathBuf::from("Database").join("Faces.db")
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            database: default_library_database(),
            faces_database: default_faces_database(),
        }
    }
}

/// Which parts of the library get transferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_true")]
    pub faces: bool,

    #[serde(default = "default_true")]
    pub keywords: bool,

    #[serde(default = "default_true")]
    pub stacks: bool,

    #[serde(default = "default_true")]
    pub gps: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            faces: true,
            keywords: true,
            stacks: true,
            gps: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Directory for the rolling log file. Defaults to the local data dir.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: KeywordConfig::default(),
            library: LibraryConfig::default(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from `CATALOG_BRIDGE_CONFIG` or the default location. A missing
    /// file yields the defaults.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("CATALOG_BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TransferError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("catalog-bridge")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
