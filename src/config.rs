use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub photos: PhotoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    /// External image tool used to derive web renditions. Anything with an
    /// ImageMagick-compatible command line works.
    #[serde(default = "default_convert_command")]
    pub convert_command: String,

    /// Default batch size for `process` when no limit is given.
    #[serde(default = "default_process_limit")]
    pub process_limit: usize,
}

fn default_convert_command() -> String {
    "convert".to_string()
}

fn default_process_limit() -> usize {
    5
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            convert_command: default_convert_command(),
            process_limit: default_process_limit(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hikelog")
        .join("hikelog.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            photos: PhotoConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hikelog")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
