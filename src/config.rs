//! Configuration Management
//!
//! Handles persistent configuration storage for sideload.

use crate::resource::PageDefaults;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Page size when a request names none
    #[serde(default)]
    pub default_page_size: Option<u32>,
    /// Largest page size a request may ask for
    #[serde(default)]
    pub max_page_size: Option<u32>,
    /// Paginate sideloaded types with the default page
    #[serde(default)]
    pub paginate_sideloads: Option<bool>,
    /// REST backend base URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Last schema file used
    #[serde(default)]
    pub last_schema: Option<PathBuf>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sideload").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load from an explicit path; missing or malformed files give defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective page defaults (config > schema file > built-in)
    pub fn effective_page_defaults(&self, schema: PageDefaults) -> PageDefaults {
        PageDefaults {
            size: self.default_page_size.unwrap_or(schema.size),
            max_size: self.max_page_size.unwrap_or(schema.max_size),
            paginate_sideloads: self.paginate_sideloads.unwrap_or(schema.paginate_sideloads),
        }
    }

    /// Get effective endpoint (CLI > config)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string).or_else(|| self.endpoint.clone())
    }

    /// Get effective schema path (CLI > config)
    pub fn effective_schema(&self, cli: Option<&Path>) -> Option<PathBuf> {
        cli.map(Path::to_path_buf).or_else(|| self.last_schema.clone())
    }

    /// Remember the schema path and save
    pub fn set_last_schema(&mut self, path: &Path) -> Result<()> {
        self.last_schema = Some(path.to_path_buf());
        self.save()
    }
}
