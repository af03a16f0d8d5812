//! App info
//!
//! Describes where an application's binaries and assets live. Loaded from a
//! TOML file; relative paths are resolved against the file's directory.
//!
//! # Example
//!
//! ```toml
//! name = "sidury"
//! binary_paths = ["bin/linux64"]
//! asset_paths = ["assets"]
//! convar_archive = "cfg/config.toml"
//!
//! [resources]
//! poll_interval_ms = 250
//! ```
//!
//! # Overrides
//!
//! `MOSAIC_BIN_PATH` (platform path-list syntax) adds binary roots searched
//! before the configured ones.

use crate::error::{KernelError, Result};
use mosaic_module::SearchPaths;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prepending binary search roots
pub const BIN_PATH_ENV: &str = "MOSAIC_BIN_PATH";

/// Resource tracker settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Minimum time between polls; 0 polls on every tick
    pub poll_interval_ms: u64,
}

impl ResourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Application descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub name: String,
    /// Module search roots, in priority order
    pub binary_paths: Vec<PathBuf>,
    pub asset_paths: Vec<PathBuf>,
    /// Where archived convars are kept between runs
    pub convar_archive: Option<PathBuf>,
    pub resources: ResourceConfig,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "mosaic".to_string(),
            binary_paths: Vec::new(),
            asset_paths: Vec::new(),
            convar_archive: None,
            resources: ResourceConfig::default(),
        }
    }
}

impl AppInfo {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| KernelError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let mut info: AppInfo = toml::from_str(&content).map_err(|source| KernelError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            info.rebase(base);
        }

        log::info!("Loaded app info '{}' from {}", info.name, path.display());
        Ok(info)
    }

    /// Resolve every relative path against `base`
    pub fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.binary_paths.iter_mut().for_each(join);
        self.asset_paths.iter_mut().for_each(join);
        if let Some(archive) = self.convar_archive.as_mut() {
            join(archive);
        }
    }

    /// Module search roots, with `MOSAIC_BIN_PATH` entries first
    pub fn search_paths(&self) -> SearchPaths {
        self.search_paths_with(std::env::var_os(BIN_PATH_ENV))
    }

    /// Module search roots with an explicit override path list
    pub fn search_paths_with(&self, overrides: Option<OsString>) -> SearchPaths {
        let mut search = SearchPaths::new(self.binary_paths.iter().cloned());
        if let Some(list) = overrides {
            let extra: Vec<PathBuf> = std::env::split_paths(&list)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            for root in extra.into_iter().rev() {
                log::debug!("Binary path from env: {}", root.display());
                search.prepend(root);
            }
        }
        search
    }

    /// First existing file named `relative` under the asset roots
    pub fn find_asset(&self, relative: impl AsRef<Path>) -> Option<PathBuf> {
        self.asset_paths
            .iter()
            .map(|root| root.join(relative.as_ref()))
            .find(|p| p.is_file())
    }
}
