//! Console variables
//!
//! Systems declare convars; the registry merges the declarations after every
//! system has initialized. Values saved by a previous run are loaded from the
//! archive before any init and override declared defaults.
//!
//! Archive format:
//!
//! ```toml
//! [convars]
//! r_vsync = "1"
//! snd_volume = "0.8"
//! ```

use crate::error::{KernelError, Result};
use mosaic_module::abi::{ConVarExport, CONVAR_ARCHIVE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A convar declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConVarDecl {
    pub name: String,
    pub default_value: String,
    pub description: String,
    pub flags: u32,
}

impl ConVarDecl {
    pub fn new(name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: default_value.into(),
            description: String::new(),
            flags: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Persist this convar across runs
    pub fn archived(mut self) -> Self {
        self.flags |= CONVAR_ARCHIVE;
        self
    }
}

impl From<ConVarExport> for ConVarDecl {
    fn from(export: ConVarExport) -> Self {
        Self {
            name: export.name,
            default_value: export.default_value,
            description: export.description,
            flags: export.flags,
        }
    }
}

/// A declared convar and its current value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConVar {
    decl: ConVarDecl,
    value: String,
}

impl ConVar {
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn default_value(&self) -> &str {
        &self.decl.default_value
    }

    pub fn description(&self) -> &str {
        &self.decl.description
    }

    pub fn is_archived(&self) -> bool {
        self.decl.flags & CONVAR_ARCHIVE != 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConVarArchive {
    #[serde(default)]
    convars: BTreeMap<String, String>,
}

/// Global convar table
#[derive(Debug, Default)]
pub struct ConVarRegistry {
    vars: BTreeMap<String, ConVar>,
    /// Values loaded from the archive, applied when the convar is declared
    archived: BTreeMap<String, String>,
}

impl ConVarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load saved values. A missing archive is not an error.
    ///
    /// Returns how many values were loaded.
    pub fn load_archive(&mut self, path: &Path) -> Result<usize> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No convar archive at {}", path.display());
                return Ok(0);
            }
            Err(source) => {
                return Err(KernelError::ArchiveIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let archive: ConVarArchive =
            toml::from_str(&content).map_err(|source| KernelError::ArchiveParse {
                path: path.to_path_buf(),
                source,
            })?;

        let count = archive.convars.len();
        for (name, value) in archive.convars {
            if let Some(var) = self.vars.get_mut(&name) {
                var.value = value.clone();
            }
            self.archived.insert(name, value);
        }

        log::info!("Loaded {} convars from {}", count, path.display());
        Ok(count)
    }

    /// Write every archive-flagged convar
    pub fn save_archive(&self, path: &Path) -> Result<()> {
        let archive = ConVarArchive {
            convars: self
                .vars
                .values()
                .filter(|v| v.is_archived())
                .map(|v| (v.name().to_string(), v.value.clone()))
                .collect(),
        };
        let content = toml::to_string_pretty(&archive)?;

        let io_err = |source| KernelError::ArchiveIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)?;

        log::info!("Archived {} convars to {}", archive.convars.len(), path.display());
        Ok(())
    }

    /// Declare a convar. The first declaration of a name wins.
    ///
    /// Returns `false` when the name was already declared.
    pub fn declare(&mut self, decl: ConVarDecl) -> bool {
        if self.vars.contains_key(&decl.name) {
            log::warn!("Convar '{}' declared twice, keeping the first", decl.name);
            return false;
        }

        let value = self
            .archived
            .get(&decl.name)
            .cloned()
            .unwrap_or_else(|| decl.default_value.clone());
        self.vars.insert(decl.name.clone(), ConVar { decl, value });
        true
    }

    pub fn get(&self, name: &str) -> Option<&ConVar> {
        self.vars.get(name)
    }

    /// Current value of a convar
    pub fn value(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(ConVar::value)
    }

    /// Set a declared convar. Returns `false` for unknown names.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.vars.get_mut(name) {
            Some(var) => {
                var.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Convars in name order
    pub fn iter(&self) -> impl Iterator<Item = &ConVar> {
        self.vars.values()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_declaration_wins() {
        let mut convars = ConVarRegistry::new();
        assert!(convars.declare(ConVarDecl::new("r_vsync", "1")));
        assert!(!convars.declare(ConVarDecl::new("r_vsync", "0")));
        assert_eq!(convars.value("r_vsync"), Some("1"));
    }

    #[test]
    fn test_set_unknown_is_rejected() {
        let mut convars = ConVarRegistry::new();
        assert!(!convars.set("missing", "1"));
        convars.declare(ConVarDecl::new("fov", "90"));
        assert!(convars.set("fov", "100"));
        assert_eq!(convars.get("fov").map(ConVar::default_value), Some("90"));
    }

    #[test]
    fn test_missing_archive_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut convars = ConVarRegistry::new();
        assert_eq!(convars.load_archive(&dir.path().join("none.toml")).unwrap(), 0);
    }

    #[test]
    fn test_archive_round_trip_only_keeps_archived_vars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.toml");

        let mut first = ConVarRegistry::new();
        first.declare(ConVarDecl::new("snd_volume", "1.0").archived());
        first.declare(ConVarDecl::new("developer", "0"));
        first.set("snd_volume", "0.25");
        first.set("developer", "1");
        first.save_archive(&path).unwrap();

        let mut second = ConVarRegistry::new();
        assert_eq!(second.load_archive(&path).unwrap(), 1);
        second.declare(ConVarDecl::new("snd_volume", "1.0").archived());
        second.declare(ConVarDecl::new("developer", "0"));

        assert_eq!(second.value("snd_volume"), Some("0.25"));
        assert_eq!(second.value("developer"), Some("0"));
    }

    #[test]
    fn test_malformed_archive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "convars = 3").unwrap();

        let mut convars = ConVarRegistry::new();
        assert!(matches!(
            convars.load_archive(&path),
            Err(KernelError::ArchiveParse { .. })
        ));
    }
}
