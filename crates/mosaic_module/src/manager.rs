//! Module manager
//!
//! Owns every loaded module, keyed by logical name, and is the single writer
//! of the interface registry. Loads are idempotent per name and fail-fast: any
//! failure while loading unwinds everything this manager has loaded so far.

use crate::error::{ModuleError, RegistryError, Result};
use crate::library::library_file_name;
use crate::registry::{InterfaceEntry, InterfaceId, InterfaceRegistry};
use crate::source::{ModuleImage, ModuleSource, NativeSource};
use mosaic_core::{Handle, SlotMap};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Handle to a loaded module
pub type ModuleId = Handle<LoadedModule>;

/// Ordered binary search roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    roots: Vec<PathBuf>,
}

impl SearchPaths {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a root searched before all existing ones
    pub fn prepend(&mut self, root: impl Into<PathBuf>) {
        self.roots.insert(0, root.into());
    }

    pub fn push(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Map a logical module name to the first existing library file
    ///
    /// `name` may carry a relative directory (`plugins/physics`); only the
    /// final component is turned into a platform library file name.
    pub fn find_library(&self, name: &str) -> Result<PathBuf> {
        let logical = Path::new(name);
        let file_name = logical
            .file_name()
            .map(|f| library_file_name(&f.to_string_lossy()))
            .ok_or_else(|| ModuleError::ModuleNotFound {
                name: name.to_string(),
                searched: Vec::new(),
            })?;

        let relative = match logical.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        };

        let mut searched = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate);
        }

        Err(ModuleError::ModuleNotFound {
            name: name.to_string(),
            searched,
        })
    }
}

/// A declared dependency of the application on one system interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRequirement {
    /// Logical module name
    pub module: String,
    /// Interface name
    pub interface: String,
    /// Interface version hash
    pub hash: u64,
    /// Optional requirements are skipped instead of failing the batch
    pub required: bool,
}

impl SystemRequirement {
    pub fn new(module: impl Into<String>, interface: impl Into<String>, hash: u64) -> Self {
        Self {
            module: module.into(),
            interface: interface.into(),
            hash,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Outcome of one requirement in a resolved batch
#[derive(Debug, Clone)]
pub struct ResolvedRequirement {
    pub requirement: SystemRequirement,
    /// `None` only for optional requirements that failed
    pub interface: Option<InterfaceId>,
}

/// Result of [`ModuleManager::resolve_requirements`], in requirement order
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    entries: Vec<ResolvedRequirement>,
}

impl Resolution {
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedRequirement> {
        self.entries.iter()
    }

    /// Interface id resolved for an interface name
    pub fn get(&self, interface: &str) -> Option<InterfaceId> {
        self.entries
            .iter()
            .find(|e| e.requirement.interface == interface)
            .and_then(|e| e.interface)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A library loaded by the manager
pub struct LoadedModule {
    name: String,
    image: Box<dyn ModuleImage>,
}

impl LoadedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.image.path()
    }
}

/// Loads modules and publishes their interfaces
pub struct ModuleManager {
    source: Box<dyn ModuleSource>,
    search: SearchPaths,
    modules: SlotMap<LoadedModule>,
    by_name: HashMap<String, ModuleId>,
    load_order: Vec<ModuleId>,
    registry: InterfaceRegistry,
}

impl ModuleManager {
    /// Create a manager that loads real dynamic libraries
    pub fn new(search: SearchPaths) -> Self {
        Self::with_source(search, NativeSource)
    }

    /// Create a manager with a custom module source
    pub fn with_source(search: SearchPaths, source: impl ModuleSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            search,
            modules: SlotMap::new(),
            by_name: HashMap::new(),
            load_order: Vec::new(),
            registry: InterfaceRegistry::new(),
        }
    }

    pub fn search_paths(&self) -> &SearchPaths {
        &self.search
    }

    // ========== Loading ==========

    /// Load a module by logical name
    ///
    /// Returns the existing id when already loaded. On failure every module
    /// loaded by this manager is unloaded before the error is returned.
    pub fn load_module(&mut self, name: &str) -> Result<ModuleId> {
        match self.open_module(name) {
            Ok(id) => Ok(id),
            Err(e) => {
                log::error!("Failed to load module '{}': {}", name, e);
                self.unload_all();
                Err(e)
            }
        }
    }

    /// Load and publish one module without rolling anything back on failure
    fn open_module(&mut self, name: &str) -> Result<ModuleId> {
        if let Some(id) = self.by_name.get(name) {
            return Ok(*id);
        }

        let path = self.search.find_library(name)?;
        let mut image = self.source.open(&path)?;

        let exports = match image.interfaces() {
            Ok(exports) => exports,
            Err(e) => {
                image.close();
                return Err(e);
            }
        };

        log::debug!("Loading module '{}' from {}", name, path.display());

        let id = self.modules.insert(LoadedModule {
            name: name.to_string(),
            image,
        });

        for export in exports {
            log::debug!("    Found interface: {} - version {:#x}", export.name, export.hash);
            if let Err(e) = self.registry.publish(id, export) {
                // First registration wins; the shadowed export is dropped
                log::warn!("Module '{}': {}", name, e);
            }
        }

        self.by_name.insert(name.to_string(), id);
        self.load_order.push(id);

        log::info!("Loaded module '{}'", name);
        Ok(id)
    }

    /// Resolve a batch of requirements
    ///
    /// Every requirement is attempted; all failures of required entries are
    /// reported together. If any required entry fails, every loaded module is
    /// unloaded and no resolution is returned.
    pub fn resolve_requirements(&mut self, requirements: &[SystemRequirement]) -> Result<Resolution> {
        let mut failures: Vec<String> = Vec::new();
        let mut failed_modules: HashSet<String> = HashSet::new();
        let mut entries = Vec::with_capacity(requirements.len());

        for req in requirements {
            let interface = match self.resolve_one(req, &mut failed_modules) {
                Ok(id) => Some(id),
                Err(failure) => {
                    if req.required && !failures.contains(&failure) {
                        failures.push(failure);
                    }
                    None
                }
            };
            entries.push(ResolvedRequirement {
                requirement: req.clone(),
                interface,
            });
        }

        if !failures.is_empty() {
            let err = ModuleError::Unresolved { failures };
            log::error!("{}", err);
            self.unload_all();
            return Err(err);
        }

        Ok(Resolution { entries })
    }

    /// Resolve a single requirement
    ///
    /// Unlike [`resolve_requirements`](Self::resolve_requirements) nothing is
    /// unloaded on failure; a module that loaded but lacks the interface stays
    /// loaded, and the caller decides how to unwind.
    pub fn resolve_requirement(&mut self, req: &SystemRequirement) -> Result<InterfaceId> {
        self.resolve_one(req, &mut HashSet::new())
            .map_err(|failure| ModuleError::Unresolved {
                failures: vec![failure],
            })
    }

    /// Returns the failure line reported for `req` when it cannot be resolved
    fn resolve_one(
        &mut self,
        req: &SystemRequirement,
        failed_modules: &mut HashSet<String>,
    ) -> std::result::Result<InterfaceId, String> {
        if failed_modules.contains(&req.module) {
            return Err(req.module.clone());
        }

        if let Err(e) = self.open_module(&req.module) {
            if req.required {
                log::error!("Failed to load module '{}': {}", req.module, e);
            } else {
                log::warn!("Failed to load optional module '{}': {}", req.module, e);
            }
            failed_modules.insert(req.module.clone());
            return Err(req.module.clone());
        }

        match self.registry.resolve(&req.interface, req.hash) {
            Ok(id) => Ok(id),
            Err(RegistryError::InterfaceMismatch { available, .. }) => {
                log::error!(
                    "Found interface '{}' but version is different: app version {:#x} - module version {:x?}",
                    req.interface,
                    req.hash,
                    available
                );
                Err(format!(
                    "{} - {} Version {:#x} (incompatible, module provides {:x?})",
                    req.module, req.interface, req.hash, available
                ))
            }
            Err(e) => {
                log::error!("Failed to load system from module '{}': {}", req.module, e);
                Err(format!("{} - {} Version {:#x}", req.module, req.interface, req.hash))
            }
        }
    }

    // ========== Unloading ==========

    /// Unload one module. Unknown names are ignored.
    pub fn unload_module(&mut self, name: &str) -> bool {
        let Some(id) = self.by_name.remove(name) else {
            return false;
        };
        self.load_order.retain(|m| *m != id);
        self.release(id);
        true
    }

    /// Unload every module in reverse load order. Safe to call repeatedly.
    pub fn unload_all(&mut self) {
        while let Some(id) = self.load_order.pop() {
            self.release(id);
        }
        self.by_name.clear();
    }

    /// Invalidate a module's interfaces, then close it
    fn release(&mut self, id: ModuleId) {
        let invalidated = self.registry.invalidate_module(id);
        if let Some(mut module) = self.modules.remove(id) {
            module.image.close();
            log::info!(
                "Unloaded module '{}' ({} interfaces invalidated)",
                module.name,
                invalidated
            );
        }
    }

    // ========== Queries ==========

    pub fn is_loaded(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Loaded module names in load order
    pub fn loaded_modules(&self) -> Vec<&str> {
        self.load_order
            .iter()
            .filter_map(|id| self.modules.get(*id))
            .map(LoadedModule::name)
            .collect()
    }

    pub fn module(&self, id: ModuleId) -> Option<&LoadedModule> {
        self.modules.get(id)
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }

    /// Shorthand for `registry().get(id)`
    pub fn interface(&self, id: InterfaceId) -> Option<&InterfaceEntry> {
        self.registry.get(id)
    }
}

impl Drop for ModuleManager {
    fn drop(&mut self) {
        self.unload_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_paths_first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let file = library_file_name("core");
        std::fs::write(first.path().join(&file), b"").unwrap();
        std::fs::write(second.path().join(&file), b"").unwrap();

        let search = SearchPaths::new([first.path(), second.path()]);
        assert_eq!(search.find_library("core").unwrap(), first.path().join(&file));
    }

    #[test]
    fn test_search_paths_subdirectory_names() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("plugins")).unwrap();
        let expected = root.path().join("plugins").join(library_file_name("physics"));
        std::fs::write(&expected, b"").unwrap();

        let search = SearchPaths::new([root.path()]);
        assert_eq!(search.find_library("plugins/physics").unwrap(), expected);
    }

    #[test]
    fn test_search_paths_reports_every_candidate() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let search = SearchPaths::new([a.path(), b.path()]);

        match search.find_library("missing") {
            Err(ModuleError::ModuleNotFound { name, searched }) => {
                assert_eq!(name, "missing");
                assert_eq!(searched.len(), 2);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_requirement_builder() {
        let req = SystemRequirement::new("audio", "Audio", 3).optional();
        assert!(!req.required);
        assert_eq!(req.module, "audio");
    }
}
