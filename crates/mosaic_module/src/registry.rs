//! Interface registry
//!
//! Table of published interfaces keyed by exact (name, hash). Entries point
//! into library memory, so they are addressed by generational [`InterfaceId`]
//! handles: once the owning module is invalidated every id issued for it stops
//! resolving instead of dangling. The module manager is the only writer and
//! must call [`InterfaceRegistry::invalidate_module`] before closing a library.

use crate::abi::{FfiLifecycle, InterfaceExport};
use crate::error::RegistryError;
use crate::manager::ModuleId;
use mosaic_core::SlotMap;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Handle to a published interface
pub type InterfaceId = mosaic_core::Handle<InterfaceEntry>;

/// A published interface
#[derive(Debug)]
pub struct InterfaceEntry {
    name: String,
    hash: u64,
    owner: ModuleId,
    instance: NonNull<c_void>,
    lifecycle: Option<FfiLifecycle>,
}

impl InterfaceEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The module that exported this interface
    pub fn owner(&self) -> ModuleId {
        self.owner
    }

    /// Raw implementation pointer, valid while the owner stays loaded
    pub fn instance(&self) -> NonNull<c_void> {
        self.instance
    }

    /// Implementation pointer cast to the interface's concrete type
    ///
    /// # Safety
    /// `T` must be the type the exporting library placed behind this name and
    /// hash, and the pointer must not be used after the owner unloads.
    pub unsafe fn cast<T>(&self) -> NonNull<T> {
        self.instance.cast()
    }

    /// Lifecycle table when the interface is a system
    pub fn lifecycle(&self) -> Option<&FfiLifecycle> {
        self.lifecycle.as_ref()
    }
}

/// Process-wide table of published interfaces
#[derive(Default)]
pub struct InterfaceRegistry {
    entries: SlotMap<InterfaceEntry>,
    /// Publication order, for deterministic lookup and listing
    order: Vec<InterfaceId>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an interface on behalf of `owner`
    ///
    /// Re-publishing the same name and hash returns the existing id. The same
    /// name under a different hash is rejected: the first registration wins.
    pub fn publish(
        &mut self,
        owner: ModuleId,
        export: InterfaceExport,
    ) -> Result<InterfaceId, RegistryError> {
        if let Some((id, existing)) = self.iter().find(|(_, e)| e.name == export.name) {
            if existing.hash == export.hash {
                return Ok(id);
            }
            return Err(RegistryError::Conflict {
                name: export.name,
                existing: existing.hash,
                rejected: export.hash,
            });
        }

        let id = self.entries.insert(InterfaceEntry {
            name: export.name,
            hash: export.hash,
            owner,
            instance: export.instance,
            lifecycle: export.lifecycle,
        });
        self.order.push(id);
        Ok(id)
    }

    /// Look up an interface by exact name and hash
    pub fn resolve(&self, name: &str, hash: u64) -> Result<InterfaceId, RegistryError> {
        let mut available = Vec::new();

        for (id, entry) in self.iter() {
            if entry.name != name {
                continue;
            }
            if entry.hash == hash {
                return Ok(id);
            }
            available.push(entry.hash);
        }

        if available.is_empty() {
            Err(RegistryError::InterfaceNotFound { name: name.to_string() })
        } else {
            Err(RegistryError::InterfaceMismatch {
                name: name.to_string(),
                requested: hash,
                available,
            })
        }
    }

    /// Get an entry; `None` once its owner has been invalidated
    pub fn get(&self, id: InterfaceId) -> Option<&InterfaceEntry> {
        self.entries.get(id)
    }

    /// Drop every entry owned by `owner`, returning how many were removed
    pub fn invalidate_module(&mut self, owner: ModuleId) -> usize {
        let mut removed = 0;
        let entries = &mut self.entries;
        self.order.retain(|id| {
            let owned = entries.get(*id).map_or(true, |e| e.owner == owner);
            if owned && entries.remove(*id).is_some() {
                removed += 1;
            }
            !owned
        });
        removed
    }

    /// Iterate entries in publication order
    pub fn iter(&self) -> impl Iterator<Item = (InterfaceId, &InterfaceEntry)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(*id).map(|e| (*id, e)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::Handle;

    fn export(name: &str, hash: u64, slot: &mut u32) -> InterfaceExport {
        InterfaceExport::new(name, hash, NonNull::from(slot).cast())
    }

    #[test]
    fn test_publish_then_resolve_returns_same_id() {
        let mut value = 0u32;
        let mut registry = InterfaceRegistry::new();
        let owner: ModuleId = Handle::new(0, 0);

        let id = registry.publish(owner, export("Core", 1, &mut value)).unwrap();
        assert_eq!(registry.resolve("Core", 1), Ok(id));
        assert_eq!(registry.get(id).map(|e| e.owner()), Some(owner));
    }

    #[test]
    fn test_hash_mismatch_is_reported_distinctly() {
        let mut value = 0u32;
        let mut registry = InterfaceRegistry::new();
        registry
            .publish(Handle::new(0, 0), export("Core", 1, &mut value))
            .unwrap();

        assert_eq!(
            registry.resolve("Core", 2),
            Err(RegistryError::InterfaceMismatch {
                name: "Core".into(),
                requested: 2,
                available: vec![1],
            })
        );
        assert_eq!(
            registry.resolve("Audio", 1),
            Err(RegistryError::InterfaceNotFound { name: "Audio".into() })
        );
    }

    #[test]
    fn test_duplicate_publish_is_idempotent_and_first_wins() {
        let (mut a, mut b) = (0u32, 0u32);
        let mut registry = InterfaceRegistry::new();
        let first = registry
            .publish(Handle::new(0, 0), export("Core", 1, &mut a))
            .unwrap();

        assert_eq!(
            registry.publish(Handle::new(1, 0), export("Core", 1, &mut b)),
            Ok(first)
        );
        assert!(matches!(
            registry.publish(Handle::new(1, 0), export("Core", 7, &mut b)),
            Err(RegistryError::Conflict { existing: 1, rejected: 7, .. })
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first).map(|e| e.owner()), Some(Handle::new(0, 0)));
    }

    #[test]
    fn test_invalidate_module_stales_ids() {
        let (mut a, mut b) = (0u32, 0u32);
        let mut registry = InterfaceRegistry::new();
        let core: ModuleId = Handle::new(0, 0);
        let audio: ModuleId = Handle::new(1, 0);

        let core_id = registry.publish(core, export("Core", 1, &mut a)).unwrap();
        let audio_id = registry.publish(audio, export("Audio", 3, &mut b)).unwrap();

        assert_eq!(registry.invalidate_module(core), 1);
        assert!(registry.get(core_id).is_none());
        assert!(registry.get(audio_id).is_some());
        assert!(registry.resolve("Core", 1).unwrap_err().is_not_found());
        assert_eq!(registry.invalidate_module(core), 0);
    }
}
