//! Resource tracker
//!
//! Polls tracked files once per tick and dispatches reloads to the callback of
//! the resource type that owns them.
//!
//! Per record, a poll:
//! - drops the record when the file can no longer be stat'ed (no callback)
//! - compares size, then modification time, then creation time
//! - refreshes the stored fingerprint whenever anything differs
//! - fires the type's callback at most once, or marks the record pending when
//!   it is locked; a pending record reloads on the first poll after unlock
//!
//! Paused types are skipped entirely, so changes made while paused are seen on
//! the first poll after resuming.

use crate::error::{ResourceError, Result};
use crate::stat::{FileStat, Fingerprint, StdFileStat};
use mosaic_core::{Handle, SlotMap};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Handle to a registered resource type
pub type ResourceTypeId = Handle<ResourceTypeEntry>;

/// Handle to a tracked resource
pub type ResourceId = Handle<ResourceRecord>;

/// Handle to an outstanding lock on a resource
pub type LockId = Handle<LockEntry>;

/// Reload callback invoked with the changed resource and its path
pub type ReloadFn = Box<dyn FnMut(ResourceId, &Path)>;

/// Description of a resource type to register
pub struct ResourceType {
    name: String,
    reload: Option<ReloadFn>,
}

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reload: None,
        }
    }

    /// Set the callback fired when a tracked file of this type changes
    pub fn with_reload(mut self, reload: impl FnMut(ResourceId, &Path) + 'static) -> Self {
        self.reload = Some(Box::new(reload));
        self
    }
}

/// A registered resource type and its tracked records
pub struct ResourceTypeEntry {
    name: String,
    reload: Option<ReloadFn>,
    paused: bool,
    /// Tracked records in registration order
    records: Vec<ResourceId>,
}

impl ResourceTypeEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_reload(&self) -> bool {
        self.reload.is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A tracked file
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    owner: ResourceTypeId,
    path: PathBuf,
    fingerprint: Fingerprint,
    ref_count: u32,
    locks: u32,
    pending: bool,
}

impl ResourceRecord {
    pub fn owner(&self) -> ResourceTypeId {
        self.owner
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fingerprint observed at the last poll
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn is_locked(&self) -> bool {
        self.locks > 0
    }

    /// A change was seen while locked and has not been dispatched yet
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// An outstanding lock
#[derive(Debug)]
pub struct LockEntry {
    resource: ResourceId,
}

/// What a single poll did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Records whose change was dispatched (callback fired or silently tracked)
    pub reloaded: Vec<ResourceId>,
    /// Paths of records dropped because their file vanished
    pub removed: Vec<PathBuf>,
    /// Locked records with a change waiting for unlock
    pub deferred: Vec<ResourceId>,
}

impl PollReport {
    pub fn is_empty(&self) -> bool {
        self.reloaded.is_empty() && self.removed.is_empty() && self.deferred.is_empty()
    }
}

/// Per-type tables of tracked files
pub struct ResourceTracker {
    stat: Box<dyn FileStat>,
    types: SlotMap<ResourceTypeEntry>,
    /// Type registration order, which is also poll order
    type_order: Vec<ResourceTypeId>,
    records: SlotMap<ResourceRecord>,
    locks: SlotMap<LockEntry>,
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTracker {
    /// Create a tracker that stats the real filesystem
    pub fn new() -> Self {
        Self::with_stat(StdFileStat)
    }

    /// Create a tracker with a custom stat source
    pub fn with_stat(stat: impl FileStat + 'static) -> Self {
        Self {
            stat: Box::new(stat),
            types: SlotMap::new(),
            type_order: Vec::new(),
            records: SlotMap::new(),
            locks: SlotMap::new(),
        }
    }

    // ========== Types ==========

    /// Register a resource type. Types live as long as the tracker.
    pub fn register_type(&mut self, ty: ResourceType) -> ResourceTypeId {
        log::debug!("Registered resource type '{}'", ty.name);
        let id = self.types.insert(ResourceTypeEntry {
            name: ty.name,
            reload: ty.reload,
            paused: false,
            records: Vec::new(),
        });
        self.type_order.push(id);
        id
    }

    pub fn set_paused(&mut self, ty: ResourceTypeId, paused: bool) -> Result<()> {
        let entry = self.types.get_mut(ty).ok_or(ResourceError::UnknownType)?;
        entry.paused = paused;
        Ok(())
    }

    pub fn resource_type(&self, ty: ResourceTypeId) -> Option<&ResourceTypeEntry> {
        self.types.get(ty)
    }

    /// Find a type by name
    pub fn find_type(&self, name: &str) -> Option<ResourceTypeId> {
        self.type_order
            .iter()
            .copied()
            .find(|id| self.types.get(*id).is_some_and(|t| t.name == name))
    }

    // ========== Records ==========

    /// Start tracking `path` under `ty`
    ///
    /// The file must exist. Tracking a path the type already tracks returns
    /// the existing record.
    pub fn track(&mut self, ty: ResourceTypeId, path: impl Into<PathBuf>) -> Result<ResourceId> {
        let path = path.into();
        if !self.types.contains(ty) {
            return Err(ResourceError::UnknownType);
        }
        if let Some(id) = self.find(ty, &path) {
            return Ok(id);
        }

        let fingerprint = self
            .stat
            .stat(&path)
            .map_err(|source| ResourceError::StatFailed {
                path: path.clone(),
                source,
            })?;

        log::trace!("Tracking resource {}", path.display());
        let id = self.records.insert(ResourceRecord {
            owner: ty,
            path,
            fingerprint,
            ref_count: 0,
            locks: 0,
            pending: false,
        });
        if let Some(entry) = self.types.get_mut(ty) {
            entry.records.push(id);
        }
        Ok(id)
    }

    /// Stop tracking a resource. Outstanding locks on it become no-ops.
    pub fn free(&mut self, resource: ResourceId) -> Result<()> {
        let record = self
            .records
            .remove(resource)
            .ok_or(ResourceError::UnknownResource)?;
        if let Some(entry) = self.types.get_mut(record.owner) {
            entry.records.retain(|r| *r != resource);
        }
        log::trace!("Freed resource {}", record.path.display());
        Ok(())
    }

    pub fn get(&self, resource: ResourceId) -> Option<&ResourceRecord> {
        self.records.get(resource)
    }

    /// Find the record `ty` holds for `path`
    pub fn find(&self, ty: ResourceTypeId, path: &Path) -> Option<ResourceId> {
        let entry = self.types.get(ty)?;
        entry
            .records
            .iter()
            .copied()
            .find(|id| self.records.get(*id).is_some_and(|r| r.path == path))
    }

    /// Records of a type in registration order
    pub fn resources(&self, ty: ResourceTypeId) -> impl Iterator<Item = (ResourceId, &ResourceRecord)> + '_ {
        self.types
            .get(ty)
            .map(|entry| entry.records.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |id| self.records.get(*id).map(|r| (*id, r)))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ========== Reference counts ==========

    /// Returns the new count
    pub fn increment_ref(&mut self, resource: ResourceId) -> Result<u32> {
        let record = self
            .records
            .get_mut(resource)
            .ok_or(ResourceError::UnknownResource)?;
        record.ref_count += 1;
        Ok(record.ref_count)
    }

    /// Returns the new count. Reaching zero does not free the record.
    pub fn decrement_ref(&mut self, resource: ResourceId) -> Result<u32> {
        let record = self
            .records
            .get_mut(resource)
            .ok_or(ResourceError::UnknownResource)?;
        record.ref_count = record
            .ref_count
            .checked_sub(1)
            .ok_or_else(|| ResourceError::RefUnderflow(record.path.clone()))?;
        Ok(record.ref_count)
    }

    // ========== Locks ==========

    /// Hold off reloads of a resource until the returned lock is released
    pub fn lock(&mut self, resource: ResourceId) -> Result<LockId> {
        let record = self
            .records
            .get_mut(resource)
            .ok_or(ResourceError::UnknownResource)?;
        record.locks += 1;
        Ok(self.locks.insert(LockEntry { resource }))
    }

    /// Release a lock
    ///
    /// A pending change is not dispatched here; it fires on the next poll.
    /// Unlocking a resource that was freed or dropped meanwhile succeeds.
    pub fn unlock(&mut self, lock: LockId) -> Result<()> {
        let entry = self.locks.remove(lock).ok_or(ResourceError::UnknownLock)?;
        if let Some(record) = self.records.get_mut(entry.resource) {
            record.locks = record.locks.saturating_sub(1);
        }
        Ok(())
    }

    /// Lock a resource for the lifetime of the returned guard
    ///
    /// The guard derefs to the tracker, so polls made through it see the
    /// resource as locked. The lock is released on drop, including on unwind.
    pub fn lock_scoped(&mut self, resource: ResourceId) -> Result<ResourceLockGuard<'_>> {
        let lock = self.lock(resource)?;
        Ok(ResourceLockGuard {
            tracker: self,
            lock,
        })
    }

    // ========== Polling ==========

    /// Re-stat every tracked file of every unpaused type
    pub fn poll(&mut self) -> PollReport {
        let mut report = PollReport::default();
        let Self {
            stat,
            types,
            type_order,
            records,
            ..
        } = self;

        for ty in type_order.iter().copied() {
            let Some(entry) = types.get_mut(ty) else {
                continue;
            };
            if entry.paused {
                continue;
            }

            let mut i = 0;
            while i < entry.records.len() {
                let id = entry.records[i];
                let Some(record) = records.get_mut(id) else {
                    entry.records.remove(i);
                    continue;
                };

                let current = match stat.stat(&record.path) {
                    Ok(fp) => fp,
                    Err(e) => {
                        log::debug!("Resource {} is gone ({}), untracking", record.path.display(), e);
                        if let Some(gone) = records.remove(id) {
                            report.removed.push(gone.path);
                        }
                        entry.records.remove(i);
                        continue;
                    }
                };

                if let Some(change) = record.fingerprint.first_change(&current) {
                    log::debug!("{}: {}", change, record.path.display());
                    record.fingerprint = current;
                    record.pending = true;
                }

                if record.pending {
                    if record.locks > 0 {
                        report.deferred.push(id);
                    } else {
                        record.pending = false;
                        if let Some(reload) = entry.reload.as_mut() {
                            log::info!("Reloading {} '{}'", entry.name, record.path.display());
                            reload(id, &record.path);
                        }
                        report.reloaded.push(id);
                    }
                }

                i += 1;
            }
        }

        report
    }
}

/// Scoped lock returned by [`ResourceTracker::lock_scoped`]
pub struct ResourceLockGuard<'a> {
    tracker: &'a mut ResourceTracker,
    lock: LockId,
}

impl Deref for ResourceLockGuard<'_> {
    type Target = ResourceTracker;

    fn deref(&self) -> &ResourceTracker {
        self.tracker
    }
}

impl DerefMut for ResourceLockGuard<'_> {
    fn deref_mut(&mut self) -> &mut ResourceTracker {
        self.tracker
    }
}

impl Drop for ResourceLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tracker.unlock(self.lock) {
            log::warn!("Releasing scoped lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::MemoryFileStat;

    fn tracker_with(files: &[&str]) -> (MemoryFileStat, ResourceTracker) {
        let stat = MemoryFileStat::new();
        for file in files {
            stat.set(*file, Fingerprint::new(1, None, None));
        }
        let tracker = ResourceTracker::with_stat(stat.clone());
        (stat, tracker)
    }

    #[test]
    fn test_track_is_idempotent_per_type() {
        let (_stat, mut tracker) = tracker_with(&["a.png"]);
        let textures = tracker.register_type(ResourceType::new("texture"));
        let sounds = tracker.register_type(ResourceType::new("sound"));

        let a = tracker.track(textures, "a.png").unwrap();
        assert_eq!(tracker.track(textures, "a.png").unwrap(), a);
        assert_ne!(tracker.track(sounds, "a.png").unwrap(), a);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.find_type("sound"), Some(sounds));
    }

    #[test]
    fn test_track_missing_file_fails() {
        let (_stat, mut tracker) = tracker_with(&[]);
        let textures = tracker.register_type(ResourceType::new("texture"));

        assert!(matches!(
            tracker.track(textures, "missing.png"),
            Err(ResourceError::StatFailed { .. })
        ));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_ref_counts_are_bookkeeping_only() {
        let (_stat, mut tracker) = tracker_with(&["a.png"]);
        let textures = tracker.register_type(ResourceType::new("texture"));
        let a = tracker.track(textures, "a.png").unwrap();

        assert_eq!(tracker.increment_ref(a).unwrap(), 1);
        assert_eq!(tracker.increment_ref(a).unwrap(), 2);
        assert_eq!(tracker.decrement_ref(a).unwrap(), 1);
        assert_eq!(tracker.decrement_ref(a).unwrap(), 0);
        assert!(tracker.get(a).is_some());
        assert!(matches!(tracker.decrement_ref(a), Err(ResourceError::RefUnderflow(_))));
    }

    #[test]
    fn test_free_stales_the_handle() {
        let (_stat, mut tracker) = tracker_with(&["a.png", "b.png"]);
        let textures = tracker.register_type(ResourceType::new("texture"));
        let a = tracker.track(textures, "a.png").unwrap();
        let b = tracker.track(textures, "b.png").unwrap();

        tracker.free(a).unwrap();
        assert!(tracker.get(a).is_none());
        assert!(matches!(tracker.free(a), Err(ResourceError::UnknownResource)));

        let remaining: Vec<_> = tracker.resources(textures).map(|(id, _)| id).collect();
        assert_eq!(remaining, vec![b]);
    }

    #[test]
    fn test_unknown_handles_are_rejected() {
        let (_stat, mut tracker) = tracker_with(&[]);
        assert!(matches!(
            tracker.set_paused(ResourceTypeId::null(), true),
            Err(ResourceError::UnknownType)
        ));
        assert!(matches!(tracker.unlock(LockId::null()), Err(ResourceError::UnknownLock)));
    }
}
