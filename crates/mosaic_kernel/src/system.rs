//! The system capability
//!
//! The kernel only ever calls the lifecycle of a system. Everything else a
//! system offers is reached through the interface registry by whoever needs it.

use crate::convar::ConVarDecl;
use crate::error::{KernelError, Result};
use mosaic_module::abi::{self, FfiLifecycle};
use mosaic_module::InterfaceEntry;
use std::ffi::c_void;
use std::ptr::NonNull;

/// A runtime component with an init/shutdown lifecycle
pub trait System {
    /// Name used in logs and lookups
    fn name(&self) -> &str;

    /// Bring the system up. Returning `false` fails startup if the system is required.
    fn init(&mut self) -> bool;

    /// Tear the system down. Called at most once, and only after a successful `init`.
    fn shutdown(&mut self);

    /// Convars merged into the global registry once every system has initialized
    fn convars(&self) -> Vec<ConVarDecl> {
        Vec::new()
    }
}

/// A system exported by a loaded module through its lifecycle table
///
/// Holds raw pointers into the module. The kernel shuts down and drops every
/// native system before it unloads modules.
#[derive(Debug)]
pub struct NativeSystem {
    name: String,
    instance: NonNull<c_void>,
    lifecycle: FfiLifecycle,
}

impl NativeSystem {
    /// Adapt a registry entry; fails when the interface has no lifecycle table
    pub fn from_entry(entry: &InterfaceEntry) -> Result<Self> {
        let lifecycle = entry
            .lifecycle()
            .copied()
            .ok_or_else(|| KernelError::NotASystem {
                interface: entry.name().to_string(),
            })?;

        Ok(Self {
            name: entry.name().to_string(),
            instance: entry.instance(),
            lifecycle,
        })
    }

    pub fn instance(&self) -> NonNull<c_void> {
        self.instance
    }
}

impl System for NativeSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> bool {
        // Safety: the owning module stays loaded while the kernel holds this system
        unsafe { (self.lifecycle.init)(self.instance.as_ptr()) }
    }

    fn shutdown(&mut self) {
        unsafe { (self.lifecycle.shutdown)(self.instance.as_ptr()) }
    }

    fn convars(&self) -> Vec<ConVarDecl> {
        unsafe { abi::collect_convars(&self.lifecycle, self.instance) }
            .into_iter()
            .map(ConVarDecl::from)
            .collect()
    }
}
