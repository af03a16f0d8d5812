//! # mosaic_module - Dynamic Module Loading
//!
//! Loads plugin libraries, discovers the interfaces each one exports, and
//! resolves the application's declared system requirements against them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SystemRequirement│───▶│  ModuleManager  │
//! │  (static table) │     │ (load, resolve) │
//! └─────────────────┘     └───┬─────────┬───┘
//!                             │         │
//!                             ▼         ▼
//!                ┌────────────────┐  ┌───────────────────┐
//!                │  ModuleSource  │  │ InterfaceRegistry │
//!                │ (DynLibrary)   │  │ (name, hash) -> id│
//!                └────────────────┘  └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use mosaic_module::{ModuleManager, SearchPaths, SystemRequirement};
//!
//! let mut modules = ModuleManager::new(SearchPaths::new(["bin/linux64"]));
//! let resolution = modules.resolve_requirements(&[
//!     SystemRequirement::new("render", "Renderer", 0x0001_0004),
//!     SystemRequirement::new("audio", "Audio", 0x0002_0001).optional(),
//! ])?;
//! ```
//!
//! ## Plugin side
//!
//! A plugin exposes a static [`abi::FfiInterface`] table through
//! [`export_interfaces!`].

pub mod abi;
mod error;
mod library;
mod manager;
mod registry;
mod source;

pub use abi::{FfiConVar, FfiInterface, FfiLifecycle, InterfaceExport};
pub use error::{ModuleError, RegistryError, Result};
pub use library::{last_error, library_file_name, DynLibrary};
pub use manager::{
    LoadedModule, ModuleId, ModuleManager, Resolution, ResolvedRequirement, SearchPaths,
    SystemRequirement,
};
pub use registry::{InterfaceEntry, InterfaceId, InterfaceRegistry};
pub use source::{ModuleImage, ModuleSource, NativeImage, NativeSource};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ModuleError, RegistryError, Result};
    pub use crate::manager::{ModuleManager, SearchPaths, SystemRequirement};
    pub use crate::registry::{InterfaceId, InterfaceRegistry};
}
