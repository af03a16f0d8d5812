//! # mosaic_kernel - Plugin Kernel
//!
//! Ties module loading, system lifecycles, convars and resource tracking into
//! one [`Kernel`] context object constructed at bootstrap and torn down at
//! shutdown.
//!
//! ## Example
//!
//! ```ignore
//! use mosaic_kernel::{AppInfo, Kernel};
//! use mosaic_module::SystemRequirement;
//!
//! let app = AppInfo::load("app.toml".as_ref())?;
//! let mut kernel = Kernel::new(app);
//! kernel.startup(&[
//!     SystemRequirement::new("render", "Renderer", 0x0001_0004),
//!     SystemRequirement::new("audio", "Audio", 0x0002_0001).optional(),
//! ])?;
//!
//! while running {
//!     kernel.tick();
//! }
//! kernel.shutdown(true);
//! ```

pub mod config;
pub mod convar;
mod error;
mod kernel;
pub mod lifecycle;
pub mod system;

pub use config::{AppInfo, ResourceConfig, BIN_PATH_ENV};
pub use convar::{ConVar, ConVarDecl, ConVarRegistry};
pub use error::{KernelError, Result};
pub use kernel::Kernel;
pub use lifecycle::{SystemController, SystemState};
pub use system::{NativeSystem, System};
