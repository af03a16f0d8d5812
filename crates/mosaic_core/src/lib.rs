//! # mosaic_core
//!
//! Zero-dependency primitives shared by the kernel crates. The only thing
//! living here today is generational handle storage: every table that can
//! outlive the thing it points at (registry entries into unloaded libraries,
//! resources whose files vanished) hands out `Handle<T>` instead of
//! references.

pub mod handle;

pub use handle::{Handle, SlotMap};
