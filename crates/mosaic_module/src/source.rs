//! Where module images come from
//!
//! The module manager talks to libraries through [`ModuleSource`] so the
//! load/resolve/rollback logic can run against something other than the OS
//! loader. [`NativeSource`] is the real one.

use crate::abi::{self, GetInterfacesFn, InterfaceExport, GET_INTERFACES_SYMBOL};
use crate::error::Result;
use crate::library::DynLibrary;
use std::path::Path;

/// Opens module images from resolved file paths
pub trait ModuleSource {
    fn open(&mut self, path: &Path) -> Result<Box<dyn ModuleImage>>;
}

/// One opened module
pub trait ModuleImage {
    fn path(&self) -> &Path;

    /// Run the interface enumeration entry point
    fn interfaces(&self) -> Result<Vec<InterfaceExport>>;

    /// Release the image. Must tolerate being called more than once.
    fn close(&mut self);
}

/// Loads modules with the OS dynamic loader
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSource;

impl ModuleSource for NativeSource {
    fn open(&mut self, path: &Path) -> Result<Box<dyn ModuleImage>> {
        let library = DynLibrary::open(path)?;
        Ok(Box::new(NativeImage { library }))
    }
}

/// A module backed by a real dynamic library
#[derive(Debug)]
pub struct NativeImage {
    library: DynLibrary,
}

impl ModuleImage for NativeImage {
    fn path(&self) -> &Path {
        self.library.path()
    }

    fn interfaces(&self) -> Result<Vec<InterfaceExport>> {
        let name = self.library.path().display().to_string();

        // Safety: the export name is reserved for this signature by the ABI
        let get: GetInterfacesFn = unsafe { self.library.symbol(GET_INTERFACES_SYMBOL)? };
        unsafe { abi::collect_interfaces(get, &name) }
    }

    fn close(&mut self) {
        self.library.close();
    }
}
