//! Dynamic library primitive
//!
//! Thin wrapper over the OS loader. No caching happens here: opening the same
//! path twice yields two handles, and callers that need idempotent loads
//! (the module manager) keep their own table.

use crate::error::{ModuleError, Result};
use libloading::{Library, Symbol};
use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

thread_local! {
    static LAST_ERROR: RefCell<String> = RefCell::new(String::new());
}

/// The most recent loader error message seen on this thread
pub fn last_error() -> String {
    LAST_ERROR.with(|e| e.borrow().clone())
}

fn record_error(message: &str) {
    LAST_ERROR.with(|e| {
        let mut last = e.borrow_mut();
        last.clear();
        last.push_str(message);
    });
}

/// Platform file name for a logical library name (`core` -> `libcore.so`)
pub fn library_file_name(name: &str) -> OsString {
    libloading::library_filename(name)
}

/// One opened dynamic library
pub struct DynLibrary {
    library: Option<Library>,
    path: PathBuf,
}

impl DynLibrary {
    /// Open a library from a path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            record_error(&format!("{}: no such file", path.display()));
            return Err(ModuleError::LibraryNotFound(path.to_path_buf()));
        }

        // Safety: running a library's initializers is the point of loading it
        let library = unsafe { Library::new(path) }.map_err(|e| {
            let message = e.to_string();
            record_error(&message);
            ModuleError::load_failed(path, message)
        })?;

        log::trace!("Opened library '{}'", path.display());

        Ok(Self {
            library: Some(library),
            path: path.to_path_buf(),
        })
    }

    /// Resolve an exported symbol
    ///
    /// # Safety
    /// `T` must match the real type of the export, and the returned value must
    /// not be used after the library is closed.
    pub unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T> {
        let library = self.library.as_ref().ok_or_else(|| {
            ModuleError::symbol_not_found(self.path.display().to_string(), name, "library is closed")
        })?;

        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);

        let symbol: Symbol<T> = library.get(&bytes).map_err(|e| {
            let message = e.to_string();
            record_error(&message);
            ModuleError::symbol_not_found(self.path.display().to_string(), name, message)
        })?;

        Ok(*symbol)
    }

    /// Close the library. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(library) = self.library.take() {
            log::debug!("Unloading library '{}'", self.path.display());
            if let Err(e) = library.close() {
                let message = e.to_string();
                record_error(&message);
                log::warn!("Failed to close library '{}': {}", self.path.display(), message);
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.library.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DynLibrary {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DynLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynLibrary")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(library_file_name("missing"));

        let err = DynLibrary::open(&path).unwrap_err();
        assert!(matches!(err, ModuleError::LibraryNotFound(p) if p == path));
        assert!(last_error().contains("no such file"));
    }

    #[test]
    fn test_garbage_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(library_file_name("garbage"));
        std::fs::write(&path, b"not a shared object").unwrap();

        let err = DynLibrary::open(&path).unwrap_err();
        assert!(matches!(err, ModuleError::LoadFailed { .. }));
        assert!(!last_error().is_empty());
    }

    #[test]
    fn test_library_file_name_contains_name() {
        let name = library_file_name("core");
        assert!(name.to_string_lossy().contains("core"));
    }
}
