//! C ABI shared between the kernel and plugin libraries
//!
//! Every plugin library exports one function, [`GET_INTERFACES_SYMBOL`],
//! returning a pointer to a static table of [`FfiInterface`] and writing the
//! table length through its out-parameter. Each descriptor carries a stable
//! name and a version hash chosen by the interface's author; the hash must
//! change whenever the interface's method set changes.
//!
//! Interfaces that act as systems also point at an [`FfiLifecycle`] table,
//! which is all the kernel ever calls on them. Business methods are reached
//! by casting the instance pointer on the caller's side.

use crate::error::{ModuleError, Result};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr::NonNull;

/// Name of the interface enumeration export
pub const GET_INTERFACES_SYMBOL: &str = "mosaic_get_interfaces";

/// Core library entry point run before the application library is loaded
pub const CORE_INIT_SYMBOL: &str = "core_init";

/// Core library teardown, run exactly once before the launcher exits
pub const CORE_EXIT_SYMBOL: &str = "core_exit";

/// Application library entry point
pub const APP_INIT_SYMBOL: &str = "app_init";

/// Convar flag: persist the value to the archive on shutdown
pub const CONVAR_ARCHIVE: u32 = 1 << 0;

pub type GetInterfacesFn = unsafe extern "C" fn(count: *mut usize) -> *const FfiInterface;
pub type CoreInitFn =
    unsafe extern "C" fn(argc: c_int, argv: *const *const c_char, app_path: *const c_char) -> c_int;
pub type CoreExitFn = unsafe extern "C" fn(write_archive: bool);
pub type AppInitFn = unsafe extern "C" fn() -> c_int;

pub type SystemInitFn = unsafe extern "C" fn(instance: *mut c_void) -> bool;
pub type SystemShutdownFn = unsafe extern "C" fn(instance: *mut c_void);
pub type SystemConVarsFn =
    unsafe extern "C" fn(instance: *mut c_void, count: *mut usize) -> *const FfiConVar;

/// Lifecycle table for interfaces that are systems
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiLifecycle {
    pub init: SystemInitFn,
    pub shutdown: SystemShutdownFn,
    /// Optional convar declarations, merged after every system has initialized
    pub convars: Option<SystemConVarsFn>,
}

/// One exported interface
#[repr(C)]
#[derive(Debug)]
pub struct FfiInterface {
    pub name: *const c_char,
    pub hash: u64,
    pub instance: *mut c_void,
    /// Null when the interface is not a system
    pub lifecycle: *const FfiLifecycle,
}

// Safety: descriptor tables are immutable statics inside the exporting library
unsafe impl Sync for FfiInterface {}

/// One convar declared by a native system
#[repr(C)]
#[derive(Debug)]
pub struct FfiConVar {
    pub name: *const c_char,
    pub default_value: *const c_char,
    pub description: *const c_char,
    pub flags: u32,
}

unsafe impl Sync for FfiConVar {}

/// Owned copy of an interface descriptor
///
/// `instance` and `lifecycle` still point into library memory and are only
/// valid while the exporting module stays loaded.
#[derive(Debug, Clone)]
pub struct InterfaceExport {
    pub name: String,
    pub hash: u64,
    pub instance: NonNull<c_void>,
    pub lifecycle: Option<FfiLifecycle>,
}

impl InterfaceExport {
    pub fn new(name: impl Into<String>, hash: u64, instance: NonNull<c_void>) -> Self {
        Self {
            name: name.into(),
            hash,
            instance,
            lifecycle: None,
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: FfiLifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }
}

/// Owned copy of a convar declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConVarExport {
    pub name: String,
    pub default_value: String,
    pub description: String,
    pub flags: u32,
}

/// Call an enumeration export and copy its table
///
/// # Safety
/// `get` must follow the enumeration contract: return null or a pointer to
/// `count` valid descriptors whose strings are NUL-terminated.
pub unsafe fn collect_interfaces(get: GetInterfacesFn, library: &str) -> Result<Vec<InterfaceExport>> {
    let mut count = 0usize;
    let table = get(&mut count);

    if table.is_null() || count == 0 {
        return Err(ModuleError::NoInterfaces(library.to_string()));
    }

    std::slice::from_raw_parts(table, count)
        .iter()
        .enumerate()
        .map(|(index, descriptor)| read_interface(descriptor, library, index))
        .collect()
}

unsafe fn read_interface(
    descriptor: &FfiInterface,
    library: &str,
    index: usize,
) -> Result<InterfaceExport> {
    let name = read_str(descriptor.name).ok_or_else(|| {
        ModuleError::invalid_interface(library, format!("descriptor {} has no valid name", index))
    })?;

    let instance = NonNull::new(descriptor.instance).ok_or_else(|| {
        ModuleError::invalid_interface(library, format!("interface '{}' has a null instance", name))
    })?;

    Ok(InterfaceExport {
        name,
        hash: descriptor.hash,
        instance,
        lifecycle: descriptor.lifecycle.as_ref().copied(),
    })
}

/// Copy the convar declarations of a native system
///
/// # Safety
/// `instance` must be the instance the lifecycle table belongs to, and its
/// library must still be loaded.
pub unsafe fn collect_convars(lifecycle: &FfiLifecycle, instance: NonNull<c_void>) -> Vec<ConVarExport> {
    let Some(convars) = lifecycle.convars else {
        return Vec::new();
    };

    let mut count = 0usize;
    let table = convars(instance.as_ptr(), &mut count);
    if table.is_null() || count == 0 {
        return Vec::new();
    }

    std::slice::from_raw_parts(table, count)
        .iter()
        .filter_map(|cvar| {
            let Some(name) = read_str(cvar.name) else {
                log::warn!("Skipping convar with invalid name");
                return None;
            };
            Some(ConVarExport {
                name,
                default_value: read_str(cvar.default_value).unwrap_or_default(),
                description: read_str(cvar.description).unwrap_or_default(),
                flags: cvar.flags,
            })
        })
        .collect()
}

unsafe fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

/// Export a static interface table from a plugin library
///
/// ```ignore
/// static INTERFACES: [FfiInterface; 1] = [FfiInterface {
///     name: c"Physics".as_ptr(),
///     hash: 0x5a17_0003,
///     instance: &PHYSICS as *const Physics as *mut c_void,
///     lifecycle: &PHYSICS_LIFECYCLE,
/// }];
///
/// mosaic_module::export_interfaces!(INTERFACES);
/// ```
#[macro_export]
macro_rules! export_interfaces {
    ($table:expr) => {
        #[no_mangle]
        pub unsafe extern "C" fn mosaic_get_interfaces(
            count: *mut usize,
        ) -> *const $crate::abi::FfiInterface {
            let table: &'static [$crate::abi::FfiInterface] = &$table;
            if !count.is_null() {
                *count = table.len();
            }
            table.as_ptr()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn empty_table(count: *mut usize) -> *const FfiInterface {
        *count = 0;
        std::ptr::null()
    }

    static NAMELESS: [FfiInterface; 1] = [FfiInterface {
        name: std::ptr::null(),
        hash: 1,
        instance: std::ptr::null_mut(),
        lifecycle: std::ptr::null(),
    }];

    unsafe extern "C" fn nameless_table(count: *mut usize) -> *const FfiInterface {
        *count = NAMELESS.len();
        NAMELESS.as_ptr()
    }

    #[test]
    fn test_empty_table_is_an_error() {
        let err = unsafe { collect_interfaces(empty_table, "empty") }.unwrap_err();
        assert!(matches!(err, ModuleError::NoInterfaces(name) if name == "empty"));
    }

    #[test]
    fn test_nameless_descriptor_is_rejected() {
        let err = unsafe { collect_interfaces(nameless_table, "broken") }.unwrap_err();
        assert!(matches!(err, ModuleError::InvalidInterface { .. }));
    }
}
