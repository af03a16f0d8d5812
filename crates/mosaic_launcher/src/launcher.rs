//! Bootstrap hand-off
//!
//! The module manager lives inside the core library, so the launcher does the
//! first loads by hand, in a fixed order:
//!
//! 1. runtime library (windowing/base runtime)
//! 2. core library
//! 3. ui library, then the core's `core_init` and `core_exit` entry points
//! 4. `core_init`, which sets up search paths
//! 5. the application library, found relative to the now-final working
//!    directory, and its `app_init`
//!
//! `core_exit` runs exactly once after a successful `core_init`, flushing
//! persistent state only when the application returned 0. Libraries unload in
//! reverse load order.

use crate::error::{LaunchError, LaunchStage};
use mosaic_module::abi::{
    AppInitFn, CoreExitFn, CoreInitFn, APP_INIT_SYMBOL, CORE_EXIT_SYMBOL, CORE_INIT_SYMBOL,
};
use mosaic_module::{library_file_name, DynLibrary, Result as ModuleResult};
use std::ffi::{c_char, c_int, CString};
use std::path::{Path, PathBuf};

/// Per-platform binary folder name, e.g. `linux64`
pub fn platform_folder() -> String {
    let os = match std::env::consts::OS {
        "windows" => "win",
        other => other,
    };
    let bits = if cfg!(target_pointer_width = "64") { "64" } else { "32" };
    format!("{}{}", os, bits)
}

/// Everything the launcher needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Root holding one folder per platform
    pub bin_dir: PathBuf,
    pub runtime_library: String,
    pub core_library: String,
    pub ui_library: String,
    /// Application directory, relative to the parent of the search root
    pub app_path: String,
    pub app_module: String,
    /// Passed through to `core_init`
    pub args: Vec<String>,
}

impl Default for LaunchPlan {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("bin"),
            runtime_library: "SDL2".to_string(),
            core_library: "ch_core".to_string(),
            ui_library: "imgui".to_string(),
            app_path: "sidury".to_string(),
            app_module: "client".to_string(),
            args: Vec::new(),
        }
    }
}

impl LaunchPlan {
    /// Path of one of the launcher's own libraries
    pub fn library_path(&self, name: &str) -> PathBuf {
        self.bin_dir.join(platform_folder()).join(library_file_name(name))
    }

    /// Path of the application library relative to `search_root`
    pub fn app_library_path(&self, search_root: &Path) -> PathBuf {
        search_root
            .join("..")
            .join(&self.app_path)
            .join("bin")
            .join(platform_folder())
            .join(library_file_name(&self.app_module))
    }
}

/// Opens the libraries the launcher hands off to
pub trait LaunchSource {
    fn open(&mut self, path: &Path) -> ModuleResult<Box<dyn LaunchImage>>;
}

/// One library opened by the launcher
pub trait LaunchImage {
    fn core_init(&self) -> ModuleResult<CoreInitFn>;
    fn core_exit(&self) -> ModuleResult<CoreExitFn>;
    fn app_init(&self) -> ModuleResult<AppInitFn>;

    /// Release the library. Must tolerate being called more than once.
    fn close(&mut self);
}

/// Opens launcher libraries with the OS dynamic loader
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLaunchSource;

impl LaunchSource for NativeLaunchSource {
    fn open(&mut self, path: &Path) -> ModuleResult<Box<dyn LaunchImage>> {
        Ok(Box::new(DynLibrary::open(path)?))
    }
}

// Safety: the entry-point names are reserved for these signatures by the ABI
impl LaunchImage for DynLibrary {
    fn core_init(&self) -> ModuleResult<CoreInitFn> {
        unsafe { self.symbol(CORE_INIT_SYMBOL) }
    }

    fn core_exit(&self) -> ModuleResult<CoreExitFn> {
        unsafe { self.symbol(CORE_EXIT_SYMBOL) }
    }

    fn app_init(&self) -> ModuleResult<AppInitFn> {
        unsafe { self.symbol(APP_INIT_SYMBOL) }
    }

    fn close(&mut self) {
        DynLibrary::close(self);
    }
}

/// Libraries held open by the launcher, closed in reverse load order
pub struct Launcher {
    source: Box<dyn LaunchSource>,
    loaded: Vec<Box<dyn LaunchImage>>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher {
    pub fn new() -> Self {
        Self::with_source(NativeLaunchSource)
    }

    pub fn with_source(source: impl LaunchSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            loaded: Vec::new(),
        }
    }

    /// Run the full hand-off. Returns the application's return code.
    ///
    /// Every library opened here is closed before returning.
    pub fn run(&mut self, plan: &LaunchPlan) -> Result<i32, LaunchError> {
        let result = self.hand_off(plan);
        self.close_all();
        result
    }

    fn hand_off(&mut self, plan: &LaunchPlan) -> Result<i32, LaunchError> {
        self.open(&plan.library_path(&plan.runtime_library), LaunchStage::RuntimeLibrary)?;
        let core = self.open(&plan.library_path(&plan.core_library), LaunchStage::CoreLibrary)?;
        self.open(&plan.library_path(&plan.ui_library), LaunchStage::UiLibrary)?;

        let core_init = self.loaded[core]
            .core_init()
            .map_err(|e| LaunchError::new(LaunchStage::CoreInitSymbol, e))?;
        let core_exit = self.loaded[core]
            .core_exit()
            .map_err(|e| LaunchError::new(LaunchStage::CoreExitSymbol, e))?;

        let args = c_strings(std::iter::once("mosaic").chain(plan.args.iter().map(String::as_str)));
        let mut argv: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
        argv.push(std::ptr::null());
        let app_path = c_string(&plan.app_path);

        log::debug!("Calling core_init with {} arguments", args.len());
        let init_ret = unsafe { core_init(args.len() as c_int, argv.as_ptr(), app_path.as_ptr()) };
        if init_ret != 0 {
            unsafe { core_exit(false) };
            return Err(LaunchError::new(
                LaunchStage::CoreInit,
                format!("core_init returned {}", init_ret),
            ));
        }

        let result = self.run_app(plan);
        let flush = matches!(result, Ok(0));
        log::debug!("Calling core_exit (write archive: {})", flush);
        unsafe { core_exit(flush) };
        result
    }

    fn run_app(&mut self, plan: &LaunchPlan) -> Result<i32, LaunchError> {
        let root = std::env::current_dir()
            .map_err(|e| LaunchError::new(LaunchStage::AppLibrary, e))?;
        let app = self.open(&plan.app_library_path(&root), LaunchStage::AppLibrary)?;

        let app_init = self.loaded[app]
            .app_init()
            .map_err(|e| LaunchError::new(LaunchStage::AppInitSymbol, e))?;

        log::info!("Starting '{}'", plan.app_path);
        let ret = unsafe { app_init() };
        log::info!("'{}' returned {}", plan.app_path, ret);
        Ok(ret)
    }

    /// Open a library for `stage`, returning its slot
    fn open(&mut self, path: &Path, stage: LaunchStage) -> Result<usize, LaunchError> {
        let library = self.source.open(path).map_err(|e| LaunchError::new(stage, e))?;
        log::debug!("Loaded {}", path.display());
        self.loaded.push(library);
        Ok(self.loaded.len() - 1)
    }

    /// Close every library in reverse load order
    pub fn close_all(&mut self) {
        while let Some(mut library) = self.loaded.pop() {
            library.close();
        }
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        self.close_all();
    }
}

// Process arguments cannot carry NUL; anything else is stripped of it
fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn c_strings<'a>(items: impl Iterator<Item = &'a str>) -> Vec<CString> {
    items.map(c_string).collect()
}
