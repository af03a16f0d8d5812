//! Module manager behaviour against an in-memory module source
//!
//! Library files exist on disk (empty) so search-path resolution runs for
//! real; opening them goes through `FakeSource`, which records every open
//! and close.

use mosaic_module::{
    library_file_name, InterfaceExport, ModuleError, ModuleImage, ModuleManager, ModuleSource,
    Result, SearchPaths, SystemRequirement,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Clone)]
enum FakeLibrary {
    Exports(Vec<(&'static str, u64)>),
    MissingSymbol,
    Empty,
}

#[derive(Default)]
struct FakeState {
    libraries: HashMap<PathBuf, FakeLibrary>,
    opens: Vec<PathBuf>,
    closes: Vec<PathBuf>,
}

#[derive(Clone, Default)]
struct FakeSource {
    state: Rc<RefCell<FakeState>>,
}

impl FakeSource {
    fn opens(&self) -> usize {
        self.state.borrow().opens.len()
    }

    fn closed_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .closes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

struct FakeImage {
    path: PathBuf,
    library: FakeLibrary,
    state: Rc<RefCell<FakeState>>,
    closed: bool,
}

impl ModuleSource for FakeSource {
    fn open(&mut self, path: &Path) -> Result<Box<dyn ModuleImage>> {
        let mut state = self.state.borrow_mut();
        state.opens.push(path.to_path_buf());
        let library = state
            .libraries
            .get(path)
            .cloned()
            .ok_or_else(|| ModuleError::load_failed(path, "not a fake library"))?;
        Ok(Box::new(FakeImage {
            path: path.to_path_buf(),
            library,
            state: self.state.clone(),
            closed: false,
        }))
    }
}

impl ModuleImage for FakeImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn interfaces(&self) -> Result<Vec<InterfaceExport>> {
        match &self.library {
            FakeLibrary::Exports(list) => Ok(list
                .iter()
                .map(|(name, hash)| InterfaceExport::new(*name, *hash, NonNull::dangling()))
                .collect()),
            FakeLibrary::MissingSymbol => Err(ModuleError::symbol_not_found(
                self.path.display().to_string(),
                "mosaic_get_interfaces",
                "undefined symbol",
            )),
            FakeLibrary::Empty => Err(ModuleError::NoInterfaces(self.path.display().to_string())),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.borrow_mut().closes.push(self.path.clone());
        }
    }
}

fn fixture(libraries: &[(&str, FakeLibrary)]) -> (TempDir, FakeSource, ModuleManager) {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::default();

    for (name, library) in libraries {
        let path = dir.path().join(library_file_name(name));
        std::fs::write(&path, b"").unwrap();
        source
            .state
            .borrow_mut()
            .libraries
            .insert(path, library.clone());
    }

    let manager = ModuleManager::with_source(SearchPaths::new([dir.path()]), source.clone());
    (dir, source, manager)
}

fn file(name: &str) -> String {
    library_file_name(name).to_string_lossy().into_owned()
}

#[test]
fn test_repeated_load_opens_once() {
    let (_dir, source, mut manager) = fixture(&[("core", FakeLibrary::Exports(vec![("Core", 1)]))]);

    let first = manager.load_module("core").unwrap();
    let second = manager.load_module("core").unwrap();
    let third = manager.load_module("core").unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(source.opens(), 1);
    assert_eq!(manager.loaded_modules(), vec!["core"]);
}

#[test]
fn test_missing_module_unwinds_everything() {
    let (_dir, source, mut manager) = fixture(&[("core", FakeLibrary::Exports(vec![("Core", 1)]))]);

    manager.load_module("core").unwrap();
    let err = manager.load_module("audio").unwrap_err();

    assert!(matches!(err, ModuleError::ModuleNotFound { .. }));
    assert!(!manager.is_loaded("core"));
    assert!(manager.registry().is_empty());
    assert_eq!(source.closed_names(), vec![file("core")]);
}

#[test]
fn test_missing_entry_symbol_closes_failing_module_too() {
    let (_dir, source, mut manager) = fixture(&[
        ("core", FakeLibrary::Exports(vec![("Core", 1)])),
        ("broken", FakeLibrary::MissingSymbol),
    ]);

    manager.load_module("core").unwrap();
    let err = manager.load_module("broken").unwrap_err();

    assert!(matches!(err, ModuleError::SymbolNotFound { .. }));
    assert_eq!(source.closed_names(), vec![file("broken"), file("core")]);
    assert!(manager.loaded_modules().is_empty());
}

#[test]
fn test_zero_interfaces_is_fatal() {
    let (_dir, _source, mut manager) = fixture(&[("hollow", FakeLibrary::Empty)]);

    let err = manager.load_module("hollow").unwrap_err();
    assert!(matches!(err, ModuleError::NoInterfaces(_)));
    assert!(!manager.is_loaded("hollow"));
}

#[test]
fn test_resolve_reports_every_failure() {
    let (_dir, source, mut manager) = fixture(&[
        ("core", FakeLibrary::Exports(vec![("Core", 1), ("Input", 4)])),
        ("render", FakeLibrary::Exports(vec![("Renderer", 9)])),
    ]);

    let err = manager
        .resolve_requirements(&[
            SystemRequirement::new("core", "Input", 4),
            SystemRequirement::new("core", "Core", 2),
            SystemRequirement::new("audio", "Audio", 1),
            SystemRequirement::new("audio", "AudioMixer", 1),
            SystemRequirement::new("render", "Physics", 1),
            SystemRequirement::new("render", "Renderer", 9),
        ])
        .unwrap_err();

    let ModuleError::Unresolved { failures } = err else {
        panic!("expected Unresolved");
    };
    assert_eq!(failures.len(), 3, "{:?}", failures);
    assert!(failures[0].starts_with("core - Core Version 0x2"));
    assert!(failures[0].contains("incompatible"));
    assert_eq!(failures[1], "audio");
    assert_eq!(failures[2], "render - Physics Version 0x1");

    // The batch is all-or-nothing
    assert!(manager.loaded_modules().is_empty());
    assert!(manager.registry().is_empty());
    assert_eq!(source.closed_names(), vec![file("render"), file("core")]);
}

#[test]
fn test_mismatched_hash_aborts_resolution() {
    let (_dir, _source, mut manager) = fixture(&[("core", FakeLibrary::Exports(vec![("Core", 1)]))]);

    let err = manager
        .resolve_requirements(&[SystemRequirement::new("core", "Core", 2)])
        .unwrap_err();

    assert!(matches!(err, ModuleError::Unresolved { ref failures } if failures.len() == 1));
    assert!(!manager.is_loaded("core"));
}

#[test]
fn test_optional_requirements_do_not_fail_the_batch() {
    let (_dir, _source, mut manager) = fixture(&[("core", FakeLibrary::Exports(vec![("Core", 1)]))]);

    let resolution = manager
        .resolve_requirements(&[
            SystemRequirement::new("core", "Core", 1),
            SystemRequirement::new("steam", "Steam", 1).optional(),
            SystemRequirement::new("core", "Telemetry", 1).optional(),
        ])
        .unwrap();

    assert_eq!(resolution.len(), 3);
    let core = resolution.get("Core").unwrap();
    assert_eq!(manager.interface(core).map(|e| e.hash()), Some(1));
    assert!(resolution.get("Steam").is_none());
    assert!(resolution.get("Telemetry").is_none());
    assert!(manager.is_loaded("core"));
}

#[test]
fn test_unload_all_is_reverse_order_and_idempotent() {
    let (_dir, source, mut manager) = fixture(&[
        ("core", FakeLibrary::Exports(vec![("Core", 1)])),
        ("render", FakeLibrary::Exports(vec![("Renderer", 1)])),
        ("game", FakeLibrary::Exports(vec![("Game", 1)])),
    ]);

    let resolution = manager
        .resolve_requirements(&[
            SystemRequirement::new("core", "Core", 1),
            SystemRequirement::new("render", "Renderer", 1),
            SystemRequirement::new("game", "Game", 1),
        ])
        .unwrap();
    let renderer = resolution.get("Renderer").unwrap();
    assert!(manager.interface(renderer).is_some());

    manager.unload_all();
    manager.unload_all();

    assert_eq!(
        source.closed_names(),
        vec![file("game"), file("render"), file("core")]
    );
    assert!(manager.interface(renderer).is_none());
}

#[test]
fn test_unload_single_module_invalidates_its_interfaces() {
    let (_dir, _source, mut manager) = fixture(&[
        ("core", FakeLibrary::Exports(vec![("Core", 1)])),
        ("render", FakeLibrary::Exports(vec![("Renderer", 1)])),
    ]);
    manager.load_module("core").unwrap();
    manager.load_module("render").unwrap();
    let core = manager.registry().resolve("Core", 1).unwrap();
    let renderer = manager.registry().resolve("Renderer", 1).unwrap();

    assert!(manager.unload_module("render"));
    assert!(!manager.unload_module("render"));

    assert!(manager.interface(renderer).is_none());
    assert!(manager.interface(core).is_some());
    assert_eq!(manager.loaded_modules(), vec!["core"]);
}

#[test]
fn test_conflicting_hash_from_second_module_is_shadowed() {
    let (_dir, _source, mut manager) = fixture(&[
        ("core", FakeLibrary::Exports(vec![("Core", 1)])),
        ("mod", FakeLibrary::Exports(vec![("Core", 2), ("ModTools", 1)])),
    ]);
    let core_module = manager.load_module("core").unwrap();
    manager.load_module("mod").unwrap();

    let core = manager.registry().resolve("Core", 1).unwrap();
    assert_eq!(manager.interface(core).map(|e| e.owner()), Some(core_module));
    assert!(manager.registry().resolve("Core", 2).unwrap_err().is_not_found());
    assert!(manager.registry().resolve("ModTools", 1).is_ok());
}

#[test]
fn test_single_requirement_failure_keeps_other_modules() {
    let (_dir, source, mut manager) = fixture(&[
        ("core", FakeLibrary::Exports(vec![("Core", 1)])),
        ("server", FakeLibrary::Exports(vec![("Server", 1)])),
    ]);
    manager.load_module("core").unwrap();

    let err = manager
        .resolve_requirement(&SystemRequirement::new("server", "Server", 2))
        .unwrap_err();
    match err {
        ModuleError::Unresolved { failures } => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].starts_with("server - Server"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(manager.loaded_modules(), vec!["core", "server"]);

    assert!(manager
        .resolve_requirement(&SystemRequirement::new("client", "Client", 1))
        .is_err());
    assert_eq!(manager.loaded_modules(), vec!["core", "server"]);
    assert!(source.closed_names().is_empty());

    let id = manager
        .resolve_requirement(&SystemRequirement::new("server", "Server", 1))
        .unwrap();
    assert_eq!(manager.interface(id).unwrap().name(), "Server");
}
