//! Kernel context
//!
//! Owns the module manager, the system controller, the convar registry and
//! the resource tracker for one process. Startup runs in three phases:
//!
//! 1. load the convar archive
//! 2. resolve requirements and init every system in order
//! 3. merge the convars every system declares
//!
//! Systems can also be brought up one at a time after startup with
//! [`Kernel::load_system`] and [`Kernel::init_system`]. Only the new system's
//! convars are merged; the archive is not reloaded.
//!
//! Shutdown reverses it: systems shut down in reverse init order, the
//! archive is optionally written, then modules unload in reverse load order.

use crate::config::AppInfo;
use crate::convar::ConVarRegistry;
use crate::error::{KernelError, Result};
use crate::lifecycle::{SystemController, SystemState};
use crate::system::{NativeSystem, System};
use mosaic_module::{InterfaceId, ModuleManager, SystemRequirement};
use mosaic_resource::{PollReport, ResourceTracker};
use std::time::Instant;

pub struct Kernel {
    app: AppInfo,
    modules: ModuleManager,
    systems: SystemController,
    convars: ConVarRegistry,
    resources: ResourceTracker,
    last_poll: Option<Instant>,
    started: bool,
}

impl Kernel {
    /// Create a kernel that loads native modules from the app's search paths
    pub fn new(app: AppInfo) -> Self {
        let modules = ModuleManager::new(app.search_paths());
        Self::with_parts(app, modules, ResourceTracker::new())
    }

    /// Create a kernel from pre-built parts
    pub fn with_parts(app: AppInfo, modules: ModuleManager, resources: ResourceTracker) -> Self {
        Self {
            app,
            modules,
            systems: SystemController::new(),
            convars: ConVarRegistry::new(),
            resources,
            last_poll: None,
            started: false,
        }
    }

    /// Add an in-process system, initialized before any system resolved at startup
    pub fn add_host_system(&mut self, system: impl System + 'static, required: bool) {
        self.systems.add(Box::new(system), required);
    }

    /// Resolve `requirements` and bring every system up
    ///
    /// On failure nothing stays initialized and every module is unloaded.
    pub fn startup(&mut self, requirements: &[SystemRequirement]) -> Result<()> {
        if let Some(path) = self.app.convar_archive.as_deref() {
            if let Err(e) = self.convars.load_archive(path) {
                log::warn!("Ignoring convar archive: {}", e);
            }
        }

        let resolution = self.modules.resolve_requirements(requirements)?;

        for resolved in resolution.iter() {
            let req = &resolved.requirement;
            let Some(id) = resolved.interface else {
                self.systems.add_unresolved(req.interface.as_str(), req.required);
                continue;
            };

            match self.native_system(req, id) {
                Ok(system) => self.systems.add(Box::new(system), req.required),
                Err(e) if req.required => {
                    log::error!("{}", e);
                    self.abort();
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Skipping optional system: {}", e);
                    self.systems.add_unresolved(req.interface.as_str(), false);
                }
            }
        }

        if let Err(e) = self.systems.init_all() {
            self.abort();
            return Err(e);
        }

        let declared = self.systems.register_globals(&mut self.convars);
        log::debug!("Registered {} convars", declared);

        self.started = true;
        log::info!("Kernel started for '{}'", self.app.name);
        Ok(())
    }

    /// Resolve one more system and add it after every existing one
    ///
    /// A required failure shuts every system down and unloads every module,
    /// like a failed startup. An optional failure is recorded as unresolved
    /// and unloads the system's module only if this call loaded it.
    pub fn load_system(&mut self, req: &SystemRequirement) -> Result<()> {
        if matches!(
            self.systems.state(&req.interface),
            Some(SystemState::Resolved | SystemState::Initialized)
        ) {
            return Ok(());
        }

        let newly_loaded = !self.modules.is_loaded(&req.module);
        let system = self
            .modules
            .resolve_requirement(req)
            .map_err(KernelError::from)
            .and_then(|id| self.native_system(req, id));

        match system {
            Ok(system) => {
                log::info!("Loaded system '{}' from '{}'", req.interface, req.module);
                self.systems.add(Box::new(system), req.required);
                Ok(())
            }
            Err(e) if req.required => {
                log::error!("{}", e);
                self.abort();
                Err(e)
            }
            Err(e) => {
                log::warn!("Skipping optional system: {}", e);
                if newly_loaded {
                    self.modules.unload_module(&req.module);
                }
                self.systems.add_unresolved(req.interface.as_str(), false);
                Ok(())
            }
        }
    }

    /// Init a system added by [`load_system`](Self::load_system) and merge its convars
    ///
    /// A required init failure unwinds the whole kernel.
    pub fn init_system(&mut self, name: &str) -> Result<()> {
        match self.systems.init_system(name) {
            Ok(true) => {
                let declared = self.systems.register_system_globals(name, &mut self.convars);
                log::debug!("Registered {} convars for '{}'", declared, name);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// [`load_system`](Self::load_system) followed by [`init_system`](Self::init_system)
    pub fn load_and_init_system(&mut self, req: &SystemRequirement) -> Result<()> {
        self.load_system(req)?;
        self.init_system(&req.interface)
    }

    fn native_system(&self, req: &SystemRequirement, id: InterfaceId) -> Result<NativeSystem> {
        match self.modules.interface(id) {
            Some(entry) => NativeSystem::from_entry(entry),
            None => Err(KernelError::NotASystem {
                interface: req.interface.clone(),
            }),
        }
    }

    fn abort(&mut self) {
        self.systems.clear();
        self.modules.unload_all();
        self.started = false;
    }

    /// Poll tracked resources if the configured interval has elapsed
    pub fn tick(&mut self) -> Option<PollReport> {
        let interval = self.app.resources.poll_interval();
        let now = Instant::now();
        if let Some(last) = self.last_poll {
            if now.duration_since(last) < interval {
                return None;
            }
        }
        self.last_poll = Some(now);
        Some(self.resources.poll())
    }

    /// Shut everything down. Safe to call repeatedly.
    ///
    /// `write_archive` saves archive-flagged convars before systems are dropped.
    pub fn shutdown(&mut self, write_archive: bool) {
        self.systems.shutdown_all();

        if write_archive && self.started {
            if let Some(path) = self.app.convar_archive.as_deref() {
                if let Err(e) = self.convars.save_archive(path) {
                    log::error!("Failed to archive convars: {}", e);
                }
            }
        }

        self.systems.clear();
        self.modules.unload_all();
        if self.started {
            log::info!("Kernel shut down");
        }
        self.started = false;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn app(&self) -> &AppInfo {
        &self.app
    }

    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    pub fn systems(&self) -> &SystemController {
        &self.systems
    }

    pub fn convars(&self) -> &ConVarRegistry {
        &self.convars
    }

    pub fn convars_mut(&mut self) -> &mut ConVarRegistry {
        &mut self.convars
    }

    pub fn resources(&self) -> &ResourceTracker {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceTracker {
        &mut self.resources
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}
