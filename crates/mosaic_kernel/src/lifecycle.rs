//! System lifecycle controller
//!
//! Holds systems in resolution order and drives them through
//! `Unresolved -> Resolved -> Initialized -> ShutDown`. Shutdown always runs
//! in exact reverse of the order in which inits succeeded.

use crate::convar::ConVarRegistry;
use crate::error::{KernelError, Result};
use crate::system::System;

/// Where a system is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    /// Declared but its interface never resolved
    Unresolved,
    Resolved,
    Initialized,
    ShutDown,
}

struct SystemSlot {
    name: String,
    system: Option<Box<dyn System>>,
    required: bool,
    state: SystemState,
}

/// Ordered set of systems and their states
#[derive(Default)]
pub struct SystemController {
    slots: Vec<SystemSlot>,
    /// Slot indices in the order their init succeeded
    init_order: Vec<usize>,
}

impl SystemController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolved system after all existing ones
    pub fn add(&mut self, system: Box<dyn System>, required: bool) {
        self.slots.push(SystemSlot {
            name: system.name().to_string(),
            system: Some(system),
            required,
            state: SystemState::Resolved,
        });
    }

    /// Record a system whose interface could not be resolved
    pub fn add_unresolved(&mut self, name: impl Into<String>, required: bool) {
        self.slots.push(SystemSlot {
            name: name.into(),
            system: None,
            required,
            state: SystemState::Unresolved,
        });
    }

    /// Init every resolved system in order
    ///
    /// The first required system that fails stops the sequence: systems
    /// already initialized are shut down in reverse order and later systems
    /// are never touched. Optional failures are logged and left `Resolved`.
    pub fn init_all(&mut self) -> Result<()> {
        for index in 0..self.slots.len() {
            self.init_slot(index)?;
        }

        log::info!("Initialized {} systems", self.init_order.len());
        Ok(())
    }

    /// Init one resolved system by name
    ///
    /// Returns `true` when the system came up now. Systems that are already
    /// initialized, unresolved, or optional and failing return `false`. A
    /// required failure shuts down every initialized system, as in
    /// [`init_all`](Self::init_all).
    pub fn init_system(&mut self, name: &str) -> Result<bool> {
        let index = self
            .slots
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| KernelError::UnknownSystem {
                system: name.to_string(),
            })?;
        self.init_slot(index)
    }

    fn init_slot(&mut self, index: usize) -> Result<bool> {
        let slot = &mut self.slots[index];
        if slot.state != SystemState::Resolved {
            return Ok(false);
        }
        let Some(system) = slot.system.as_mut() else {
            return Ok(false);
        };

        log::debug!("Initializing system '{}'", slot.name);
        if system.init() {
            slot.state = SystemState::Initialized;
            self.init_order.push(index);
            Ok(true)
        } else if slot.required {
            log::error!("Failed to Init Required System '{}'", slot.name);
            let name = slot.name.clone();
            self.shutdown_all();
            Err(KernelError::init_failed(name))
        } else {
            log::warn!("Failed to Init Optional System '{}'", slot.name);
            Ok(false)
        }
    }

    /// Merge the convars of every initialized system into `convars`
    pub fn register_globals(&self, convars: &mut ConVarRegistry) -> usize {
        self.init_order
            .iter()
            .map(|index| self.declare_convars(*index, convars))
            .sum()
    }

    /// Merge the convars of one initialized system into `convars`
    pub fn register_system_globals(&self, name: &str, convars: &mut ConVarRegistry) -> usize {
        self.init_order
            .iter()
            .find(|index| self.slots[**index].name == name)
            .map(|index| self.declare_convars(*index, convars))
            .unwrap_or(0)
    }

    fn declare_convars(&self, index: usize, convars: &mut ConVarRegistry) -> usize {
        let Some(system) = self.slots[index].system.as_ref() else {
            return 0;
        };
        system
            .convars()
            .into_iter()
            .map(|decl| convars.declare(decl))
            .filter(|declared| *declared)
            .count()
    }

    /// Shut down initialized systems in reverse init order. Safe to call repeatedly.
    pub fn shutdown_all(&mut self) {
        while let Some(index) = self.init_order.pop() {
            let slot = &mut self.slots[index];
            if let Some(system) = slot.system.as_mut() {
                log::debug!("Shutting down system '{}'", slot.name);
                system.shutdown();
            }
            slot.state = SystemState::ShutDown;
        }
    }

    /// Drop every system. Initialized systems are shut down first.
    pub fn clear(&mut self) {
        self.shutdown_all();
        self.slots.clear();
    }

    /// State of the first system with this name
    pub fn state(&self, name: &str) -> Option<SystemState> {
        self.slots.iter().find(|s| s.name == name).map(|s| s.state)
    }

    /// System names and states in resolution order
    pub fn iter(&self) -> impl Iterator<Item = (&str, SystemState)> {
        self.slots.iter().map(|s| (s.name.as_str(), s.state))
    }

    /// Names of initialized systems in init order
    pub fn initialized(&self) -> Vec<&str> {
        self.init_order
            .iter()
            .map(|i| self.slots[*i].name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for SystemController {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
