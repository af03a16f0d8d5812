//! Error types for module loading and interface resolution

use std::path::PathBuf;
use thiserror::Error;

/// Result type for module operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors raised while loading modules or resolving requirements
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Library file does not exist
    #[error("Library not found: '{0}'")]
    LibraryNotFound(PathBuf),

    /// No file for a logical module name under any search path
    #[error("No module named '{name}' found in search paths {searched:?}")]
    ModuleNotFound {
        name: String,
        searched: Vec<PathBuf>,
    },

    /// The OS loader rejected the library
    #[error("Failed to load library '{path}': {message}")]
    LoadFailed {
        path: PathBuf,
        message: String,
    },

    /// Library does not export a required symbol
    #[error("Symbol '{symbol}' not found in library '{library}': {message}")]
    SymbolNotFound {
        library: String,
        symbol: String,
        message: String,
    },

    /// The interface enumeration returned nothing
    #[error("Failed to load interfaces from library '{0}'")]
    NoInterfaces(String),

    /// The interface table contains a malformed descriptor
    #[error("Invalid interface descriptor in '{library}': {message}")]
    InvalidInterface {
        library: String,
        message: String,
    },

    /// One or more required modules or interfaces could not be resolved
    #[error("Failed to load required modules or systems:{}", format_failures(.failures))]
    Unresolved {
        failures: Vec<String>,
    },
}

impl ModuleError {
    /// Create a load failure
    pub fn load_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ModuleError::LoadFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(
        library: impl Into<String>,
        symbol: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ModuleError::SymbolNotFound {
            library: library.into(),
            symbol: symbol.into(),
            message: message.into(),
        }
    }

    /// Create an invalid interface error
    pub fn invalid_interface(library: impl Into<String>, message: impl Into<String>) -> Self {
        ModuleError::InvalidInterface {
            library: library.into(),
            message: message.into(),
        }
    }
}

fn format_failures(failures: &[String]) -> String {
    failures.iter().map(|f| format!("\n\t{}", f)).collect()
}

/// Errors raised by the interface registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No interface with this name is published
    #[error("Failed to find interface: {name}")]
    InterfaceNotFound { name: String },

    /// The name is published but only under other version hashes
    #[error("Found interface '{name}' but version is different: requested {requested:#x}, available {available:x?}")]
    InterfaceMismatch {
        name: String,
        requested: u64,
        available: Vec<u64>,
    },

    /// A second module tried to publish a name under a different hash
    #[error("Interface '{name}' already published with hash {existing:#x}, rejected hash {rejected:#x}")]
    Conflict {
        name: String,
        existing: u64,
        rejected: u64,
    },
}

impl RegistryError {
    /// Both a missing name and a hash mismatch resolve to "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::InterfaceNotFound { .. } | RegistryError::InterfaceMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_lists_every_failure() {
        let err = ModuleError::Unresolved {
            failures: vec!["audio".into(), "core - Core Version 0x2".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\n\taudio"));
        assert!(msg.contains("\n\tcore - Core Version 0x2"));
    }

    #[test]
    fn test_mismatch_is_not_found_class() {
        let err = RegistryError::InterfaceMismatch {
            name: "Core".into(),
            requested: 2,
            available: vec![1],
        };
        assert!(err.is_not_found());
        assert!(!RegistryError::Conflict {
            name: "Core".into(),
            existing: 1,
            rejected: 2
        }
        .is_not_found());
    }
}
