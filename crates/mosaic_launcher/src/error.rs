//! Launch failures and their process exit codes

use std::fmt;
use thiserror::Error;

/// Launch stage that failed. Each maps to its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStage {
    RuntimeLibrary,
    CoreLibrary,
    UiLibrary,
    CoreInitSymbol,
    CoreExitSymbol,
    CoreInit,
    AppLibrary,
    AppInitSymbol,
}

impl LaunchStage {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::RuntimeLibrary => -1,
            Self::CoreLibrary => -2,
            Self::UiLibrary => -3,
            Self::CoreInitSymbol => -4,
            Self::CoreExitSymbol => -5,
            Self::CoreInit => -6,
            Self::AppLibrary => -7,
            Self::AppInitSymbol => -8,
        }
    }
}

impl fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuntimeLibrary => write!(f, "Failed to load runtime library"),
            Self::CoreLibrary => write!(f, "Failed to load core library"),
            Self::UiLibrary => write!(f, "Failed to load ui library"),
            Self::CoreInitSymbol => write!(f, "Failed to find core_init"),
            Self::CoreExitSymbol => write!(f, "Failed to find core_exit"),
            Self::CoreInit => write!(f, "Failed to init core"),
            Self::AppLibrary => write!(f, "Failed to load app library"),
            Self::AppInitSymbol => write!(f, "Failed to find app_init"),
        }
    }
}

/// A fatal launch failure
#[derive(Debug, Error)]
#[error("{stage}: {message}")]
pub struct LaunchError {
    pub stage: LaunchStage,
    pub message: String,
}

impl LaunchError {
    pub fn new(stage: LaunchStage, message: impl fmt::Display) -> Self {
        Self {
            stage,
            message: message.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.stage.exit_code()
    }
}
