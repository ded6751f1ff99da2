//! Checks that the hardware performance-counter interface is usable before any
//! process is started in profiling mode.
//!
//! AMD uProf PCM reads model-specific registers through the `msr` kernel
//! module. Loading it needs root, so the check goes through `sudo modprobe`.

use crate::{cli::HarnessConfig, error::HarnessError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

/// Result of trying to make a kernel module available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleAvailability {
    Available,
    Unavailable { reason: String },
    PermissionDenied,
}

impl ModuleAvailability {
    /// Turn anything but `Available` into the matching fatal error.
    pub fn into_result(self, module: &str) -> Result<(), HarnessError> {
        match self {
            ModuleAvailability::Available => Ok(()),
            ModuleAvailability::Unavailable { reason } => {
                error!("Error inserting {} kernel module: {}", module, reason);
                Err(HarnessError::ModuleUnavailable {
                    module: module.to_string(),
                    reason,
                })
            }
            ModuleAvailability::PermissionDenied => {
                error!("Permission denied inserting {} kernel module", module);
                Err(HarnessError::ModulePermissionDenied {
                    module: module.to_string(),
                })
            }
        }
    }
}

/// Something that can load a kernel module and report whether it worked.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, module: &str) -> ModuleAvailability;
}

/// Loads modules with `modprobe`, optionally through `sudo`.
#[derive(Clone, Debug)]
pub struct ModprobeLoader {
    pub program: String,
    pub use_sudo: bool,
}

impl Default for ModprobeLoader {
    fn default() -> Self {
        Self {
            program: crate::defaults::MODPROBE.to_string(),
            use_sudo: true,
        }
    }
}

impl ModprobeLoader {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            program: config.modprobe.clone(),
            use_sudo: config.use_sudo,
        }
    }

    fn command(&self, module: &str) -> Command {
        let mut cmd = if self.use_sudo {
            let mut c = Command::new("sudo");
            c.arg(&self.program);
            c
        } else {
            Command::new(&self.program)
        };
        // sudo may need the terminal for a password prompt.
        cmd.arg(module).stdin(Stdio::inherit());
        cmd
    }
}

#[async_trait]
impl ModuleLoader for ModprobeLoader {
    async fn load(&self, module: &str) -> ModuleAvailability {
        debug!(
            "Loading kernel module {} with {} (sudo: {})",
            module, self.program, self.use_sudo
        );
        match self.command(module).status().await {
            Ok(status) if status.success() => ModuleAvailability::Available,
            Ok(status) => ModuleAvailability::Unavailable {
                reason: format!("{} exited with {}", self.program, status),
            },
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                ModuleAvailability::PermissionDenied
            }
            Err(e) => ModuleAvailability::Unavailable {
                reason: format!("{}: {}", self.program, e),
            },
        }
    }
}
