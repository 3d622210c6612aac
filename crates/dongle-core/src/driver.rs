//! Competing kernel driver mitigation.
//!
//! The default gamepad driver (xpad on Linux) grabs the emulated pad and
//! swallows vendor reports. The session unloads it while open and reloads it
//! on close, but only if it was the one that unloaded it.

use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to run modprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("modprobe {action} {driver} failed: {stderr}")]
    Failed {
        action: &'static str,
        driver: String,
        stderr: String,
    },
}

/// OS driver management.
pub trait DriverControl: Send + Sync {
    /// Unload `driver`.
    fn remove(&self, driver: &str) -> Result<(), DriverError>;

    /// Load `driver` with module arguments `args`.
    fn load(&self, driver: &str, args: &str) -> Result<(), DriverError>;
}

/// Driver control through the `modprobe` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct Modprobe;

impl Modprobe {
    fn run(action: &'static str, driver: &str, cmd: &mut Command) -> Result<(), DriverError> {
        let output = cmd.output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::Failed {
                action,
                driver: driver.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl DriverControl for Modprobe {
    fn remove(&self, driver: &str) -> Result<(), DriverError> {
        Self::run("-r", driver, Command::new("modprobe").arg("-r").arg(driver))
    }

    fn load(&self, driver: &str, args: &str) -> Result<(), DriverError> {
        Self::run(
            "load",
            driver,
            Command::new("modprobe")
                .arg(driver)
                .args(args.split_whitespace()),
        )
    }
}

/// Record of what the session did to the competing driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverMitigation {
    driver: Option<String>,
    unloaded: bool,
}

impl DriverMitigation {
    /// No mitigation configured.
    pub fn disabled() -> Self {
        Self {
            driver: None,
            unloaded: false,
        }
    }

    /// Try to unload `driver`. Failure is logged, never fatal: the driver may
    /// not be loaded at all.
    pub fn engage(control: &dyn DriverControl, driver: Option<&str>) -> Self {
        let Some(driver) = driver else {
            return Self::disabled();
        };
        let unloaded = match control.remove(driver) {
            Ok(()) => {
                info!(driver, "Unloaded competing kernel driver");
                true
            }
            Err(e) => {
                debug!(driver, error = %e, "Competing kernel driver not unloaded");
                false
            }
        };
        Self {
            driver: Some(driver.to_string()),
            unloaded,
        }
    }

    /// Whether the driver was unloaded by this session and not restored yet.
    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    /// Reload the driver if this session unloaded it. Failure is logged.
    pub fn restore(&mut self, control: &dyn DriverControl) {
        if !std::mem::take(&mut self.unloaded) {
            return;
        }
        let Some(driver) = self.driver.as_deref() else {
            return;
        };
        info!(driver, "Reloading competing kernel driver");
        if let Err(e) = control.load(driver, "") {
            warn!(driver, error = %e, "Failed to reload kernel driver");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::RecordingDriver;
    use super::*;

    #[test]
    fn test_restore_after_unload() {
        let control = RecordingDriver::default();
        let mut mitigation = DriverMitigation::engage(&control, Some("xpad"));
        assert!(mitigation.is_unloaded());

        mitigation.restore(&control);
        mitigation.restore(&control);
        assert!(!mitigation.is_unloaded());
        assert_eq!(control.calls(), vec!["remove xpad", "load xpad"]);
    }

    #[test]
    fn test_failed_unload_is_not_reversed() {
        let control = RecordingDriver {
            fail_remove: true,
            ..Default::default()
        };
        let mut mitigation = DriverMitigation::engage(&control, Some("xpad"));
        assert!(!mitigation.is_unloaded());

        mitigation.restore(&control);
        assert_eq!(control.calls(), vec!["remove xpad"]);
    }

    #[test]
    fn test_failed_reload_is_swallowed() {
        let control = RecordingDriver {
            fail_load: true,
            ..Default::default()
        };
        let mut mitigation = DriverMitigation::engage(&control, Some("xpad"));
        mitigation.restore(&control);
        assert!(!mitigation.is_unloaded());
    }

    #[test]
    fn test_disabled() {
        let control = RecordingDriver::default();
        let mut mitigation = DriverMitigation::engage(&control, None);
        mitigation.restore(&control);
        assert_eq!(mitigation, DriverMitigation::disabled());
        assert!(control.calls().is_empty());
    }
}
