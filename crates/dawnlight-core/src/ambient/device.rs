//! Brightness and torch capabilities.
//!
//! The effector drives these traits and never talks to hardware directly.
//! Linux devices are reached through sysfs (`/sys/class/backlight`,
//! `/sys/class/leds`); everything else falls back to the simulated
//! implementations, which only record what they were asked to do.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CapabilityError;
use crate::lock;

/// Screen (or lamp) brightness in `[0, 1]`.
pub trait BrightnessControl: Send + Sync {
    fn brightness(&self) -> Result<f64, CapabilityError>;
    fn set_brightness(&self, level: f64) -> Result<(), CapabilityError>;
}

/// Auxiliary on/off light.
pub trait TorchControl: Send + Sync {
    fn set_torch(&self, on: bool) -> Result<(), CapabilityError>;
}

/// Capability that is not present on this device.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl BrightnessControl for Unsupported {
    fn brightness(&self) -> Result<f64, CapabilityError> {
        Err(CapabilityError::unavailable("brightness", "not supported"))
    }

    fn set_brightness(&self, _level: f64) -> Result<(), CapabilityError> {
        Ok(())
    }
}

impl TorchControl for Unsupported {
    fn set_torch(&self, _on: bool) -> Result<(), CapabilityError> {
        Ok(())
    }
}

/// In-memory brightness that records every level it was set to.
#[derive(Debug)]
pub struct SimulatedBacklight {
    level: Mutex<f64>,
    history: Mutex<Vec<f64>>,
}

impl SimulatedBacklight {
    pub fn new(initial: f64) -> Self {
        Self {
            level: Mutex::new(initial.clamp(0.0, 1.0)),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn level(&self) -> f64 {
        *lock(&self.level)
    }

    pub fn history(&self) -> Vec<f64> {
        lock(&self.history).clone()
    }
}

impl BrightnessControl for SimulatedBacklight {
    fn brightness(&self) -> Result<f64, CapabilityError> {
        Ok(self.level())
    }

    fn set_brightness(&self, level: f64) -> Result<(), CapabilityError> {
        let level = level.clamp(0.0, 1.0);
        *lock(&self.level) = level;
        lock(&self.history).push(level);
        Ok(())
    }
}

/// In-memory torch that counts its toggles.
#[derive(Debug, Default)]
pub struct SimulatedTorch {
    state: Mutex<(bool, usize)>,
}

impl SimulatedTorch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        lock(&self.state).0
    }

    /// Number of calls that changed the torch state.
    pub fn toggles(&self) -> usize {
        lock(&self.state).1
    }
}

impl TorchControl for SimulatedTorch {
    fn set_torch(&self, on: bool) -> Result<(), CapabilityError> {
        let mut state = lock(&self.state);
        if state.0 != on {
            state.1 += 1;
        }
        state.0 = on;
        Ok(())
    }
}

fn read_u64(path: &Path, capability: &str) -> Result<u64, CapabilityError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CapabilityError::call_failed(capability, format!("{}: {e}", path.display())))?;
    raw.trim()
        .parse()
        .map_err(|e| CapabilityError::call_failed(capability, format!("{}: {e}", path.display())))
}

fn write_u64(path: &Path, value: u64, capability: &str) -> Result<(), CapabilityError> {
    std::fs::write(path, value.to_string())
        .map_err(|e| CapabilityError::call_failed(capability, format!("{}: {e}", path.display())))
}

/// Pick `name` under `class_dir`, or the first entry when no name is given.
fn find_device(class_dir: &Path, name: Option<&str>, capability: &str) -> Result<PathBuf, CapabilityError> {
    if let Some(name) = name {
        let dir = class_dir.join(name);
        return if dir.is_dir() {
            Ok(dir)
        } else {
            Err(CapabilityError::unavailable(capability, format!("{} not found", dir.display())))
        };
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(class_dir)
        .map_err(|e| CapabilityError::unavailable(capability, format!("{}: {e}", class_dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    entries
        .into_iter()
        .next()
        .ok_or_else(|| CapabilityError::unavailable(capability, "no device present"))
}

/// Linux backlight under `/sys/class/backlight/<name>`.
#[derive(Debug, Clone)]
pub struct SysfsBacklight {
    dir: PathBuf,
    max: u64,
}

impl SysfsBacklight {
    pub const CLASS_DIR: &'static str = "/sys/class/backlight";

    /// Open the named backlight, or the first one found.
    ///
    /// # Errors
    /// Returns `CapabilityError::Unavailable` when no usable device exists.
    pub fn open(name: Option<&str>) -> Result<Self, CapabilityError> {
        Self::open_in(Path::new(Self::CLASS_DIR), name)
    }

    pub fn open_in(class_dir: &Path, name: Option<&str>) -> Result<Self, CapabilityError> {
        let dir = find_device(class_dir, name, "brightness")?;
        let max = read_u64(&dir.join("max_brightness"), "brightness")?;
        if max == 0 {
            return Err(CapabilityError::unavailable("brightness", "max_brightness is 0"));
        }
        Ok(Self { dir, max })
    }
}

impl BrightnessControl for SysfsBacklight {
    fn brightness(&self) -> Result<f64, CapabilityError> {
        let raw = read_u64(&self.dir.join("brightness"), "brightness")?;
        Ok((raw as f64 / self.max as f64).clamp(0.0, 1.0))
    }

    fn set_brightness(&self, level: f64) -> Result<(), CapabilityError> {
        let raw = (level.clamp(0.0, 1.0) * self.max as f64).round() as u64;
        write_u64(&self.dir.join("brightness"), raw, "brightness")
    }
}

/// Linux LED under `/sys/class/leds/<name>`, used as the torch.
#[derive(Debug, Clone)]
pub struct SysfsLed {
    dir: PathBuf,
    max: u64,
}

impl SysfsLed {
    pub const CLASS_DIR: &'static str = "/sys/class/leds";

    /// # Errors
    /// Returns `CapabilityError::Unavailable` when no usable LED exists.
    pub fn open(name: Option<&str>) -> Result<Self, CapabilityError> {
        Self::open_in(Path::new(Self::CLASS_DIR), name)
    }

    pub fn open_in(class_dir: &Path, name: Option<&str>) -> Result<Self, CapabilityError> {
        let dir = find_device(class_dir, name, "torch")?;
        let max = read_u64(&dir.join("max_brightness"), "torch")?.max(1);
        Ok(Self { dir, max })
    }
}

impl TorchControl for SysfsLed {
    fn set_torch(&self, on: bool) -> Result<(), CapabilityError> {
        write_u64(&self.dir.join("brightness"), if on { self.max } else { 0 }, "torch")
    }
}
