//! System configuration
//!
//! Table capacities and the per-index capture device defaults. Everything has
//! a default, so an empty TOML document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::module::ModuleId;
use crate::{Error, Result};

/// Configuration for a [`MediaSystem`](crate::MediaSystem)
///
/// # Example
///
/// ```
/// use media_channels::SystemConfig;
///
/// let config = SystemConfig::from_toml_str(r#"
///     vi_devices = ["/dev/video0", "/dev/video1"]
///
///     [capacity]
///     venc = 4
/// "#).unwrap();
/// assert_eq!(config.capacity.venc, 4);
/// assert_eq!(config.vi_devices.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Number of channel slots per module type
    pub capacity: TableCapacity,

    /// Device path pre-populated into video input slot `i` at table init
    pub vi_devices: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            capacity: TableCapacity::default(),
            vi_devices: vec![
                "/dev/video13".to_string(), // ispp bypass
                "/dev/video14".to_string(), // ispp scale0
                "/dev/video15".to_string(), // ispp scale1
                "/dev/video16".to_string(), // ispp scale2
            ],
        }
    }
}

impl SystemConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SystemConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading channel configuration");
        Self::from_toml_str(&contents)
    }

    /// Reject configurations no table can be built from
    pub fn validate(&self) -> Result<()> {
        for module in ModuleId::CHANNEL_MODULES {
            if self.capacity.of(module) == 0 {
                return Err(Error::Config(format!(
                    "capacity for {} must be at least 1",
                    module
                )));
            }
        }
        if self.vi_devices.iter().any(|p| p.is_empty()) {
            return Err(Error::Config("vi_devices entries must not be empty".to_string()));
        }
        Ok(())
    }

    /// Default device path for a video input index, if one is configured
    pub fn vi_device(&self, index: usize) -> Option<&str> {
        self.vi_devices.get(index).map(String::as_str)
    }
}

/// Channel slots per module type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableCapacity {
    pub vi: usize,
    pub venc: usize,
    pub vdec: usize,
    pub ai: usize,
    pub ao: usize,
    pub aenc: usize,
}

impl Default for TableCapacity {
    fn default() -> Self {
        Self {
            vi: 4,
            venc: 16,
            vdec: 16,
            ai: 1,
            ao: 1,
            aenc: 16,
        }
    }
}

impl TableCapacity {
    /// Capacity for a module type (0 for modules without a channel table)
    pub fn of(&self, module: ModuleId) -> usize {
        match module {
            ModuleId::Vi => self.vi,
            ModuleId::Venc => self.venc,
            ModuleId::Vdec => self.vdec,
            ModuleId::Ai => self.ai,
            ModuleId::Ao => self.ao,
            ModuleId::Aenc => self.aenc,
            _ => 0,
        }
    }
}
