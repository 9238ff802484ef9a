use anyhow::{Context, Result, anyhow};
use picboot_lib::{AddressRange, DeviceProfile};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default values for the device profile file
pub struct Defaults;

impl Defaults {
    pub const DEVICES_FILE: &'static str = "devices.json";
    pub const BAUD: u32 = DeviceProfile::DEFAULT_BAUD;
    pub const TIMEOUT_MS: u64 = 2000;
}

/// Hex string, e.g. "0x1F00"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexString(pub String);

impl HexString {
    pub fn to_u32(&self) -> Result<u32, String> {
        let Some(hex_part) = self.0.strip_prefix("0x") else {
            return Err(format!("Invalid hex string format: {}", self.0));
        };
        u32::from_str_radix(hex_part, 16)
            .map_err(|e| format!("Failed to parse hex string '{}': {}", self.0, e))
    }
}

/// Inclusive address range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    pub first: HexString,
    pub last: HexString,
}

impl RangeConfig {
    pub fn to_range(&self) -> Result<AddressRange, String> {
        Ok(AddressRange::new(self.first.to_u32()?, self.last.to_u32()?))
    }
}

/// One device profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub write_block: u32,
    pub read_block: u32,
    pub erase_block: u32,
    pub max_pkt_size: u32,
    pub bytes_per_addr: u32,
    pub prog: Vec<RangeConfig>,
    pub data: RangeConfig,
}

/// Root of the JSON profile file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    pub devices: Vec<DeviceConfig>,
}

fn default_baud() -> u32 {
    Defaults::BAUD
}
fn default_timeout_ms() -> u64 {
    Defaults::TIMEOUT_MS
}

impl DevicesConfig {
    /// Load profiles from a JSON file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device profiles from {}", path))?;
        Self::from_json(&content).with_context(|| format!("Invalid device profile file {}", path))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Find a profile by name, ignoring ASCII case
    pub fn find(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

impl DeviceConfig {
    /// Convert into a validated profile.
    ///
    /// A baud rate outside the supported range falls back to the default.
    pub fn to_profile(&self) -> Result<DeviceProfile> {
        let baud = if (DeviceProfile::MIN_BAUD..=DeviceProfile::MAX_BAUD).contains(&self.baud) {
            self.baud
        } else {
            tracing::warn!(
                "device '{}': baud {} out of range, using {}",
                self.name,
                self.baud,
                Defaults::BAUD
            );
            Defaults::BAUD
        };

        let prog_ranges = self
            .prog
            .iter()
            .map(RangeConfig::to_range)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Invalid program memory range: {}", e))?;
        let data_range = self
            .data
            .to_range()
            .map_err(|e| anyhow!("Invalid data memory range: {}", e))?;

        let profile = DeviceProfile {
            name: self.name.clone(),
            baud,
            timeout: Duration::from_millis(self.timeout_ms),
            write_block: self.write_block,
            read_block: self.read_block,
            erase_block: self.erase_block,
            max_pkt_size: self.max_pkt_size,
            bytes_per_addr: self.bytes_per_addr,
            prog_ranges,
            data_range,
        };
        profile.validate()?;
        Ok(profile)
    }
}
