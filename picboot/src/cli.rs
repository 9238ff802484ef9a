use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use picboot_lib::utils::Utils;
use picboot_lib::{AddressRange, DeviceProfile};
use std::time::Duration;

use crate::config::{Defaults, DevicesConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "PIC serial bootloader CLI", long_about = None)]
pub struct Cli {
    /// Device profile JSON file
    #[arg(short = 'f', long = "devices", default_value = Defaults::DEVICES_FILE)]
    pub devices: String,

    /// Device profile name (may be omitted when the file holds a single profile)
    #[arg(short = 'd', long = "device")]
    pub device: Option<String>,

    /// Serial port device
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Serial port baud rate (default: the profile's recommended rate)
    #[arg(short = 'b', long = "baud")]
    pub baud: Option<u32>,

    /// UART read timeout in milliseconds (default: the profile's timeout)
    #[arg(short = 't', long = "timeout")]
    pub timeout: Option<u64>,

    /// Restrict erase/read/write to one region (format: <first:last>)
    #[arg(short = 'r', long = "range", global = true)]
    pub range: Option<String>,

    /// Suppress progress bar output (default: false)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Erase program memory
    #[command(name = "erase")]
    Erase,

    /// Read program memory into an Intel HEX file
    #[command(name = "read")]
    Read(ReadArgs),

    /// Write an Intel HEX file into program memory
    #[command(name = "write")]
    Write(WriteArgs),

    /// Start the application code
    #[command(name = "run")]
    Run,

    /// List the device profiles of the profile file
    #[command(name = "devices")]
    Devices,
}

#[derive(Parser, Debug, Clone)]
pub struct ReadArgs {
    /// Output HEX file
    #[arg(required = true)]
    pub output: String,
}

#[derive(Parser, Debug, Clone)]
pub struct WriteArgs {
    /// Input HEX file
    #[arg(required = true)]
    pub input: String,

    /// Write even if the HEX file had errors
    #[arg(long = "force")]
    pub force: bool,
}

/// Everything a device command needs, after merging CLI arguments with the profile.
#[derive(Debug, Clone)]
pub struct Settings {
    pub profile: DeviceProfile,
    pub port: String,
    pub baud: u32,
    pub timeout: Duration,
    /// Regions the command works on
    pub ranges: Vec<AddressRange>,
    pub quiet: bool,
}

/// Merge CLI arguments with the device profile, CLI args take precedence
pub fn merge_config(args: &Cli, config: &DevicesConfig) -> Result<Settings> {
    let device = match &args.device {
        Some(name) => config
            .find(name)
            .ok_or_else(|| anyhow!("Device '{}' not found in {}", name, args.devices))?,
        None => match config.devices.as_slice() {
            [only] => only,
            [] => bail!("No device profiles in {}", args.devices),
            _ => bail!("Several device profiles found, select one with --device"),
        },
    };
    let profile = device
        .to_profile()
        .with_context(|| format!("Invalid device profile '{}'", device.name))?;

    let port = args
        .port
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("Port must be specified via --port"))?;

    let baud = args.baud.unwrap_or(profile.baud);
    if !(DeviceProfile::MIN_BAUD..=DeviceProfile::MAX_BAUD).contains(&baud) {
        bail!(
            "Speed must be a number <{} .. {}>",
            DeviceProfile::MIN_BAUD,
            DeviceProfile::MAX_BAUD
        );
    }

    let timeout = match args.timeout {
        Some(0) => bail!("Timeout must be non-zero"),
        Some(ms) => Duration::from_millis(ms),
        None => profile.timeout,
    };

    let ranges = match &args.range {
        Some(range) => vec![Utils::parse_range(range).context("Invalid --range")?],
        None => profile.prog_ranges.clone(),
    };

    Ok(Settings {
        profile,
        port,
        baud,
        timeout,
        ranges,
        quiet: args.quiet,
    })
}
