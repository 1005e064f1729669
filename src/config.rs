//! TOML configuration for acquisition and validation.
//!
//! Every section carries defaults, so a partial file (or no file at all)
//! yields a usable configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{CaptureError, Result};
use crate::frame::Schema;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub schema: SchemaConfig,
    pub acquisition: AcquisitionConfig,
    pub validation: ValidationConfig,
}

/// Connection parameters for the serial link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device paths tried in order; the first that opens wins.
    pub candidates: Vec<String>,
    pub baud_rate: u32,
    pub parity: ParitySetting,
    pub stop_bits: StopBitsSetting,
    pub data_bits: DataBitsSetting,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParitySetting {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBitsSetting {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBitsSetting {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<ParitySetting> for serialport::Parity {
    fn from(p: ParitySetting) -> Self {
        match p {
            ParitySetting::None => serialport::Parity::None,
            ParitySetting::Odd => serialport::Parity::Odd,
            ParitySetting::Even => serialport::Parity::Even,
        }
    }
}

impl From<StopBitsSetting> for serialport::StopBits {
    fn from(s: StopBitsSetting) -> Self {
        match s {
            StopBitsSetting::One => serialport::StopBits::One,
            StopBitsSetting::Two => serialport::StopBits::Two,
        }
    }
}

impl From<DataBitsSetting> for serialport::DataBits {
    fn from(d: DataBitsSetting) -> Self {
        match d {
            DataBitsSetting::Five => serialport::DataBits::Five,
            DataBitsSetting::Six => serialport::DataBits::Six,
            DataBitsSetting::Seven => serialport::DataBits::Seven,
            DataBitsSetting::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Shape of one frame on the wire and one row on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub channels: Vec<String>,
    /// Whether rows carry a trailing label column.
    pub label_column: bool,
    /// Marker wrapped around each line by the firmware.
    pub sentinel: String,
    pub delimiter: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub data_dir: PathBuf,
    pub default_label: String,
    pub flush_interval_secs: u64,
    pub restart_delay_ms: u64,
    pub max_restarts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Dataset file extension, without the dot.
    pub extension: String,
    pub index_column: String,
    pub time_column: String,
    /// Per-second sample counts considered nominal.
    pub accepted_odr: BTreeSet<usize>,
    pub report_dir: PathBuf,
}

/// What a run is about to do; decides which directories must exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Acquisition,
    Validation,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            candidates: vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()],
            baud_rate: 19200,
            parity: ParitySetting::None,
            stop_bits: StopBitsSetting::One,
            data_bits: DataBitsSetting::Eight,
            timeout_ms: 100,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            channels: ["acc_x", "acc_y", "acc_z", "gyro_x", "gyro_y", "gyro_z"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            label_column: true,
            sentinel: "**".to_string(),
            delimiter: ',',
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_label: "farm_ft".to_string(),
            flush_interval_secs: 300,
            restart_delay_ms: 1000,
            max_restarts: 3,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
            index_column: "index".to_string(),
            time_column: "datetime".to_string(),
            accepted_odr: [24, 25, 26].into_iter().collect(),
            report_dir: PathBuf::from("reports"),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SchemaConfig {
    pub fn schema(&self) -> Schema {
        Schema::new(self.channels.clone(), self.label_column)
    }
}

impl AcquisitionConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| CaptureError::Config(format!("{}: {e}", path.display())))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CaptureError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial.candidates.is_empty() {
            return invalid("at least one serial candidate path is required");
        }
        if self.serial.baud_rate == 0 {
            return invalid("baud rate must be positive");
        }
        if self.schema.channels.is_empty() {
            return invalid("schema needs at least one channel");
        }
        if self.acquisition.flush_interval_secs == 0 {
            return invalid("flush interval must be positive");
        }
        if self.acquisition.default_label.trim().is_empty() {
            return invalid("default label must not be empty");
        }
        if self.validation.accepted_odr.is_empty() {
            return invalid("accepted ODR set must not be empty");
        }
        if self.validation.extension.trim_start_matches('.').is_empty() {
            return invalid("dataset extension must not be empty");
        }
        if self.validation.index_column == self.validation.time_column {
            return invalid("index and time columns must differ");
        }
        Ok(())
    }

    /// Create the directories a run of the given mode writes into.
    pub fn prepare(&self, mode: RunMode) -> Result<()> {
        let dir = match mode {
            RunMode::Acquisition => &self.acquisition.data_dir,
            RunMode::Validation => &self.validation.report_dir,
        };
        std::fs::create_dir_all(dir)?;
        debug!("Prepared {:?} directory {}", mode, dir.display());
        Ok(())
    }
}

fn invalid(msg: &str) -> Result<()> {
    Err(CaptureError::Config(msg.to_string()))
}
