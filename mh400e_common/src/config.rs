//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the TOML configuration of
//! the gearbox controller.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mh400e_common::config::{ConfigError, ConfigLoader, GearboxConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = GearboxConfig::load(Path::new("gearbox.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "mh400e-gearbox"
//!
//! [timing]
//! stage_poll_interval_ns = 5000000
//!
//! [watchdog]
//! max_stage_polls = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consts::{
    CYCLE_TIME_US, CYCLE_TIME_US_MAX, CYCLE_TIME_US_MIN, GENERIC_PIN_INTERVAL_NS,
    REVERSE_MOTOR_INTERVAL_NS, STAGE_POLL_INTERVAL_NS, TWITCH_KEEP_PIN_OFF_NS,
    TWITCH_KEEP_PIN_ON_NS,
};
use crate::gears::{Gear, GearTable};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "mh400e-gearbox"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: "mh400e-gearbox".to_string(),
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Gearbox Config ─────────────────────────────────────────────────

/// Shift timing. All intervals in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Dwell between toggling two outputs.
    #[serde(default = "default_generic_pin_interval")]
    pub generic_pin_interval_ns: i64,

    /// Dwell after asserting reverse, before the motor starts.
    #[serde(default = "default_reverse_motor_interval")]
    pub reverse_motor_interval_ns: i64,

    /// Sensor re-check interval while a shaft motor runs.
    #[serde(default = "default_stage_poll_interval")]
    pub stage_poll_interval_ns: i64,

    /// Twitch pulse on time.
    #[serde(default = "default_twitch_keep_pin_on")]
    pub twitch_keep_pin_on_ns: i64,

    /// Twitch pulse off time; also the stop-phase re-check interval.
    #[serde(default = "default_twitch_keep_pin_off")]
    pub twitch_keep_pin_off_ns: i64,

    /// Host cycle time [µs].
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,
}

fn default_generic_pin_interval() -> i64 {
    GENERIC_PIN_INTERVAL_NS
}
fn default_reverse_motor_interval() -> i64 {
    REVERSE_MOTOR_INTERVAL_NS
}
fn default_stage_poll_interval() -> i64 {
    STAGE_POLL_INTERVAL_NS
}
fn default_twitch_keep_pin_on() -> i64 {
    TWITCH_KEEP_PIN_ON_NS
}
fn default_twitch_keep_pin_off() -> i64 {
    TWITCH_KEEP_PIN_OFF_NS
}
fn default_cycle_time_us() -> u32 {
    CYCLE_TIME_US
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            generic_pin_interval_ns: GENERIC_PIN_INTERVAL_NS,
            reverse_motor_interval_ns: REVERSE_MOTOR_INTERVAL_NS,
            stage_poll_interval_ns: STAGE_POLL_INTERVAL_NS,
            twitch_keep_pin_on_ns: TWITCH_KEEP_PIN_ON_NS,
            twitch_keep_pin_off_ns: TWITCH_KEEP_PIN_OFF_NS,
            cycle_time_us: CYCLE_TIME_US,
        }
    }
}

impl TimingConfig {
    /// Host cycle period [ns].
    #[inline]
    pub const fn period_ns(&self) -> i64 {
        self.cycle_time_us as i64 * 1000
    }

    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("generic_pin_interval_ns", self.generic_pin_interval_ns),
            ("reverse_motor_interval_ns", self.reverse_motor_interval_ns),
            ("stage_poll_interval_ns", self.stage_poll_interval_ns),
            ("twitch_keep_pin_on_ns", self.twitch_keep_pin_on_ns),
            ("twitch_keep_pin_off_ns", self.twitch_keep_pin_off_ns),
        ];
        if let Some((name, value)) = intervals.iter().find(|(_, v)| *v <= 0) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be positive, got {value}"
            )));
        }
        if self.cycle_time_us < CYCLE_TIME_US_MIN || self.cycle_time_us > CYCLE_TIME_US_MAX {
            return Err(ConfigError::ValidationError(format!(
                "cycle_time_us {} out of range [{}, {}]",
                self.cycle_time_us, CYCLE_TIME_US_MIN, CYCLE_TIME_US_MAX
            )));
        }
        Ok(())
    }
}

/// Optional supervision of a running shift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Abort a stage after this many sensor polls without arrival.
    /// Absent: a stage polls until its sensors confirm the target.
    #[serde(default)]
    pub max_stage_polls: Option<u32>,

    /// Treat shift faults as fatal in the runner (emergency stop) instead of
    /// only logging them.
    #[serde(default)]
    pub escalate_faults: bool,
}

/// One `[[gears]]` entry overriding the built-in table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearDef {
    /// Nominal spindle speed [rpm]; 0 marks neutral.
    pub rpm: u16,
    /// 12-bit sensor code, `(input << 8) | (midrange << 4) | backgear`.
    pub value: u16,
}

impl From<GearDef> for Gear {
    fn from(def: GearDef) -> Self {
        Gear::new(def.rpm, def.value)
    }
}

/// Top-level gearbox controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GearboxConfig {
    #[serde(default)]
    pub shared: SharedConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Gear table override; empty selects the built-in MH400E table.
    #[serde(default)]
    pub gears: Vec<GearDef>,
}

impl GearboxConfig {
    /// Validate all sections, including the gear table override.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.timing.validate()?;
        if self.watchdog.max_stage_polls == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_stage_polls must be at least 1".to_string(),
            ));
        }
        self.gear_table().map(|_| ())
    }

    /// Gear table selected by this configuration.
    pub fn gear_table(&self) -> Result<GearTable, ConfigError> {
        if self.gears.is_empty() {
            return Ok(GearTable::mh400e());
        }
        let entries: Vec<Gear> = self.gears.iter().copied().map(Gear::from).collect();
        GearTable::new(&entries).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
