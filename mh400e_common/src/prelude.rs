//! Prelude module for common re-exports.
//!
//! ```rust
//! use mh400e_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, GearboxConfig, LogLevel, SharedConfig, TimingConfig,
    WatchdogConfig,
};

// ─── Gears ──────────────────────────────────────────────────────────
pub use crate::gears::{Gear, GearLookup, GearTable, GearTableError};

// ─── I/O ────────────────────────────────────────────────────────────
pub use crate::io::{
    GearboxInputs, GearboxOutputs, PinGroup, ShaftId, ShaftOutputs, StageMask,
};
