//! MH400E Common Library
//!
//! Shared types for the MH400E gearbox controller workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Timing defaults, pin counts and table limits
//! - [`io`] - Pin groups, stage masks and the gearbox I/O image
//! - [`gears`] - Gear encoding, the built-in gear table and lookup trait
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use mh400e_common::prelude::*;
//!
//! let table = GearTable::mh400e();
//! assert!(table.neutral().is_neutral());
//! ```

pub mod config;
pub mod consts;
pub mod gears;
pub mod io;
pub mod prelude;
