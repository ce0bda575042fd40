//! # MH400E Gearbox Library
//!
//! Gear shift controller for the three-shaft MAHO MH400E gearbox. Called once
//! per period of a fixed-rate real-time loop, it sequences each shaft's motor,
//! direction and speed outputs until the position sensors confirm the target
//! gear, holding the spindle interlock for the whole maneuver.
//!
//! ## Cascade
//!
//! ```text
//!  start(gear) ──► InputStage ──► Midrange ──► Backgear ──► Stop ──► Idle
//!        │                                        ▲
//!        └──────────── neutral target ────────────┘
//! ```
//!
//! ## Non-blocking
//!
//! Nothing in [`Gearbox::tick`] waits: every dwell is a countdown on the shared
//! [`DelayTimer`] re-checked on the next tick. No heap allocation happens
//! after construction.

#![deny(clippy::disallowed_types)]

pub mod cycle;
pub mod delay;
pub mod direction;
pub mod gearbox;
pub mod shaft;
pub mod sim;
pub mod twitch;

pub use crate::delay::DelayTimer;
pub use crate::direction::need_reverse;
pub use crate::gearbox::{Gearbox, ShiftFault, ShiftStatus, ShiftStep};
pub use crate::shaft::{Shaft, ShaftPhase, StageOutcome};
pub use crate::twitch::{NoPulse, PulseHelper, Twitcher};
