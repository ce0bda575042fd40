//! Gearbox façade and shift cascade.
//!
//! [`Gearbox`] owns the three shafts, the spindle interlock and the shared
//! delay. The host samples sensors, calls [`Gearbox::tick`] once per period
//! while a shift runs, and writes [`Gearbox::outputs`] back to the pins. The
//! spindle twitch pins are not part of that image: read them from
//! `pulse().outputs()` every cycle as well.
//!
//! # Example
//!
//! ```rust
//! use mh400e_common::prelude::*;
//! use mh400e_gearbox::{Gearbox, NoPulse, ShiftStep};
//!
//! let timing = TimingConfig::default();
//! let mut gearbox = Gearbox::new(timing, &WatchdogConfig::default(), GearTable::mh400e(), NoPulse);
//!
//! let target = *gearbox.gears().by_rpm(800).unwrap();
//! gearbox.sample(&GearboxInputs::default());
//! gearbox.start(&target, timing.period_ns()).unwrap();
//!
//! assert_eq!(gearbox.step(), ShiftStep::InputStage);
//! assert!(gearbox.outputs().start_shift);
//! ```

use core::fmt;

use mh400e_common::config::{ConfigError, GearboxConfig, TimingConfig, WatchdogConfig};
use mh400e_common::gears::{Gear, GearLookup, GearTable};
use mh400e_common::io::{GearboxInputs, GearboxOutputs, ShaftId, StageMask};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::delay::DelayTimer;
use crate::shaft::{Shaft, StageOutcome};
use crate::twitch::{PulseHelper, Twitcher};

// ─── Cascade ────────────────────────────────────────────────────────

/// Continuation run on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShiftStep {
    /// No shift in progress.
    #[default]
    Idle,
    InputStage,
    Midrange,
    Backgear,
    /// Drain the pulse helper and release the interlock.
    Stop,
}

impl ShiftStep {
    /// Step armed once this one completes.
    pub const fn after(self) -> Self {
        match self {
            Self::InputStage => Self::Midrange,
            Self::Midrange => Self::Backgear,
            Self::Backgear => Self::Stop,
            Self::Stop | Self::Idle => Self::Idle,
        }
    }

    /// Shaft driven by this step, if it is a stage.
    pub const fn shaft(self) -> Option<ShaftId> {
        match self {
            Self::InputStage => Some(ShaftId::Input),
            Self::Midrange => Some(ShaftId::Midrange),
            Self::Backgear => Some(ShaftId::Backgear),
            Self::Stop | Self::Idle => None,
        }
    }
}

impl fmt::Display for ShiftStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::InputStage => write!(f, "input"),
            Self::Midrange => write!(f, "midrange"),
            Self::Backgear => write!(f, "backgear"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Faults surfaced by the cascade. The host decides how to escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShiftFault {
    /// `tick` called while idle.
    #[error("gearbox ticked with no shift in progress")]
    NoShiftInProgress,

    /// `start` called while another shift runs.
    #[error("shift requested while the {step} step is running")]
    ShiftInProgress { step: ShiftStep },

    /// Watchdog expired on a stage.
    #[error("{shaft} shaft did not reach {target} after {polls} polls (sensors {current})")]
    StageTimeout {
        shaft: ShaftId,
        target: StageMask,
        current: StageMask,
        polls: u32,
    },
}

/// Result of a successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftStatus {
    InProgress,
    /// The stop phase finished this tick; the gearbox is idle again.
    Complete,
}

// ─── Gearbox ────────────────────────────────────────────────────────

/// Gear shift controller.
pub struct Gearbox<P = Twitcher, L = GearTable> {
    input_stage: Shaft,
    midrange: Shaft,
    backgear: Shaft,

    start_shift: bool,
    stop_spindle: bool,
    spindle_stopped: bool,
    spindle_on_before_shift: bool,

    delay: DelayTimer,
    next: ShiftStep,

    timing: TimingConfig,
    max_stage_polls: Option<u32>,
    pulse: P,
    gears: L,
}

impl Gearbox<Twitcher, GearTable> {
    /// Build from a loaded configuration, validating it first.
    pub fn from_config(config: &GearboxConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let gears = config.gear_table()?;
        Ok(Self::new(
            config.timing,
            &config.watchdog,
            gears,
            Twitcher::new(&config.timing),
        ))
    }
}

impl<P: PulseHelper, L: GearLookup> Gearbox<P, L> {
    /// Idle gearbox. The backgear target starts at neutral.
    pub fn new(timing: TimingConfig, watchdog: &WatchdogConfig, gears: L, pulse: P) -> Self {
        let neutral = gears.neutral().mask(ShaftId::Backgear);
        Self {
            input_stage: Shaft::new(ShaftId::Input, StageMask::empty()),
            midrange: Shaft::new(ShaftId::Midrange, StageMask::empty()),
            backgear: Shaft::new(ShaftId::Backgear, neutral),
            start_shift: false,
            stop_spindle: false,
            spindle_stopped: false,
            spindle_on_before_shift: false,
            delay: DelayTimer::new(),
            next: ShiftStep::Idle,
            timing,
            max_stage_polls: watchdog.max_stage_polls,
            pulse,
            gears,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    #[inline]
    pub const fn step(&self) -> ShiftStep {
        self.next
    }

    #[inline]
    pub fn is_shifting(&self) -> bool {
        self.next != ShiftStep::Idle
    }

    pub const fn shaft(&self, id: ShaftId) -> &Shaft {
        match id {
            ShaftId::Input => &self.input_stage,
            ShaftId::Midrange => &self.midrange,
            ShaftId::Backgear => &self.backgear,
        }
    }

    #[inline]
    pub const fn pulse(&self) -> &P {
        &self.pulse
    }

    #[inline]
    pub fn pulse_mut(&mut self) -> &mut P {
        &mut self.pulse
    }

    #[inline]
    pub const fn gears(&self) -> &L {
        &self.gears
    }

    #[inline]
    pub const fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Output image to write back to the pins.
    pub fn outputs(&self) -> GearboxOutputs {
        GearboxOutputs {
            input: self.input_stage.outputs(),
            midrange: self.midrange.outputs(),
            backgear: self.backgear.outputs(),
            start_shift: self.start_shift,
            stop_spindle: self.stop_spindle,
        }
    }

    /// Current sensor masks packed as a 12-bit gear code.
    pub fn combined_code(&self) -> u16 {
        ShaftId::ALL.iter().fold(0u16, |code, &id| {
            code | (u16::from(self.shaft(id).current().nibble()) << id.code_shift())
        })
    }

    fn shaft_mut(&mut self, id: ShaftId) -> &mut Shaft {
        match id {
            ShaftId::Input => &mut self.input_stage,
            ShaftId::Midrange => &mut self.midrange,
            ShaftId::Backgear => &mut self.backgear,
        }
    }

    // ─── Host Interface ─────────────────────────────────────────────

    /// Refresh sensor masks and the spindle state. Call before every tick.
    pub fn sample(&mut self, inputs: &GearboxInputs) {
        for id in ShaftId::ALL {
            self.shaft_mut(id).sample(inputs.group(id).mask());
        }
        self.spindle_stopped = inputs.spindle_stopped;
    }

    /// Begin shifting into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ShiftFault::ShiftInProgress`] if a shift is already running;
    /// nothing is changed in that case.
    pub fn start(&mut self, target: &Gear, period_ns: i64) -> Result<(), ShiftFault> {
        if self.is_shifting() {
            warn!(step = %self.next, rpm = target.rpm, "shift request rejected");
            return Err(ShiftFault::ShiftInProgress { step: self.next });
        }

        self.spindle_on_before_shift = !self.spindle_stopped;
        self.stop_spindle = true;

        for id in ShaftId::ALL {
            self.shaft_mut(id).set_target(target.mask(id));
        }

        self.delay.arm(self.timing.generic_pin_interval_ns);
        self.start_shift = true;
        self.pulse.start(period_ns);

        let neutral = self.gears.neutral().mask(ShaftId::Backgear);
        self.next = if self.backgear.target() == neutral {
            ShiftStep::Backgear
        } else {
            ShiftStep::InputStage
        };

        info!(
            rpm = target.rpm,
            code = format_args!("{:#05x}", target.value),
            spindle_was_running = self.spindle_on_before_shift,
            first = %self.next,
            "gear shift started"
        );
        Ok(())
    }

    /// Advance the shift by one period.
    ///
    /// # Errors
    ///
    /// [`ShiftFault::NoShiftInProgress`] when idle, [`ShiftFault::StageTimeout`]
    /// when the stage watchdog expires. After a timeout the cascade continues
    /// with the stop phase.
    pub fn tick(&mut self, period_ns: i64) -> Result<ShiftStatus, ShiftFault> {
        self.pulse.tick(period_ns);

        match self.next {
            ShiftStep::Idle => {
                error!("gearbox tick with no shift in progress");
                Err(ShiftFault::NoShiftInProgress)
            }
            ShiftStep::InputStage => self.run_stage(ShaftId::Input, period_ns),
            ShiftStep::Midrange => self.run_stage(ShaftId::Midrange, period_ns),
            ShiftStep::Backgear => self.run_stage(ShaftId::Backgear, period_ns),
            ShiftStep::Stop => Ok(self.run_stop(period_ns)),
        }
    }

    /// Gear currently engaged according to `inputs`.
    ///
    /// `None` while the shafts sit between positions, which is normal during a
    /// shift.
    pub fn current_gear(&mut self, inputs: &GearboxInputs) -> Option<&Gear> {
        self.sample(inputs);
        let neutral = self.gears.neutral();
        if self.backgear.current() == neutral.mask(ShaftId::Backgear) {
            return Some(neutral);
        }
        self.gears.resolve(self.combined_code())
    }

    // ─── Cascade Steps ──────────────────────────────────────────────

    fn run_stage(&mut self, id: ShaftId, period_ns: i64) -> Result<ShiftStatus, ShiftFault> {
        if self.delay.wait(period_ns) {
            return Ok(ShiftStatus::InProgress);
        }

        let shaft = match id {
            ShaftId::Input => &mut self.input_stage,
            ShaftId::Midrange => &mut self.midrange,
            ShaftId::Backgear => &mut self.backgear,
        };

        match shaft.step(&mut self.delay, &self.timing) {
            StageOutcome::Advance => {
                self.next = self.next.after();
                debug!(shaft = %id, next = %self.next, "stage complete");
            }
            StageOutcome::Stay => {
                if let Some(max) = self.max_stage_polls {
                    if shaft.polls() > max {
                        let fault = ShiftFault::StageTimeout {
                            shaft: id,
                            target: shaft.target(),
                            current: shaft.current(),
                            polls: shaft.polls(),
                        };
                        shaft.abort();
                        self.delay.arm(self.timing.generic_pin_interval_ns);
                        self.next = ShiftStep::Stop;
                        warn!(%fault, "stage watchdog expired, aborting shift");
                        return Err(fault);
                    }
                }
            }
        }
        Ok(ShiftStatus::InProgress)
    }

    fn run_stop(&mut self, period_ns: i64) -> ShiftStatus {
        if self.delay.wait(period_ns) {
            return ShiftStatus::InProgress;
        }

        self.pulse.stop(period_ns);
        if !self.pulse.stop_completed() {
            self.delay.arm(self.timing.twitch_keep_pin_off_ns);
            return ShiftStatus::InProgress;
        }

        // TODO: a shift cut short by an e-stop lands here with whatever the
        // interrupted stage left asserted; re-check shaft outputs and sensor
        // positions before releasing the interlock.
        self.start_shift = false;
        if self.spindle_on_before_shift {
            self.stop_spindle = false;
        }
        self.spindle_on_before_shift = false;
        self.next = ShiftStep::Idle;

        info!(code = format_args!("{:#05x}", self.combined_code()), "gear shift complete");
        ShiftStatus::Complete
    }
}

impl<P: fmt::Debug, L> fmt::Debug for Gearbox<P, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gearbox")
            .field("next", &self.next)
            .field("input_stage", &self.input_stage)
            .field("midrange", &self.midrange)
            .field("backgear", &self.backgear)
            .field("start_shift", &self.start_shift)
            .field("stop_spindle", &self.stop_spindle)
            .field("delay", &self.delay)
            .field("pulse", &self.pulse)
            .finish_non_exhaustive()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twitch::NoPulse;
    use mh400e_common::io::PinGroup;

    const PERIOD: i64 = 1_000_000;

    fn timing() -> TimingConfig {
        TimingConfig {
            generic_pin_interval_ns: 2_000_000,
            reverse_motor_interval_ns: 2_000_000,
            stage_poll_interval_ns: 1_000_000,
            twitch_keep_pin_on_ns: 1_000_000,
            twitch_keep_pin_off_ns: 1_000_000,
            cycle_time_us: 1000,
        }
    }

    fn gearbox() -> Gearbox<NoPulse, GearTable> {
        Gearbox::new(timing(), &WatchdogConfig::default(), GearTable::mh400e(), NoPulse)
    }

    fn inputs_for(code: u16, spindle_stopped: bool) -> GearboxInputs {
        GearboxInputs {
            input: PinGroup::from_mask(ShaftId::Input.mask_of(code)),
            midrange: PinGroup::from_mask(ShaftId::Midrange.mask_of(code)),
            backgear: PinGroup::from_mask(ShaftId::Backgear.mask_of(code)),
            spindle_stopped,
        }
    }

    fn gear(g: &Gearbox<NoPulse, GearTable>, rpm: u16) -> Gear {
        *g.gears().by_rpm(rpm).unwrap()
    }

    #[test]
    fn new_gearbox_is_idle_with_neutral_backgear_target() {
        let g = gearbox();
        assert_eq!(g.step(), ShiftStep::Idle);
        assert!(!g.is_shifting());
        assert_eq!(g.shaft(ShaftId::Backgear).target(), StageMask::CENTER);
        assert_eq!(g.shaft(ShaftId::Input).target(), StageMask::empty());
        assert_eq!(g.outputs(), GearboxOutputs::default());
    }

    #[test]
    fn cascade_order() {
        assert_eq!(ShiftStep::InputStage.after(), ShiftStep::Midrange);
        assert_eq!(ShiftStep::Midrange.after(), ShiftStep::Backgear);
        assert_eq!(ShiftStep::Backgear.after(), ShiftStep::Stop);
        assert_eq!(ShiftStep::Stop.after(), ShiftStep::Idle);
        assert_eq!(ShiftStep::Stop.shaft(), None);
    }

    #[test]
    fn start_splits_code_into_targets() {
        let mut g = gearbox();
        let target = gear(&g, 800);
        g.start(&target, PERIOD).unwrap();
        assert_eq!(g.shaft(ShaftId::Input).target().nibble(), 0x4);
        assert_eq!(g.shaft(ShaftId::Midrange).target().nibble(), 0x9);
        assert_eq!(g.shaft(ShaftId::Backgear).target().nibble(), 0x2);
        assert_eq!(g.step(), ShiftStep::InputStage);
        assert!(g.outputs().start_shift);
    }

    #[test]
    fn neutral_start_skips_to_backgear() {
        let mut g = gearbox();
        let neutral = *g.gears().neutral();
        g.start(&neutral, PERIOD).unwrap();
        assert_eq!(g.step(), ShiftStep::Backgear);
        assert!(g.outputs().start_shift);
    }

    #[test]
    fn start_requests_spindle_stop() {
        let mut g = gearbox();
        g.sample(&inputs_for(0x999, false));
        let target = gear(&g, 4000);
        g.start(&target, PERIOD).unwrap();
        assert!(g.outputs().stop_spindle);
    }

    #[test]
    fn second_start_is_rejected() {
        let mut g = gearbox();
        let first = gear(&g, 80);
        let second = gear(&g, 4000);
        g.start(&first, PERIOD).unwrap();
        let err = g.start(&second, PERIOD).unwrap_err();
        assert_eq!(
            err,
            ShiftFault::ShiftInProgress {
                step: ShiftStep::InputStage
            }
        );
        assert_eq!(g.shaft(ShaftId::Input).target().nibble(), 0x9);
    }

    #[test]
    fn idle_tick_is_a_fault() {
        let mut g = gearbox();
        assert_eq!(g.tick(PERIOD), Err(ShiftFault::NoShiftInProgress));
        assert_eq!(g.step(), ShiftStep::Idle);
    }

    #[test]
    fn first_stage_waits_for_initial_settle() {
        let mut g = gearbox();
        g.sample(&inputs_for(0x999, true));
        let target = gear(&g, 4000);
        g.start(&target, PERIOD).unwrap();

        assert_eq!(g.tick(PERIOD), Ok(ShiftStatus::InProgress));
        assert_eq!(g.tick(PERIOD), Ok(ShiftStatus::InProgress));
        assert_eq!(g.shaft(ShaftId::Input).phase(), crate::ShaftPhase::Off);

        g.tick(PERIOD).unwrap();
        assert!(g.shaft(ShaftId::Input).phase().is_on());
    }

    #[test]
    fn pre_satisfied_shift_completes_without_motor() {
        let mut g = gearbox();
        let target = gear(&g, 800);
        let inputs = inputs_for(target.value, false);
        g.sample(&inputs);
        g.start(&target, PERIOD).unwrap();

        let mut status = ShiftStatus::InProgress;
        for _ in 0..50 {
            g.sample(&inputs);
            status = g.tick(PERIOD).unwrap();
            let out = g.outputs();
            for id in ShaftId::ALL {
                assert!(!out.shaft(id).any());
            }
            if status == ShiftStatus::Complete {
                break;
            }
        }
        assert_eq!(status, ShiftStatus::Complete);
        assert!(!g.is_shifting());
        assert!(!g.outputs().start_shift);
        assert!(!g.outputs().stop_spindle);
    }

    #[test]
    fn stopped_spindle_stays_stopped_after_shift() {
        let mut g = gearbox();
        let target = gear(&g, 800);
        let inputs = inputs_for(target.value, true);
        g.sample(&inputs);
        g.start(&target, PERIOD).unwrap();
        for _ in 0..50 {
            g.sample(&inputs);
            if g.tick(PERIOD).unwrap() == ShiftStatus::Complete {
                break;
            }
        }
        assert!(!g.is_shifting());
        assert!(g.outputs().stop_spindle);
    }

    #[test]
    fn current_gear_ignores_other_shafts_in_neutral() {
        let mut g = gearbox();
        for other in [0x000, 0x990, 0x240, 0xff0] {
            let found = g.current_gear(&inputs_for(other | 0x004, false)).copied();
            assert_eq!(found.map(|g| g.rpm), Some(0));
        }
    }

    #[test]
    fn current_gear_resolves_table_codes() {
        let mut g = gearbox();
        let found = g.current_gear(&inputs_for(0x222, false)).copied();
        assert_eq!(found.map(|g| g.rpm), Some(4000));
        assert_eq!(g.combined_code(), 0x222);
    }

    #[test]
    fn current_gear_between_positions_is_none() {
        let mut g = gearbox();
        assert!(g.current_gear(&inputs_for(0x082, false)).is_none());
    }

    #[test]
    fn watchdog_aborts_stuck_stage() {
        let watchdog = WatchdogConfig {
            max_stage_polls: Some(3),
            escalate_faults: false,
        };
        let mut g = Gearbox::new(timing(), &watchdog, GearTable::mh400e(), NoPulse);
        let inputs = inputs_for(0x999, false);
        g.sample(&inputs);
        let target = gear(&g, 4000);
        g.start(&target, PERIOD).unwrap();

        let mut fault = None;
        for _ in 0..100 {
            g.sample(&inputs);
            if let Err(e) = g.tick(PERIOD) {
                fault = Some(e);
                break;
            }
        }
        match fault {
            Some(ShiftFault::StageTimeout { shaft, polls, .. }) => {
                assert_eq!(shaft, ShaftId::Input);
                assert_eq!(polls, 4);
            }
            other => panic!("expected stage timeout, got {other:?}"),
        }
        assert_eq!(g.step(), ShiftStep::Stop);
        assert!(!g.outputs().shaft(ShaftId::Input).any());

        let mut status = ShiftStatus::InProgress;
        for _ in 0..10 {
            status = g.tick(PERIOD).unwrap();
            if status == ShiftStatus::Complete {
                break;
            }
        }
        assert_eq!(status, ShiftStatus::Complete);
        assert!(!g.outputs().start_shift);
    }
}
