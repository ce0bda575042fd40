//! Per-shaft stage driver.
//!
//! The same logic moves all three shafts. A shaft is OFF until its stage runs
//! with a target the sensors do not yet show; it then drives the motor until
//! they do, and releases its outputs one at a time with a settle dwell after
//! each, since the actuators chatter if outputs drop together:
//!
//! ```text
//!  Off ──► Driving ──► AwaitMotorOff ──► AwaitReverseOff ──► AwaitSlowOff ──► Off
//!              ▲              │                  │                 │
//!              └──────── position lost ──────────┴─────────────────┘
//! ```
//!
//! Release phases whose output was never asserted are passed through in the
//! same tick.

use mh400e_common::config::TimingConfig;
use mh400e_common::io::{ShaftId, ShaftOutputs, StageMask};
use tracing::{debug, trace};

use crate::delay::DelayTimer;
use crate::direction::need_reverse;

/// Stage driver phase. Everything except `Off` is the ON state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaftPhase {
    /// Idle or settled.
    #[default]
    Off,
    /// Motor running towards the target.
    Driving,
    /// Target reached, motor de-energized; waiting before touching reverse.
    AwaitMotorOff,
    /// Reverse released; waiting before touching low speed.
    AwaitReverseOff,
    /// Low speed released; waiting before leaving the stage.
    AwaitSlowOff,
}

impl ShaftPhase {
    /// True for every ON sub-phase.
    #[inline]
    pub const fn is_on(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// What the cascade should run on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Re-arm this stage.
    Stay,
    /// Shaft settled at target; arm the next stage.
    Advance,
}

/// State and outputs of one shaft.
#[derive(Debug, Clone)]
pub struct Shaft {
    id: ShaftId,
    phase: ShaftPhase,
    current: StageMask,
    target: StageMask,
    outputs: ShaftOutputs,
    /// Sensor polls since the motor was first commanded.
    polls: u32,
}

impl Shaft {
    /// Create an idle shaft with the given initial target.
    pub const fn new(id: ShaftId, target: StageMask) -> Self {
        Self {
            id,
            phase: ShaftPhase::Off,
            current: StageMask::empty(),
            target,
            outputs: ShaftOutputs {
                motor_on: false,
                reverse: false,
                slow: false,
            },
            polls: 0,
        }
    }

    #[inline]
    pub const fn id(&self) -> ShaftId {
        self.id
    }

    #[inline]
    pub const fn phase(&self) -> ShaftPhase {
        self.phase
    }

    /// Last sampled sensor mask.
    #[inline]
    pub const fn current(&self) -> StageMask {
        self.current
    }

    #[inline]
    pub const fn target(&self) -> StageMask {
        self.target
    }

    #[inline]
    pub const fn outputs(&self) -> ShaftOutputs {
        self.outputs
    }

    /// Sensor polls spent driving in the current move.
    #[inline]
    pub const fn polls(&self) -> u32 {
        self.polls
    }

    /// Sensors confirm the target position.
    #[inline]
    pub fn in_position(&self) -> bool {
        self.current == self.target
    }

    /// Store the freshly sampled sensor mask. Never written by the driver.
    #[inline]
    pub fn sample(&mut self, mask: StageMask) {
        self.current = mask;
    }

    pub fn set_target(&mut self, target: StageMask) {
        self.target = target;
    }

    /// Drop every output and return to `Off` without settling.
    pub fn abort(&mut self) {
        self.outputs = ShaftOutputs::default();
        self.phase = ShaftPhase::Off;
        self.polls = 0;
    }

    /// Run one stage pass. The caller has already waited out `delay`.
    pub fn step(&mut self, delay: &mut DelayTimer, timing: &TimingConfig) -> StageOutcome {
        if self.phase.is_on() && self.phase != ShaftPhase::Driving && !self.in_position() {
            debug!(
                shaft = %self.id,
                current = %self.current,
                target = %self.target,
                "position lost while releasing, driving again"
            );
            self.phase = ShaftPhase::Driving;
        }

        match self.phase {
            ShaftPhase::Off => self.begin(delay, timing),
            ShaftPhase::Driving if self.in_position() => self.arrive(delay, timing),
            ShaftPhase::Driving => self.drive(delay, timing),
            ShaftPhase::AwaitMotorOff => self.release_reverse(delay, timing),
            ShaftPhase::AwaitReverseOff => self.release_slow(delay, timing),
            ShaftPhase::AwaitSlowOff => self.finish(delay, timing),
        }
    }

    fn begin(&mut self, delay: &mut DelayTimer, timing: &TimingConfig) -> StageOutcome {
        if self.in_position() {
            debug!(shaft = %self.id, target = %self.target, "already in position");
            return StageOutcome::Advance;
        }

        self.phase = ShaftPhase::Driving;
        self.polls = 0;
        if need_reverse(self.target, self.current) {
            self.outputs.reverse = true;
            delay.arm(timing.reverse_motor_interval_ns);
        }
        debug!(
            shaft = %self.id,
            current = %self.current,
            target = %self.target,
            reverse = self.outputs.reverse,
            "shaft move started"
        );
        StageOutcome::Stay
    }

    fn drive(&mut self, delay: &mut DelayTimer, timing: &TimingConfig) -> StageOutcome {
        // Seating in the center detent needs the reduced speed, selected
        // before the motor is energized.
        if self.target.contains(StageMask::CENTER) && !self.outputs.slow {
            self.outputs.slow = true;
        } else if !self.outputs.motor_on {
            self.outputs.motor_on = true;
        }
        self.polls = self.polls.saturating_add(1);
        trace!(shaft = %self.id, current = %self.current, polls = self.polls, "polling");
        delay.arm(timing.stage_poll_interval_ns);
        StageOutcome::Stay
    }

    fn arrive(&mut self, delay: &mut DelayTimer, timing: &TimingConfig) -> StageOutcome {
        debug!(shaft = %self.id, polls = self.polls, "target reached");
        if self.outputs.motor_on {
            self.outputs.motor_on = false;
            self.phase = ShaftPhase::AwaitMotorOff;
            delay.arm(timing.generic_pin_interval_ns);
            return StageOutcome::Stay;
        }
        self.release_reverse(delay, timing)
    }

    fn release_reverse(&mut self, delay: &mut DelayTimer, timing: &TimingConfig) -> StageOutcome {
        if self.outputs.reverse {
            self.outputs.reverse = false;
            self.phase = ShaftPhase::AwaitReverseOff;
            delay.arm(timing.generic_pin_interval_ns);
            return StageOutcome::Stay;
        }
        self.release_slow(delay, timing)
    }

    fn release_slow(&mut self, delay: &mut DelayTimer, timing: &TimingConfig) -> StageOutcome {
        if self.outputs.slow {
            self.outputs.slow = false;
            self.phase = ShaftPhase::AwaitSlowOff;
            delay.arm(timing.generic_pin_interval_ns);
            return StageOutcome::Stay;
        }
        self.finish(delay, timing)
    }

    fn finish(&mut self, delay: &mut DelayTimer, timing: &TimingConfig) -> StageOutcome {
        self.phase = ShaftPhase::Off;
        self.polls = 0;
        delay.arm(timing.generic_pin_interval_ns);
        debug!(shaft = %self.id, "shaft settled");
        StageOutcome::Advance
    }
}
