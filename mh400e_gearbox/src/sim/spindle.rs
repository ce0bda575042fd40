//! Spindle speed model for the stop interlock.

use tracing::{debug, trace};

use crate::twitch::TwitchOutputs;

/// Spindle that ramps down while a stop is requested and back up otherwise.
#[derive(Debug, Clone)]
pub struct SpindleModel {
    rpm: f64,
    nominal_rpm: f64,
    ramp_rpm_per_s: f64,
    pins: TwitchOutputs,
    pulses: u32,
}

impl SpindleModel {
    pub fn new(nominal_rpm: f64, ramp_rpm_per_s: f64, running: bool) -> Self {
        Self {
            rpm: if running { nominal_rpm } else { 0.0 },
            nominal_rpm,
            ramp_rpm_per_s,
            pins: TwitchOutputs::default(),
            pulses: 0,
        }
    }

    #[inline]
    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    /// Zero-speed input.
    #[inline]
    pub fn stopped(&self) -> bool {
        self.rpm <= 0.0
    }

    /// Twitch pins currently applied to the motor.
    #[inline]
    pub fn twitch_pins(&self) -> TwitchOutputs {
        self.pins
    }

    /// Twitch pulses seen so far.
    #[inline]
    pub fn pulses(&self) -> u32 {
        self.pulses
    }

    /// Apply the twitch pins. Pulses nudge the gears, not the speed.
    pub fn twitch(&mut self, pins: TwitchOutputs) {
        if pins.any() && !self.pins.any() {
            self.pulses += 1;
            trace!(cw = pins.cw, ccw = pins.ccw, pulses = self.pulses, "spindle twitch");
        }
        self.pins = pins;
    }

    pub fn advance(&mut self, stop_requested: bool, dt_s: f64) {
        let was_stopped = self.stopped();
        let step = self.ramp_rpm_per_s * dt_s;
        self.rpm = if stop_requested {
            (self.rpm - step).max(0.0)
        } else {
            (self.rpm + step).min(self.nominal_rpm)
        };
        if self.stopped() != was_stopped {
            debug!(stopped = self.stopped(), "spindle state changed");
        }
    }
}
