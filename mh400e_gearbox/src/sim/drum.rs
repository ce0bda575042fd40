//! Shift drum of one shaft.
//!
//! The drum position runs from 0.0 (far left) to 1.0 (far right). Each seated
//! position has a detent with a sensor window around it; the left-center
//! sensor covers everything left of the center window.

use mh400e_common::io::{PinGroup, ShaftOutputs, StageMask};
use tracing::trace;

use super::PlantConfig;

/// Left detent.
pub const LEFT_POS: f64 = 0.1;
/// Center detent.
pub const CENTER_POS: f64 = 0.5;
/// Right detent.
pub const RIGHT_POS: f64 = 0.9;

/// Simulated shift drum.
#[derive(Debug, Clone)]
pub struct ShaftDrum {
    position: f64,
    full_speed: f64,
    slow_speed: f64,
    window: f64,
    jammed: bool,
}

impl ShaftDrum {
    pub fn new(config: &PlantConfig, position: f64) -> Self {
        Self {
            position: position.clamp(0.0, 1.0),
            full_speed: config.full_speed,
            slow_speed: config.slow_speed,
            window: config.sensor_window,
            jammed: false,
        }
    }

    /// Detent matching a seated sensor pattern. `None` for patterns that
    /// name no position.
    pub fn seat_of(mask: StageMask) -> Option<f64> {
        if mask.contains(StageMask::RIGHT) {
            Some(RIGHT_POS)
        } else if mask.contains(StageMask::LEFT) {
            Some(LEFT_POS)
        } else if mask.contains(StageMask::CENTER) {
            Some(CENTER_POS)
        } else {
            None
        }
    }

    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Block the drum; the motor no longer moves it.
    pub fn jam(&mut self) {
        self.jammed = true;
    }

    /// Sensor readings at the current position.
    pub fn sensors(&self) -> PinGroup {
        let near = |detent: f64| (self.position - detent).abs() <= self.window;
        PinGroup {
            left: near(LEFT_POS),
            right: near(RIGHT_POS),
            center: near(CENTER_POS),
            left_center: self.position < CENTER_POS - self.window,
        }
    }

    /// Move for `dt_s` seconds under the given outputs.
    pub fn advance(&mut self, outputs: &ShaftOutputs, dt_s: f64) {
        if !outputs.motor_on || self.jammed {
            return;
        }
        let speed = if outputs.slow {
            self.slow_speed
        } else {
            self.full_speed
        };
        let direction = if outputs.reverse { -1.0 } else { 1.0 };
        self.position = (self.position + direction * speed * dt_s).clamp(0.0, 1.0);
        trace!(position = self.position, "drum moved");
    }
}
