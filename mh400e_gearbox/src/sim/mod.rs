//! Simulated gearbox plant.
//!
//! Stands in for the machine in the demo binary and the integration tests:
//! the shift motors move three drums whose positions produce the sensor
//! patterns, and the spindle ramps down while a stop is requested.
//!
//! ```toml
//! [plant]
//! full_speed = 0.5
//! slow_speed = 0.15
//! sensor_window = 0.04
//! ```

mod drum;
mod spindle;

pub use drum::{CENTER_POS, LEFT_POS, RIGHT_POS, ShaftDrum};
pub use spindle::SpindleModel;

use std::time::Duration;

use mh400e_common::consts::SHAFT_COUNT;
use mh400e_common::gears::Gear;
use mh400e_common::io::{GearboxInputs, GearboxOutputs, ShaftId};
use serde::{Deserialize, Serialize};

use crate::twitch::TwitchOutputs;

/// Plant parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    /// Drum travel at full speed [span/s].
    #[serde(default = "default_full_speed")]
    pub full_speed: f64,

    /// Drum travel with low speed selected [span/s].
    #[serde(default = "default_slow_speed")]
    pub slow_speed: f64,

    /// Half-width of each sensor window [span].
    #[serde(default = "default_sensor_window")]
    pub sensor_window: f64,

    /// Spindle speed while running [rpm].
    #[serde(default = "default_spindle_rpm")]
    pub spindle_rpm: f64,

    /// Spindle acceleration and deceleration [rpm/s].
    #[serde(default = "default_spindle_ramp")]
    pub spindle_ramp_rpm_per_s: f64,

    /// Spindle turning when the simulation starts.
    #[serde(default = "default_spindle_running")]
    pub spindle_running: bool,
}

fn default_full_speed() -> f64 {
    0.5
}
fn default_slow_speed() -> f64 {
    0.15
}
fn default_sensor_window() -> f64 {
    0.04
}
fn default_spindle_rpm() -> f64 {
    1000.0
}
fn default_spindle_ramp() -> f64 {
    4000.0
}
fn default_spindle_running() -> bool {
    true
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            full_speed: default_full_speed(),
            slow_speed: default_slow_speed(),
            sensor_window: default_sensor_window(),
            spindle_rpm: default_spindle_rpm(),
            spindle_ramp_rpm_per_s: default_spindle_ramp(),
            spindle_running: default_spindle_running(),
        }
    }
}

/// Three drums and a spindle.
#[derive(Debug, Clone)]
pub struct GearboxPlant {
    drums: [ShaftDrum; SHAFT_COUNT],
    spindle: SpindleModel,
}

impl GearboxPlant {
    /// Plant with every drum seated at `gear`. Shafts the gear leaves
    /// unspecified start at the left detent.
    pub fn at_gear(config: &PlantConfig, gear: &Gear) -> Self {
        let drums = ShaftId::ALL.map(|id| {
            let seat = ShaftDrum::seat_of(gear.mask(id)).unwrap_or(LEFT_POS);
            ShaftDrum::new(config, seat)
        });
        Self {
            drums,
            spindle: SpindleModel::new(
                config.spindle_rpm,
                config.spindle_ramp_rpm_per_s,
                config.spindle_running,
            ),
        }
    }

    #[inline]
    pub fn drum(&self, id: ShaftId) -> &ShaftDrum {
        &self.drums[id as usize]
    }

    #[inline]
    pub fn spindle(&self) -> &SpindleModel {
        &self.spindle
    }

    /// Block one shaft.
    pub fn jam(&mut self, id: ShaftId) {
        self.drums[id as usize].jam();
    }

    /// Sensor image for the next tick.
    pub fn inputs(&self) -> GearboxInputs {
        GearboxInputs {
            input: self.drum(ShaftId::Input).sensors(),
            midrange: self.drum(ShaftId::Midrange).sensors(),
            backgear: self.drum(ShaftId::Backgear).sensors(),
            spindle_stopped: self.spindle.stopped(),
        }
    }

    /// Apply `outputs` for `dt`.
    pub fn advance(&mut self, outputs: &GearboxOutputs, dt: Duration) {
        let dt_s = dt.as_secs_f64();
        for id in ShaftId::ALL {
            self.drums[id as usize].advance(outputs.shaft(id), dt_s);
        }
        self.spindle.advance(outputs.stop_spindle, dt_s);
    }

    /// Apply the spindle twitch pins.
    pub fn twitch(&mut self, pins: TwitchOutputs) {
        self.spindle.twitch(pins);
    }
}
