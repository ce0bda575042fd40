//! System-wide constants for the MH400E workspace.
//!
//! Single source of truth for timing defaults and table limits.
//! All intervals are in nanoseconds, the unit of the host tick period.

/// Number of position sensors per shaft.
pub const PINS_IN_GROUP: usize = 4;

/// Number of independently actuated shafts.
pub const SHAFT_COUNT: usize = 3;

/// Largest value a combined gear code may take (three 4-bit nibbles).
pub const GEAR_CODE_MAX: u16 = 0x0fff;

/// Capacity of the gear lookup table.
pub const MAX_GEARS: usize = 32;

/// Dwell between toggling two gearbox outputs (100 ms).
pub const GENERIC_PIN_INTERVAL_NS: i64 = 100_000_000;

/// Dwell after asserting reverse before the motor may start (100 ms).
pub const REVERSE_MOTOR_INTERVAL_NS: i64 = 100_000_000;

/// Sensor re-check interval while a shaft motor is running (5 ms).
pub const STAGE_POLL_INTERVAL_NS: i64 = 5_000_000;

/// Time a twitch pulse keeps the spindle motor pin on (150 ms).
pub const TWITCH_KEEP_PIN_ON_NS: i64 = 150_000_000;

/// Time a twitch pulse keeps the spindle motor pin off (300 ms).
pub const TWITCH_KEEP_PIN_OFF_NS: i64 = 300_000_000;

/// Default host cycle time in microseconds (1 kHz).
pub const CYCLE_TIME_US: u32 = 1000;

/// Lower bound for the configured cycle time.
pub const CYCLE_TIME_US_MIN: u32 = 100;

/// Upper bound for the configured cycle time.
pub const CYCLE_TIME_US_MAX: u32 = 100_000;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mh400e/gearbox.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert_eq!(PINS_IN_GROUP * SHAFT_COUNT, 12);
        assert_eq!(GEAR_CODE_MAX, (1 << (PINS_IN_GROUP * SHAFT_COUNT)) - 1);
        assert!(CYCLE_TIME_US_MIN <= CYCLE_TIME_US && CYCLE_TIME_US <= CYCLE_TIME_US_MAX);
    }

    #[test]
    fn poll_interval_is_shorter_than_settle_dwell() {
        assert!(STAGE_POLL_INTERVAL_NS < GENERIC_PIN_INTERVAL_NS);
        assert!(TWITCH_KEEP_PIN_ON_NS > 0 && TWITCH_KEEP_PIN_OFF_NS > 0);
    }
}
