//! Config file loading tests.
//!
//! Exercises `ConfigLoader::load` for `GearboxConfig` against files on disk:
//! missing file, syntax errors, full documents and gear table overrides.

use mh400e_common::config::{ConfigError, ConfigLoader, GearboxConfig, LogLevel};
use mh400e_common::gears::GearLookup;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{content}").unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn missing_file_is_reported() {
    let result = GearboxConfig::load(Path::new("/nonexistent/mh400e/gearbox.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let file = write_config("[timing\nstage_poll_interval_ns = ");
    let result = GearboxConfig::load(file.path());
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn wrong_field_type_is_a_parse_error() {
    let file = write_config("[timing]\nstage_poll_interval_ns = \"fast\"\n");
    let result = GearboxConfig::load(file.path());
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn full_document_loads_and_validates() {
    let file = write_config(
        r#"
[shared]
log_level = "debug"
service_name = "mh400e-test"

[timing]
generic_pin_interval_ns = 50000000
reverse_motor_interval_ns = 80000000
stage_poll_interval_ns = 2000000
twitch_keep_pin_on_ns = 100000000
twitch_keep_pin_off_ns = 200000000
cycle_time_us = 1000

[watchdog]
max_stage_polls = 4000
escalate_faults = true
"#,
    );

    let config = GearboxConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "mh400e-test");
    assert_eq!(config.timing.generic_pin_interval_ns, 50_000_000);
    assert_eq!(config.timing.reverse_motor_interval_ns, 80_000_000);
    assert_eq!(config.watchdog.max_stage_polls, Some(4000));
    assert!(config.watchdog.escalate_faults);
}

#[test]
fn gear_table_override_from_file() {
    let file = write_config(
        r#"
[[gears]]
rpm = 0
value = 0x004

[[gears]]
rpm = 80
value = 0x999

[[gears]]
rpm = 4000
value = 0x222
"#,
    );

    let config = GearboxConfig::load(file.path()).unwrap();
    let table = config.gear_table().unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.neutral().rpm, 0);
    assert_eq!(table.by_rpm(4000).map(|g| g.value), Some(0x222));
    assert!(table.by_rpm(100).is_none());
}

#[test]
fn duplicate_gear_codes_fail_validation() {
    let file = write_config(
        r#"
[[gears]]
rpm = 0
value = 0x004

[[gears]]
rpm = 80
value = 0x999

[[gears]]
rpm = 100
value = 0x999
"#,
    );

    let config = GearboxConfig::load(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("share code"));
}
