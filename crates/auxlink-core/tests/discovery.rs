//! Capability discovery scenarios

use auxlink_core::config::EngineSettings;
use auxlink_core::discovery::{
    discover, CapabilitySet, Feature, FeatureKind, RotatorPresence, WeatherMeasurement,
};
use auxlink_core::protocol::mock::MockChannel;
use auxlink_core::protocol::CommandEngine;
use pretty_assertions::assert_eq;

fn run(link: &MockChannel) -> CapabilitySet {
    let settings = EngineSettings::default();
    let engine = CommandEngine::new(Box::new(link.clone()), &settings);
    discover(&engine, &settings)
}

#[test]
fn test_focuser_and_temperature_only() {
    let link = MockChannel::new();
    link.respond(":GVN#", "10.30g#")
        .respond(":FA#", "2#")
        .respond(":rA#", "0#")
        .respond(":GX9A#", "22.5#")
        .respond(":GX9B#", "N/A#")
        .respond(":GX9C#", "N/A#")
        .respond(":GX9E#", "N/A#")
        .respond(":GXY0#", "N/A#");

    let caps = run(&link);

    assert_eq!(
        caps,
        CapabilitySet {
            firmware: Some("10.30g".to_string()),
            focuser_count: 2,
            rotator: RotatorPresence::Absent,
            weather_channels: [true, false, false, false],
            features: Vec::new(),
            has_features: false,
        }
    );
    assert!(caps.has_focuser());
    assert!(!caps.has_rotator());
    assert!(!caps.rotator.may_poll());
    assert!(caps.has_weather());
    assert!(!caps.has_features());
    assert_eq!(caps.firmware_version(), Some(10.30));
    assert_eq!(caps.weather_measurements(), vec![WeatherMeasurement::Temperature]);
}

#[test]
fn test_sequence_order() {
    let link = MockChannel::new();
    link.respond(":GXY0#", "00000000#");
    run(&link);

    assert_eq!(
        link.writes(),
        vec![":GVN#", ":FA#", ":rA#", ":GX9A#", ":GX9B#", ":GX9C#", ":GX9E#", ":GXY0#"]
    );
}

#[test]
fn test_silent_board_downgrades_everything() {
    let link = MockChannel::new();
    let caps = run(&link);

    assert_eq!(caps.firmware, None);
    assert!(!caps.has_focuser());
    // a failed query is not a definitive answer
    assert_eq!(caps.rotator, RotatorPresence::Unknown);
    assert!(caps.rotator.may_poll());
    assert!(!caps.has_weather());
    assert!(!caps.has_features());
}

#[test]
fn test_old_firmware_still_discovers() {
    let link = MockChannel::new();
    link.respond(":GVN#", "9.2#")
        .respond(":FA#", "1#")
        .respond(":rA#", "D#")
        .respond(":GXY0#", "0#");

    let caps = run(&link);
    assert_eq!(caps.firmware.as_deref(), Some("9.2"));
    assert_eq!(caps.focuser_count, 1);
    assert_eq!(caps.rotator, RotatorPresence::Present { derotator: true });
}

#[test]
fn test_weather_absent_markers() {
    let link = MockChannel::new();
    link.respond(":GX9A#", "nan#")
        .respond(":GX9B#", "0#")
        .respond(":GX9C#", "48.0#")
        .respond(":GX9E#", "N/A#");

    let caps = run(&link);
    assert_eq!(caps.weather_channels, [false, false, true, false]);
    assert!(caps.has_weather());
}

#[test]
fn test_features_fan_out_over_enabled_slots() {
    let link = MockChannel::new();
    link.respond(":GXY0#", "01000011#")
        .respond(":GXY2#", "Dew1,3#")
        .respond(":GXY7#", "Roof,6#")
        .respond(":GXY8#", "N/A,N/A#");

    let caps = run(&link);

    assert!(caps.has_features());
    assert_eq!(
        caps.features,
        vec![
            Feature {
                index: 2,
                name: "Dew1".to_string(),
                kind: FeatureKind::DewHeater,
            },
            Feature {
                index: 7,
                name: "Roof".to_string(),
                kind: FeatureKind::CoverSwitch,
            },
        ]
    );

    let writes = link.writes();
    let feature_queries: Vec<&str> = writes
        .iter()
        .map(String::as_str)
        .filter(|w| w.starts_with(":GXY") && *w != ":GXY0#")
        .collect();
    assert_eq!(feature_queries, vec![":GXY2#", ":GXY7#", ":GXY8#"]);
}
