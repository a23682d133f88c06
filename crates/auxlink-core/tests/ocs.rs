//! Observatory Control System handshake and discovery

use std::time::Duration;

use auxlink_core::config::EngineSettings;
use auxlink_core::ocs::{OcsCapabilities, OcsSession, RoofDelays, RoofMotion};
use auxlink_core::protocol::mock::MockChannel;
use auxlink_core::protocol::{Failure, LinkKind, ProtocolError};
use pretty_assertions::assert_eq;

fn roll_off_roof() -> MockChannel {
    let link = MockChannel::new();
    link.respond(":IP#", "OCS#")
        .respond(":IN#", "3.03i#")
        // unconfigured items answer an unterminated 0
        .respond(":DU#", "0")
        .respond(":IT#", "1.5,3.0#");
    link
}

#[test]
fn test_roll_off_roof_without_dome() {
    let link = roll_off_roof();
    let session = OcsSession::connect(Box::new(link.clone())).unwrap();

    assert_eq!(
        session.capabilities(),
        &OcsCapabilities {
            firmware: Some("3.03i".to_string()),
            has_dome: false,
            roof_delays: Some(RoofDelays {
                pre_motion: Duration::from_millis(1500),
                post_motion: Duration::from_secs(3),
            }),
        }
    );
    assert_eq!(link.writes(), vec![":IP#", ":IN#", ":DU#", ":IT#"]);
    assert!(!session.engine().is_busy());
}

#[test]
fn test_dome_reported_parked() {
    let link = roll_off_roof();
    link.respond(":DU#", "P#");
    let session = OcsSession::connect(Box::new(link)).unwrap();
    assert!(session.capabilities().has_dome);
}

#[test]
fn test_wrong_product_stops_before_discovery() {
    let link = MockChannel::new();
    link.respond(":IP#", "On-Step#");
    let err = OcsSession::connect(Box::new(link.clone())).unwrap_err();
    assert!(matches!(err, ProtocolError::HandshakeFailed(_)));
    assert_eq!(link.writes(), vec![":IP#"]);
}

#[test]
fn test_silent_board_fails_handshake() {
    let link = MockChannel::new();
    let err = OcsSession::connect(Box::new(link)).unwrap_err();
    assert!(matches!(err, ProtocolError::HandshakeFailed(_)));
}

#[test]
fn test_roof_delay_error_code_leaves_delays_unknown() {
    let link = roll_off_roof();
    link.respond(":IT#", "0#");
    let session = OcsSession::connect(Box::new(link)).unwrap();
    assert_eq!(session.capabilities().roof_delays, None);
    assert_eq!(session.capabilities().roof_poll_delay(), Duration::from_millis(500));
}

#[test]
fn test_move_roof_waits_pre_motion_delay() {
    let link = roll_off_roof();
    let session = OcsSession::connect(Box::new(link.clone())).unwrap();

    let wait = session.move_roof(RoofMotion::Open).unwrap();
    assert_eq!(wait, Duration::from_millis(2000));
    session.move_roof(RoofMotion::Close).unwrap();
    assert_eq!(
        link.writes()[4..].to_vec(),
        vec![":RO#".to_string(), ":RC#".to_string()]
    );

    link.fail_writes(true);
    assert_eq!(session.move_roof(RoofMotion::Open), Err(Failure::Write));
    assert!(!session.engine().is_busy());
}

#[test]
fn test_disconnect_returns_link() {
    let link = MockChannel::network();
    link.respond(":IP#", "OCS#")
        .respond(":IN#", "3.03i#")
        .respond(":DU#", "H#")
        .respond(":IT#", "0.0,0.0#");
    let session = OcsSession::connect_with(Box::new(link), &EngineSettings::observatory()).unwrap();
    assert!(session.capabilities().has_dome);
    let link = session.disconnect();
    assert_eq!(link.link_kind(), LinkKind::Network);
}
