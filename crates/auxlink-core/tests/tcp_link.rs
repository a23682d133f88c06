//! Full connect over a loopback TCP socket

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use auxlink_core::config::EngineSettings;
use auxlink_core::controller::{AuxController, ConnectionState};
use auxlink_core::discovery::{RotatorPresence, WeatherMeasurement};
use auxlink_core::protocol::{LinkKind, TcpChannel, TimeoutPolicy};

/// Minimal board: answers every command this test sends, then exits on hangup
fn serve(mut stream: TcpStream) -> Vec<String> {
    let mut seen = Vec::new();
    let mut command = Vec::new();
    let mut byte = [0u8; 1];
    while let Ok(1) = stream.read(&mut byte) {
        command.push(byte[0]);
        if byte[0] != b'#' {
            continue;
        }
        let text = String::from_utf8_lossy(&command).into_owned();
        command.clear();
        let reply = match text.as_str() {
            ":GVP#" => "On-Step#",
            ":GVN#" => "10.30g#",
            ":FA#" => "1#",
            ":rA#" => "1#",
            ":GX9A#" => "N/A#",
            ":GX9B#" => "N/A#",
            ":GX9C#" => "61.0#",
            ":GX9E#" => "N/A#",
            ":GXY0#" => "00000000#",
            ":FG#" => "25000#",
            _ => "0#",
        };
        seen.push(text);
        if stream.write_all(reply.as_bytes()).is_err() {
            break;
        }
    }
    seen
}

#[test]
fn test_connect_and_poll_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve(stream)
    });

    let link = TcpChannel::new(TcpStream::connect(addr).unwrap());
    let mut controller = AuxController::new(EngineSettings::default());
    let caps = controller.connect(Box::new(link)).unwrap().clone();

    assert_eq!(controller.state(), ConnectionState::Connected);
    assert_eq!(
        controller.policy().unwrap(),
        TimeoutPolicy::Networked { seconds: 2 }
    );
    assert_eq!(caps.focuser_count, 1);
    assert_eq!(caps.rotator, RotatorPresence::Present { derotator: false });
    assert_eq!(caps.weather_measurements(), vec![WeatherMeasurement::Humidity]);
    assert!(!caps.has_features());

    let position = controller.engine().unwrap().read_int(":FG#").unwrap();
    assert_eq!(position.value, 25000);
    assert_eq!(
        controller.poll_weather().unwrap(),
        vec![(WeatherMeasurement::Humidity, 61.0)]
    );

    let link = controller.disconnect().unwrap();
    assert_eq!(link.link_kind(), LinkKind::Network);
    drop(link);

    let seen = server.join().unwrap();
    assert_eq!(seen.first().map(String::as_str), Some(":GVP#"));
    assert_eq!(seen.last().map(String::as_str), Some(":GX9C#"));
}
