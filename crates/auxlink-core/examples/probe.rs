//! Connect to a controller and print what it has
//!
//! ```text
//! cargo run --example probe -- /dev/ttyACM0
//! cargo run --example probe -- 192.168.0.1:9999
//! cargo run --example probe -- demo
//! cargo run --example probe -- list
//! ```
//!
//! Set `RUST_LOG=debug` to see every command and reply.

use std::net::TcpStream;
use std::path::Path;

use anyhow::{bail, Context, Result};
use auxlink_core::config::EngineSettings;
use auxlink_core::controller::AuxController;
use auxlink_core::demo::DemoController;
use auxlink_core::protocol::commands::GET_FOCUSER_POSITION;
use auxlink_core::protocol::{list_ports, open_port, CommunicationChannel, TcpChannel};

fn open(target: &str) -> Result<Box<dyn CommunicationChannel>> {
    if target == "demo" {
        return Ok(Box::new(DemoController::default()));
    }
    if target.contains(':') && !target.starts_with("COM") {
        let stream =
            TcpStream::connect(target).with_context(|| format!("connecting to {}", target))?;
        return Ok(Box::new(TcpChannel::new(stream)));
    }
    Ok(Box::new(open_port(target, None)?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(target) = args.next() else {
        bail!("usage: probe <serial port | host:port | demo | list> [settings.json]");
    };

    if target == "list" {
        for port in list_ports() {
            println!(
                "{}  {}",
                port.name,
                port.product.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    let settings = match args.next() {
        Some(path) => EngineSettings::load(Path::new(&path))?,
        None => EngineSettings::default(),
    };

    let mut controller = AuxController::new(settings);
    let caps = controller.connect(open(&target)?)?.clone();

    println!("firmware:  {}", caps.firmware.as_deref().unwrap_or("?"));
    println!("focusers:  {}", caps.focuser_count);
    println!("rotator:   {:?}", caps.rotator);
    println!("weather:   {:?}", caps.weather_measurements());
    for feature in &caps.features {
        println!("feature {}: {} ({:?})", feature.index, feature.name, feature.kind);
    }

    if caps.has_focuser() {
        match controller.engine()?.read_int(GET_FOCUSER_POSITION) {
            Ok(position) => println!("focuser at {}", position.value),
            Err(failure) => println!("focuser position unavailable: {}", failure),
        }
    }
    for (measurement, value) in controller.poll_weather()? {
        println!("{:?}: {:.1}", measurement, value);
    }

    controller.disconnect();
    Ok(())
}
