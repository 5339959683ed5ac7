//! Tests against a real serial device.
//!
//! Ignored by default. Run with:
//! `TEST_PORT=/dev/ttyUSB0 TEST_LOOPBACK=1 cargo test --test hardware -- --ignored`
//!
//! `TEST_LOOPBACK=1` means TX is wired to RX.

use serial_transport::{BaudRate, PortSettings, ReceiveParameters, SerialTransport, TraceLevel};
use std::env;

struct TestPortConfig {
    port_name: String,
    baud_rate: BaudRate,
    loopback_enabled: bool,
}

impl TestPortConfig {
    fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .and_then(|bps| BaudRate::try_from(bps).ok())
            .unwrap_or(BaudRate::Baud9600);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");
        Some(Self {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }

    fn transport(&self) -> SerialTransport {
        let mut settings = PortSettings::new(self.port_name.clone());
        settings.baud_rate = self.baud_rate;
        let transport = SerialTransport::from_settings(settings);
        transport.set_trace_level(TraceLevel::Verbose);
        transport.on_trace(|event| eprintln!("{:?}: {}", event.kind, event.text));
        transport
    }
}

#[test]
#[ignore = "requires a serial device in TEST_PORT"]
fn test_real_port_open_close() {
    let Some(config) = TestPortConfig::from_env() else {
        eprintln!("TEST_PORT not set, skipping");
        return;
    };
    let transport = config.transport();
    transport.open().unwrap();
    assert!(transport.is_open());
    assert_eq!(transport.bytes_to_write().unwrap(), 0);
    transport.set_dtr(true).unwrap();
    transport.close().unwrap();
    transport.close().unwrap();
    assert!(!transport.is_open());
}

#[test]
#[ignore = "requires a looped serial device in TEST_PORT"]
fn test_real_port_loopback_ping() {
    let Some(config) = TestPortConfig::from_env() else {
        eprintln!("TEST_PORT not set, skipping");
        return;
    };
    if !config.loopback_enabled {
        eprintln!("TEST_LOOPBACK not set, skipping");
        return;
    }
    let transport = config.transport();
    transport.open().unwrap();
    let sync = transport.synchronous();
    transport.send("PING\n", None).unwrap();
    let mut params = ReceiveParameters::<String>::new()
        .with_eop("\n")
        .with_wait_time(2000);
    assert!(transport.receive(&mut params).unwrap());
    assert_eq!(params.reply.as_deref(), Some("PING\n"));
    sync.release();
    transport.close().unwrap();
}

#[test]
#[ignore = "lists host ports"]
fn test_port_names() {
    let names = SerialTransport::port_names().unwrap();
    for name in &names {
        eprintln!("{name}");
    }
}
