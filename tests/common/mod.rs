//! Shared test utilities for transport tests.
//!
//! - Transports wired to mock ports (loopback or null-modem pair)
//! - Recorders that collect callback events for later assertions

#![allow(dead_code)]

use serial_transport::{
    BaudRate, ConnectionState, DataBits, MockSerialPort, Parity, SerialDevice, SerialTransport,
    StopBits, TraceEvent,
};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Transport whose writes come back as reads.
pub fn loopback_transport(port_name: &str) -> (SerialTransport, MockSerialPort) {
    let mock = MockSerialPort::loopback(port_name).into_closed();
    let transport = SerialTransport::new(
        port_name,
        BaudRate::Baud9600,
        DataBits::Eight,
        Parity::None,
        StopBits::One,
    );
    transport.set_port_opener(mock.clone());
    (transport, mock)
}

/// Transport on one end of a null-modem pair; the other end is returned
/// open so the test can play the remote device.
pub fn paired_transport(port_name: &str) -> (SerialTransport, MockSerialPort) {
    let (local, remote) = MockSerialPort::pair(port_name, "REMOTE");
    let local = local.into_closed();
    let transport = SerialTransport::new(
        port_name,
        BaudRate::Baud9600,
        DataBits::Eight,
        Parity::None,
        StopBits::One,
    );
    transport.set_port_opener(local);
    (transport, remote)
}

/// Remote device that answers every request line with `reply`.
///
/// Exits after `lines` requests or once `remote` is closed.
pub fn spawn_responder(remote: MockSerialPort, reply: &'static [u8], lines: usize) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut pending = Vec::new();
        let mut answered = 0;
        while answered < lines {
            let chunk = match remote.read() {
                Ok(chunk) if !chunk.is_empty() => chunk,
                _ => return,
            };
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                pending.drain(..=pos);
                let _ = remote.write(reply);
                answered += 1;
            }
        }
    })
}

/// Collects everything a transport reports through its callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
    pub states: Arc<Mutex<Vec<ConnectionState>>>,
    pub traces: Arc<Mutex<Vec<TraceEvent>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
    pub received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Recorder {
    pub fn attach(transport: &SerialTransport) -> Self {
        let recorder = Self::default();
        let states = Arc::clone(&recorder.states);
        transport.on_state_change(move |state| states.lock().unwrap().push(state));
        let traces = Arc::clone(&recorder.traces);
        transport.on_trace(move |event| traces.lock().unwrap().push(event.clone()));
        let errors = Arc::clone(&recorder.errors);
        transport.on_error(move |err| errors.lock().unwrap().push(err.to_string()));
        let received = Arc::clone(&recorder.received);
        transport.on_received(move |event| received.lock().unwrap().push(event.data.clone()));
        recorder
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn trace_texts(&self) -> Vec<String> {
        self.traces
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.text.clone())
            .collect()
    }

    pub fn received_bytes(&self) -> Vec<u8> {
        self.received.lock().unwrap().concat()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
