//! Transport behaviour over mock devices.
//!
//! Covers the request/reply flow in synchronous mode, asynchronous delivery,
//! lifecycle idempotence and error routing.

mod common;

use common::{loopback_transport, paired_transport, spawn_responder, wait_for, Recorder};
use pretty_assertions::assert_eq;
use serial_transport::{
    ConnectionState, ErrorKind, MockSerialPort, PortError, PortSettings, ReceiveParameters,
    SerialDevice, SerialTransport, TraceLevel, TraceType,
};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Synchronous request/reply
// ============================================================================

#[test]
fn test_ping_over_loopback() {
    let (transport, _mock) = loopback_transport("LOOP1");
    transport.open().unwrap();
    let sync = transport.synchronous();

    transport.send("PING\n", None).unwrap();
    let mut reply = ReceiveParameters::<String>::new()
        .with_eop("\n")
        .with_wait_time(1000);
    assert!(transport.receive(&mut reply).unwrap());
    assert_eq!(reply.reply.as_deref(), Some("PING\n"));

    let started = Instant::now();
    let mut nothing = ReceiveParameters::<String>::new()
        .with_eop("\n")
        .with_wait_time(50);
    assert!(!transport.receive(&mut nothing).unwrap());
    assert!(started.elapsed() >= Duration::from_millis(45));
    assert!(nothing.reply.is_none());

    sync.release();
    transport.close().unwrap();
}

#[test]
fn test_request_reply_with_remote_device() {
    let (transport, remote) = paired_transport("TTY0");
    let responder = spawn_responder(remote.clone(), b"PONG\r\n", 3);
    transport.open().unwrap();
    let _sync = transport.synchronous();

    for _ in 0..3 {
        transport.send("PING\n", None).unwrap();
        let mut params = ReceiveParameters::<String>::new()
            .with_eop("\r\n")
            .with_wait_time(1000);
        assert!(transport.receive(&mut params).unwrap());
        assert_eq!(params.reply.as_deref(), Some("PONG\r\n"));
    }

    responder.join().unwrap();
    assert_eq!(remote.written(), b"PONG\r\nPONG\r\nPONG\r\n".to_vec());
    assert_eq!(transport.bytes_sent(), 15);
    assert_eq!(transport.bytes_received(), 18);
    transport.close().unwrap();
}

#[test]
fn test_terminator_split_across_chunks() {
    let (transport, remote) = paired_transport("TTY1");
    transport.open().unwrap();
    let _sync = transport.synchronous();

    let writer = thread::spawn(move || {
        remote.write(b"VALUE=42\r").unwrap();
        thread::sleep(Duration::from_millis(30));
        remote.write(b"\nTAIL").unwrap();
    });

    let mut params = ReceiveParameters::<String>::new()
        .with_eop("\r\n")
        .with_wait_time(1000);
    assert!(transport.receive(&mut params).unwrap());
    assert_eq!(params.reply.as_deref(), Some("VALUE=42\r\n"));
    writer.join().unwrap();

    let mut rest = ReceiveParameters::<Vec<u8>>::new()
        .with_all_data()
        .with_wait_time(1000);
    assert!(transport.receive(&mut rest).unwrap());
    assert_eq!(rest.reply.unwrap(), b"TAIL".to_vec());
}

#[test]
fn test_count_then_all_data_partition() {
    let (transport, _mock) = loopback_transport("LOOP2");
    transport.open().unwrap();
    let _sync = transport.synchronous();
    transport.send("ABCDEFG", None).unwrap();

    let mut head = ReceiveParameters::<String>::new()
        .with_count(3)
        .with_wait_time(1000);
    assert!(transport.receive(&mut head).unwrap());
    // Make sure the whole write has landed before draining the rest.
    assert!(wait_for(Duration::from_secs(1), || transport.bytes_received() == 7));
    let mut tail = ReceiveParameters::<String>::new()
        .with_all_data()
        .with_wait_time(1000);
    assert!(transport.receive(&mut tail).unwrap());

    assert_eq!(head.reply.as_deref(), Some("ABC"));
    assert_eq!(tail.reply.as_deref(), Some("DEFG"));
}

#[test]
fn test_reset_synchronous_buffer() {
    let (transport, _mock) = loopback_transport("LOOP3");
    transport.open().unwrap();
    let _sync = transport.synchronous();
    transport.send("stale\n", None).unwrap();
    assert!(wait_for(Duration::from_secs(1), || transport.bytes_received() == 6));

    transport.reset_synchronous_buffer();
    let mut params = ReceiveParameters::<String>::new().with_eop("\n");
    assert!(!transport.receive(&mut params).unwrap());
}

#[test]
fn test_receive_without_condition_is_validation_error() {
    let (transport, _mock) = loopback_transport("LOOP4");
    let mut params = ReceiveParameters::<Vec<u8>>::new().with_wait_time(10);
    let err = transport.receive(&mut params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

// ============================================================================
// Asynchronous delivery
// ============================================================================

#[test]
fn test_async_bytes_arrive_in_order() {
    let (transport, remote) = paired_transport("TTY2");
    let recorder = Recorder::attach(&transport);
    transport.open().unwrap();

    for chunk in [&b"one "[..], b"two ", b"three"] {
        remote.write(chunk).unwrap();
    }
    assert!(wait_for(Duration::from_secs(2), || {
        recorder.received_bytes().len() == 13
    }));
    assert_eq!(recorder.received_bytes(), b"one two three".to_vec());
    assert_eq!(transport.bytes_received(), 13);

    transport.close().unwrap();
    remote.write(b"late").unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(recorder.received_bytes(), b"one two three".to_vec());
}

#[test]
fn test_sent_bytes_reach_peer_unchanged() {
    let (transport, remote) = paired_transport("TTY3");
    transport.open().unwrap();

    transport.send(&[0x00u8, 0xff, 0x10][..], None).unwrap();
    transport.send(&0x0a0bu16, None).unwrap();
    transport.send(&true, None).unwrap();

    assert_eq!(remote.written(), Vec::<u8>::new());
    assert_eq!(remote.read().unwrap(), vec![0x00, 0xff, 0x10, 0x0a, 0x0b, 0x01]);
    assert_eq!(transport.bytes_sent(), 6);

    transport.reset_byte_counters();
    assert_eq!(transport.bytes_sent(), 0);
    assert_eq!(transport.bytes_received(), 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_lifecycle_state_sequence() {
    let (transport, _mock) = loopback_transport("LOOP5");
    let recorder = Recorder::attach(&transport);

    transport.open().unwrap();
    transport.open().unwrap();
    assert!(transport.is_open());
    transport.close().unwrap();
    transport.close().unwrap();
    assert!(!transport.is_open());

    assert_eq!(
        recorder.states(),
        vec![
            ConnectionState::Opening,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ]
    );
}

#[test]
fn test_second_transport_cannot_take_busy_port() {
    let mock = MockSerialPort::new("BUSY0").into_closed();
    let first = SerialTransport::from_settings(PortSettings::new("BUSY0"));
    first.set_port_opener(mock.clone());
    let second = SerialTransport::from_settings(PortSettings::new("BUSY0"));
    second.set_port_opener(mock);

    first.open().unwrap();
    let err = second.open().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPort);
    assert_eq!(second.connection_state(), ConnectionState::Closed);

    first.close().unwrap();
    second.open().unwrap();
}

#[test]
fn test_open_failure_is_returned_and_reported() {
    let (transport, mock) = loopback_transport("LOOP6");
    let recorder = Recorder::attach(&transport);
    transport.set_trace_level(TraceLevel::Info);
    mock.fail_next_open(PortError::invalid_config("mark parity not supported"));

    let err = transport.open().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert_eq!(
        recorder.errors.lock().unwrap().as_slice(),
        ["Invalid configuration: mark parity not supported"]
    );
    assert_eq!(
        recorder.states(),
        vec![ConnectionState::Opening, ConnectionState::Closed]
    );
    assert_eq!(
        recorder.trace_texts(),
        vec![
            "Connecting to LOOP6".to_string(),
            "Connect to LOOP6 failed: Invalid configuration: mark parity not supported"
                .to_string(),
        ]
    );
}

#[test]
fn test_empty_port_name_rejected() {
    let transport = SerialTransport::from_settings(PortSettings::new(""));
    let recorder = Recorder::attach(&transport);
    let err = transport.open().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPort);
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    assert!(recorder.states().is_empty());
}

#[test]
fn test_reader_failure_only_reaches_callback() {
    let (transport, mock) = loopback_transport("LOOP7");
    let recorder = Recorder::attach(&transport);
    transport.set_trace_level(TraceLevel::Error);
    transport.open().unwrap();

    mock.fail_next_read("framing error");
    assert!(wait_for(Duration::from_secs(2), || {
        !recorder.errors.lock().unwrap().is_empty()
    }));
    let traces = recorder.traces.lock().unwrap().clone();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].kind, TraceType::Error);
    assert!(traces[0].text.starts_with("Connection failed: "));

    transport.close().unwrap();
    assert_eq!(transport.connection_state(), ConnectionState::Closed);
}

#[test]
fn test_receive_after_close_times_out() {
    let (transport, _mock) = loopback_transport("LOOP8");
    transport.open().unwrap();
    let _sync = transport.synchronous();
    transport.close().unwrap();

    let started = Instant::now();
    let mut params = ReceiveParameters::<String>::new()
        .with_eop("\n")
        .with_wait_time(100);
    assert!(!transport.receive(&mut params).unwrap());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_drop_closes_device() {
    let mock = MockSerialPort::loopback("LOOP9").into_closed();
    {
        let transport = SerialTransport::from_settings(PortSettings::new("LOOP9"));
        transport.set_port_opener(mock.clone());
        transport.open().unwrap();
        assert!(mock.is_open());
    }
    assert!(!mock.is_open());
}

#[test]
fn test_concurrent_open_opens_device_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let mock = MockSerialPort::loopback("LOOP10").into_closed();
    let opens = Arc::new(AtomicUsize::new(0));
    let transport = Arc::new(SerialTransport::from_settings(PortSettings::new("LOOP10")));
    {
        let mock = mock.clone();
        let opens = Arc::clone(&opens);
        transport.set_port_opener(
            move |settings: &PortSettings| -> Result<Box<dyn SerialDevice>, PortError> {
                opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(mock.open_with(settings)?))
            },
        );
    }
    let recorder = Recorder::attach(&transport);

    let openers: Vec<_> = (0..8)
        .map(|_| {
            let transport = Arc::clone(&transport);
            thread::spawn(move || transport.open())
        })
        .collect();
    for opener in openers {
        opener.join().unwrap().unwrap();
    }

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(transport.is_open());
    assert_eq!(
        recorder.states(),
        vec![ConnectionState::Opening, ConnectionState::Open]
    );
    assert!(recorder.errors.lock().unwrap().is_empty());
    transport.close().unwrap();
}

#[test]
fn test_no_callbacks_after_close_returns() {
    let (transport, mock) = loopback_transport("LOOP11");
    transport.set_trace_level(TraceLevel::Verbose);
    transport.open().unwrap();
    let recorder = Recorder::attach(&transport);
    transport.close().unwrap();
    let states_at_close = recorder.states();
    let traces_at_close = recorder.trace_texts().len();

    mock.enqueue_read(b"late");
    thread::sleep(Duration::from_millis(50));

    assert!(recorder.received_bytes().is_empty());
    assert!(recorder.errors.lock().unwrap().is_empty());
    assert_eq!(recorder.states(), states_at_close);
    assert_eq!(recorder.trace_texts().len(), traces_at_close);
}
