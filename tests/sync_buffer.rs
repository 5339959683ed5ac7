//! Property tests for the synchronous receive buffer.

use proptest::prelude::*;
use serial_transport::SyncBuffer;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn pattern() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A pattern split over two appends is found exactly where it ends.
    #[test]
    fn split_pattern_is_found(
        prefix in prop::collection::vec(any::<u8>(), 0..32),
        pattern in pattern(),
        split in any::<prop::sample::Index>(),
    ) {
        let mut stream = prefix.clone();
        stream.extend_from_slice(&pattern);
        let cut = prefix.len() + split.index(pattern.len() + 1);

        let buffer = SyncBuffer::new();
        buffer.append(&stream[..cut]);
        // Searching before the rest arrives must not skip the partial match.
        let early = buffer.search(&pattern, 0, Duration::ZERO);
        buffer.append(&stream[cut..]);
        let found = buffer.search(&pattern, 0, Duration::from_millis(100));

        let first = stream
            .windows(pattern.len())
            .position(|w| w == pattern.as_slice())
            .map(|pos| pos + pattern.len());
        prop_assert_eq!(found, first);
        if let Some(early) = early {
            prop_assert_eq!(Some(early), first);
        }
    }

    /// Taking a count and then the rest partitions the buffer.
    #[test]
    fn take_then_take_all_partitions(
        data in prop::collection::vec(any::<u8>(), 0..64),
        count in 0usize..80,
    ) {
        let buffer = SyncBuffer::new();
        buffer.append(&data);
        let mut head = buffer.take(count);
        let tail = buffer.take_all();
        prop_assert_eq!(head.len(), count.min(data.len()));
        head.extend_from_slice(&tail);
        prop_assert_eq!(head, data);
        prop_assert!(buffer.is_empty());
    }

    /// With no pattern, a length threshold alone decides the match.
    #[test]
    fn empty_pattern_waits_for_length(
        data in prop::collection::vec(any::<u8>(), 0..16),
        min_len in 1usize..16,
    ) {
        let buffer = SyncBuffer::new();
        buffer.append(&data);
        let found = buffer.search(&[], min_len, Duration::ZERO);
        if data.len() >= min_len {
            prop_assert_eq!(found, Some(0));
        } else {
            prop_assert_eq!(found, None);
        }
    }
}

#[test]
fn zero_wait_never_blocks() {
    let buffer = SyncBuffer::new();
    let started = std::time::Instant::now();
    assert_eq!(buffer.search(b"\n", 0, Duration::ZERO), None);
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[test]
fn waiter_wakes_on_append_from_other_thread() {
    let buffer = Arc::new(SyncBuffer::new());
    let writer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for chunk in [&b"AT+"[..], b"OK\r", b"\n"] {
                thread::sleep(Duration::from_millis(10));
                buffer.append(chunk);
            }
        })
    };
    let found = buffer.search(b"\r\n", 0, Duration::from_secs(2));
    writer.join().unwrap();
    assert_eq!(found, Some(7));
    assert_eq!(buffer.take(7), b"AT+OK\r\n".to_vec());
}
