//! Performance benchmarks for the hot paths of the receive cycle

use rcon_client::assembler::MultiPartAssembly;
use rcon_client::tracker::SequenceTracker;
use rcon_shared::{checksum, decode, encode, Datagram};
use std::time::Instant;

/// Benchmarks CRC32 over a typical response body
#[test]
fn benchmark_checksum() {
    let payload = vec![0x5Au8; 1024];

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = checksum(&payload);
    }

    let duration = start.elapsed();
    println!(
        "Checksum: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks framing and parsing of console messages
#[test]
fn benchmark_encode_decode() {
    let datagram = Datagram::ConsoleMessage {
        sequence: 42,
        body: "Player #3 Miller (127.0.0.1:2304) connected".to_string(),
    };

    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = encode(&datagram);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sequence(), Some(42));
    }

    let duration = start.elapsed();
    println!(
        "Encode + decode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks reassembly of a maximal multi-part response
#[test]
fn benchmark_multi_part_assembly() {
    let total = u8::MAX;
    let fragment = vec![b'x'; 64];

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut assembly = MultiPartAssembly::new(total);
        // Reverse order is the worst case for insertion
        for index in (0..total).rev() {
            assembly.insert(index, total, fragment.clone()).unwrap();
        }
        assert!(assembly.is_complete());
        let body = assembly.finish().unwrap();
        assert_eq!(body.len(), total as usize * fragment.len());
    }

    let duration = start.elapsed();
    println!(
        "Multi-part assembly: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks duplicate detection across many wraps of the sequence space
#[test]
fn benchmark_sequence_tracker() {
    let mut tracker = SequenceTracker::new(100);

    let iterations = 100_000u32;
    let start = Instant::now();

    let mut fresh = 0;
    for i in 0..iterations {
        if tracker.observe((i % 256) as u8) {
            fresh += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Sequence tracker: {} observations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // The window is smaller than the sequence space, so nothing repeats inside it
    assert_eq!(fresh, iterations);
    assert!(duration.as_millis() < 1000);
}
