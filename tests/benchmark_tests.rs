//! Performance benchmarks for session bookkeeping and message handling

use bincode::{deserialize, serialize};
use server::admission::{AdmissionController, ApprovalRequest};
use server::session::SessionTable;
use shared::{ConnectionId, Delivery, MessageRegistry, NamedMessage, Packet, TestMsg};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Benchmarks connect/disconnect churn on the session table
#[test]
fn benchmark_session_churn() {
    let mut sessions = SessionTable::new();

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let id = ConnectionId(i as u64 + 1);
        sessions.on_connect(id);
        if i % 2 == 0 {
            sessions.on_disconnect(id);
        }
    }

    let duration = start.elapsed();
    println!(
        "Session churn: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(sessions.len(), iterations / 2);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks taking snapshots of a populated session table
#[test]
fn benchmark_session_snapshot() {
    let mut sessions = SessionTable::new();
    for i in 1..=1_000 {
        sessions.on_connect(ConnectionId(i));
    }

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let snapshot = sessions.snapshot();
        assert_eq!(snapshot.len(), 1_000);
    }

    let duration = start.elapsed();
    println!(
        "Session snapshot (1000 sessions): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks TestMsg encode/decode
#[test]
fn benchmark_test_msg_codec() {
    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let msg = TestMsg {
            bool_value: i % 2 == 0,
            int_value: i as i32,
            ulong_value: i as u64,
        };
        let body = msg.encode().unwrap();
        assert_eq!(body.len(), TestMsg::WIRE_SIZE);
        let decoded = TestMsg::decode(&body).unwrap();
        assert_eq!(decoded.ulong_value, i as u64);
    }

    let duration = start.elapsed();
    println!(
        "TestMsg codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks full envelope serialization as done for every broadcast
#[test]
fn benchmark_packet_serialization() {
    let msg = TestMsg {
        bool_value: true,
        int_value: 1,
        ulong_value: 7,
    };

    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let packet = Packet::named(TestMsg::NAME, &msg, Delivery::ReliableFragmentedSequenced).unwrap();
        let data = serialize(&packet).unwrap();
        let _: Packet = deserialize(&data).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks admission checks on maximum-size payloads
#[test]
fn benchmark_admission_checks() {
    let admission = AdmissionController::default();
    let request = ApprovalRequest {
        connection_id: ConnectionId(1),
        payload: vec![0; admission.max_payload()],
    };

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        assert!(admission.approve(&request).approved);
    }

    let duration = start.elapsed();
    println!(
        "Admission checks: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 100);
}

/// Benchmarks registry dispatch to a registered handler
#[tokio::test]
async fn benchmark_registry_dispatch() {
    let registry = MessageRegistry::new();
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    registry
        .register(TestMsg::NAME, move |_: ConnectionId, _: TestMsg| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .await;

    let body = TestMsg::default().encode().unwrap();

    let iterations = 50_000;
    let start = Instant::now();

    for i in 0..iterations {
        registry
            .dispatch(TestMsg::NAME, ConnectionId(i as u64), TestMsg::VERSION, &body)
            .await
            .unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Registry dispatch: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(handled.load(Ordering::Relaxed), iterations);
    assert!(duration.as_millis() < 2000);
}
