//! Fan-out PUT behavior: quorum, sticky failures, per-target headers,
//! byte-identical bodies.

mod common;

use common::{dead_endpoint, new_log, spawn_stub, StubResponse};
use grid_sdk::{PolyPut, SdkError, SliceReader};

const CHUNK_A: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
const CHUNK_B: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";
const CHUNK_C: &str = "CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC";

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_all_targets_receive_identical_bytes() {
    let log = new_log();
    let host_a = spawn_stub(log.clone(), |_| StubResponse::ok()).await;
    let host_b = spawn_stub(log.clone(), |_| StubResponse::ok()).await;

    let body = payload(20000);
    let mut pp = PolyPut::new().unwrap();
    pp.add_target(&format!("http://{host_a}/{CHUNK_A}"));
    pp.add_target(&format!("http://{host_b}/{CHUNK_B}"));
    pp.add_header("X-oio-chunk-meta-chunk-pos", "0");

    let mut slice = SliceReader::new(body.as_slice(), body.len() as u64);
    pp.execute(&mut slice).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    for rec in log.iter() {
        assert_eq!(rec.method, "PUT");
        assert_eq!(rec.header("content-length"), Some("20000"));
        assert_eq!(rec.body, body);
        assert_eq!(rec.header("x-oio-chunk-meta-chunk-pos"), Some("0"));
    }
    // The chunk-id header names each target's own chunk.
    let ids: Vec<&str> = log
        .iter()
        .map(|r| r.header("x-oio-chunk-meta-chunk-id").unwrap())
        .collect();
    assert!(ids.contains(&CHUNK_A));
    assert!(ids.contains(&CHUNK_B));
}

#[tokio::test]
async fn test_one_failure_out_of_three_is_tolerated() {
    let log = new_log();
    let host_a = spawn_stub(log.clone(), |_| StubResponse::ok()).await;
    let host_b = spawn_stub(log.clone(), |_| StubResponse::ok()).await;
    let dead = dead_endpoint().await;

    let body = payload(4096);
    let mut pp = PolyPut::new().unwrap();
    pp.add_target(&format!("http://{host_a}/{CHUNK_A}"));
    pp.add_target(&format!("http://{host_b}/{CHUNK_B}"));
    pp.add_target(&format!("http://{dead}/{CHUNK_C}"));

    let mut slice = SliceReader::new(body.as_slice(), body.len() as u64);
    pp.execute(&mut slice).await.unwrap();

    assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_two_failures_out_of_three_break_quorum() {
    let log = new_log();
    let host_a = spawn_stub(log.clone(), |_| StubResponse::ok()).await;
    let dead_b = dead_endpoint().await;
    let dead_c = dead_endpoint().await;

    let body = payload(4096);
    let mut pp = PolyPut::new().unwrap();
    pp.add_target(&format!("http://{host_a}/{CHUNK_A}"));
    pp.add_target(&format!("http://{dead_b}/{CHUNK_B}"));
    pp.add_target(&format!("http://{dead_c}/{CHUNK_C}"));

    let mut slice = SliceReader::new(body.as_slice(), body.len() as u64);
    let err = pp.execute(&mut slice).await.unwrap_err();
    assert!(matches!(err, SdkError::QuorumNotReached));
}

#[tokio::test]
async fn test_rejecting_replicas_count_as_failures() {
    let log = new_log();
    let host_a = spawn_stub(log.clone(), |_| StubResponse::ok()).await;
    let host_b = spawn_stub(log.clone(), |_| StubResponse::status(403)).await;
    let host_c = spawn_stub(log.clone(), |_| StubResponse::status(500)).await;

    let body = payload(1024);
    let mut pp = PolyPut::new().unwrap();
    pp.add_target(&format!("http://{host_a}/{CHUNK_A}"));
    pp.add_target(&format!("http://{host_b}/{CHUNK_B}"));
    pp.add_target(&format!("http://{host_c}/{CHUNK_C}"));

    let mut slice = SliceReader::new(body.as_slice(), body.len() as u64);
    let err = pp.execute(&mut slice).await.unwrap_err();
    assert!(matches!(err, SdkError::QuorumNotReached));
}
