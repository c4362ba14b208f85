//! End-to-end sessions against the in-process MCU simulator.
//!
//! Host engine and simulator each own one end of an in-memory pipe, so
//! these runs exercise the same polled channel machinery used against
//! real hardware, with real AES-GCM-SIV on the device side.

use std::time::Duration;

use rand::RngCore;
use scl_core::config::SessionConfig;
use scl_core::{Capabilities, Operation, SclError, SclResult, SessionParams, TAG_SIZE};
use scl_proto::split_container;
use scl_session::{ChunkTransferSession, SessionOutcome};
use scl_sim::{spawn, SimBehavior, SimReport};

const KEY: [u8; 16] = [0x42; 16];
const NONCE: [u8; 16] = [0x17; 16];

fn test_config() -> SessionConfig {
    SessionConfig {
        chunk_size: 64,
        warmup_ms: 5,
        settle_ms: 5,
        ..SessionConfig::default()
    }
}

fn test_behavior() -> SimBehavior {
    SimBehavior {
        chunk_size: 64,
        ..SimBehavior::default()
    }
}

fn random_data(n: usize) -> Vec<u8> {
    let mut data = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

fn run_session(
    behavior: SimBehavior,
    params: &SessionParams,
    input: &[u8],
) -> (SclResult<SessionOutcome>, SclResult<SimReport>) {
    let (mut host, mcu) = spawn(behavior, Duration::from_millis(1));
    let config = test_config();
    let outcome = ChunkTransferSession::new(&mut host, &config).run(params, input, None);
    drop(host);
    (outcome, mcu.join())
}

#[test]
fn encrypt_decrypt_roundtrip_with_aad() {
    // Three full chunks plus a 17-byte tail.
    let plaintext = random_data(3 * 64 + 17);
    let aad = b"volume-1".to_vec();

    let enc_params =
        SessionParams::new(Operation::Encrypt, KEY, NONCE).with_aad(aad.clone());
    let (outcome, report) = run_session(test_behavior(), &enc_params, &plaintext);
    let outcome = outcome.unwrap();
    let report = report.unwrap();

    assert_eq!(report.aad, aad);
    assert_eq!(report.chunks, 4);
    assert_eq!(report.bytes_in, plaintext.len());
    assert!(report.end_marker_seen);
    assert_eq!(outcome.report.chunks, 4);
    assert!(!outcome.report.short_stream);
    assert!(outcome.finish.end_acked);
    assert!(outcome.finish.stream_complete);
    assert!(outcome.finish.summary.is_some());

    // Container: 16-byte nonce, then one tag per chunk on top of the data.
    let (nonce, body) = split_container(&outcome.artifact).unwrap();
    assert_eq!(nonce, NONCE);
    assert_eq!(body.len(), plaintext.len() + 4 * TAG_SIZE);

    let dec_params =
        SessionParams::new(Operation::Decrypt, KEY, nonce).with_aad(aad.clone());
    let (decrypted, dec_report) = run_session(test_behavior(), &dec_params, body);
    let decrypted = decrypted.unwrap();

    assert_eq!(decrypted.artifact, plaintext);
    assert_eq!(dec_report.unwrap().chunks, 4);
}

#[test]
fn full_size_chunk_yields_the_canonical_container() {
    // 1024 bytes of plaintext at the firmware's native chunk size:
    // one chunk, and a 16 + 1024 + 16 = 1056-byte container.
    let plaintext = random_data(1024);
    let params = SessionParams::new(Operation::Encrypt, KEY, NONCE);
    let behavior = SimBehavior::default();

    let (mut host, mcu) = spawn(behavior, Duration::from_millis(1));
    let config = SessionConfig {
        warmup_ms: 5,
        settle_ms: 5,
        ..SessionConfig::default()
    };
    let outcome = ChunkTransferSession::new(&mut host, &config)
        .run(&params, &plaintext, None)
        .unwrap();
    drop(host);

    assert_eq!(outcome.report.chunks, 1);
    assert_eq!(outcome.artifact.len(), 1056);
    assert_eq!(mcu.join().unwrap().bytes_in, 1024);
}

#[test]
fn exact_chunk_multiple_has_no_trailing_partial() {
    let plaintext = random_data(2 * 64);
    let params = SessionParams::new(Operation::Encrypt, KEY, NONCE);
    let (outcome, report) = run_session(test_behavior(), &params, &plaintext);
    let outcome = outcome.unwrap();

    assert_eq!(report.unwrap().chunks, 2);
    assert_eq!(outcome.report.chunks, 2);
    assert_eq!(outcome.artifact.len(), 16 + 2 * (64 + TAG_SIZE));
}

#[test]
fn empty_aad_declares_zero_and_skips_the_body() {
    let plaintext = random_data(40);
    let params = SessionParams::new(Operation::Encrypt, KEY, NONCE);
    let (outcome, report) = run_session(test_behavior(), &params, &plaintext);

    assert!(outcome.is_ok());
    assert!(report.unwrap().aad.is_empty());
}

#[test]
fn firmware_without_aad_support_negotiates_cleanly() {
    let caps = Capabilities {
        has_aad: false,
        declares_size: false,
    };
    let plaintext = random_data(40);
    let params = SessionParams::new(Operation::Encrypt, KEY, NONCE).with_capabilities(caps);
    let behavior = SimBehavior {
        capabilities: caps,
        ..test_behavior()
    };
    let (outcome, report) = run_session(behavior, &params, &plaintext);

    assert!(outcome.is_ok());
    assert!(report.unwrap().aad.is_empty());
}

#[test]
fn legacy_firmware_receives_the_declared_size() {
    let caps = Capabilities {
        has_aad: true,
        declares_size: true,
    };
    let plaintext = random_data(150);
    let params = SessionParams::new(Operation::Encrypt, KEY, NONCE).with_capabilities(caps);
    let behavior = SimBehavior {
        capabilities: caps,
        ..test_behavior()
    };
    let (outcome, report) = run_session(behavior, &params, &plaintext);

    assert!(outcome.is_ok());
    assert_eq!(report.unwrap().declared_size, Some(150));
}

#[test]
fn empty_input_is_rejected_before_touching_the_wire() {
    let (mut host, _device) = scl_link::pipe(Duration::from_millis(1));
    let config = test_config();
    let params = SessionParams::new(Operation::Encrypt, KEY, NONCE);
    let err = ChunkTransferSession::new(&mut host, &config)
        .run(&params, &[], None)
        .unwrap_err();
    assert!(matches!(err, SclError::InvalidParams(_)));
}
