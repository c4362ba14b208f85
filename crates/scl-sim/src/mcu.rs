//! The device-side protocol loop.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use scl_core::{Operation, SclError, SclResult, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use scl_link::{pipe, LineChannel, PipeChannel};
use tracing::debug;

use crate::behavior::SimBehavior;
use crate::crypto::ChunkCipher;

/// How long the simulated firmware waits on the host before giving up.
const HOST_TIMEOUT: Duration = Duration::from_secs(10);

/// What the simulated device observed, for test assertions.
#[derive(Debug, Default)]
pub struct SimReport {
    pub operation: Option<Operation>,
    /// AAD received during the handshake (empty when none was sent).
    pub aad: Vec<u8>,
    /// Total size declared via the legacy WAIT_SIZE step.
    pub declared_size: Option<u32>,
    /// Chunks fully ingested and processed.
    pub chunks: usize,
    /// Payload bytes received across all chunks.
    pub bytes_in: usize,
    /// The host sent the zero-length end marker.
    pub end_marker_seen: bool,
}

pub struct SimMcu {
    handle: JoinHandle<SclResult<SimReport>>,
}

impl SimMcu {
    /// Wait for the device loop to exit and collect its report.
    pub fn join(self) -> SclResult<SimReport> {
        self.handle
            .join()
            .map_err(|_| SclError::Framing("simulator thread panicked".into()))?
    }
}

/// Start a simulated MCU; returns the host end of the link.
pub fn spawn(behavior: SimBehavior, poll_interval: Duration) -> (PipeChannel, SimMcu) {
    let (host, device) = pipe(poll_interval);
    let handle = thread::spawn(move || run_device(device, behavior));
    (host, SimMcu { handle })
}

fn need<T>(value: Option<T>, what: &str) -> SclResult<T> {
    value.ok_or_else(|| SclError::Framing(format!("host never sent {what}")))
}

fn run_device(mut chan: PipeChannel, behavior: SimBehavior) -> SclResult<SimReport> {
    let mut report = SimReport::default();

    chan.send(b"READY\r\n")?;
    let mode = need(chan.read_exact(1, HOST_TIMEOUT)?, "mode select")?;
    if mode[0] != b'n' {
        chan.send(b"ERROR: unknown mode\r\n")?;
        return Err(SclError::Framing(format!(
            "unexpected mode byte {:#04x}",
            mode[0]
        )));
    }
    chan.send(b"NEW_STREAM_MODE\r\n")?;

    chan.send(b"WAIT_OPERATION\r\n")?;
    let op = need(chan.read_exact(1, HOST_TIMEOUT)?, "operation byte")?;
    let operation = match op[0] {
        b'e' => Operation::Encrypt,
        b'd' => Operation::Decrypt,
        other => {
            chan.send(b"ERROR: unsupported operation\r\n")?;
            return Err(SclError::Framing(format!(
                "unexpected operation byte {other:#04x}"
            )));
        }
    };
    report.operation = Some(operation);
    chan.send(b"ACK\r\n")?;

    chan.send(b"WAIT_KEY\r\n")?;
    let key_bytes = need(chan.read_exact(KEY_SIZE, HOST_TIMEOUT)?, "session key")?;
    chan.send(b"ACK\r\n")?;
    if let Some(message) = &behavior.error_after_key {
        chan.send(format!("ERROR: {message}\r\n").as_bytes())?;
        return Ok(report);
    }

    chan.send(b"WAIT_NONCE\r\n")?;
    let nonce_bytes = need(chan.read_exact(NONCE_SIZE, HOST_TIMEOUT)?, "session nonce")?;
    chan.send(b"ACK\r\n")?;

    if behavior.capabilities.has_aad {
        chan.send(b"WAIT_AAD_LEN\r\n")?;
        let len = need(chan.read_exact(4, HOST_TIMEOUT)?, "AAD length")?;
        let aad_len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        chan.send(b"ACK\r\n")?;
        if aad_len > 0 {
            chan.send(b"WAIT_AAD\r\n")?;
            report.aad = need(chan.read_exact(aad_len, HOST_TIMEOUT)?, "AAD bytes")?;
            chan.send(b"ACK\r\n")?;
        }
    }

    if behavior.capabilities.declares_size {
        chan.send(b"WAIT_SIZE\r\n")?;
        let size = need(chan.read_exact(4, HOST_TIMEOUT)?, "declared size")?;
        report.declared_size = Some(u32::from_be_bytes([size[0], size[1], size[2], size[3]]));
        chan.send(b"ACK\r\n")?;
    }

    chan.send(b"READY_FOR_DATA\r\n")?;

    let key: [u8; KEY_SIZE] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| SclError::Framing("short session key".into()))?;
    let nonce: [u8; NONCE_SIZE] = nonce_bytes
        .as_slice()
        .try_into()
        .map_err(|_| SclError::Framing("short session nonce".into()))?;
    let cipher = ChunkCipher::new(&key, &nonce);

    let request_size = match operation {
        Operation::Encrypt => behavior.chunk_size,
        Operation::Decrypt => behavior.chunk_size + TAG_SIZE,
    };
    let mut garble_next = behavior.garble_first_request;
    let mut bytes_out = 0usize;

    loop {
        if behavior.complete_after_chunks == Some(report.chunks) {
            debug!(chunks = report.chunks, "declaring early stream completion");
            chan.send(b"STREAM_COMPLETE\r\n")?;
            return Ok(report);
        }

        if garble_next {
            chan.send(b"WAIT_CHUNK:banana\r\n")?;
            garble_next = false;
        } else {
            chan.send(format!("WAIT_CHUNK:{request_size}\r\n").as_bytes())?;
        }

        let header = need(chan.read_exact(4, HOST_TIMEOUT)?, "chunk header")?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len == 0 {
            report.end_marker_seen = true;
            chan.send(b"END_OF_STREAM\r\n")?;
            chan.send(b"STREAM_COMPLETE\r\n")?;
            chan.send(
                format!(
                    "SUMMARY: chunks={} bytes_in={} bytes_out={}\r\n",
                    report.chunks, report.bytes_in, bytes_out
                )
                .as_bytes(),
            )?;
            return Ok(report);
        }

        let payload = need(chan.read_exact(len, HOST_TIMEOUT)?, "chunk payload")?;
        report.bytes_in += len;
        let index = (report.chunks + 1) as u32;

        let reported = if behavior.misreport_received_len {
            len + 1
        } else {
            len
        };
        chan.send(format!("CHUNK_RECEIVED:{reported}\r\n").as_bytes())?;

        let out = match operation {
            Operation::Encrypt => cipher.seal(index, &report.aad, &payload)?,
            Operation::Decrypt => cipher.open(index, &report.aad, &payload)?,
        };
        bytes_out += out.len();
        report.chunks += 1;

        if behavior.omit_output_for != Some(report.chunks) {
            let mut encoded = STANDARD.encode(&out);
            if behavior.dirty_base64 {
                encoded = smudge(&encoded);
            }
            if behavior.split_base64 && encoded.len() > 8 {
                let mid = encoded.len() / 2;
                chan.send(format!("B64:{}\r\n", &encoded[..mid]).as_bytes())?;
                chan.send(format!("B64:{}\r\n", &encoded[mid..]).as_bytes())?;
            } else {
                chan.send(format!("B64:{encoded}\r\n").as_bytes())?;
            }
        }
        chan.send(b"CHUNK_PROCESSED\r\n")?;
    }
}

/// Sprinkle the noise real UART captures show: stray pad characters and
/// whitespace inside the frame. The tolerant decoder must strip both.
fn smudge(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len() + 16);
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % 17 == 0 {
            out.push(' ');
        }
        if i > 0 && i % 41 == 0 {
            out.push('=');
        }
        out.push(c);
    }
    out
}
