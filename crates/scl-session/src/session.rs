//! One full device session: handshake, chunk loop, termination, artifact
//! assembly.
//!
//! The session works on the device-facing byte stream. For encryption
//! that is the plaintext, and the returned artifact is the full container
//! (nonce prefix plus the tagged ciphertext stream). For decryption the
//! caller splits the container first and hands over the body; the
//! artifact is the recovered plaintext.

use std::thread;
use std::time::{Duration, Instant};

use scl_core::config::SessionConfig;
use scl_core::{Operation, SclError, SclResult, SessionParams, TAG_SIZE};
use scl_link::LineChannel;
use scl_proto::assemble_container;
use tracing::{info, warn};

use crate::finish::{FinishSummary, StreamTerminator};
use crate::handshake::HandshakeNegotiator;
use crate::transfer::{ChunkTransferEngine, TransferReport};

/// Everything a completed session yields.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Container bytes (encrypt) or recovered plaintext (decrypt).
    pub artifact: Vec<u8>,
    pub report: TransferReport,
    pub finish: FinishSummary,
    /// Wall-clock time from handshake start to artifact assembly.
    pub elapsed: Duration,
}

pub struct ChunkTransferSession<'a, C: LineChannel> {
    chan: &'a mut C,
    config: &'a SessionConfig,
}

impl<'a, C: LineChannel> ChunkTransferSession<'a, C> {
    pub fn new(chan: &'a mut C, config: &'a SessionConfig) -> Self {
        Self { chan, config }
    }

    /// Drive `input` through the MCU under `params`.
    pub fn run(
        &mut self,
        params: &SessionParams,
        input: &[u8],
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> SclResult<SessionOutcome> {
        if input.is_empty() {
            return Err(SclError::InvalidParams(
                "refusing to stream an empty input".into(),
            ));
        }
        let started = Instant::now();
        info!(
            operation = ?params.operation,
            bytes = input.len(),
            aad_len = params.aad.len(),
            "session starting"
        );

        HandshakeNegotiator::new(self.chan, self.config).run(params, input.len() as u32)?;

        // The firmware needs a beat between READY_FOR_DATA and the first
        // header landing on the wire.
        thread::sleep(self.config.warmup());

        let default_chunk = match params.operation {
            Operation::Encrypt => self.config.chunk_size,
            Operation::Decrypt => self.config.chunk_size + TAG_SIZE,
        };
        let (output, report) =
            ChunkTransferEngine::new(self.chan, self.config, default_chunk).run(input, progress)?;

        // A short stream skips the terminator: the MCU already declared
        // the stream closed and will not read another header.
        let finish = if report.short_stream {
            FinishSummary {
                stream_complete: true,
                ..FinishSummary::default()
            }
        } else {
            StreamTerminator::new(self.chan, self.config).run()?
        };

        if output.is_empty() {
            return Err(SclError::Decode(
                "no processed data received from device".into(),
            ));
        }
        if !report.degraded.is_empty() {
            warn!(
                degraded = report.degraded.len(),
                "session succeeded with degraded chunks"
            );
        }

        let artifact = match params.operation {
            Operation::Encrypt => assemble_container(&params.nonce, &output),
            Operation::Decrypt => output,
        };
        let elapsed = started.elapsed();
        info!(
            operation = ?params.operation,
            artifact_bytes = artifact.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "session complete"
        );
        Ok(SessionOutcome {
            artifact,
            report,
            finish,
            elapsed,
        })
    }
}
