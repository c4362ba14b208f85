//! The chunked send/receive loop.
//!
//! The MCU dictates chunk sizes (its RAM, its rules) and the host obeys:
//! wait for WAIT_CHUNK:<n>, clamp to the bytes remaining, write a 4-byte
//! big-endian length header then the payload, wait for the ingest ack,
//! then reassemble the Base64-framed result. One chunk in flight, always;
//! the firmware cannot buffer more.
//!
//! Completion per chunk is tri-state: `Complete`, degraded-but-usable, or
//! a hard failure that aborts the session. Degraded paths exist because
//! real firmware sometimes emits the result slightly out of order
//! relative to CHUNK_PROCESSED, or drops the completion marker while the
//! data itself arrived fine.

use std::time::Instant;

use scl_core::config::SessionConfig;
use scl_core::{SclError, SclResult, Step};
use scl_link::LineChannel;
use scl_proto::{decode_frame, McuLine};
use tracing::{debug, info, warn};

use crate::wait::wait_for;

/// Why a chunk completed without the full confirmation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    /// CHUNK_PROCESSED arrived but no decodable B64 output was seen.
    /// Whether firmware legitimately omits unchanged output or this masks
    /// a bug is unresolved; it is surfaced here instead of assumed away.
    ProcessedWithoutOutput,
    /// The result deadline lapsed after partial output had been decoded.
    TimeoutWithPartialData,
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradedReason::ProcessedWithoutOutput => f.write_str("processed without output"),
            DegradedReason::TimeoutWithPartialData => f.write_str("timeout with partial data"),
        }
    }
}

/// Per-chunk completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Complete,
    Degraded(DegradedReason),
}

/// Transfer-state accounting for one session.
#[derive(Debug, Default)]
pub struct TransferReport {
    /// Input bytes delivered to the MCU.
    pub bytes_sent: usize,
    /// Decoded output bytes received back.
    pub bytes_received: usize,
    /// Chunks completed (including degraded ones).
    pub chunks: usize,
    /// Degraded completions, by chunk index.
    pub degraded: Vec<(usize, DegradedReason)>,
    /// CHUNK_RECEIVED count disagreements (logged, non-fatal).
    pub size_mismatches: usize,
    /// The MCU ended the stream before all input was sent.
    pub short_stream: bool,
}

/// Outcome of one ack+result wait.
enum ChunkResult {
    Done { data: Vec<u8>, status: ChunkStatus },
    ShortStream { data: Vec<u8> },
}

pub struct ChunkTransferEngine<'a, C: LineChannel> {
    chan: &'a mut C,
    config: &'a SessionConfig,
    /// Fallback when WAIT_CHUNK carries a malformed size; differs between
    /// encrypt (plaintext chunk) and decrypt (ciphertext chunk + tag).
    default_chunk_size: usize,
}

impl<'a, C: LineChannel> ChunkTransferEngine<'a, C> {
    pub fn new(chan: &'a mut C, config: &'a SessionConfig, default_chunk_size: usize) -> Self {
        Self {
            chan,
            config,
            default_chunk_size,
        }
    }

    /// Stream `input` through the MCU. Returns the reassembled output and
    /// the transfer report. `progress` observes (bytes_sent, total).
    pub fn run(
        &mut self,
        input: &[u8],
        mut progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> SclResult<(Vec<u8>, TransferReport)> {
        let mut output = Vec::new();
        let mut report = TransferReport::default();
        let total = input.len();

        while report.bytes_sent < total {
            let remaining = total - report.bytes_sent;
            let index = report.chunks + 1;

            // 1. Chunk request, or MCU-initiated end of stream.
            let requested = match wait_for(
                self.chan,
                Step::AwaitChunkRequest,
                self.config.chunk_timeout(),
                |l| matches!(l, McuLine::WaitChunk(_) | McuLine::StreamComplete),
            )? {
                McuLine::StreamComplete => {
                    info!(
                        sent = report.bytes_sent,
                        total, "MCU ended stream early; accepting short stream"
                    );
                    report.short_stream = true;
                    break;
                }
                McuLine::WaitChunk(Some(n)) if n > 0 => n,
                McuLine::WaitChunk(_) => {
                    warn!(
                        fallback = self.default_chunk_size,
                        "malformed chunk request; using default size"
                    );
                    self.default_chunk_size
                }
                _ => unreachable!("wait_for only returns matching lines"),
            };

            // 2. Clamp to the bytes we still have.
            let size = requested.min(remaining);
            let chunk = &input[report.bytes_sent..report.bytes_sent + size];
            debug!(index, requested, size, "sending chunk");

            // 3. Length header, then payload, as two flushed writes.
            self.chan.send(&(size as u32).to_be_bytes())?;
            self.chan.send(chunk)?;
            report.bytes_sent += size;

            // 4–6. Ack, result, decode.
            match self.receive_chunk_result(index, size, &mut report)? {
                ChunkResult::Done { data, status } => {
                    report.bytes_received += data.len();
                    output.extend_from_slice(&data);
                    if let ChunkStatus::Degraded(reason) = status {
                        warn!(index, %reason, "chunk completed degraded");
                        report.degraded.push((index, reason));
                    }
                    report.chunks += 1;
                }
                ChunkResult::ShortStream { data } => {
                    report.bytes_received += data.len();
                    output.extend_from_slice(&data);
                    report.chunks += 1;
                    report.short_stream = true;
                    info!(sent = report.bytes_sent, total, "stream completed mid-chunk");
                    break;
                }
            }

            if let Some(cb) = progress.as_deref_mut() {
                cb(report.bytes_sent as u64, total as u64);
            }
        }

        info!(
            chunks = report.chunks,
            bytes_sent = report.bytes_sent,
            bytes_received = report.bytes_received,
            degraded = report.degraded.len(),
            short_stream = report.short_stream,
            "chunk loop finished"
        );
        Ok((output, report))
    }

    /// Wait for CHUNK_RECEIVED, then reassemble the chunk's output until
    /// CHUNK_PROCESSED (or a tolerated degradation).
    fn receive_chunk_result(
        &mut self,
        index: usize,
        sent_len: usize,
        report: &mut TransferReport,
    ) -> SclResult<ChunkResult> {
        // B64 text accumulates as it arrives and is decoded once the chunk
        // reaches a terminal state; frames split across lines reassemble
        // correctly that way, where eager per-line decoding would not.
        let mut pending_b64 = String::new();
        let mut processed = false;

        // Phase A: ingest ack. Results occasionally overtake the ack, so
        // B64/CHUNK_PROCESSED seen here are captured, not discarded.
        let ack_deadline = Instant::now() + self.config.chunk_timeout();
        let mut acked = false;
        while !acked {
            let remaining = ack_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if pending_b64.is_empty() && !processed {
                    return Err(SclError::Timeout(Step::AwaitChunkAck));
                }
                warn!(index, "chunk ack never arrived; output already flowing");
                break;
            }
            match self.chan.read_line(remaining)? {
                None => continue,
                Some(line) => match McuLine::parse(&line) {
                    McuLine::ChunkReceived(reported) => {
                        if let Some(reported) = reported {
                            if reported != sent_len {
                                let e = SclError::SizeMismatch {
                                    sent: sent_len,
                                    reported,
                                };
                                warn!(index, %e, "device accounting disagrees; continuing");
                                report.size_mismatches += 1;
                            }
                        }
                        acked = true;
                    }
                    McuLine::B64(payload) => pending_b64.push_str(&payload),
                    McuLine::ChunkProcessed => processed = true,
                    McuLine::StreamComplete => {
                        return Ok(ChunkResult::ShortStream {
                            data: Self::decode_pending(index, &pending_b64),
                        })
                    }
                    McuLine::Error(message) => {
                        return Err(SclError::Device {
                            step: Step::AwaitChunkAck,
                            message,
                        })
                    }
                    other => debug!(index, ?other, "ignoring while awaiting ack"),
                },
            }
        }

        // Phase B: the processed result.
        let result_deadline = Instant::now() + self.config.result_timeout();
        loop {
            if processed {
                let data = Self::decode_pending(index, &pending_b64);
                let status = if data.is_empty() {
                    ChunkStatus::Degraded(DegradedReason::ProcessedWithoutOutput)
                } else {
                    ChunkStatus::Complete
                };
                return Ok(ChunkResult::Done { data, status });
            }
            let remaining = result_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // Tolerated once per chunk when output already arrived.
                let data = Self::decode_pending(index, &pending_b64);
                if data.is_empty() {
                    return Err(SclError::Timeout(Step::AwaitChunkResult));
                }
                return Ok(ChunkResult::Done {
                    data,
                    status: ChunkStatus::Degraded(DegradedReason::TimeoutWithPartialData),
                });
            }
            match self.chan.read_line(remaining)? {
                None => continue,
                Some(line) => match McuLine::parse(&line) {
                    McuLine::B64(payload) => pending_b64.push_str(&payload),
                    McuLine::ChunkProcessed => processed = true,
                    McuLine::StreamComplete => {
                        return Ok(ChunkResult::ShortStream {
                            data: Self::decode_pending(index, &pending_b64),
                        })
                    }
                    McuLine::Error(message) => {
                        return Err(SclError::Device {
                            step: Step::AwaitChunkResult,
                            message,
                        })
                    }
                    McuLine::Summary(s) => debug!(index, summary = %s, "mid-chunk stats"),
                    other => debug!(index, ?other, "ignoring while awaiting result"),
                },
            }
        }
    }

    /// Decode the chunk's accumulated B64 text. An undecodable remainder
    /// yields no data; the caller's terminal-state logic decides whether
    /// that degrades or fails the chunk.
    fn decode_pending(index: usize, pending: &str) -> Vec<u8> {
        if pending.is_empty() {
            return Vec::new();
        }
        match decode_frame(pending) {
            Some(decoded) => {
                debug!(index, bytes = decoded.len(), "decoded result frame");
                decoded
            }
            None => {
                warn!(index, held = pending.len(), "result frame did not decode");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::ScriptedLink;

    fn config(chunk_secs: u64, result_secs: u64) -> SessionConfig {
        SessionConfig {
            chunk_timeout_secs: chunk_secs,
            result_timeout_secs: result_secs,
            ..SessionConfig::default()
        }
    }

    // "AAAAAAAAAAA=" is eight zero bytes; "AAAAAA==" is four.

    #[test]
    fn single_chunk_completes_cleanly() {
        let mut link = ScriptedLink::new(&[
            "WAIT_CHUNK:8",
            "CHUNK_RECEIVED:8",
            "B64:AAAAAAAAAAA=",
            "CHUNK_PROCESSED",
        ]);
        let cfg = config(2, 2);
        let (out, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();

        assert_eq!(out, vec![0u8; 8]);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.bytes_sent, 8);
        assert_eq!(report.bytes_received, 8);
        assert!(report.degraded.is_empty());
        // Header then payload, as two writes.
        assert_eq!(link.sent[0], vec![0, 0, 0, 8]);
        assert_eq!(link.sent[1], vec![0u8; 8]);
    }

    #[test]
    fn request_is_clamped_to_remaining_input() {
        let mut link = ScriptedLink::new(&[
            "WAIT_CHUNK:1024",
            "CHUNK_RECEIVED:8",
            "B64:AAAAAAAAAAA=",
            "CHUNK_PROCESSED",
        ]);
        let cfg = config(2, 2);
        let (_, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();
        assert_eq!(report.bytes_sent, 8);
        assert_eq!(link.sent[0], vec![0, 0, 0, 8]);
    }

    #[test]
    fn garbled_request_falls_back_to_default_size() {
        let mut link = ScriptedLink::new(&[
            "WAIT_CHUNK:banana",
            "CHUNK_RECEIVED:4",
            "B64:AAAAAA==",
            "CHUNK_PROCESSED",
            "WAIT_CHUNK:4",
            "CHUNK_RECEIVED:4",
            "B64:AAAAAA==",
            "CHUNK_PROCESSED",
        ]);
        let cfg = config(2, 2);
        let (out, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();

        assert_eq!(out.len(), 8);
        assert_eq!(report.chunks, 2);
        assert_eq!(link.sent[0], vec![0, 0, 0, 4]);
    }

    #[test]
    fn size_mismatch_is_counted_not_fatal() {
        let mut link = ScriptedLink::new(&[
            "WAIT_CHUNK:8",
            "CHUNK_RECEIVED:9",
            "B64:AAAAAAAAAAA=",
            "CHUNK_PROCESSED",
        ]);
        let cfg = config(2, 2);
        let (out, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(report.size_mismatches, 1);
    }

    #[test]
    fn split_frames_reassemble_before_decoding() {
        let mut link = ScriptedLink::new(&[
            "WAIT_CHUNK:8",
            "CHUNK_RECEIVED:8",
            "B64:AAAAAA",
            "B64:AAAAA=",
            "CHUNK_PROCESSED",
        ]);
        let cfg = config(2, 2);
        let (out, _) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();
        assert_eq!(out, vec![0u8; 8]);
    }

    #[test]
    fn processed_without_output_degrades() {
        let mut link =
            ScriptedLink::new(&["WAIT_CHUNK:8", "CHUNK_RECEIVED:8", "CHUNK_PROCESSED"]);
        let cfg = config(2, 2);
        let (out, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(
            report.degraded,
            vec![(1, DegradedReason::ProcessedWithoutOutput)]
        );
    }

    #[test]
    fn result_timeout_with_partial_data_degrades() {
        // Output overtakes the ack; CHUNK_PROCESSED never arrives.
        let mut link =
            ScriptedLink::new(&["WAIT_CHUNK:8", "B64:AAAAAAAAAAA=", "CHUNK_RECEIVED:8"]);
        let cfg = config(2, 0);
        let (out, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();
        assert_eq!(out, vec![0u8; 8]);
        assert_eq!(
            report.degraded,
            vec![(1, DegradedReason::TimeoutWithPartialData)]
        );
    }

    #[test]
    fn silent_device_after_send_is_fatal() {
        let mut link = ScriptedLink::new(&["WAIT_CHUNK:8"]);
        let cfg = config(1, 1);
        let err = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap_err();
        assert!(matches!(err, SclError::Timeout(Step::AwaitChunkAck)));
    }

    #[test]
    fn device_error_mid_stream_is_fatal() {
        let mut link = ScriptedLink::new(&["WAIT_CHUNK:8", "ERROR: aead failure"]);
        let cfg = config(2, 2);
        let err = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap_err();
        assert!(matches!(err, SclError::Device { .. }));
    }

    #[test]
    fn early_stream_complete_ends_the_loop() {
        let mut link = ScriptedLink::new(&["STREAM_COMPLETE"]);
        let cfg = config(2, 2);
        let (out, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], None)
            .unwrap();
        assert!(out.is_empty());
        assert!(report.short_stream);
        assert_eq!(report.chunks, 0);
        // No header was ever written.
        assert!(link.sent.is_empty());
    }

    #[test]
    fn stream_complete_during_result_keeps_partial_output() {
        let mut link = ScriptedLink::new(&[
            "WAIT_CHUNK:8",
            "CHUNK_RECEIVED:8",
            "B64:AAAAAAAAAAA=",
            "STREAM_COMPLETE",
        ]);
        let cfg = config(2, 2);
        let (out, report) = ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 16], None)
            .unwrap();
        assert_eq!(out, vec![0u8; 8]);
        assert!(report.short_stream);
        assert_eq!(report.chunks, 1);
    }

    #[test]
    fn progress_reports_cumulative_bytes() {
        let mut link = ScriptedLink::new(&[
            "WAIT_CHUNK:8",
            "CHUNK_RECEIVED:8",
            "B64:AAAAAAAAAAA=",
            "CHUNK_PROCESSED",
        ]);
        let cfg = config(2, 2);
        let mut seen = Vec::new();
        let mut cb = |sent: u64, total: u64| seen.push((sent, total));
        ChunkTransferEngine::new(&mut link, &cfg, 4)
            .run(&[0u8; 8], Some(&mut cb))
            .unwrap();
        assert_eq!(seen, vec![(8, 8)]);
    }
}
