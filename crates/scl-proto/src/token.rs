//! Classification of MCU control lines.
//!
//! Firmware output is matched by substring, not exact equality: real builds
//! interleave debug prefixes and occasionally glue stats onto the same
//! line. Ordering matters: READY_FOR_DATA must be tested before READY,
//! WAIT_AAD_LEN before WAIT_AAD.

/// One parsed control line from the MCU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McuLine {
    /// MCU finished booting.
    Ready,
    /// Streaming protocol mode accepted.
    NewStreamMode,
    /// MCU expects the 1-byte operation select.
    WaitOperation,
    /// Generic step acknowledgement.
    Ack,
    /// MCU expects the 16-byte key.
    WaitKey,
    /// MCU expects the 16-byte nonce.
    WaitNonce,
    /// MCU expects the 4-byte big-endian AAD length.
    WaitAadLen,
    /// MCU expects the AAD payload.
    WaitAad,
    /// Legacy firmware expects the 4-byte big-endian total size.
    WaitSize,
    /// MCU is ready to stream chunks.
    ReadyForData,
    /// Request for the next chunk of at most `n` bytes. `None` when the
    /// size field was malformed; the engine falls back to its default.
    WaitChunk(Option<usize>),
    /// Chunk ingested; `None` when the count field was malformed.
    ChunkReceived(Option<usize>),
    /// Base64-encoded processed output (payload after the `B64:` prefix).
    B64(String),
    /// Chunk result logically complete.
    ChunkProcessed,
    /// End-of-stream marker acknowledged.
    EndOfStream,
    /// MCU ended the stream.
    StreamComplete,
    /// Free-form statistics line.
    Summary(String),
    /// Explicit device error; aborts the session.
    Error(String),
    /// Anything else (firmware debug chatter); ignored by the engine.
    Other(String),
}

impl McuLine {
    /// Parse one stripped line of MCU output.
    pub fn parse(line: &str) -> McuLine {
        if let Some(payload) = line.strip_prefix("B64:") {
            return McuLine::B64(payload.to_string());
        }
        if line.contains("ERROR") {
            return McuLine::Error(line.to_string());
        }
        if line.contains("WAIT_CHUNK") {
            return McuLine::WaitChunk(parse_count(line));
        }
        if line.contains("CHUNK_RECEIVED") {
            return McuLine::ChunkReceived(parse_count(line));
        }
        if line.contains("CHUNK_PROCESSED") {
            return McuLine::ChunkProcessed;
        }
        if line.contains("STREAM_COMPLETE") {
            return McuLine::StreamComplete;
        }
        if line.contains("END_OF_STREAM") {
            return McuLine::EndOfStream;
        }
        if line.contains("SUMMARY") {
            return McuLine::Summary(line.to_string());
        }
        if line.contains("READY_FOR_DATA") {
            return McuLine::ReadyForData;
        }
        if line.contains("NEW_STREAM_MODE") {
            return McuLine::NewStreamMode;
        }
        if line.contains("WAIT_OPERATION") {
            return McuLine::WaitOperation;
        }
        if line.contains("WAIT_KEY") {
            return McuLine::WaitKey;
        }
        if line.contains("WAIT_NONCE") {
            return McuLine::WaitNonce;
        }
        if line.contains("WAIT_AAD_LEN") {
            return McuLine::WaitAadLen;
        }
        if line.contains("WAIT_AAD") {
            return McuLine::WaitAad;
        }
        if line.contains("WAIT_SIZE") {
            return McuLine::WaitSize;
        }
        if line.contains("READY") {
            return McuLine::Ready;
        }
        if line.contains("ACK") {
            return McuLine::Ack;
        }
        McuLine::Other(line.to_string())
    }
}

/// Extract the `<n>` from `TOKEN:<n>` lines. Malformed counts are `None`
/// rather than an error; every caller has a documented fallback.
fn parse_count(line: &str) -> Option<usize> {
    line.split(':').nth(1)?.trim().parse().ok()
}
