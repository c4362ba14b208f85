//! scl-session: the host-side streaming transfer engine
//!
//! One session drives one file through the MCU accelerator:
//!
//! ```text
//! ChunkTransferSession
//!   ├── HandshakeNegotiator   mode → operation → key → nonce → [AAD] → [size]
//!   ├── ChunkTransferEngine   WAIT_CHUNK → header+payload → ack → B64 result
//!   └── StreamTerminator      zero-length marker → best-effort confirmations
//! ```
//!
//! The engine is single-threaded and strictly sequential: one chunk in
//! flight, every wait bounded by its own deadline. The MCU is
//! authoritative over chunk sizing and stream lifetime; the host is
//! authoritative over nothing but its own input buffer.

pub mod finish;
pub mod handshake;
pub mod session;
pub mod transfer;
mod wait;

#[cfg(test)]
pub(crate) mod testutil;

pub use finish::{FinishSummary, StreamTerminator};
pub use handshake::HandshakeNegotiator;
pub use session::{ChunkTransferSession, SessionOutcome};
pub use transfer::{ChunkStatus, ChunkTransferEngine, DegradedReason, TransferReport};
