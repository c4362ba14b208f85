//! scl-sim: an in-process stand-in for the accelerator firmware.
//!
//! Speaks the device side of the streaming protocol over an in-memory
//! pipe, on its own thread, with real AES-GCM-SIV underneath. Behavior
//! knobs inject the faults the host engine must tolerate: garbled chunk
//! requests, dirty Base64 framing, split frames, missing output, early
//! stream completion, and mid-handshake device errors.
//!
//! The simulator is deliberately strict about what it reads from the
//! host: wrong byte counts or a silent host fail the run, so tests catch
//! host-side framing bugs as device-side errors.

pub mod behavior;
pub mod crypto;
pub mod mcu;

pub use behavior::SimBehavior;
pub use crypto::ChunkCipher;
pub use mcu::{spawn, SimMcu, SimReport};
