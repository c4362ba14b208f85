//! scl-proto: the MCU line protocol as data
//!
//! - `token`: classify newline-terminated control lines into a typed enum
//! - `b64`: tolerant decoder for `B64:<data>` result frames
//! - `layout`: ciphertext container format and chunk-boundary arithmetic
//!
//! The protocol mixes ASCII control lines with raw binary payloads; only
//! the line side lives here. Binary exchange is driven by the session
//! crate, which knows the byte counts each prompt implies.

pub mod b64;
pub mod layout;
pub mod token;

pub use b64::decode_frame;
pub use layout::{assemble_container, encrypted_chunk_sizes, split_container, verify_container};
pub use token::McuLine;
