pub mod config;
pub mod error;
pub mod types;

pub use error::{SclError, SclResult};
pub use types::{Capabilities, Operation, SessionParams, Step};

/// Plaintext chunk size the MCU firmware is built around (bytes)
pub const CHUNK_SIZE: usize = 1024;

/// Authentication tag appended to every encrypted chunk (bytes)
pub const TAG_SIZE: usize = 16;

/// Session key size (bytes); the accelerator only accepts AES-128 keys
pub const KEY_SIZE: usize = 16;

/// Session nonce size (bytes)
pub const NONCE_SIZE: usize = 16;
