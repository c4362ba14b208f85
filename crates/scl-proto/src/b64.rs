//! Tolerant decoder for the firmware's `B64:` result frames.
//!
//! The MCU emits Base64 through the same UART as its debug output, so a
//! frame can arrive with interleaved garbage bytes and missing padding.
//! Cleaning is: keep only alphabet characters, re-pad to a multiple of 4,
//! then decode strictly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Decode a possibly-dirty Base64 payload. Returns `None` when nothing
/// decodable remains; callers retry on subsequent lines until the chunk
/// deadline expires.
pub fn decode_frame(raw: &str) -> Option<Vec<u8>> {
    let cleaned = clean(raw);
    if cleaned.len() < 4 {
        return None;
    }
    STANDARD.decode(cleaned.as_bytes()).ok()
}

/// Strip everything outside the Base64 alphabet and restore padding.
/// Existing '=' are dropped first so that interior padding from glued
/// frames cannot poison the strict decode.
fn clean(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/'))
        .collect();

    let missing = (4 - cleaned.len() % 4) % 4;
    for _ in 0..missing {
        cleaned.push('=');
    }
    cleaned
}
