//! Ciphertext container layout and chunk-boundary arithmetic.
//!
//! On-disk format: `nonce(16) || chunk_1(ct+tag) || chunk_2(ct+tag) || …`
//! with no length table. Boundaries are reconstructed deterministically:
//! every encrypted chunk is `CHUNK_SIZE + TAG_SIZE` bytes except the last.
//! The decrypt path must produce the same split the encrypt path did or
//! authentication fails on the device.

use scl_core::{SclError, SclResult, CHUNK_SIZE, NONCE_SIZE, TAG_SIZE};

/// Deterministic encrypted-chunk sizes for a container body of
/// `total_encrypted` bytes (nonce excluded).
pub fn encrypted_chunk_sizes(total_encrypted: usize) -> Vec<usize> {
    let full = CHUNK_SIZE + TAG_SIZE;
    let mut sizes = Vec::with_capacity(total_encrypted / full + 1);
    let mut remaining = total_encrypted;
    while remaining > 0 {
        let size = remaining.min(full);
        sizes.push(size);
        remaining -= size;
    }
    sizes
}

/// Split a ciphertext container into its nonce prefix and encrypted body.
pub fn split_container(container: &[u8]) -> SclResult<([u8; NONCE_SIZE], &[u8])> {
    if container.len() < NONCE_SIZE {
        return Err(SclError::Framing(format!(
            "ciphertext container too short: {} bytes (nonce alone is {NONCE_SIZE})",
            container.len()
        )));
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&container[..NONCE_SIZE]);
    Ok((nonce, &container[NONCE_SIZE..]))
}

/// Assemble the final encrypt artifact: `nonce || encrypted body`.
pub fn assemble_container(nonce: &[u8; NONCE_SIZE], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NONCE_SIZE + body.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(body);
    out
}

/// Structural check of an encrypted file: nonce present, body non-empty,
/// and the deterministic chunk arithmetic covers it exactly.
pub fn verify_container(container: &[u8]) -> SclResult<()> {
    let (_, body) = split_container(container)?;
    if body.is_empty() {
        return Err(SclError::Framing("container has no encrypted data".into()));
    }
    let sizes = encrypted_chunk_sizes(body.len());
    let covered: usize = sizes.iter().sum();
    if covered != body.len() {
        return Err(SclError::Framing(format!(
            "chunk arithmetic covers {covered} of {} body bytes",
            body.len()
        )));
    }
    Ok(())
}
