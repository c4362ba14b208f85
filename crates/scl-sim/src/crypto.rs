//! Per-chunk AES-GCM-SIV, the way the firmware derives it.
//!
//! The 16-byte session nonce is truncated to the cipher's 12 bytes, and
//! the last four of those are XORed with the 1-based chunk index so every
//! chunk seals under a distinct nonce.

use aes_gcm_siv::aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::{Aes128GcmSiv, Nonce};
use scl_core::{SclError, SclResult, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

pub struct ChunkCipher {
    cipher: Aes128GcmSiv,
    base: [u8; NONCE_SIZE],
}

impl ChunkCipher {
    pub fn new(key: &[u8; KEY_SIZE], session_nonce: &[u8; NONCE_SIZE]) -> Self {
        Self {
            cipher: Aes128GcmSiv::new(key.into()),
            base: *session_nonce,
        }
    }

    fn nonce_for(&self, index: u32) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&self.base[..12]);
        for (b, i) in nonce[8..].iter_mut().zip(index.to_be_bytes()) {
            *b ^= i;
        }
        nonce
    }

    /// Encrypt one chunk; the tag rides appended to the ciphertext.
    pub fn seal(&self, index: u32, aad: &[u8], plaintext: &[u8]) -> SclResult<Vec<u8>> {
        let nonce = self.nonce_for(index);
        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| SclError::Decode(format!("chunk {index} seal failed")))
    }

    /// Decrypt and authenticate one tagged chunk.
    pub fn open(&self, index: u32, aad: &[u8], sealed: &[u8]) -> SclResult<Vec<u8>> {
        if sealed.len() < TAG_SIZE {
            return Err(SclError::InvalidParams(format!(
                "chunk {index} shorter than the authentication tag"
            )));
        }
        let nonce = self.nonce_for(index);
        self.cipher
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: sealed, aad })
            .map_err(|_| SclError::Decode(format!("chunk {index} failed authentication")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip_with_aad() {
        let cipher = ChunkCipher::new(&[7u8; 16], &[9u8; 16]);
        let sealed = cipher.seal(1, b"hdr", b"hello accelerator").unwrap();
        assert_eq!(sealed.len(), 17 + TAG_SIZE);
        let opened = cipher.open(1, b"hdr", &sealed).unwrap();
        assert_eq!(opened, b"hello accelerator");
    }

    #[test]
    fn chunk_index_changes_the_nonce() {
        let cipher = ChunkCipher::new(&[7u8; 16], &[9u8; 16]);
        let a = cipher.seal(1, b"", b"same bytes").unwrap();
        let b = cipher.seal(2, b"", b"same bytes").unwrap();
        assert_ne!(a, b);
        // Opening under the wrong index must fail authentication.
        assert!(cipher.open(2, b"", &a).is_err());
    }

    #[test]
    fn aad_is_bound_to_the_tag() {
        let cipher = ChunkCipher::new(&[7u8; 16], &[9u8; 16]);
        let sealed = cipher.seal(1, b"context-a", b"payload").unwrap();
        assert!(cipher.open(1, b"context-b", &sealed).is_err());
    }

    #[test]
    fn truncated_chunk_is_rejected_before_decrypting() {
        let cipher = ChunkCipher::new(&[7u8; 16], &[9u8; 16]);
        assert!(matches!(
            cipher.open(1, b"", &[0u8; 8]),
            Err(SclError::InvalidParams(_))
        ));
    }
}
