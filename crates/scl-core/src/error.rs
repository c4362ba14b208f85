use thiserror::Error;

use crate::types::Step;

pub type SclResult<T> = Result<T, SclError>;

/// Protocol error taxonomy.
///
/// Handshake-phase errors are always fatal. Inside the chunk loop a timeout
/// is tolerated once per chunk when partial output was already decoded;
/// end-of-stream confirmation failures are downgraded to warnings by the
/// terminator and never constructed as errors at all.
#[derive(Debug, Error)]
pub enum SclError {
    /// A deadline expired while awaiting an expected token.
    #[error("timeout during {0}")]
    Timeout(Step),

    /// The MCU emitted an explicit ERROR line.
    #[error("device error during {step}: {message}")]
    Device { step: Step, message: String },

    /// A length/size token could not be parsed and no safe fallback applied.
    #[error("framing error: {0}")]
    Framing(String),

    /// Base64 payload could not be decoded before the chunk deadline.
    #[error("base64 decode failed: {0}")]
    Decode(String),

    /// Reported chunk-received size disagrees with the sent size.
    ///
    /// Logged and tolerated inside the chunk loop; only surfaced as an
    /// error by callers that demand strict accounting.
    #[error("size mismatch: sent {sent} bytes, device reported {reported}")]
    SizeMismatch { sent: usize, reported: usize },

    /// Underlying channel failure. Fatal, aborts the session immediately.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller-side precondition failure (bad key/nonce length, empty input).
    #[error("invalid session parameters: {0}")]
    InvalidParams(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_names_the_step() {
        let e = SclError::Timeout(Step::KeyExchange);
        assert_eq!(e.to_string(), "timeout during key exchange");
    }

    #[test]
    fn device_error_carries_mcu_message() {
        let e = SclError::Device {
            step: Step::AwaitChunkAck,
            message: "ERROR: bad key".into(),
        };
        assert!(e.to_string().contains("ERROR: bad key"));
    }
}
