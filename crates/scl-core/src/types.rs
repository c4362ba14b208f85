use serde::{Deserialize, Serialize};

use crate::{KEY_SIZE, NONCE_SIZE, SclError, SclResult};

/// Direction of the cryptographic operation performed by the MCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    /// The single byte sent in answer to WAIT_OPERATION.
    pub fn wire_byte(self) -> u8 {
        match self {
            Operation::Encrypt => b'e',
            Operation::Decrypt => b'd',
        }
    }
}

/// Optional handshake steps the target firmware supports.
///
/// One configuration-driven negotiator covers every firmware variant; the
/// AAD and size exchanges become conditional transitions instead of forked
/// copies of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Firmware prompts WAIT_AAD_LEN (and WAIT_AAD when length > 0).
    pub has_aad: bool,
    /// Legacy firmware prompts WAIT_SIZE and wants the total declared
    /// up front. The canonical streaming path never declares a size and
    /// terminates on the zero-length chunk marker instead.
    pub declares_size: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            has_aad: true,
            declares_size: false,
        }
    }
}

/// Everything a session needs before the handshake starts.
///
/// Key and nonce are fixed-size arrays: violating the 16-byte invariant is
/// a caller-side precondition failure and never reaches the wire.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub operation: Operation,
    pub key: [u8; KEY_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub aad: Vec<u8>,
    pub capabilities: Capabilities,
}

impl SessionParams {
    pub fn new(operation: Operation, key: [u8; KEY_SIZE], nonce: [u8; NONCE_SIZE]) -> Self {
        Self {
            operation,
            key,
            nonce,
            aad: Vec::new(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_aad(mut self, aad: Vec<u8>) -> Self {
        self.aad = aad;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Validate slices of arbitrary length into fixed-size parameters.
    pub fn from_slices(
        operation: Operation,
        key: &[u8],
        nonce: &[u8],
    ) -> SclResult<Self> {
        let key: [u8; KEY_SIZE] = key
            .try_into()
            .map_err(|_| SclError::InvalidParams(format!("key must be {KEY_SIZE} bytes")))?;
        let nonce: [u8; NONCE_SIZE] = nonce
            .try_into()
            .map_err(|_| SclError::InvalidParams(format!("nonce must be {NONCE_SIZE} bytes")))?;
        Ok(Self::new(operation, key, nonce))
    }
}

/// Named protocol steps, used for timeout classification and logging.
///
/// The aggregate state machine is: AwaitReady → ModeSelect →
/// OperationSelect → KeyExchange → NonceExchange → AadLenExchange →
/// AadExchange → SizeExchange (legacy) → AwaitDataReady → chunk loop
/// (AwaitChunkRequest → AwaitChunkAck → AwaitChunkResult) →
/// AwaitEndOfStream → AwaitStreamComplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AwaitReady,
    ModeSelect,
    OperationSelect,
    KeyExchange,
    NonceExchange,
    AadLenExchange,
    AadExchange,
    SizeExchange,
    AwaitDataReady,
    AwaitChunkRequest,
    AwaitChunkAck,
    AwaitChunkResult,
    AwaitEndOfStream,
    AwaitStreamComplete,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::AwaitReady => "await ready",
            Step::ModeSelect => "mode select",
            Step::OperationSelect => "operation select",
            Step::KeyExchange => "key exchange",
            Step::NonceExchange => "nonce exchange",
            Step::AadLenExchange => "AAD length exchange",
            Step::AadExchange => "AAD exchange",
            Step::SizeExchange => "size exchange",
            Step::AwaitDataReady => "await data ready",
            Step::AwaitChunkRequest => "await chunk request",
            Step::AwaitChunkAck => "await chunk ack",
            Step::AwaitChunkResult => "await chunk result",
            Step::AwaitEndOfStream => "await end of stream",
            Step::AwaitStreamComplete => "await stream complete",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_wire_bytes() {
        assert_eq!(Operation::Encrypt.wire_byte(), b'e');
        assert_eq!(Operation::Decrypt.wire_byte(), b'd');
    }

    #[test]
    fn params_reject_short_key() {
        let err = SessionParams::from_slices(Operation::Encrypt, &[0u8; 8], &[0u8; 16]);
        assert!(matches!(err, Err(SclError::InvalidParams(_))));
    }

    #[test]
    fn params_accept_exact_sizes() {
        let p = SessionParams::from_slices(Operation::Decrypt, &[1u8; 16], &[2u8; 16]).unwrap();
        assert_eq!(p.key, [1u8; 16]);
        assert_eq!(p.nonce, [2u8; 16]);
        assert!(p.aad.is_empty());
    }
}
