use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::Capabilities;

/// Top-level host configuration (loaded from sercrypt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SclConfig {
    pub serial: SerialConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path (e.g. /dev/ttyUSB0 or COM3)
    pub port: String,
    /// Baud rate (default: 115200, matching the firmware UART)
    pub baud: u32,
    /// Poll granularity for deadline-bounded reads, in milliseconds
    pub poll_interval_ms: u64,
    /// Log level (default: info)
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default plaintext chunk size when the MCU's request is malformed
    pub chunk_size: usize,
    /// Handshake steps: deadline per expected token, in seconds
    pub handshake_timeout_secs: u64,
    /// Initial READY wait (the MCU may still be booting), in seconds
    pub ready_timeout_secs: u64,
    /// Chunk request / chunk ack deadline, in seconds
    pub chunk_timeout_secs: u64,
    /// Per-chunk processing result deadline, in seconds
    pub result_timeout_secs: u64,
    /// Stream finalization deadline (best-effort waits), in seconds
    pub finish_timeout_secs: u64,
    /// Hardware warmup delay before the first chunk, in milliseconds
    pub warmup_ms: u64,
    /// Settle delay before the end-of-stream marker, in milliseconds
    pub settle_ms: u64,
    /// Optional handshake steps supported by the target firmware
    pub capabilities: Capabilities,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud: 115_200,
            poll_interval_ms: 10,
            log_level: "info".into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::CHUNK_SIZE,
            handshake_timeout_secs: 10,
            ready_timeout_secs: 15,
            chunk_timeout_secs: 30,
            result_timeout_secs: 60,
            finish_timeout_secs: 30,
            warmup_ms: 300,
            settle_ms: 100,
            capabilities: Capabilities::default(),
        }
    }
}

impl SclConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &std::path::Path) -> crate::SclResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| crate::SclError::InvalidParams(format!("config parse error: {e}")))
    }
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SessionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_secs(self.finish_timeout_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
