use scl_core::{Capabilities, CHUNK_SIZE};

/// Fault-injection and protocol-shape knobs for one simulated session.
#[derive(Debug, Clone)]
pub struct SimBehavior {
    /// Plaintext bytes requested per WAIT_CHUNK. For decryption the
    /// simulator requests this plus the tag size, like the firmware does.
    pub chunk_size: usize,
    /// Handshake steps the simulated firmware performs.
    pub capabilities: Capabilities,
    /// Emit `ERROR: <msg>` right after the key ack and stop.
    pub error_after_key: Option<String>,
    /// Declare STREAM_COMPLETE instead of requesting chunk N+1.
    pub complete_after_chunks: Option<usize>,
    /// First chunk request carries an unparseable size.
    pub garble_first_request: bool,
    /// Pepper result frames with whitespace and stray pad characters.
    pub dirty_base64: bool,
    /// Emit each result frame as two B64: lines.
    pub split_base64: bool,
    /// Send CHUNK_PROCESSED without any B64 output for this chunk (1-based).
    pub omit_output_for: Option<usize>,
    /// CHUNK_RECEIVED reports one byte more than was actually read.
    pub misreport_received_len: bool,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            capabilities: Capabilities::default(),
            error_after_key: None,
            complete_after_chunks: None,
            garble_first_request: false,
            dirty_base64: false,
            split_base64: false,
            omit_output_for: None,
            misreport_received_len: false,
        }
    }
}
