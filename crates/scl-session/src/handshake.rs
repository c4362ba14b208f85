//! Handshake negotiation: bring the MCU from power-up into "ready for
//! chunked data" for the chosen operation.
//!
//! The sequence is strictly sequential, each step blocking on its
//! expected token under its own deadline. The AAD and legacy size steps
//! are conditional transitions driven by the firmware capability set, so
//! one negotiator covers every protocol variant. Any ERROR line or step
//! timeout aborts: no partial crypto context is worth keeping.

use scl_core::config::SessionConfig;
use scl_core::{SclResult, SessionParams, Step};
use scl_link::LineChannel;
use scl_proto::McuLine;
use tracing::{debug, info};

use crate::wait::wait_for;

/// Byte that selects the streaming protocol mode after READY.
const MODE_SELECT: u8 = b'n';

pub struct HandshakeNegotiator<'a, C: LineChannel> {
    chan: &'a mut C,
    config: &'a SessionConfig,
}

impl<'a, C: LineChannel> HandshakeNegotiator<'a, C> {
    pub fn new(chan: &'a mut C, config: &'a SessionConfig) -> Self {
        Self { chan, config }
    }

    /// Run the full opening sequence. `declared_size` is only consulted
    /// when the firmware capability set includes the legacy size step.
    pub fn run(&mut self, params: &SessionParams, declared_size: u32) -> SclResult<()> {
        let t = self.config.handshake_timeout();

        // 1. MCU boot banner
        wait_for(self.chan, Step::AwaitReady, self.config.ready_timeout(), |l| {
            matches!(l, McuLine::Ready)
        })?;
        debug!("MCU ready");

        // 2. Mode select
        self.chan.send(&[MODE_SELECT])?;
        wait_for(self.chan, Step::ModeSelect, t, |l| {
            matches!(l, McuLine::NewStreamMode)
        })?;

        // 3. Operation select
        wait_for(self.chan, Step::OperationSelect, t, |l| {
            matches!(l, McuLine::WaitOperation)
        })?;
        self.chan.send(&[params.operation.wire_byte()])?;
        wait_for(self.chan, Step::OperationSelect, t, |l| matches!(l, McuLine::Ack))?;
        debug!(operation = ?params.operation, "operation accepted");

        // 4. Key exchange
        wait_for(self.chan, Step::KeyExchange, t, |l| matches!(l, McuLine::WaitKey))?;
        self.chan.send(&params.key)?;
        wait_for(self.chan, Step::KeyExchange, t, |l| matches!(l, McuLine::Ack))?;

        // 5. Nonce exchange
        wait_for(self.chan, Step::NonceExchange, t, |l| {
            matches!(l, McuLine::WaitNonce)
        })?;
        self.chan.send(&params.nonce)?;
        wait_for(self.chan, Step::NonceExchange, t, |l| matches!(l, McuLine::Ack))?;

        // 6. AAD exchange (capability-gated)
        if params.capabilities.has_aad {
            wait_for(self.chan, Step::AadLenExchange, t, |l| {
                matches!(l, McuLine::WaitAadLen)
            })?;
            self.chan.send(&(params.aad.len() as u32).to_be_bytes())?;
            wait_for(self.chan, Step::AadLenExchange, t, |l| matches!(l, McuLine::Ack))?;

            if !params.aad.is_empty() {
                wait_for(self.chan, Step::AadExchange, t, |l| {
                    matches!(l, McuLine::WaitAad)
                })?;
                self.chan.send(&params.aad)?;
                wait_for(self.chan, Step::AadExchange, t, |l| matches!(l, McuLine::Ack))?;
                debug!(aad_len = params.aad.len(), "AAD accepted");
            }
        }

        // 7. Legacy fixed-size declaration (capability-gated); the
        // canonical path relies solely on the zero-length end marker.
        if params.capabilities.declares_size {
            wait_for(self.chan, Step::SizeExchange, t, |l| {
                matches!(l, McuLine::WaitSize)
            })?;
            self.chan.send(&declared_size.to_be_bytes())?;
            wait_for(self.chan, Step::SizeExchange, t, |l| matches!(l, McuLine::Ack))?;
            debug!(declared_size, "total size declared");
        }

        // 8. Ready to stream
        wait_for(self.chan, Step::AwaitDataReady, t, |l| {
            matches!(l, McuLine::ReadyForData)
        })?;
        info!(operation = ?params.operation, "handshake complete, MCU ready for data");
        Ok(())
    }
}
