//! Stream termination: the zero-length end marker and the best-effort
//! confirmation tail.
//!
//! Everything here is advisory. The payload is already in hand by the
//! time the terminator runs, so a silent or chatty MCU changes only the
//! session's confidence report, never its success.

use std::thread;
use std::time::Instant;

use scl_core::config::SessionConfig;
use scl_core::{SclResult, Step};
use scl_link::LineChannel;
use scl_proto::McuLine;
use tracing::{debug, info, warn};

/// What the MCU said (or failed to say) after the end marker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinishSummary {
    /// END_OF_STREAM acknowledgement seen.
    pub end_acked: bool,
    /// STREAM_COMPLETE seen.
    pub stream_complete: bool,
    /// Trailing SUMMARY: statistics line, verbatim.
    pub summary: Option<String>,
}

pub struct StreamTerminator<'a, C: LineChannel> {
    chan: &'a mut C,
    config: &'a SessionConfig,
}

impl<'a, C: LineChannel> StreamTerminator<'a, C> {
    pub fn new(chan: &'a mut C, config: &'a SessionConfig) -> Self {
        Self { chan, config }
    }

    /// Send the zero-length header and collect whatever confirmations the
    /// firmware offers before the finish deadline.
    pub fn run(&mut self) -> SclResult<FinishSummary> {
        // Let the MCU drain its last result before the marker lands.
        thread::sleep(self.config.settle());

        self.chan.send(&0u32.to_be_bytes())?;
        debug!("end-of-stream marker sent");

        let mut summary = FinishSummary::default();
        let deadline = Instant::now() + self.config.finish_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.chan.read_line(remaining)? {
                None => break,
                Some(line) => match McuLine::parse(&line) {
                    McuLine::EndOfStream => summary.end_acked = true,
                    McuLine::StreamComplete => summary.stream_complete = true,
                    McuLine::Summary(stats) => {
                        info!(%stats, "device transfer summary");
                        summary.summary = Some(stats);
                    }
                    McuLine::Error(message) => {
                        // Post-transfer errors cannot invalidate data we
                        // already hold; note them and keep listening.
                        warn!(step = %Step::AwaitStreamComplete, %message, "device error after end marker");
                    }
                    other => debug!(?other, "ignoring during finalization"),
                },
            }
            if summary.end_acked && summary.stream_complete && summary.summary.is_some() {
                break;
            }
        }

        if !summary.stream_complete {
            warn!("stream completion never confirmed; transfer data retained");
        }
        Ok(summary)
    }
}
