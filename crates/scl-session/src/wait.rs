//! Deadline-bounded token waits shared by the session phases.

use std::time::{Duration, Instant};

use scl_core::{SclError, SclResult, Step};
use scl_link::LineChannel;
use scl_proto::McuLine;
use tracing::{debug, warn};

/// Read lines until one matches `want`, the MCU reports an error, or the
/// deadline expires. Non-matching chatter is logged and skipped.
pub fn wait_for<C, F>(
    chan: &mut C,
    step: Step,
    timeout: Duration,
    mut want: F,
) -> SclResult<McuLine>
where
    C: LineChannel,
    F: FnMut(&McuLine) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SclError::Timeout(step));
        }
        match chan.read_line(remaining)? {
            None => return Err(SclError::Timeout(step)),
            Some(line) => {
                let parsed = McuLine::parse(&line);
                if let McuLine::Error(message) = parsed {
                    warn!(%step, %message, "device reported error");
                    return Err(SclError::Device { step, message });
                }
                if want(&parsed) {
                    return Ok(parsed);
                }
                debug!(%step, %line, "skipping unrelated line");
            }
        }
    }
}
