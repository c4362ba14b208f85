//! In-memory duplex byte pipe.
//!
//! Two connected endpoints, each a full `LineChannel`: what one end
//! sends, the other reads. The simulator owns one end on its own thread
//! and the engine under test owns the other, so sessions exercise the
//! exact same polled-read machinery they use against real hardware.

use std::io::{self, Read, Write};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use crate::channel::PolledChannel;

/// Bound on in-flight writes per direction. The protocol is strictly
/// half-duplex request/response, so this never fills in practice.
const PIPE_DEPTH: usize = 64;

/// One endpoint of the duplex pipe.
pub type PipeChannel = PolledChannel<PipeEnd>;

/// Create a connected pair of in-memory channels.
pub fn pipe(poll_interval: Duration) -> (PipeChannel, PipeChannel) {
    let (a_tx, b_rx) = sync_channel::<Vec<u8>>(PIPE_DEPTH);
    let (b_tx, a_rx) = sync_channel::<Vec<u8>>(PIPE_DEPTH);

    let a = PipeEnd {
        tx: a_tx,
        rx: a_rx,
        carry: Vec::new(),
        recv_timeout: poll_interval,
    };
    let b = PipeEnd {
        tx: b_tx,
        rx: b_rx,
        carry: Vec::new(),
        recv_timeout: poll_interval,
    };
    (
        PolledChannel::new(a, poll_interval),
        PolledChannel::new(b, poll_interval),
    )
}

/// Raw transport half; `Read`/`Write` so `PolledChannel` can drive it.
pub struct PipeEnd {
    tx: SyncSender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    /// Remainder of a message larger than the caller's read buffer.
    carry: Vec<u8>,
    recv_timeout: Duration,
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.carry.is_empty() {
            match self.rx.recv_timeout(self.recv_timeout) {
                Ok(chunk) => self.carry = chunk,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "pipe empty"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the pipe",
                    ));
                }
            }
        }
        let n = self.carry.len().min(buf.len());
        buf[..n].copy_from_slice(&self.carry[..n]);
        self.carry.drain(..n);
        Ok(n)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed the pipe"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
