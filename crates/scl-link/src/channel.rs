//! The `LineChannel` trait and its generic polled implementation.
//!
//! The MCU protocol mixes newline/carriage-return-delimited ASCII control
//! lines with raw binary payloads, so the channel offers both framings.
//! Reads never block past their deadline: the transport is polled at a
//! fixed granularity and `Ok(None)` signals expiry, leaving the
//! retry-or-fail decision to the caller. Transport-level I/O errors are
//! fatal and propagate immediately.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use scl_core::SclResult;
use tracing::trace;

/// A synchronous, half-duplex-by-convention serial line.
pub trait LineChannel {
    /// Write raw bytes, flushed.
    fn send(&mut self, bytes: &[u8]) -> SclResult<()>;

    /// Read one stripped ASCII line, or `None` when the deadline expires.
    fn read_line(&mut self, timeout: Duration) -> SclResult<Option<String>>;

    /// Read exactly `n` raw bytes, or `None` when the deadline expires
    /// before all of them arrive.
    fn read_exact(&mut self, n: usize, timeout: Duration) -> SclResult<Option<Vec<u8>>>;
}

/// Deadline-polled `LineChannel` over any blocking-with-timeout transport.
///
/// The transport's own read timeout acts as the poll granularity: a read
/// returning `TimedOut`/`WouldBlock` (or zero bytes, for transports that
/// signal emptiness that way) is one poll tick, not an error.
pub struct PolledChannel<T: Read + Write> {
    io: T,
    pending: VecDeque<u8>,
    poll_interval: Duration,
}

impl<T: Read + Write> PolledChannel<T> {
    pub fn new(io: T, poll_interval: Duration) -> Self {
        Self {
            io,
            pending: VecDeque::new(),
            poll_interval,
        }
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    /// Pull whatever the transport has into the pending buffer.
    /// Returns false when this poll tick yielded nothing.
    fn poll_once(&mut self) -> SclResult<bool> {
        let mut buf = [0u8; 256];
        match self.io.read(&mut buf) {
            Ok(0) => {
                // Transport has nothing buffered; pace the spin.
                std::thread::sleep(self.poll_interval);
                Ok(false)
            }
            Ok(n) => {
                self.pending.extend(&buf[..n]);
                Ok(true)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drain one complete line from the pending buffer, if present.
    fn take_line(&mut self) -> Option<String> {
        let pos = self
            .pending
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')?;
        let line: Vec<u8> = self.pending.drain(..pos).collect();
        self.pending.pop_front(); // the terminator itself
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

impl<T: Read + Write> LineChannel for PolledChannel<T> {
    fn send(&mut self, bytes: &[u8]) -> SclResult<()> {
        self.io.write_all(bytes)?;
        self.io.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> SclResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Blank segments (CRLF pairs, keepalive newlines) are noise.
            while let Some(line) = self.take_line() {
                if !line.is_empty() {
                    trace!(target: "scl::mcu", %line, "line received");
                    return Ok(Some(line));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.poll_once()?;
        }
    }

    fn read_exact(&mut self, n: usize, timeout: Duration) -> SclResult<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        while self.pending.len() < n {
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.poll_once()?;
        }
        Ok(Some(self.pending.drain(..n).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Scripted transport: hands out queued reads, records writes.
    struct Scripted {
        reads: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(reads: &[&[u8]]) -> Self {
            Self {
                reads: reads.iter().map(|r| r.to_vec()).collect(),
                written: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "empty")),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn chan(reads: &[&[u8]]) -> PolledChannel<Scripted> {
        PolledChannel::new(Scripted::new(reads), Duration::from_millis(1))
    }

    #[test]
    fn reads_newline_terminated_line() {
        let mut c = chan(&[b"READY\n"]);
        let line = c.read_line(Duration::from_millis(50)).unwrap();
        assert_eq!(line.as_deref(), Some("READY"));
    }

    #[test]
    fn reads_crlf_line_and_skips_blank() {
        let mut c = chan(&[b"ACK\r\n\r\nWAIT_KEY\r\n"]);
        assert_eq!(
            c.read_line(Duration::from_millis(50)).unwrap().as_deref(),
            Some("ACK")
        );
        assert_eq!(
            c.read_line(Duration::from_millis(50)).unwrap().as_deref(),
            Some("WAIT_KEY")
        );
    }

    #[test]
    fn line_split_across_polls() {
        let mut c = chan(&[b"WAIT_CH", b"UNK:1024\n"]);
        assert_eq!(
            c.read_line(Duration::from_millis(50)).unwrap().as_deref(),
            Some("WAIT_CHUNK:1024")
        );
    }

    #[test]
    fn deadline_expiry_returns_none() {
        let mut c = chan(&[]);
        assert_eq!(c.read_line(Duration::from_millis(20)).unwrap(), None);
    }

    #[test]
    fn read_exact_collects_across_polls() {
        let mut c = chan(&[b"\x00\x00", b"\x04\x00"]);
        let bytes = c.read_exact(4, Duration::from_millis(50)).unwrap();
        assert_eq!(bytes.unwrap(), vec![0, 0, 4, 0]);
    }

    #[test]
    fn read_exact_partial_then_timeout_is_none() {
        let mut c = chan(&[b"\x01"]);
        assert_eq!(c.read_exact(4, Duration::from_millis(20)).unwrap(), None);
        // The partial byte stays pending for a later read
        assert_eq!(c.pending.len(), 1);
    }

    #[test]
    fn send_writes_and_flushes() {
        let mut c = chan(&[]);
        c.send(b"n").unwrap();
        assert_eq!(c.io.written, b"n");
    }
}
