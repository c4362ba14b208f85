//! Background line reader with a bounded event channel.
//!
//! The monitor workflow (and historically the bootloader driver) wants a
//! dedicated thread watching MCU output while the main thread decides
//! what to do. Instead of shared mutable flags, the reader classifies
//! each line and pushes it into a bounded `sync_channel`; the consumer
//! drains events synchronously. Backpressure is the bound: if the
//! consumer stalls, the reader blocks rather than dropping lines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::LineChannel;

/// Queue bound; a wedged consumer stalls the reader, it never drops.
const EVENT_QUEUE_DEPTH: usize = 256;

/// How long each poll of the channel waits before re-checking the stop flag.
const READ_SLICE: Duration = Duration::from_millis(250);

/// A classified line from the reader thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Ordinary output line.
    Line(String),
    /// A WAIT_* prompt: the device is blocked on host input.
    Prompt(String),
    /// The channel died; terminal, the reader exits after sending this.
    Disconnected(String),
}

/// Handle to the background reader. Dropping it stops the thread.
pub struct LineReader {
    events: Receiver<LineEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LineReader {
    /// Spawn a reader thread owning `channel`.
    pub fn spawn<C>(mut channel: C) -> Self
    where
        C: LineChannel + Send + 'static,
    {
        let (tx, rx) = sync_channel(EVENT_QUEUE_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                match channel.read_line(READ_SLICE) {
                    Ok(Some(line)) => {
                        let event = classify(line);
                        if send_event(&tx, event).is_err() {
                            break; // consumer gone
                        }
                    }
                    Ok(None) => {} // poll slice elapsed, re-check stop flag
                    Err(e) => {
                        warn!(error = %e, "reader channel failed");
                        let _ = send_event(&tx, LineEvent::Disconnected(e.to_string()));
                        break;
                    }
                }
            }
            debug!("line reader stopped");
        });

        Self {
            events: rx,
            stop,
            handle: Some(handle),
        }
    }

    /// Receive the next event, or `None` when `timeout` elapses.
    pub fn recv(&self, timeout: Duration) -> Option<LineEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Prompts are the WAIT_* family: the device is parked waiting for bytes.
fn classify(line: String) -> LineEvent {
    if line.contains("WAIT_") {
        LineEvent::Prompt(line)
    } else {
        LineEvent::Line(line)
    }
}

/// Blocking send that still notices a departed consumer.
fn send_event(tx: &SyncSender<LineEvent>, event: LineEvent) -> Result<(), ()> {
    match tx.try_send(event) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(event)) => tx.send(event).map_err(|_| ()),
        Err(TrySendError::Disconnected(_)) => Err(()),
    }
}
