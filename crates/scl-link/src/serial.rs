//! `serialport`-backed channel for real hardware.
//!
//! The port's read timeout is set to the poll interval so every blocking
//! read doubles as one poll tick; `PolledChannel` turns `TimedOut` into
//! deadline accounting. Both FIFOs are cleared on open, since the MCU may
//! have been chattering since reset.

use std::time::Duration;

use scl_core::config::SerialConfig;
use scl_core::SclResult;
use serialport::{ClearBuffer, SerialPort};
use tracing::info;

use crate::channel::PolledChannel;

pub type SerialChannel = PolledChannel<Box<dyn SerialPort>>;

/// Open the configured device at 8N1 with no flow control.
pub fn open(config: &SerialConfig) -> SclResult<SerialChannel> {
    let port = serialport::new(&config.port, config.baud)
        .timeout(config.poll_interval())
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotConnected, e))?;

    port.clear(ClearBuffer::All)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    info!(port = %config.port, baud = config.baud, "serial port opened");
    Ok(PolledChannel::new(port, config.poll_interval()))
}

/// Open with an explicit poll interval (used by the monitor, which polls
/// more coarsely than the engine).
pub fn open_with_poll(config: &SerialConfig, poll: Duration) -> SclResult<SerialChannel> {
    let mut cfg = config.clone();
    cfg.poll_interval_ms = poll.as_millis() as u64;
    open(&cfg)
}
