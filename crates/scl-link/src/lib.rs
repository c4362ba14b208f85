//! scl-link: byte transport under the protocol engine
//!
//! - `channel`: the `LineChannel` trait and the generic deadline-polled
//!   implementation over any `Read + Write` transport
//! - `serial`: `serialport`-backed channel for real hardware
//! - `pipe`: in-memory duplex pipe, the transport for the simulator and
//!   for integration tests
//! - `reader`: background line reader feeding a bounded event channel
//!
//! Every wait in this crate is a bounded poll loop against a wall-clock
//! deadline; nothing blocks indefinitely.

pub mod channel;
pub mod pipe;
pub mod reader;
pub mod serial;

pub use channel::{LineChannel, PolledChannel};
pub use pipe::{pipe, PipeChannel};
pub use reader::{LineEvent, LineReader};
pub use serial::SerialChannel;
