//! Scripted `LineChannel` for unit-testing the protocol phases without a
//! transport: hands out queued lines, records every write.

use std::collections::VecDeque;
use std::time::Duration;

use scl_core::SclResult;
use scl_link::LineChannel;

pub struct ScriptedLink {
    lines: VecDeque<String>,
    pub sent: Vec<Vec<u8>>,
}

impl ScriptedLink {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            sent: Vec::new(),
        }
    }
}

impl LineChannel for ScriptedLink {
    fn send(&mut self, bytes: &[u8]) -> SclResult<()> {
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> SclResult<Option<String>> {
        match self.lines.pop_front() {
            Some(line) => Ok(Some(line)),
            None => {
                // Pace the caller's deadline loop like a real poll tick.
                std::thread::sleep(Duration::from_millis(1));
                Ok(None)
            }
        }
    }

    fn read_exact(&mut self, _n: usize, _timeout: Duration) -> SclResult<Option<Vec<u8>>> {
        Ok(None)
    }
}
