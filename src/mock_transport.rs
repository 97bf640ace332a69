//! Scripted stand-in for a BBTK on the other end of the serial line.

use crate::serial_terminal::{TerminalError, Transport};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

type Responder = Box<dyn FnMut(&str) -> Option<Vec<u8>> + Send>;

struct DeviceState {
    output: VecDeque<u8>,
    written: Vec<u8>,
    line: Vec<u8>,
    commands: Vec<String>,
    responder: Responder,
    max_read: usize,
    noise: Option<u8>,
}

/// Handle shared between a test and the transport it hands to the code
/// under test. Every complete line written is passed to the responder,
/// whose reply (if any) is queued for reading.
#[derive(Clone)]
pub struct ScriptedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl ScriptedDevice {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                output: VecDeque::new(),
                written: Vec::new(),
                line: Vec::new(),
                commands: Vec::new(),
                responder: Box::new(responder),
                max_read: usize::MAX,
                noise: None,
            })),
        }
    }

    /// Cap how many bytes a single read returns, to exercise chunk boundaries.
    pub fn with_max_read(self, max_read: usize) -> Self {
        self.state.lock().unwrap().max_read = max_read;
        self
    }

    /// Once the scripted output runs dry, keep sending `byte` about once a
    /// millisecond instead of going quiet.
    pub fn with_noise(self, byte: u8) -> Self {
        self.state.lock().unwrap().noise = Some(byte);
        self
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }

    pub fn push_output(&self, bytes: &[u8]) {
        self.state.lock().unwrap().output.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }
}

impl Read for ScriptedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, noise) = {
            let mut state = self.state.lock().unwrap();
            let n = buf.len().min(state.output.len()).min(state.max_read);
            for slot in buf.iter_mut().take(n) {
                *slot = state.output.pop_front().unwrap();
            }
            (n, state.noise)
        };
        if n == 0 && !buf.is_empty() {
            if let Some(byte) = noise {
                thread::sleep(Duration::from_millis(1));
                buf[0] = byte;
                return Ok(1);
            }
        }
        if n == 0 {
            thread::sleep(Duration::from_millis(1));
            return Err(io::ErrorKind::TimedOut.into());
        }
        Ok(n)
    }
}

impl Write for ScriptedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.written.extend_from_slice(buf);
        for &byte in buf {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&state.line)
                    .trim_end_matches('\r')
                    .to_string();
                state.line.clear();
                if let Some(reply) = (state.responder)(&line) {
                    state.output.extend(reply);
                }
                state.commands.push(line);
            } else {
                state.line.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedDevice {
    fn clear(&mut self) -> Result<(), TerminalError> {
        self.state.lock().unwrap().output.clear();
        Ok(())
    }
}
