use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

/// Every command and reply line ends with this terminator on the wire.
const LINE_TERMINATOR: &str = "\r\n";

const READ_CHUNK: usize = 1024;

/// Longest reply line accepted. The box never sends more than a few dozen
/// bytes per line; anything longer is noise.
pub const MAX_LINE_LEN: usize = 4096;

/// Byte channel the terminal drives. Anything readable and writable works;
/// serial ports additionally know how to purge their OS buffers.
pub trait Transport: Read + Write + Send {
    /// Discard whatever sits in the input and output buffers.
    fn clear(&mut self) -> Result<(), TerminalError> {
        Ok(())
    }
}

impl Transport for Box<dyn SerialPort> {
    fn clear(&mut self) -> Result<(), TerminalError> {
        SerialPort::clear(&mut **self, serialport::ClearBuffer::All)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: Expected {expected} but got '{actual}'. Likely due to a timeout.")]
    Timeout { expected: String, actual: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Line oriented terminal to a BBTK.
///
/// Bytes read past the end of a line stay in `pending`, so a raw capture
/// drain that follows a line read does not lose anything.
pub struct BbtkTerminal {
    port: Box<dyn Transport>,
    pending: Vec<u8>,
    line_timeout: Duration,
}

impl BbtkTerminal {
    /// Open a serial port at 8N1 with the given per-read timeout.
    pub fn open(port: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, TerminalError> {
        log::debug!("Opening {} at {} bps", port, baud_rate);
        let serial = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(read_timeout)
            .open()?;

        Ok(Self::from_transport(Box::new(serial), read_timeout))
    }

    pub fn from_transport(port: Box<dyn Transport>, line_timeout: Duration) -> Self {
        Self {
            port,
            pending: Vec::new(),
            line_timeout,
        }
    }

    /// Write `command` followed by CRLF, then hold off for `settle`.
    pub fn write_command(&mut self, command: &str, settle: Duration) -> Result<(), TerminalError> {
        log::debug!("-> {:?}", command);
        let line = format!("{}{}", command, LINE_TERMINATOR);
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        thread::sleep(settle);
        Ok(())
    }

    /// Read the next line, without its terminator.
    ///
    /// Fails with `Timeout` once the line timeout has passed, even while
    /// bytes are still arriving, or when more than [`MAX_LINE_LEN`] bytes
    /// pile up without a terminator. In the second case they are dropped.
    pub fn read_line(&mut self) -> Result<String, TerminalError> {
        let deadline = Instant::now() + self.line_timeout;

        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                let line = String::from_utf8(line)?;
                log::debug!("<- {:?}", line);
                return Ok(line);
            }

            if self.pending.len() > MAX_LINE_LEN {
                log::warn!("Dropping {} bytes without a line terminator", self.pending.len());
                let actual = String::from_utf8_lossy(&self.pending[..MAX_LINE_LEN]).to_string();
                self.pending.clear();
                return Err(TerminalError::Timeout {
                    expected: format!("a line of at most {MAX_LINE_LEN} bytes"),
                    actual,
                });
            }
            if Instant::now() >= deadline {
                return Err(TerminalError::Timeout {
                    expected: "a complete line".to_string(),
                    actual: String::from_utf8_lossy(&self.pending).to_string(),
                });
            }
            self.fill()?;
        }
    }

    /// Move whatever is available into `buffer`. Returns the number of bytes
    /// appended; zero means the read timed out with nothing new.
    pub fn read_chunk(&mut self, buffer: &mut Vec<u8>) -> Result<usize, TerminalError> {
        if self.pending.is_empty() {
            self.fill()?;
        }
        let n = self.pending.len();
        buffer.append(&mut self.pending);
        Ok(n)
    }

    /// Purge host side buffers, including bytes already pulled off the port.
    pub fn clear(&mut self) -> Result<(), TerminalError> {
        self.pending.clear();
        self.port.clear()
    }

    fn fill(&mut self) -> Result<usize, TerminalError> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.port.read(&mut chunk) {
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }
}
