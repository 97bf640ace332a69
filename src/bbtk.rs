use crate::sensor_config::{FormatError, SmoothingMask, Thresholds};
use crate::serial_terminal::{BbtkTerminal, TerminalError, Transport};
use crate::session_config::{PollLimit, SessionConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const CONNECT_REPLY: &str = "BBTK;";
const ECHO_REPLY: &str = "ECHO";
const FORMAT_REPLY: &str = "FRMT;";
const ERASE_REPLY: &str = "ESEC;";
const CLEAR_DONE: &str = "DONE;";
// Not a typo: AJPV and SPIE finish with differently spelled lines.
const ADJUST_DONE: &str = "Done;";
const END_OF_DATA: &[u8] = b"EDAT";

// Firmware settle times. These are minimums the box needs, not knobs.
const COMMAND_SETTLE: Duration = Duration::from_millis(50);
const CONNECT_SETTLE: Duration = Duration::from_millis(100);
const THRESHOLDS_SETTLE: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLEAR_SETTLE: Duration = Duration::from_secs(1);
const INFO_SETTLE: Duration = Duration::from_secs(1);
const FLUSH_SETTLE: Duration = Duration::from_secs(1);
const CAPTURE_STEP: Duration = Duration::from_secs(1);
const CAPTURE_ARM: Duration = Duration::from_millis(1500);

/// Upper bound on the raw capture stream kept in memory.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum BbtkError {
    #[error("Serial terminal error: {0}")]
    Terminal(#[from] TerminalError),

    #[error("{command}: expected {expected:?}, got {actual:?}")]
    Protocol {
        command: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Capture duration must be at least one second")]
    InvalidCaptureDuration,

    #[error("{operation} gave up after {attempts} attempts ({elapsed:?})")]
    Timeout {
        operation: &'static str,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("Capture stream exceeded {limit} bytes without an end of data marker")]
    CaptureOverflow { limit: usize },
}

/// Shared flag that stops a long running operation at its next check.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &'static str) -> Result<(), BbtkError> {
        if self.is_cancelled() {
            return Err(BbtkError::Cancelled { operation });
        }
        Ok(())
    }
}

fn expect_reply(command: &'static str, expected: &'static str, actual: String) -> Result<(), BbtkError> {
    if actual == expected {
        Ok(())
    } else {
        Err(BbtkError::Protocol {
            command,
            expected,
            actual,
        })
    }
}

/// An open port that has not completed the `CONN` handshake yet.
pub struct UnconnectedBbtk {
    terminal: BbtkTerminal,
    config: SessionConfig,
}

impl UnconnectedBbtk {
    pub fn open(port: &str, config: SessionConfig) -> Result<Self, BbtkError> {
        log::log!(
            config.progress_level(),
            "Trying to open {} at {} bps...",
            port,
            config.baud_rate
        );
        let terminal = BbtkTerminal::open(port, config.baud_rate, config.read_timeout)?;
        Ok(Self { terminal, config })
    }

    pub fn from_transport(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let terminal = BbtkTerminal::from_transport(transport, config.read_timeout);
        Self { terminal, config }
    }

    /// Purge the serial input and output buffers.
    pub fn reset_serial_buffers(&mut self) -> Result<(), BbtkError> {
        self.terminal.clear()?;
        Ok(())
    }

    /// Handshake: `CONN` must be answered with exactly `BBTK;`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn connect(mut self) -> Result<Bbtk, BbtkError> {
        log::log!(self.config.progress_level(), "Trying to connect to BBTK...");
        self.terminal.write_command("CONN", COMMAND_SETTLE)?;
        thread::sleep(CONNECT_SETTLE);

        let reply = self.terminal.read_line()?;
        expect_reply("CONN", CONNECT_REPLY, reply)?;

        log::log!(self.config.progress_level(), "Connected to BBTK");
        Ok(Bbtk {
            terminal: self.terminal,
            config: self.config,
        })
    }
}

/// A connected BBTK. Every method runs one command to completion; the
/// session is strictly sequential.
pub struct Bbtk {
    terminal: BbtkTerminal,
    config: SessionConfig,
}

impl Bbtk {
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// `ECHO` liveness check. A wrong answer is logged and reported as
    /// `false`; only transport failures are errors.
    pub fn is_alive(&mut self) -> Result<bool, BbtkError> {
        self.terminal.write_command("ECHO", COMMAND_SETTLE)?;
        let reply = self.terminal.read_line()?;
        match expect_reply("ECHO", ECHO_REPLY, reply) {
            Ok(()) => Ok(true),
            Err(e) => {
                log::warn!("{}", e);
                Ok(false)
            }
        }
    }

    /// Set smoothing on the opto and mic lines.
    pub fn set_smoothing(&mut self, mask: &SmoothingMask) -> Result<(), BbtkError> {
        log::log!(self.config.progress_level(), "Setting smoothing mask to {}", mask);
        self.terminal.write_command("SMOO", COMMAND_SETTLE)?;
        self.terminal
            .write_command(&mask.wire_payload(), COMMAND_SETTLE)?;
        Ok(())
    }

    /// Set the activation thresholds. Values above 127 are refused before
    /// anything is sent.
    pub fn set_thresholds(&mut self, thresholds: &Thresholds) -> Result<(), BbtkError> {
        thresholds.validate()?;
        log::log!(
            self.config.progress_level(),
            "Setting thresholds to {}",
            thresholds
        );

        self.terminal.write_command("SEPV", COMMAND_SETTLE)?;
        for value in thresholds.to_array() {
            self.terminal
                .write_command(&value.to_string(), COMMAND_SETTLE)?;
        }
        thread::sleep(THRESHOLDS_SETTLE);
        Ok(())
    }

    pub fn get_thresholds(&mut self) -> Result<Thresholds, BbtkError> {
        self.terminal.write_command("GEPV", COMMAND_SETTLE)?;
        let reply = self.terminal.read_line()?;
        let values = reply.strip_suffix(';').unwrap_or(&reply);
        Ok(Thresholds::decode(values)?)
    }

    /// Firmware version of the ARM chip, as reported by `FIRM`.
    pub fn firmware_version(&mut self) -> Result<String, BbtkError> {
        self.terminal.write_command("FIRM", COMMAND_SETTLE)?;
        Ok(self.terminal.read_line()?)
    }

    /// Show the copyright notice and firmware date on the box's LCD.
    pub fn display_info(&mut self) -> Result<(), BbtkError> {
        self.terminal.write_command("ABOU", COMMAND_SETTLE)?;
        thread::sleep(INFO_SETTLE);
        Ok(())
    }

    /// `FLUS`: ask the box to drop its USB output buffer.
    pub fn flush_usb(&mut self) -> Result<(), BbtkError> {
        self.terminal.write_command("FLUS", COMMAND_SETTLE)?;
        thread::sleep(FLUSH_SETTLE);
        Ok(())
    }

    pub fn reset_serial_buffers(&mut self) -> Result<(), BbtkError> {
        self.terminal.clear()?;
        Ok(())
    }

    /// Format the timing memory (first run after power up) or erase the
    /// sectors used by the previous capture.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn clear_timing_data(&mut self, cancel: &CancelToken) -> Result<(), BbtkError> {
        log::log!(self.config.progress_level(), "Clearing timing data...");
        self.terminal.write_command("SPIE", COMMAND_SETTLE)?;

        let first = self.terminal.read_line()?;
        match first.as_str() {
            FORMAT_REPLY => log::debug!("SPIE: formatting memory"),
            ERASE_REPLY => log::debug!("SPIE: erasing sectors"),
            CLEAR_DONE => log::debug!("SPIE: nothing to clear"),
            _ => log::warn!(
                "SPIE: expected {:?} or {:?}, got {:?}",
                FORMAT_REPLY,
                ERASE_REPLY,
                first
            ),
        }

        if first != CLEAR_DONE {
            self.poll_until("SPIE", CLEAR_DONE, self.config.clear_limit, cancel)?;
        }
        thread::sleep(CLEAR_SETTLE);
        Ok(())
    }

    /// Put the box in manual threshold adjustment mode and wait until the
    /// operator leaves it.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn adjust_thresholds(&mut self, cancel: &CancelToken) -> Result<(), BbtkError> {
        self.terminal.write_command("AJPV", COMMAND_SETTLE)?;
        self.poll_until("AJPV", ADJUST_DONE, self.config.adjust_limit, cancel)
    }

    fn poll_until(
        &mut self,
        operation: &'static str,
        done: &str,
        limit: PollLimit,
        cancel: &CancelToken,
    ) -> Result<(), BbtkError> {
        let started = Instant::now();
        let mut attempts = 0;

        while attempts < limit.max_attempts && started.elapsed() < limit.deadline {
            cancel.check(operation)?;
            attempts += 1;

            match self.terminal.read_line() {
                Ok(line) if line == done => return Ok(()),
                Ok(line) => log::debug!("{}: expected {:?}, got {:?}", operation, done, line),
                Err(TerminalError::Timeout { .. }) => {
                    log::debug!("{}: still waiting for {:?}", operation, done);
                }
                Err(e) => return Err(e.into()),
            }
            thread::sleep(POLL_INTERVAL);
        }

        Err(BbtkError::Timeout {
            operation,
            attempts,
            elapsed: started.elapsed(),
        })
    }

    /// Run a timed digital capture (`DSCM`) and return the raw text the box
    /// sends back, up to and including the `EDAT` marker.
    #[tracing::instrument(level = "debug", skip(self, cancel))]
    pub fn capture_events(&mut self, duration_secs: u32, cancel: &CancelToken) -> Result<String, BbtkError> {
        if duration_secs == 0 {
            return Err(BbtkError::InvalidCaptureDuration);
        }
        log::log!(
            self.config.progress_level(),
            "Capturing events (DSCM) for {} s...",
            duration_secs
        );

        self.arm_capture(duration_secs, cancel)?;
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(duration_secs)) + self.config.capture_grace;
        self.wait_out_capture(duration_secs, cancel)?;
        let text = self.drain_capture(deadline, cancel)?;

        log::log!(
            self.config.progress_level(),
            "Capture complete, {} bytes",
            text.len()
        );
        Ok(text)
    }

    fn arm_capture(&mut self, duration_secs: u32, cancel: &CancelToken) -> Result<(), BbtkError> {
        let duration_us = (u64::from(duration_secs) * 1_000_000).to_string();
        let steps = [
            ("DSCM", CAPTURE_STEP),
            ("TIML", CAPTURE_STEP),
            (duration_us.as_str(), CAPTURE_STEP),
            ("RUDS", CAPTURE_ARM),
        ];

        for (command, hold_off) in steps {
            cancel.check("DSCM")?;
            thread::sleep(hold_off);
            self.terminal.write_command(command, COMMAND_SETTLE)?;
        }
        Ok(())
    }

    fn wait_out_capture(&mut self, duration_secs: u32, cancel: &CancelToken) -> Result<(), BbtkError> {
        for remaining in (1..duration_secs).rev() {
            cancel.check("DSCM")?;
            log::log!(self.config.progress_level(), "{} s", remaining);
            thread::sleep(Duration::from_secs(1));
        }
        Ok(())
    }

    /// Collect the stream until `EDAT` shows up. Gives up at `deadline`
    /// even if bytes are still coming in.
    fn drain_capture(&mut self, deadline: Instant, cancel: &CancelToken) -> Result<String, BbtkError> {
        log::debug!("Waiting for data...");
        let started = Instant::now();
        let mut scanner = MarkerScanner::new(END_OF_DATA);
        let mut attempts = 0;

        loop {
            cancel.check("DSCM")?;
            if Instant::now() >= deadline {
                return Err(BbtkError::Timeout {
                    operation: "DSCM",
                    attempts,
                    elapsed: started.elapsed(),
                });
            }
            attempts += 1;

            let n = self.terminal.read_chunk(&mut scanner.data)?;
            if n > 0 && scanner.found() {
                break;
            }
            if scanner.data.len() > MAX_CAPTURE_BYTES {
                return Err(BbtkError::CaptureOverflow {
                    limit: MAX_CAPTURE_BYTES,
                });
            }
        }

        Ok(String::from_utf8_lossy(&scanner.data).into_owned())
    }

    pub fn disconnect(self) {
        log::debug!("Closing connection to BBTK");
    }
}

/// Accumulates a stream and looks for a marker across everything read so
/// far, so a marker split over two reads is still found.
struct MarkerScanner {
    marker: &'static [u8],
    data: Vec<u8>,
    searched: usize,
}

impl MarkerScanner {
    fn new(marker: &'static [u8]) -> Self {
        Self {
            marker,
            data: Vec::new(),
            searched: 0,
        }
    }

    fn found(&mut self) -> bool {
        let start = self.searched.saturating_sub(self.marker.len() - 1);
        self.searched = self.data.len();
        self.data[start..]
            .windows(self.marker.len())
            .any(|window| window == self.marker)
    }
}
