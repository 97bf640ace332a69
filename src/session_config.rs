use std::time::Duration;

/// Bound on a loop that polls the device for a completion line.
///
/// Polling stops at whichever limit is hit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLimit {
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl PollLimit {
    pub const fn new(max_attempts: u32, deadline: Duration) -> Self {
        Self {
            max_attempts,
            deadline,
        }
    }
}

/// Per-session settings. Firmware settle delays are not part of this;
/// they are fixed minimums owned by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub baud_rate: u32,
    /// Upper bound on a single line read.
    pub read_timeout: Duration,
    /// Report progress at info level rather than debug.
    pub verbose: bool,
    /// `SPIE`: wait for `DONE;`. A full format takes a while.
    pub clear_limit: PollLimit,
    /// `AJPV`: wait for `Done;`. Someone is turning knobs on the box.
    pub adjust_limit: PollLimit,
    /// How long past the programmed duration a capture may take to drain.
    pub capture_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(1),
            verbose: false,
            clear_limit: PollLimit::new(600, Duration::from_secs(120)),
            adjust_limit: PollLimit::new(3_000, Duration::from_secs(600)),
            capture_grace: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn clear_limit(mut self, limit: PollLimit) -> Self {
        self.clear_limit = limit;
        self
    }

    pub fn adjust_limit(mut self, limit: PollLimit) -> Self {
        self.adjust_limit = limit;
        self
    }

    pub fn capture_grace(mut self, grace: Duration) -> Self {
        self.capture_grace = grace;
        self
    }

    pub(crate) fn progress_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}
