use crate::channels::{Channel, CHANNEL_COUNT};
use polars::prelude::*;
use std::io::Write;

/// Records in a capture stream are separated by this character.
pub const RECORD_DELIMITER: char = ';';
/// One state character per channel followed by a microsecond timestamp.
pub const RECORD_LEN: usize = CHANNEL_COUNT + TIMESTAMP_DIGITS;
pub const TIMESTAMP_DIGITS: usize = 12;

pub const TIMESTAMP_COLUMN_NAME: &str = "timestamp";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureDecodeError {
    #[error("Record {record}: invalid timestamp '{value}'")]
    InvalidTimestamp { record: usize, value: String },

    #[error("Record {record}: invalid state '{value}' for {channel}")]
    InvalidState {
        record: usize,
        channel: Channel,
        value: char,
    },
}

/// State of every line at one instant of a capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Milliseconds since the capture started.
    pub timestamp: f64,
    states: [bool; CHANNEL_COUNT],
}

impl Sample {
    pub fn new(timestamp: f64, states: [bool; CHANNEL_COUNT]) -> Self {
        Self { timestamp, states }
    }

    /// Every line low.
    pub fn idle(timestamp: f64) -> Self {
        Self::new(timestamp, [false; CHANNEL_COUNT])
    }

    pub fn state(&self, channel: Channel) -> bool {
        self.states[channel.index()]
    }

    pub fn states(&self) -> &[bool; CHANNEL_COUNT] {
        &self.states
    }

    pub fn with_state(mut self, channel: Channel, state: bool) -> Self {
        self.states[channel.index()] = state;
        self
    }
}

/// Decode the raw text of a `DSCM` capture.
///
/// Anything between delimiters that is not exactly one record long after
/// trimming is skipped. The `EDAT` marker and partial trailing records fall
/// out this way. So does any text glued to a record without a `;` in
/// between, and that record goes with it.
#[tracing::instrument(level = "debug", skip_all, fields(bytes = raw.len()))]
pub fn decode_capture(raw: &str) -> Result<Vec<Sample>, CaptureDecodeError> {
    let mut samples: Vec<Sample> = Vec::new();

    for candidate in raw.split(RECORD_DELIMITER) {
        let candidate = candidate.trim();
        if candidate.len() != RECORD_LEN {
            continue;
        }

        let sample = decode_record(samples.len(), candidate)?;
        if let Some(previous) = samples.last() {
            if sample.timestamp < previous.timestamp {
                log::warn!(
                    "Record {}: timestamp {:.3} ms goes back from {:.3} ms",
                    samples.len(),
                    sample.timestamp,
                    previous.timestamp
                );
            }
        }
        samples.push(sample);
    }

    log::debug!("Decoded {} samples", samples.len());
    Ok(samples)
}

fn decode_record(record: usize, text: &str) -> Result<Sample, CaptureDecodeError> {
    let bytes = text.as_bytes();
    let (state_chars, timestamp_chars) = bytes.split_at(CHANNEL_COUNT);

    let mut states = [false; CHANNEL_COUNT];
    for (channel, (slot, &c)) in Channel::ALL.iter().zip(states.iter_mut().zip(state_chars)) {
        *slot = match c {
            b'0' => false,
            b'1' => true,
            other => {
                return Err(CaptureDecodeError::InvalidState {
                    record,
                    channel: *channel,
                    value: char::from(other),
                })
            }
        };
    }

    let invalid_timestamp = || CaptureDecodeError::InvalidTimestamp {
        record,
        value: String::from_utf8_lossy(timestamp_chars).to_string(),
    };
    if !timestamp_chars.iter().all(u8::is_ascii_digit) {
        return Err(invalid_timestamp());
    }
    let micros: u64 = std::str::from_utf8(timestamp_chars)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid_timestamp)?;

    Ok(Sample::new(micros as f64 / 1000.0, states))
}

/// One row per sample: `timestamp` then every line in record order, as 0/1.
pub fn samples_to_dataframe(samples: &[Sample]) -> PolarsResult<DataFrame> {
    let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
    let mut columns: Vec<Column> = vec![Series::new(TIMESTAMP_COLUMN_NAME.into(), timestamps).into()];

    for channel in Channel::ALL {
        let states: Vec<i32> = samples
            .iter()
            .map(|s| i32::from(s.state(channel)))
            .collect();
        columns.push(Series::new(channel.name().into(), states).into());
    }

    DataFrame::new(columns)
}

/// Write the sample table as CSV, timestamps with 3 decimals.
pub fn write_samples_csv<W: Write>(samples: &[Sample], writer: W) -> PolarsResult<()> {
    let mut df = samples_to_dataframe(samples)?;
    CsvWriter::new(writer)
        .include_header(true)
        .with_float_precision(Some(3))
        .finish(&mut df)
}
