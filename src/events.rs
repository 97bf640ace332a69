use crate::capture::Sample;
use crate::channels::Channel;
use polars::prelude::*;
use std::io::Write;

pub const TYPE_COLUMN_NAME: &str = "Type";
pub const ONSET_COLUMN_NAME: &str = "Onset";
pub const DURATION_COLUMN_NAME: &str = "Duration";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EdgeError {
    #[error("Sequence too short ({0} samples, need more than 2)")]
    TooShort(usize),

    #[error("Signal must start at baseline (0)")]
    StartsHigh,

    #[error("Signal must end at baseline (0)")]
    EndsHigh,

    #[error("{rising} rising edges but {falling} falling edges")]
    Unpaired { rising: usize, falling: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("No samples to extract events from")]
    NoSamples,

    #[error("Error processing {channel}: {source}")]
    Channel {
        channel: Channel,
        #[source]
        source: EdgeError,
    },
}

/// Sample indices where a line goes up and where it comes back down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edges {
    pub rising: Vec<usize>,
    pub falling: Vec<usize>,
}

/// One activation of an input line, in sample time units (ms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub channel: Channel,
    pub onset: f64,
    pub duration: f64,
}

/// Locate rising (`0 -> 1`) and falling (`1 -> 0`) edges in a binary
/// sequence. An edge is reported at the index of the sample after the
/// transition.
///
/// The sequence has to hold more than two samples and start and end low,
/// which guarantees every rising edge has a falling partner.
pub fn locate_edges(sequence: &[bool]) -> Result<Edges, EdgeError> {
    if sequence.len() <= 2 {
        return Err(EdgeError::TooShort(sequence.len()));
    }
    if sequence[0] {
        return Err(EdgeError::StartsHigh);
    }
    if sequence[sequence.len() - 1] {
        return Err(EdgeError::EndsHigh);
    }

    let mut edges = Edges::default();
    for (i, pair) in sequence.windows(2).enumerate() {
        match (pair[0], pair[1]) {
            (false, true) => edges.rising.push(i + 1),
            (true, false) => edges.falling.push(i + 1),
            _ => {}
        }
    }

    if edges.rising.len() != edges.falling.len() {
        return Err(EdgeError::Unpaired {
            rising: edges.rising.len(),
            falling: edges.falling.len(),
        });
    }
    Ok(edges)
}

/// Pair the k-th rising edge with the k-th falling edge of each input line.
///
/// Events come out grouped by line in [`Channel::INPUTS`] order, each
/// group in onset order. The first sample is always treated as low.
/// One malformed line fails the whole extraction.
#[tracing::instrument(level = "debug", skip_all, fields(samples = samples.len()))]
pub fn extract_events(samples: &[Sample]) -> Result<Vec<Event>, EventError> {
    if samples.is_empty() {
        return Err(EventError::NoSamples);
    }

    let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
    let mut events = Vec::new();

    for channel in Channel::INPUTS {
        let mut sequence: Vec<bool> = samples.iter().map(|s| s.state(channel)).collect();
        sequence[0] = false;

        let edges =
            locate_edges(&sequence).map_err(|source| EventError::Channel { channel, source })?;

        for (&up, &down) in edges.rising.iter().zip(&edges.falling) {
            events.push(Event {
                channel,
                onset: timestamps[up],
                duration: timestamps[down] - timestamps[up],
            });
        }
    }

    log::debug!("Extracted {} events", events.len());
    Ok(events)
}

/// `Type, Onset, Duration` table.
pub fn events_to_dataframe(events: &[Event]) -> PolarsResult<DataFrame> {
    let types: Vec<&str> = events.iter().map(|e| e.channel.name()).collect();
    let onsets: Vec<f64> = events.iter().map(|e| e.onset).collect();
    let durations: Vec<f64> = events.iter().map(|e| e.duration).collect();

    DataFrame::new(vec![
        Series::new(TYPE_COLUMN_NAME.into(), types).into(),
        Series::new(ONSET_COLUMN_NAME.into(), onsets).into(),
        Series::new(DURATION_COLUMN_NAME.into(), durations).into(),
    ])
}

pub fn write_events_csv<W: Write>(events: &[Event], writer: W) -> PolarsResult<()> {
    let mut df = events_to_dataframe(events)?;
    CsvWriter::new(writer)
        .include_header(true)
        .with_float_precision(Some(3))
        .finish(&mut df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(values: &[u8]) -> Vec<bool> {
        values.iter().map(|&v| v == 1).collect()
    }

    fn samples_for(channel: Channel, values: &[u8], timestamps: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .zip(timestamps)
            .map(|(&v, &t)| Sample::idle(t).with_state(channel, v == 1))
            .collect()
    }

    #[test]
    fn test_locate_edges() {
        let edges = locate_edges(&bits(&[0, 1, 1, 0, 1, 0, 0])).unwrap();
        assert_eq!(edges.rising, vec![1, 4]);
        assert_eq!(edges.falling, vec![3, 5]);
    }

    #[test]
    fn test_locate_edges_boundaries() {
        assert_eq!(locate_edges(&bits(&[0, 0])), Err(EdgeError::TooShort(2)));
        assert_eq!(locate_edges(&bits(&[1, 0, 0])), Err(EdgeError::StartsHigh));
        assert_eq!(locate_edges(&bits(&[0, 1, 1])), Err(EdgeError::EndsHigh));
        assert_eq!(locate_edges(&bits(&[0, 0, 0])), Ok(Edges::default()));
    }

    #[test]
    fn test_single_pulse() {
        let samples = samples_for(
            Channel::Opto2,
            &[0, 0, 1, 1, 0, 0],
            &[0.0, 10.0, 20.0, 30.0, 40.0, 50.0],
        );

        let events = extract_events(&samples).unwrap();
        assert_eq!(
            events,
            vec![Event {
                channel: Channel::Opto2,
                onset: 20.0,
                duration: 20.0
            }]
        );
    }

    #[test]
    fn test_first_sample_forced_to_baseline() {
        // The first sample reads high but counts as low, so the drop that
        // follows is not an edge.
        let samples = samples_for(Channel::Keypad1, &[1, 0, 0], &[0.0, 1.0, 2.0]);
        assert_eq!(extract_events(&samples).unwrap(), vec![]);

        // High from the start: the pulse is reported from the second sample.
        let samples = samples_for(Channel::Keypad1, &[1, 1, 0], &[0.0, 1.0, 2.0]);
        let events = extract_events(&samples).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].onset, 1.0);
        assert_eq!(events[0].duration, 1.0);
    }

    #[test]
    fn test_line_still_high_at_end_fails() {
        let samples = samples_for(Channel::TtlIn1, &[0, 1, 1], &[0.0, 1.0, 2.0]);
        assert_eq!(
            extract_events(&samples),
            Err(EventError::Channel {
                channel: Channel::TtlIn1,
                source: EdgeError::EndsHigh
            })
        );
    }

    #[test]
    fn test_too_few_samples_fails() {
        assert_eq!(extract_events(&[]), Err(EventError::NoSamples));
        let samples = samples_for(Channel::Mic1, &[0, 0], &[0.0, 1.0]);
        assert!(matches!(
            extract_events(&samples),
            Err(EventError::Channel {
                channel: Channel::Keypad4,
                source: EdgeError::TooShort(2)
            })
        ));
    }

    #[test]
    fn test_output_lines_are_not_analysed() {
        let samples = samples_for(Channel::Sounder1, &[0, 1, 0], &[0.0, 1.0, 2.0]);
        assert!(extract_events(&samples).unwrap().is_empty());

        let samples = samples_for(Channel::ActClose1, &[0, 1, 1], &[0.0, 1.0, 2.0]);
        assert!(extract_events(&samples).is_ok());
    }

    #[test]
    fn test_events_grouped_by_channel_order() {
        let timestamps = [0.0, 5.0, 10.0, 15.0, 20.0];
        let samples: Vec<Sample> = [[0, 0], [1, 1], [0, 1], [1, 0], [0, 0]]
            .iter()
            .zip(timestamps)
            .map(|(&[mic1, keypad4], t)| {
                Sample::idle(t)
                    .with_state(Channel::Mic1, mic1 == 1)
                    .with_state(Channel::Keypad4, keypad4 == 1)
            })
            .collect();

        let events = extract_events(&samples).unwrap();
        let summary: Vec<(Channel, f64, f64)> = events
            .iter()
            .map(|e| (e.channel, e.onset, e.duration))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Channel::Keypad4, 5.0, 10.0),
                (Channel::Mic1, 5.0, 5.0),
                (Channel::Mic1, 15.0, 5.0),
            ]
        );
    }

    #[test]
    fn test_events_csv() {
        let events = vec![Event {
            channel: Channel::Opto1,
            onset: 20.0,
            duration: 16.6667,
        }];
        let mut out = Vec::new();
        write_events_csv(&events, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec![
            "Type,Onset,Duration",
            "Opto1,20.000,16.667"
        ]);
    }
}
