//! # BBTK RS
//!
//! A Rust library for driving a Black Box ToolKit v3 (BBTK) timing box over
//! its USB serial port and turning its digital captures into event tables.
//!
//! ## Features
//!
//! - **Device discovery**: Uses `serialport` to find the port a BBTK answers on
//! - **Sensor configuration**: Typed activation thresholds and smoothing mask
//! - **Device control**: Handshake, threshold set/get/adjust, memory clear and timed captures
//! - **Capture decoding**: Raw `DSCM` records to per-line samples in milliseconds
//! - **Event extraction**: Rising/falling edge pairing on the 12 input lines
//! - **DataFrame output**: Uses `polars` for samples and events, written as CSV
//!
//! ## Examples
//!
//! ### Capture and Extract Events
//!
//! ```rust,no_run
//! use bbtk_rs::{decode_capture, extract_events, BbtkConnector, CancelToken, SessionConfig};
//!
//! let mut bbtk = BbtkConnector::connect(Some("/dev/ttyACM0"), SessionConfig::default())?;
//! let cancel = CancelToken::new();
//!
//! bbtk.clear_timing_data(&cancel)?;
//! let raw = bbtk.capture_events(30, &cancel)?;
//!
//! let samples = decode_capture(&raw)?;
//! for event in extract_events(&samples)? {
//!     println!("{} at {:.3} ms for {:.3} ms", event.channel, event.onset, event.duration);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Thresholds
//!
//! ```rust
//! use bbtk_rs::Thresholds;
//!
//! let thresholds = Thresholds::default().optos(90);
//! assert_eq!(thresholds.encode(), "0,0,63,63,90,90,90,90");
//!
//! let parsed: Thresholds = "0,0,63,63,90,90,90,90".parse().unwrap();
//! assert_eq!(parsed, thresholds);
//! ```
//!
//! ### Smoothing Mask
//!
//! ```rust
//! use bbtk_rs::SmoothingMask;
//!
//! let mask = SmoothingMask::default();
//! assert_eq!(mask.encode(), "1;1;0;0;0;0");
//! assert_eq!(mask.wire_payload(), "11000011");
//! ```

pub mod bbtk;
pub mod bbtk_connector;
pub mod capture;
pub mod channels;
pub mod events;
pub mod sensor_config;
pub mod serial_terminal;
pub mod session_config;

#[cfg(test)]
mod mock_transport;

// Re-export the main types for convenience
pub use bbtk::{Bbtk, BbtkError, CancelToken, UnconnectedBbtk};

pub use bbtk_connector::{BbtkConnector, ConnectorError};

pub use capture::{decode_capture, write_samples_csv, CaptureDecodeError, Sample};

pub use channels::Channel;

pub use events::{extract_events, locate_edges, write_events_csv, Edges, EdgeError, Event, EventError};

pub use sensor_config::{FormatError, SmoothingMask, Thresholds};

pub use serial_terminal::{BbtkTerminal, TerminalError, Transport};

pub use session_config::{PollLimit, SessionConfig};
