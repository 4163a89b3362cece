//! `windgps` - Decode wind/GPS logger captures and reconstruct a UTC timeline
//!
//! This library decodes the fixed-size binary blocks written by a wind/GPS
//! logger, recovers the block layout when it is only approximately known,
//! repairs counter and date glitches, and fits the logger's local millisecond
//! clock to GPS time.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod codec;
pub mod config;
pub mod dates;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod repair;
pub mod storage;
pub mod wind;

pub use clock::{AnchorPoint, ClockFit, ClockFitter, ClockModel, RansacConfig};
pub use codec::layout::{DiscoveredLayout, LayoutDiscoverer};
pub use codec::stream::BlockStreamDecoder;
pub use codec::{BlockGeometry, RawBlock, Record, RecordCodec};
pub use config::Config;
pub use dates::DateReconciler;
pub use discovery::find_log_files;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use pipeline::{Dataset, Pipeline, RunSummary, Sample};
pub use repair::repair_millis;
pub use storage::{RunRecord, Storage, StoredSample};
pub use wind::{WindExtractor, WindSample};
