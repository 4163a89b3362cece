//! Batch processing of one capture session.
//!
//! Decodes an ordered file set, repairs the millisecond counter, reconciles
//! dates, fits the clock and extracts wind values into a [`Dataset`].

use std::path::Path;

use chrono::DateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::{timeline, ClockFit, ClockFitter};
use crate::codec::layout::LayoutDiscoverer;
use crate::codec::stream::{BlockStreamDecoder, DecodedCapture, FileStats};
use crate::codec::{BlockGeometry, RecordCodec};
use crate::config::Config;
use crate::dates::DateReconciler;
use crate::error::Result;
use crate::repair::repair_millis;
use crate::wind::WindExtractor;

/// Suffix of a run label.
const LABEL_SUFFIX: &str = "windgps_data";

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Repaired local millisecond counter.
    pub local_millis: u32,
    /// Latitude in degrees.
    pub latitude: f32,
    /// Longitude in degrees.
    pub longitude: f32,
    /// Reconstructed UTC epoch seconds.
    pub epoch_seconds: f64,
    /// One value per wind key, in key order.
    pub wind: Vec<Option<f64>>,
}

/// The reconstructed timeline of a capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// `YYYYMMDD_HHMMSS_windgps_data` from the first row, if it has a valid time.
    pub label: Option<String>,
    /// Hash identifying the input files and their order.
    pub source_hash: String,
    /// Per-file decode statistics.
    pub files: Vec<FileStats>,
    /// Geometry discovered on the first file.
    pub geometry: BlockGeometry,
    /// Records decoded before any were dropped.
    pub records_decoded: usize,
    /// Kept records whose date was repaired.
    pub dates_repaired: usize,
    /// The fitted clock.
    pub clock: ClockFit,
    /// Wind keys, in column order.
    pub wind_keys: Vec<String>,
    /// Output rows in capture order.
    pub rows: Vec<Sample>,
}

impl Dataset {
    /// Summary of the run.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            label: self.label.clone(),
            files: self.files.len(),
            geometry: self.geometry,
            records_decoded: self.records_decoded,
            records_dropped: self.records_decoded - self.rows.len(),
            dates_repaired: self.dates_repaired,
            anchors: self.clock.anchor_count,
            inliers: self.clock.inliers.len(),
            slope: self.clock.model.slope,
            intercept: self.clock.model.intercept,
            rows: self.rows.len(),
        }
    }
}

/// Counts and clock parameters of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Run label.
    pub label: Option<String>,
    /// Files processed.
    pub files: usize,
    /// Block geometry.
    pub geometry: BlockGeometry,
    /// Records decoded.
    pub records_decoded: usize,
    /// Records dropped for a zero date or time.
    pub records_dropped: usize,
    /// Kept records whose date was repaired.
    pub dates_repaired: usize,
    /// GPS anchors found.
    pub anchors: usize,
    /// Anchors kept by outlier rejection.
    pub inliers: usize,
    /// Seconds per local tick.
    pub slope: f64,
    /// Epoch seconds at local tick zero.
    pub intercept: f64,
    /// Rows emitted.
    pub rows: usize,
}

/// Run label for a row at `epoch_seconds`.
///
/// The time is rounded to the millisecond tick before the seconds are taken.
#[must_use]
pub fn run_label(epoch_seconds: f64) -> Option<String> {
    if !epoch_seconds.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = (epoch_seconds * 1000.0).round() as i64;
    DateTime::from_timestamp(millis.div_euclid(1000), 0)
        .map(|t| format!("{}_{LABEL_SUFFIX}", t.format("%Y%m%d_%H%M%S")))
}

/// The configured processing stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    decoder: BlockStreamDecoder,
    dates: DateReconciler,
    fitter: ClockFitter,
    wind: WindExtractor,
}

impl Pipeline {
    /// Assemble a pipeline from its stages.
    #[must_use]
    pub fn new(
        decoder: BlockStreamDecoder,
        dates: DateReconciler,
        fitter: ClockFitter,
        wind: WindExtractor,
    ) -> Self {
        Self {
            decoder,
            dates,
            fitter,
            wind,
        }
    }

    /// Build a pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error if no expected year is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let codec = RecordCodec::new(config.layout.wind_text_len);
        let decoder = BlockStreamDecoder::new(
            codec,
            LayoutDiscoverer::new(codec, config.layout.max_attempts),
            config.layout.nominal_geometry(),
            config.layout.revalidate_per_file,
        );
        Ok(Self::new(
            decoder,
            DateReconciler::new(config.clock.base_year, config.expected_year()?),
            ClockFitter::new(config.clock.ransac()),
            WindExtractor::new(config.wind.keys.clone()),
        ))
    }

    /// Decode and process an ordered file set.
    ///
    /// # Errors
    ///
    /// Propagates decode errors and clock fit errors; any error aborts the run.
    pub fn run<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Dataset> {
        let capture = self.decoder.decode_files(paths)?;
        self.process(capture)
    }

    /// Process already decoded records.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InsufficientAnchors`] or
    /// [`crate::Error::DegenerateAnchors`] if the clock cannot be fitted.
    pub fn process(&self, capture: DecodedCapture) -> Result<Dataset> {
        let DecodedCapture {
            geometry,
            records,
            files,
            source_hash,
        } = capture;

        let millis: Vec<u32> = records.iter().map(|r| r.local_millis).collect();
        let millis = repair_millis(&millis);

        let packed_dates: Vec<u32> = records.iter().map(|r| r.gps_date_packed).collect();
        let packed_times: Vec<u32> = records.iter().map(|r| r.gps_time_packed).collect();
        let dates = self.dates.reconcile(&packed_dates, &packed_times);
        if dates.corrupt > 0 {
            warn!(corrupt = dates.corrupt, "Repaired corrupt GPS dates");
        }

        let kept_millis: Vec<u32> = dates.kept.iter().map(|&i| millis[i]).collect();
        let kept_times: Vec<u32> = dates.kept.iter().map(|&i| packed_times[i]).collect();
        let anchors = timeline(&kept_millis, &kept_times, |row| dates.date(row));
        let clock = self.fitter.fit(&anchors)?;

        let rows: Vec<Sample> = dates
            .kept
            .iter()
            .zip(&kept_millis)
            .map(|(&i, &local_millis)| {
                let record = &records[i];
                Sample {
                    local_millis,
                    latitude: record.latitude,
                    longitude: record.longitude,
                    epoch_seconds: clock.model.apply(f64::from(local_millis)),
                    wind: self.wind.extract(&record.wind_text),
                }
            })
            .collect();

        let label = rows.first().and_then(|r| run_label(r.epoch_seconds));
        info!(
            rows = rows.len(),
            label = label.as_deref().unwrap_or("-"),
            "Processed capture"
        );

        Ok(Dataset {
            label,
            source_hash,
            files,
            geometry,
            records_decoded: records.len(),
            dates_repaired: dates.corrupt,
            clock,
            wind_keys: self.wind.keys().to_vec(),
            rows,
        })
    }
}
