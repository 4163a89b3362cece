//! Block geometry discovery.
//!
//! The logger firmware does not record its padding length, and the nominal
//! values users know are often off by a few bytes. Every block header carries
//! the same record count when the geometry is right; any padding error makes
//! block boundaries drift into record or fill bytes, so the headers read at the
//! drifted offsets disagree. Discovery searches padding lengths upward from the
//! nominal seed until the headers agree.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{BlockGeometry, RecordCodec};
use crate::error::{Error, Result};

/// Default bound on candidate geometries tried per file.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// Result of a successful discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscoveredLayout {
    /// The validated geometry.
    pub geometry: BlockGeometry,
    /// Candidate geometries tried, including the accepted one.
    pub attempts: u32,
    /// Number of complete blocks in the file.
    pub block_count: usize,
    /// Bytes after the last complete block.
    pub trailing_bytes: usize,
}

/// Finds the true block geometry of a capture file.
#[derive(Debug, Clone, Copy)]
pub struct LayoutDiscoverer {
    codec: RecordCodec,
    max_attempts: u32,
}

impl LayoutDiscoverer {
    /// Create a discoverer for records of `codec`'s width.
    #[must_use]
    pub fn new(codec: RecordCodec, max_attempts: u32) -> Self {
        Self {
            codec,
            max_attempts,
        }
    }

    /// Discover the geometry of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the file cannot be read, otherwise as
    /// [`LayoutDiscoverer::discover`].
    pub fn discover_file(
        &self,
        path: impl AsRef<Path>,
        nominal: BlockGeometry,
    ) -> Result<DiscoveredLayout> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), len = bytes.len(), "Discovering block layout");
        self.discover(&bytes, nominal)
    }

    /// Discover the geometry of an in-memory capture.
    ///
    /// The record count is taken from the first block header; padding is then
    /// increased one byte at a time from `nominal.padding_bytes` until the
    /// header count is identical in every block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TruncatedInput`] if `bytes` holds less than one block
    /// under `nominal`, and [`Error::LayoutNotFound`] if no candidate within
    /// the attempt bound yields consistent headers.
    pub fn discover(&self, bytes: &[u8], nominal: BlockGeometry) -> Result<DiscoveredLayout> {
        let needed = self.codec.block_size(nominal);
        if bytes.len() < needed {
            return Err(Error::TruncatedInput {
                needed,
                available: bytes.len(),
            });
        }

        let header_count = RecordCodec::header_at(bytes, 0).unwrap_or(0);
        if header_count == 0 {
            warn!("First block header holds a zero record count");
            return Err(Error::LayoutNotFound {
                attempts: 0,
                last_padding: nominal.padding_bytes,
            });
        }

        let mut geometry = nominal;
        if header_count != nominal.records_per_block {
            debug!(
                nominal = nominal.records_per_block,
                header = header_count,
                "Correcting records per block from first block header"
            );
            geometry = geometry.with_records_per_block(header_count);
        }

        for attempt in 1..=self.max_attempts {
            let headers = self.header_counts(bytes, geometry);
            if headers.is_empty() {
                trace!(padding = geometry.padding_bytes, "No complete block fits");
            } else {
                let spread = population_std_dev(&headers);
                trace!(
                    padding = geometry.padding_bytes,
                    blocks = headers.len(),
                    spread,
                    "Tried block layout"
                );
                if spread == 0.0 {
                    if headers.len() == 1 {
                        warn!("Only one block in file; layout cannot be cross-checked");
                    }
                    let block_size = self.codec.block_size(geometry);
                    debug!(%geometry, attempts = attempt, "Block layout found");
                    return Ok(DiscoveredLayout {
                        geometry,
                        attempts: attempt,
                        block_count: headers.len(),
                        trailing_bytes: bytes.len() % block_size,
                    });
                }
            }

            if attempt == self.max_attempts {
                break;
            }
            let Some(padding) = geometry.padding_bytes.checked_add(1) else {
                break;
            };
            geometry = geometry.with_padding_bytes(padding);
        }

        Err(Error::LayoutNotFound {
            attempts: self.max_attempts,
            last_padding: geometry.padding_bytes,
        })
    }

    /// Header count of every complete block under `geometry`.
    fn header_counts(&self, bytes: &[u8], geometry: BlockGeometry) -> Vec<u32> {
        let block_size = self.codec.block_size(geometry);
        let blocks = bytes.len() / block_size;
        (0..blocks)
            .filter_map(|i| RecordCodec::header_at(bytes, i * block_size))
            .collect()
    }
}

/// Population standard deviation of `values`.
///
/// Zero exactly when every value is equal.
#[must_use]
pub fn population_std_dev(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}
