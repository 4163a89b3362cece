//! Wind sensor text parsing.
//!
//! The anemometer writes `label value label value ...` as ASCII into a fixed
//! width buffer, NUL padded.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default wind keys extracted per sample.
pub const DEFAULT_KEYS: [&str; 2] = ["S2", "D"];

/// Named numeric values from one wind text buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindSample {
    values: BTreeMap<String, f64>,
}

impl WindSample {
    /// Parse a raw wind text buffer.
    ///
    /// Duplicate labels keep the last value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldDecodeFailure`] for an odd token count, a label
    /// that is not UTF-8 or a value that is not a number.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = raw.trim_ascii();
        let text = text
            .iter()
            .position(|&b| b == 0)
            .map_or(text, |nul| &text[..nul])
            .trim_ascii();

        let tokens: Vec<&[u8]> = text.split(|&b| b == b' ').filter(|t| !t.is_empty()).collect();
        if tokens.len() % 2 != 0 {
            return Err(Error::field_decode(
                "wind",
                format!("odd token count {}", tokens.len()),
            ));
        }

        let mut values = BTreeMap::new();
        for pair in tokens.chunks_exact(2) {
            let label = std::str::from_utf8(pair[0])
                .map_err(|e| Error::field_decode("wind", format!("label is not UTF-8: {e}")))?;
            let value = std::str::from_utf8(pair[1])
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| {
                    Error::field_decode(
                        "wind",
                        format!(
                            "value for '{label}' is not a number: {}",
                            String::from_utf8_lossy(pair[1])
                        ),
                    )
                })?;
            values.insert(label.to_string(), value);
        }

        Ok(Self { values })
    }

    /// Value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Number of labelled values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the text held no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Extracts configured keys from wind text, degrading failures to missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindExtractor {
    keys: Vec<String>,
}

impl Default for WindExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KEYS.iter().map(ToString::to_string).collect())
    }
}

impl WindExtractor {
    /// Create an extractor for `keys`, in output column order.
    #[must_use]
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// The configured keys.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// One value per key for a record. A malformed buffer yields all missing.
    #[must_use]
    pub fn extract(&self, raw: &[u8]) -> Vec<Option<f64>> {
        match WindSample::parse(raw) {
            Ok(sample) => self.keys.iter().map(|k| sample.get(k)).collect(),
            Err(e) if e.is_recoverable() => {
                debug!(error = %e, "Wind text unreadable, values missing");
                vec![None; self.keys.len()]
            }
            Err(e) => {
                warn!(error = %e, "Unexpected wind parse failure, values missing");
                vec![None; self.keys.len()]
            }
        }
    }
}
