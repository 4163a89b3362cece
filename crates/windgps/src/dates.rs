//! GPS date reconciliation.
//!
//! The receiver reports the date as a packed `DDMMYY` decimal. Single-field
//! bit flips are common, so a sample whose date is implausible is not thrown
//! away: its day, month and year are each re-derived from neighbouring
//! samples.

use chrono::NaiveDate;
use tracing::debug;

use crate::repair::fill_missing;

/// Split a packed decimal into its first three two-digit groups.
///
/// The value is zero padded to six digits first; wider values keep their
/// leading digits, so `1234567` splits as `(12, 34, 56)`.
#[must_use]
pub fn unpack_six(packed: u32) -> (u32, u32, u32) {
    let digits = format!("{packed:06}");
    let d = digits.as_bytes();
    let pair = |i: usize| u32::from(d[i] - b'0') * 10 + u32::from(d[i + 1] - b'0');
    (pair(0), pair(2), pair(4))
}

/// A decoded `DDMMYY` date, not yet validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedDate {
    /// Day of month.
    pub day: u32,
    /// Month of year.
    pub month: u32,
    /// Full year (`base_year` + two-digit offset).
    pub year: i32,
}

impl PackedDate {
    /// Decode a packed date relative to `base_year`.
    #[must_use]
    pub fn decode(packed: u32, base_year: i32) -> Self {
        let (day, month, offset) = unpack_six(packed);
        Self {
            day,
            month,
            // offset is at most 99
            year: base_year + i32::try_from(offset).unwrap_or(0),
        }
    }

    /// The calendar date, if the fields form one.
    #[must_use]
    pub fn to_naive_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// Per-sample calendar columns after reconciliation.
///
/// Columns are indexed by position among the kept samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledDates {
    /// Indices of the kept samples in the input sequence.
    pub kept: Vec<usize>,
    /// Day of month per kept sample.
    pub day: Vec<Option<f64>>,
    /// Month per kept sample.
    pub month: Vec<Option<f64>>,
    /// Year per kept sample.
    pub year: Vec<Option<f64>>,
    /// Number of kept samples whose date was replaced.
    pub corrupt: usize,
}

impl ReconciledDates {
    /// Number of kept samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kept.len()
    }

    /// Whether no sample was kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    /// Calendar date of kept sample `row`, fields truncated to integers.
    #[must_use]
    pub fn date(&self, row: usize) -> Option<NaiveDate> {
        let year = self.year.get(row).copied().flatten()?;
        let month = self.month.get(row).copied().flatten()?;
        let day = self.day.get(row).copied().flatten()?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (year, month, day) = (year.trunc() as i32, month.trunc() as u32, day.trunc() as u32);
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

/// Drops defective samples and repairs corrupt dates.
#[derive(Debug, Clone, Copy)]
pub struct DateReconciler {
    base_year: i32,
    expected_year: i32,
}

impl DateReconciler {
    /// Create a reconciler expecting dates in `expected_year`.
    #[must_use]
    pub fn new(base_year: i32, expected_year: i32) -> Self {
        Self {
            base_year,
            expected_year,
        }
    }

    /// Reconcile the packed dates of a sample sequence.
    ///
    /// `dates` and `times` are the packed GPS date and time per sample.
    /// Samples where either is zero are dropped. A kept sample whose year is
    /// not the expected one, or whose fields do not form a calendar date, has
    /// all three fields interpolated from its neighbours.
    #[must_use]
    pub fn reconcile(&self, dates: &[u32], times: &[u32]) -> ReconciledDates {
        let mut out = ReconciledDates::default();

        for (i, (&packed, &time)) in dates.iter().zip(times).enumerate() {
            if packed == 0 || time == 0 {
                continue;
            }
            out.kept.push(i);

            let date = PackedDate::decode(packed, self.base_year);
            if date.year == self.expected_year && date.to_naive_date().is_some() {
                out.day.push(Some(f64::from(date.day)));
                out.month.push(Some(f64::from(date.month)));
                out.year.push(Some(f64::from(date.year)));
            } else {
                out.day.push(None);
                out.month.push(None);
                out.year.push(None);
                out.corrupt += 1;
            }
        }

        let dropped = dates.len().min(times.len()) - out.kept.len();
        debug!(
            kept = out.kept.len(),
            dropped,
            corrupt = out.corrupt,
            "Reconciled GPS dates"
        );

        if out.corrupt > 0 {
            out.day = fill_missing(&out.day);
            out.month = fill_missing(&out.month);
            out.year = fill_missing(&out.year);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconciler() -> DateReconciler {
        DateReconciler::new(2000, 2021)
    }

    #[test]
    fn test_unpack_six() {
        assert_eq!(unpack_six(150_321), (15, 3, 21));
        assert_eq!(unpack_six(10_121), (1, 1, 21));
        assert_eq!(unpack_six(0), (0, 0, 0));
        assert_eq!(unpack_six(1_234_567), (12, 34, 56));
    }

    #[test]
    fn test_decode_valid_date() {
        let date = PackedDate::decode(150_321, 2000);
        assert_eq!(
            date,
            PackedDate {
                day: 15,
                month: 3,
                year: 2021
            }
        );
        assert_eq!(date.to_naive_date(), NaiveDate::from_ymd_opt(2021, 3, 15));
    }

    #[test]
    fn test_valid_date_kept() {
        let r = reconciler().reconcile(&[150_321], &[12_000_000]);
        assert_eq!(r.kept, vec![0]);
        assert_eq!(r.corrupt, 0);
        assert_eq!(r.date(0), NaiveDate::from_ymd_opt(2021, 3, 15));
    }

    #[test]
    fn test_wrong_year_interpolated() {
        let r = reconciler().reconcile(
            &[150_321, 150_399, 170_321],
            &[12_000_000, 12_000_100, 12_000_200],
        );
        assert_eq!(r.len(), 3);
        assert_eq!(r.corrupt, 1);
        assert_eq!(r.year[1], Some(2021.0));
        assert_eq!(r.month[1], Some(3.0));
        assert_eq!(r.day[1], Some(16.0));
        assert_eq!(r.date(1), NaiveDate::from_ymd_opt(2021, 3, 16));
    }

    #[test]
    fn test_zero_fields_dropped() {
        let r = reconciler().reconcile(
            &[150_321, 0, 150_321, 150_321],
            &[12_000_000, 12_000_100, 0, 12_000_300],
        );
        assert_eq!(r.kept, vec![0, 3]);
        assert_eq!(r.corrupt, 0);
    }

    #[test]
    fn test_invalid_calendar_date_interpolated() {
        let r = reconciler().reconcile(
            &[150_321, 151_321, 150_321],
            &[12_000_000, 12_000_100, 12_000_200],
        );
        assert_eq!(r.corrupt, 1);
        assert_eq!(r.date(1), NaiveDate::from_ymd_opt(2021, 3, 15));
    }

    #[test]
    fn test_trailing_corrupt_carries_forward() {
        let r = reconciler().reconcile(&[150_321, 150_399], &[12_000_000, 12_000_100]);
        assert_eq!(r.date(1), NaiveDate::from_ymd_opt(2021, 3, 15));
    }

    #[test]
    fn test_fractional_fields_truncate() {
        let r = reconciler().reconcile(
            &[150_321, 150_399, 160_321],
            &[12_000_000, 12_000_100, 12_000_200],
        );
        assert_eq!(r.day[1], Some(15.5));
        assert_eq!(r.date(1), NaiveDate::from_ymd_opt(2021, 3, 15));
    }

    #[test]
    fn test_all_corrupt_has_no_date() {
        let r = reconciler().reconcile(&[150_399, 150_398], &[1, 1]);
        assert_eq!(r.corrupt, 2);
        assert!(r.date(0).is_none());
        assert!(r.date(1).is_none());
    }

    #[test]
    fn test_empty() {
        let r = reconciler().reconcile(&[], &[]);
        assert!(r.is_empty());
    }
}
