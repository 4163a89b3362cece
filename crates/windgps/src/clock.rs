//! Clock reconciliation between the local millisecond counter and GPS time.
//!
//! The GPS receiver repeats its last fix until a new one arrives, so only
//! samples where the decoded GPS time has just advanced by one second are
//! trusted as anchors. A robust line fit over those anchors maps local ticks
//! to UTC epoch seconds.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::dates::unpack_six;
use crate::error::{Error, Result};

/// Default inlier residual threshold in seconds.
pub const DEFAULT_RESIDUAL_THRESHOLD: f64 = 0.08;

/// Default number of candidate lines tried.
pub const DEFAULT_MAX_TRIALS: usize = 100;

/// Decoded GPS time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsTime {
    /// `HHMMSS` as one integer, hundredths removed.
    pub hhmmss: u32,
    /// Hour of day.
    pub hour: u32,
    /// Minute of hour.
    pub minute: u32,
    /// Second of minute.
    pub second: u32,
}

impl GpsTime {
    /// Decode a packed `HHMMSScc` time.
    #[must_use]
    pub fn decode(packed: u32) -> Self {
        let hhmmss = packed / 100;
        let (hour, minute, second) = unpack_six(hhmmss);
        Self {
            hhmmss,
            hour,
            minute,
            second,
        }
    }
}

/// A trusted (local tick, UTC epoch) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    /// Local millisecond counter.
    pub local_millis: f64,
    /// UTC epoch seconds.
    pub epoch_seconds: f64,
}

impl AnchorPoint {
    /// Create an anchor point.
    #[must_use]
    pub fn new(local_millis: f64, epoch_seconds: f64) -> Self {
        Self {
            local_millis,
            epoch_seconds,
        }
    }
}

/// Linear map from local ticks to UTC epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockModel {
    /// Seconds per local tick.
    pub slope: f64,
    /// Epoch seconds at local tick zero.
    pub intercept: f64,
}

impl ClockModel {
    /// Epoch seconds for a local tick.
    #[must_use]
    pub fn apply(&self, local_millis: f64) -> f64 {
        self.slope * local_millis + self.intercept
    }

    /// Absolute residual of `point` against the model.
    #[must_use]
    pub fn residual(&self, point: &AnchorPoint) -> f64 {
        (point.epoch_seconds - self.apply(point.local_millis)).abs()
    }

    /// The line through two points, or `None` if they share a local tick.
    #[must_use]
    pub fn through(a: &AnchorPoint, b: &AnchorPoint) -> Option<Self> {
        let dx = b.local_millis - a.local_millis;
        if dx == 0.0 {
            return None;
        }
        let slope = (b.epoch_seconds - a.epoch_seconds) / dx;
        Some(Self {
            slope,
            intercept: a.epoch_seconds - slope * a.local_millis,
        })
    }
}

/// Build the anchor timeline.
///
/// `millis` and `times` are per-sample local ticks and packed GPS times;
/// `date_of(i)` gives the reconciled calendar date of sample `i`. A sample is
/// an anchor when its decoded `HHMMSS` is exactly one more than the previous
/// sample's. Anchors whose date or time do not form a valid UTC instant are
/// skipped.
pub fn timeline(
    millis: &[u32],
    times: &[u32],
    date_of: impl Fn(usize) -> Option<NaiveDate>,
) -> Vec<AnchorPoint> {
    let decoded: Vec<GpsTime> = times.iter().map(|&t| GpsTime::decode(t)).collect();
    let mut anchors = Vec::new();
    let mut skipped = 0usize;

    for i in 1..decoded.len().min(millis.len()) {
        if i64::from(decoded[i].hhmmss) - i64::from(decoded[i - 1].hhmmss) != 1 {
            continue;
        }
        let t = decoded[i];
        let instant = date_of(i)
            .and_then(|d| d.and_hms_opt(t.hour, t.minute, t.second))
            .map(|dt| dt.and_utc().timestamp());
        let Some(epoch) = instant else {
            trace!(sample = i, time = t.hhmmss, "Skipping anchor without a valid UTC instant");
            skipped += 1;
            continue;
        };
        #[allow(clippy::cast_precision_loss)]
        let epoch = epoch as f64;
        anchors.push(AnchorPoint::new(f64::from(millis[i]), epoch));
    }

    debug!(anchors = anchors.len(), skipped, "Collected GPS anchors");
    anchors
}

/// Parameters of the robust line search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RansacConfig {
    /// Largest absolute residual, in seconds, of an inlier.
    pub residual_threshold: f64,
    /// Number of candidate lines to try.
    pub max_trials: usize,
    /// Seed of the candidate sampler.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            residual_threshold: DEFAULT_RESIDUAL_THRESHOLD,
            max_trials: DEFAULT_MAX_TRIALS,
            seed: 0,
        }
    }
}

/// Indices of the points consistent with the best two-point candidate line.
///
/// Candidates are lines through two anchors. When there are no more distinct
/// pairs than `max_trials`, every pair is tried; otherwise pairs are drawn
/// from a generator seeded with `config.seed`. The candidate with the most
/// points within `residual_threshold` wins, ties going to the smaller summed
/// residual. The returned indices are ascending.
///
/// # Errors
///
/// Returns [`Error::InsufficientAnchors`] for fewer than two points and
/// [`Error::DegenerateAnchors`] if every point has the same local tick.
pub fn robust_inlier_mask(points: &[AnchorPoint], config: &RansacConfig) -> Result<Vec<usize>> {
    let n = points.len();
    if n < 2 {
        return Err(Error::InsufficientAnchors { found: n });
    }

    let mut best: Option<(usize, f64, ClockModel)> = None;
    let mut consider = |a: usize, b: usize| {
        let Some(model) = ClockModel::through(&points[a], &points[b]) else {
            return;
        };
        let (count, spread) = points
            .iter()
            .map(|p| model.residual(p))
            .filter(|r| *r <= config.residual_threshold)
            .fold((0usize, 0.0f64), |(c, s), r| (c + 1, s + r));
        let better = match best {
            None => true,
            Some((best_count, best_spread, _)) => {
                count > best_count || (count == best_count && spread < best_spread)
            }
        };
        if better {
            best = Some((count, spread, model));
        }
    };

    let pairs = n * (n - 1) / 2;
    if pairs <= config.max_trials {
        for a in 0..n {
            for b in a + 1..n {
                consider(a, b);
            }
        }
    } else {
        let mut rng = StdRng::seed_from_u64(config.seed);
        for _ in 0..config.max_trials {
            let a = rng.random_range(0..n);
            let mut b = rng.random_range(0..n - 1);
            if b >= a {
                b += 1;
            }
            consider(a, b);
        }
    }

    let Some((count, _, model)) = best else {
        return Err(Error::DegenerateAnchors { count: n });
    };
    trace!(inliers = count, slope = model.slope, "Best candidate line");

    Ok(points
        .iter()
        .enumerate()
        .filter(|(_, p)| model.residual(p) <= config.residual_threshold)
        .map(|(i, _)| i)
        .collect())
}

/// Ordinary least-squares line through `points`.
///
/// # Errors
///
/// Returns [`Error::InsufficientAnchors`] for fewer than two points and
/// [`Error::DegenerateAnchors`] if every point has the same local tick.
pub fn fit_line(points: &[AnchorPoint]) -> Result<ClockModel> {
    if points.len() < 2 {
        return Err(Error::InsufficientAnchors {
            found: points.len(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.local_millis).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.epoch_seconds).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), p| {
        let dx = p.local_millis - mean_x;
        let dy = p.epoch_seconds - mean_y;
        (sxx + dx * dx, sxy + dx * dy)
    });

    if sxx == 0.0 {
        return Err(Error::DegenerateAnchors {
            count: points.len(),
        });
    }

    let slope = sxy / sxx;
    Ok(ClockModel {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Outcome of a clock fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockFit {
    /// The fitted model.
    pub model: ClockModel,
    /// Number of anchors offered to the fit.
    pub anchor_count: usize,
    /// Indices of the anchors kept by outlier rejection.
    pub inliers: Vec<usize>,
}

/// Fits a [`ClockModel`] robust to outlier GPS fixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockFitter {
    config: RansacConfig,
}

impl ClockFitter {
    /// Create a fitter.
    #[must_use]
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    /// Reject outliers, then refit on the inliers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientAnchors`] or [`Error::DegenerateAnchors`]
    /// when no line can be defined.
    pub fn fit(&self, anchors: &[AnchorPoint]) -> Result<ClockFit> {
        let inliers = robust_inlier_mask(anchors, &self.config)?;
        let kept: Vec<AnchorPoint> = inliers.iter().map(|&i| anchors[i]).collect();
        let model = fit_line(&kept)?;

        info!(
            anchors = anchors.len(),
            inliers = inliers.len(),
            slope = model.slope,
            intercept = model.intercept,
            "Fitted clock model"
        );

        Ok(ClockFit {
            model,
            anchor_count: anchors.len(),
            inliers,
        })
    }
}
