//! Local millisecond counter repair.
//!
//! The logger's millisecond counter should never step backwards. When it does
//! (a reset or an overflow glitch), the sample after the step is treated as
//! missing and refilled from its neighbours.

use tracing::debug;

/// Fill missing values by linear interpolation on array position.
///
/// Interior gaps are interpolated between the nearest valid neighbours. A
/// trailing gap carries the last valid value forward and a leading gap carries
/// the first valid value backward. An all-missing column stays missing.
#[must_use]
pub fn fill_missing(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let valid: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();

    let (Some(&first), Some(&last)) = (valid.first(), valid.last()) else {
        return out;
    };

    for slot in &mut out[..first] {
        *slot = values[first];
    }
    for slot in &mut out[last + 1..] {
        *slot = values[last];
    }

    for pair in valid.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if hi - lo < 2 {
            continue;
        }
        let (Some(y0), Some(y1)) = (values[lo], values[hi]) else {
            continue;
        };
        #[allow(clippy::cast_precision_loss)]
        let span = (hi - lo) as f64;
        for (k, slot) in out[lo + 1..hi].iter_mut().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let step = (k + 1) as f64;
            *slot = Some(y0 + (y1 - y0) * step / span);
        }
    }

    out
}

/// Repair backward jumps in the local millisecond counter.
///
/// Index `i + 1` is marked missing whenever `millis[i + 1] < millis[i]` in the
/// original sequence; missing values are then filled with [`fill_missing`]
/// and truncated back to whole ticks.
#[must_use]
pub fn repair_millis(millis: &[u32]) -> Vec<u32> {
    let mut column: Vec<Option<f64>> = millis.iter().map(|&m| Some(f64::from(m))).collect();

    let mut flagged = 0;
    for (i, pair) in millis.windows(2).enumerate() {
        if i64::from(pair[1]) < i64::from(pair[0]) {
            column[i + 1] = None;
            flagged += 1;
        }
    }

    if flagged == 0 {
        return millis.to_vec();
    }
    debug!(flagged, "Repairing backward steps in millisecond counter");

    fill_missing(&column)
        .into_iter()
        .zip(millis)
        .map(|(v, &orig)| v.map_or(orig, quantize))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize(value: f64) -> u32 {
    value.trunc().clamp(0.0, f64::from(u32::MAX)) as u32
}
