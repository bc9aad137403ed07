//! Probability calibration: Platt scaling, temperature scaling, isotonic
//! regression, plus the calibration-quality metrics (ECE, MCE, Brier score)
//! used to decide whether a predictor's confidence values are trustworthy.

/// Sigmoid, shared by Platt and temperature scaling.
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Platt scaling: `sigmoid(a * logit + b)`. `a`/`b` are fit offline (outside
/// this crate's scope) and passed in here.
pub fn platt_scale(logit: f64, a: f64, b: f64) -> f64 {
    sigmoid(a * logit + b)
}

/// Temperature scaling: `sigmoid(logit / temperature)`. `temperature > 1`
/// softens overconfident predictions.
pub fn temperature_scale(logit: f64, temperature: f64) -> f64 {
    sigmoid(logit / temperature.max(1e-9))
}

/// A monotonic step function fit via pool-adjacent-violators (PAVA),
/// mapping raw scores to calibrated probabilities.
pub struct IsotonicRegression {
    /// `(x, y)` breakpoints, sorted ascending by `x`, `y` non-decreasing.
    breakpoints: Vec<(f64, f64)>,
}

impl IsotonicRegression {
    /// Fit from `(raw_score, observed_outcome)` pairs. `observed_outcome`
    /// is typically 0.0/1.0 but any ordered real is accepted.
    pub fn fit(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        // Pool-adjacent-violators: maintain a stack of (sum_y, count, x)
        // blocks; merge the top two whenever the pooled means would
        // violate monotonicity.
        let mut blocks: Vec<(f64, f64, usize)> = Vec::new(); // (x_last, sum_y, count)
        for (x, y) in pairs {
            blocks.push((x, y, 1));
            while blocks.len() >= 2 {
                let n = blocks.len();
                let (_, sum_b, count_b) = blocks[n - 1];
                let (_, sum_a, count_a) = blocks[n - 2];
                let mean_a = sum_a / count_a as f64;
                let mean_b = sum_b / count_b as f64;
                if mean_a > mean_b {
                    let merged_x = blocks[n - 1].0;
                    let merged_sum = sum_a + sum_b;
                    let merged_count = count_a + count_b;
                    blocks.truncate(n - 2);
                    blocks.push((merged_x, merged_sum, merged_count));
                } else {
                    break;
                }
            }
        }

        let breakpoints = blocks.into_iter().map(|(x, sum, count)| (x, sum / count as f64)).collect();
        Self { breakpoints }
    }

    /// Calibrated probability for `raw_score`: the value at the nearest
    /// breakpoint not greater than `raw_score`, or the first breakpoint's
    /// value if `raw_score` precedes everything seen during fitting.
    pub fn apply(&self, raw_score: f64) -> f64 {
        match self.breakpoints.partition_point(|(x, _)| *x <= raw_score) {
            0 => self.breakpoints.first().map(|(_, y)| *y).unwrap_or(0.0),
            idx => self.breakpoints[idx - 1].1,
        }
    }
}

/// One (predicted probability, actual binary outcome) pair feeding a
/// calibration metric.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationSample {
    pub predicted: f64,
    pub actual: f64,
}

/// Expected Calibration Error: bucket predictions into `bin_count` equal-
/// width bins over `[0,1]`, then take the sample-weighted average gap
/// between each bin's mean prediction and its observed accuracy.
pub fn expected_calibration_error(samples: &[CalibrationSample], bin_count: usize) -> f64 {
    if samples.is_empty() || bin_count == 0 {
        return 0.0;
    }
    let bins = bucket(samples, bin_count);
    let total = samples.len() as f64;
    bins.iter()
        .filter(|b| b.count > 0)
        .map(|b| (b.count as f64 / total) * (b.mean_predicted - b.mean_actual).abs())
        .sum()
}

/// Maximum Calibration Error: the single worst bin gap, rather than the
/// weighted average ECE gives.
pub fn max_calibration_error(samples: &[CalibrationSample], bin_count: usize) -> f64 {
    if samples.is_empty() || bin_count == 0 {
        return 0.0;
    }
    bucket(samples, bin_count)
        .iter()
        .filter(|b| b.count > 0)
        .map(|b| (b.mean_predicted - b.mean_actual).abs())
        .fold(0.0, f64::max)
}

/// Brier score: mean squared error between predicted probability and
/// observed binary outcome. Lower is better; 0 is perfect.
pub fn brier_score(samples: &[CalibrationSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| (s.predicted - s.actual).powi(2)).sum::<f64>() / samples.len() as f64
}

/// A predictor is considered well-calibrated when its Expected Calibration
/// Error stays under 0.1.
pub fn is_well_calibrated(samples: &[CalibrationSample], bin_count: usize) -> bool {
    expected_calibration_error(samples, bin_count) < 0.1
}

struct Bin {
    mean_predicted: f64,
    mean_actual: f64,
    count: usize,
}

fn bucket(samples: &[CalibrationSample], bin_count: usize) -> Vec<Bin> {
    let mut sums = vec![(0.0_f64, 0.0_f64, 0_usize); bin_count];
    for sample in samples {
        let idx = ((sample.predicted.clamp(0.0, 1.0)) * bin_count as f64).floor() as usize;
        let idx = idx.min(bin_count - 1);
        sums[idx].0 += sample.predicted;
        sums[idx].1 += sample.actual;
        sums[idx].2 += 1;
    }
    sums.into_iter()
        .map(|(sum_p, sum_a, count)| Bin {
            mean_predicted: if count > 0 { sum_p / count as f64 } else { 0.0 },
            mean_actual: if count > 0 { sum_a / count as f64 } else { 0.0 },
            count,
        })
        .collect()
}
