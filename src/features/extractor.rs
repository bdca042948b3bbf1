//! Feature computation over the rolling window. Extraction never fails the
//! pipeline: undefined quantities (empty buffer, zero variance, too few
//! samples) come back as 0 instead of propagating.

use super::{FeatureSet, RollingWindow};
use serde::Serialize;

pub struct FeatureExtractor {
    window: RollingWindow,
    sample_count: u64,
    start_time: Option<f64>,
}

/// Raw window contents for inspection and event payloads.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub values: Vec<f64>,
    pub timestamps: Vec<f64>,
    pub window_size: usize,
    pub current_size: usize,
    pub sample_count: u64,
    pub is_full: bool,
}

impl FeatureExtractor {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: RollingWindow::new(window_size),
            sample_count: 0,
            start_time: None,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.capacity()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Ingest one reading and compute the full feature set for the
    /// resulting window. Out-of-order timestamps are accepted; they only
    /// degrade the temporal features.
    pub fn process(&mut self, value: f64, timestamp: f64) -> FeatureSet {
        if self.start_time.is_none() {
            self.start_time = Some(timestamp);
        }
        self.window.push(value, timestamp);
        self.sample_count += 1;

        let values = self.window.values();
        let timestamps = self.window.timestamps();

        let mut features = statistical_features(&values);
        temporal_features(&timestamps, self.start_time, &mut features);

        features.value = value;
        features.timestamp = timestamp;
        features.sample_count = self.sample_count;
        features.buffer_size = self.window.len();
        features.window_full = self.window.is_full();
        features
    }

    /// Clear buffer, sample count, and start time; the next reading
    /// behaves like the first ever seen.
    pub fn reset(&mut self) {
        self.window.clear();
        self.sample_count = 0;
        self.start_time = None;
    }

    /// Resize the window, keeping the most recent readings.
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window.set_capacity(window_size);
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            values: self.window.values(),
            timestamps: self.window.timestamps(),
            window_size: self.window.capacity(),
            current_size: self.window.len(),
            sample_count: self.sample_count,
            is_full: self.window.is_full(),
        }
    }
}

fn statistical_features(values: &[f64]) -> FeatureSet {
    let mut f = FeatureSet::default();
    if values.is_empty() {
        return f;
    }

    let mean = mean(values);
    let std_dev = population_std(values, mean);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    f.mean = mean;
    f.std_dev = std_dev;
    f.min = min;
    f.max = max;
    f.range = max - min;
    f.median = percentile(&sorted, 50.0);
    f.q25 = percentile(&sorted, 25.0);
    f.q75 = percentile(&sorted, 75.0);
    f.iqr = f.q75 - f.q25;
    f.skewness = skewness(values, mean, std_dev);
    f.kurtosis = excess_kurtosis(values, mean, std_dev);
    f.cv = if mean != 0.0 { std_dev / mean } else { 0.0 };
    f.zero_crossings = zero_crossings(values, mean);
    f.peak_count = count_peaks(values);
    f
}

fn temporal_features(timestamps: &[f64], start_time: Option<f64>, f: &mut FeatureSet) {
    let start = start_time.unwrap_or(0.0);
    if timestamps.len() < 2 {
        f.time_since_start = match (timestamps.first(), start_time) {
            (Some(ts), Some(start)) => ts - start,
            _ => 0.0,
        };
        return;
    }

    let first = timestamps[0];
    let last = timestamps[timestamps.len() - 1];
    let avg_delta = mean(
        &timestamps
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect::<Vec<f64>>(),
    );

    f.time_span = last - first;
    f.sampling_rate = if avg_delta > 0.0 { 1.0 / avg_delta } else { 0.0 };
    f.time_since_start = last - start;
    f.avg_interval = avg_delta;
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Linear-interpolated percentile over pre-sorted data.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Third standardized moment; 0 for short or constant windows.
fn skewness(values: &[f64], mean: f64, std_dev: f64) -> f64 {
    if values.len() < 3 || std_dev == 0.0 {
        return 0.0;
    }
    values
        .iter()
        .map(|v| ((v - mean) / std_dev).powi(3))
        .sum::<f64>()
        / values.len() as f64
}

/// Fourth standardized moment minus 3; 0 for short or constant windows.
fn excess_kurtosis(values: &[f64], mean: f64, std_dev: f64) -> f64 {
    if values.len() < 4 || std_dev == 0.0 {
        return 0.0;
    }
    values
        .iter()
        .map(|v| ((v - mean) / std_dev).powi(4))
        .sum::<f64>()
        / values.len() as f64
        - 3.0
}

/// Sign changes across the mean-centered window.
fn zero_crossings(values: &[f64], mean: f64) -> u32 {
    if values.len() < 2 {
        return 0;
    }
    let sign = |v: f64| -> i8 {
        let c = v - mean;
        if c > 0.0 {
            1
        } else if c < 0.0 {
            -1
        } else {
            0
        }
    };
    values
        .windows(2)
        .filter(|w| sign(w[0]) != sign(w[1]))
        .count() as u32
}

/// Strict local maxima: higher than both immediate neighbors.
fn count_peaks(values: &[f64]) -> u32 {
    if values.len() < 3 {
        return 0;
    }
    values
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] > w[2])
        .count() as u32
}
