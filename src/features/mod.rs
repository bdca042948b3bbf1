//! Rolling-window statistical feature extraction from voltage readings.

mod window;
mod extractor;

pub use extractor::{FeatureExtractor, WindowSnapshot};
pub use window::RollingWindow;

use serde::{Deserialize, Serialize};

/// Features computed over the current window, recomputed fresh per reading.
/// Every field is zero-filled when the underlying quantity is undefined
/// (empty buffer, zero variance, too few samples).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    // Statistical
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub median: f64,
    pub q25: f64,
    pub q75: f64,
    pub iqr: f64,
    pub skewness: f64,
    /// Excess kurtosis (fourth standardized moment minus 3)
    pub kurtosis: f64,
    /// Coefficient of variation, std / mean
    pub cv: f64,
    /// Sign changes of the mean-centered window
    pub zero_crossings: u32,
    /// Strict local maxima (three-point test)
    pub peak_count: u32,
    // Temporal
    pub time_span: f64,
    /// 1 / mean consecutive timestamp delta
    pub sampling_rate: f64,
    pub time_since_start: f64,
    pub avg_interval: f64,
    // Current reading
    pub value: f64,
    pub timestamp: f64,
    // Bookkeeping
    pub sample_count: u64,
    pub buffer_size: usize,
    pub window_full: bool,
}
