//! Simulated sensor: sine carrier with noise and occasional spike bursts,
//! emitted as numeric text lines like the real device would produce.

use super::{ReadingSource, SourceError};
use rand::Rng;

pub struct SimulatedSource {
    /// Samples emitted so far, drives the carrier phase
    tick: u64,
    /// Base voltage level
    baseline: f64,
    /// Carrier amplitude
    amplitude: f64,
    /// Probability per sample of starting a spike burst
    spike_chance: f64,
    /// Remaining samples in the current burst
    burst_left: u32,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            tick: 0,
            baseline: 2.5,
            amplitude: 0.3,
            spike_chance: 0.01,
            burst_left: 0,
        }
    }

    /// A variant that never spikes, useful for healthy-signal runs
    pub fn steady() -> Self {
        Self {
            spike_chance: 0.0,
            ..Self::new()
        }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut rng = rand::thread_rng();
        let phase = self.tick as f64 * 0.1;
        self.tick += 1;

        let mut value = self.baseline + self.amplitude * phase.sin();
        value += rng.gen_range(-0.05..0.05);

        if self.burst_left > 0 {
            self.burst_left -= 1;
            value += rng.gen_range(1.5..3.0);
        } else if self.spike_chance > 0.0 && rng.gen_bool(self.spike_chance) {
            self.burst_left = rng.gen_range(3..8);
        }

        Ok(Some(format!("{:.4}", value)))
    }
}
